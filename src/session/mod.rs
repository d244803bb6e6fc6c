//! Session state machine
//!
//! The single authority on interaction state. Consumes local wake events
//! from the pump and remote commands from the connection manager, drives
//! streaming on and off, and orchestrates the barge-in sequence. All
//! transition failures are non-fatal: the worst outcome is an unchanged
//! state or an unsent notification.

mod state;

pub use state::{InteractionState, SessionState, StreamSession};

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::config::SessionConfig;
use crate::connection::{MessageHandler, OutboundQueue};
use crate::protocol::{self, Inbound, Outbound};
use crate::pump::WakeEvent;
use crate::voice::{OutputControl, PlaybackSink, TranscriptSink, WakeWordScorer};

/// External collaborators the session drives
pub struct Hooks {
    /// Best-effort output mute used during barge-in
    pub output: Arc<dyn OutputControl>,
    /// Sink for backend TTS audio
    pub playback: Arc<dyn PlaybackSink>,
    /// Sink for transcript updates
    pub display: Arc<dyn TranscriptSink>,
}

/// The session state machine
pub struct Session {
    state: Arc<SessionState>,
    queue: OutboundQueue,
    scorer: Arc<Mutex<dyn WakeWordScorer>>,
    hooks: Hooks,
    wake_cooldown: Duration,
    settle_delay: Duration,
    mute_timeout: Duration,
    last_wake: Mutex<Option<Instant>>,
}

impl Session {
    /// Create the state machine
    #[must_use]
    pub fn new(
        state: Arc<SessionState>,
        queue: OutboundQueue,
        scorer: Arc<Mutex<dyn WakeWordScorer>>,
        hooks: Hooks,
        config: &SessionConfig,
    ) -> Self {
        Self {
            state,
            queue,
            scorer,
            hooks,
            wake_cooldown: config.wake_cooldown,
            settle_delay: config.barge_in_settle,
            mute_timeout: config.mute_timeout,
            last_wake: Mutex::new(None),
        }
    }

    /// Shared state handle
    #[must_use]
    pub fn state(&self) -> Arc<SessionState> {
        Arc::clone(&self.state)
    }

    /// Consume wake events from the pump until it stops
    pub async fn run(self: Arc<Self>, mut wake_rx: mpsc::Receiver<WakeEvent>) {
        while let Some(event) = wake_rx.recv().await {
            self.handle_wake(event).await;
        }
        tracing::debug!("wake event channel closed, session loop stopping");
    }

    /// React to a locally detected wake word
    ///
    /// Detections inside the cooldown window are dropped. From idle the
    /// transition is local-first: listening starts before the backend
    /// acknowledges. From speaking this runs the barge-in sequence. Any
    /// other state ignores the detection.
    pub async fn handle_wake(&self, event: WakeEvent) {
        if !self.accept_wake() {
            tracing::debug!("wake detection inside cooldown window, ignoring");
            return;
        }

        match self.state.state() {
            InteractionState::Idle => {
                tracing::info!(confidence = event.confidence, "wake word detected");
                self.state.set_state(InteractionState::Listening);
                self.enable_streaming();
                self.queue.send(Outbound::WakewordDetected {
                    confidence: event.confidence,
                    timestamp: protocol::timestamp(),
                });
            }
            InteractionState::Speaking => self.barge_in(event.confidence).await,
            other => {
                tracing::debug!(state = %other, "ignoring wake detection");
            }
        }
    }

    /// Cooldown gate: at most one accepted detection per window
    ///
    /// An accepted detection consumes the window even when the current
    /// state then ignores it.
    fn accept_wake(&self) -> bool {
        let Ok(mut last) = self.last_wake.lock() else {
            return false;
        };

        let now = Instant::now();
        if let Some(previous) = *last {
            if now.duration_since(previous) < self.wake_cooldown {
                return false;
            }
        }
        *last = Some(now);
        true
    }

    /// Barge-in: mute, notify, settle, unmute, listen
    ///
    /// The steps run in this fixed order even when mute or unmute fail.
    async fn barge_in(&self, confidence: f32) {
        tracing::info!(confidence, "barge-in detected during playback");

        match tokio::time::timeout(self.mute_timeout, self.hooks.output.mute()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::warn!(error = %e, "output mute failed"),
            Err(_) => tracing::warn!(timeout = ?self.mute_timeout, "output mute timed out"),
        }

        self.queue.send(Outbound::WakewordBargeIn {
            confidence,
            timestamp: protocol::timestamp(),
        });

        // Let residual playback drain before reopening the microphone path.
        tokio::time::sleep(self.settle_delay).await;

        match tokio::time::timeout(self.mute_timeout, self.hooks.output.unmute()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::warn!(error = %e, "output unmute failed"),
            Err(_) => tracing::warn!(timeout = ?self.mute_timeout, "output unmute timed out"),
        }

        self.state.set_state(InteractionState::Listening);
        self.enable_streaming();
    }

    /// Apply a remote state command; unparseable names leave state unchanged
    fn apply_remote_state(&self, name: &str) {
        let new_state = match name.parse::<InteractionState>() {
            Ok(state) => state,
            Err(e) => {
                tracing::error!(error = %e, "ignoring invalid state from backend");
                return;
            }
        };

        let old_state = self.state.state();
        self.state.set_state(new_state);
        tracing::info!(from = %old_state, to = %new_state, "state transition");

        match new_state {
            InteractionState::Listening => self.enable_streaming(),
            InteractionState::Idle | InteractionState::Processing => {
                self.disable_streaming("state_change");
            }
            InteractionState::Speaking => {}
        }
    }

    /// Unconditionally return to idle, discarding scorer state
    fn reset(&self) {
        tracing::info!("session reset");
        self.disable_streaming("session_reset");
        if let Ok(mut scorer) = self.scorer.lock() {
            scorer.reset();
        }
        self.state.set_state(InteractionState::Idle);
    }

    fn enable_streaming(&self) {
        if self.state.enable_streaming() {
            tracing::info!("audio streaming enabled");
        }
    }

    fn disable_streaming(&self, reason: &str) {
        if self.state.disable_streaming() {
            tracing::info!(reason, "audio streaming disabled");
            self.queue.send(Outbound::StreamEnd {
                reason: reason.to_string(),
            });
        }
    }
}

#[async_trait]
impl MessageHandler for Session {
    async fn handle(&self, message: Inbound) {
        match message {
            Inbound::SetState { state } => self.apply_remote_state(&state),
            Inbound::InterruptTts => {
                tracing::info!("playback interrupt requested");
                self.hooks.playback.stop();
            }
            Inbound::TtsAudio { audio, format } => {
                if let Err(e) = self.hooks.playback.play(&audio, &format).await {
                    tracing::warn!(error = %e, "tts playback failed");
                }
            }
            Inbound::SessionReset => self.reset(),
            Inbound::Transcript { text, is_final } => {
                self.hooks.display.transcript(&text, is_final);
            }
            Inbound::ToolStatus { status, name } => {
                tracing::info!(tool = %name, status = %status, "tool status");
            }
        }
    }
}
