//! Audio stream pump
//!
//! Drains the capture source continuously so the device buffer never
//! overflows, scores every frame for the wake word, and forwards frames
//! as sequenced chunks only while streaming is enabled.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc;

use crate::connection::OutboundQueue;
use crate::protocol::Outbound;
use crate::session::SessionState;
use crate::voice::{CaptureSource, WakeWordScorer};

/// Pause after a capture failure before retrying the device
const CAPTURE_RETRY: Duration = Duration::from_secs(1);

/// A detection reported by the scorer, pending the session's cooldown gate
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WakeEvent {
    /// Detection confidence (0.0 to 1.0)
    pub confidence: f32,
}

/// Run the pump until the process shuts down
///
/// Every frame is drained and scored regardless of the streaming flag;
/// capture failures are logged and retried, never fatal.
pub async fn run<C: CaptureSource>(
    mut capture: C,
    scorer: Arc<Mutex<dyn WakeWordScorer>>,
    state: Arc<SessionState>,
    queue: OutboundQueue,
    wake_tx: mpsc::Sender<WakeEvent>,
) {
    tracing::info!("audio pump started");

    loop {
        let frame = match capture.read_frame().await {
            Ok(frame) => frame,
            Err(e) => {
                tracing::error!(error = %e, "capture read failed");
                tokio::time::sleep(CAPTURE_RETRY).await;
                continue;
            }
        };

        match scorer.lock().ok().map(|mut scorer| scorer.detect(&frame)) {
            Some(Ok((true, confidence))) => {
                if wake_tx.try_send(WakeEvent { confidence }).is_err() {
                    tracing::debug!("wake event queue full, dropping detection");
                }
            }
            Some(Err(e)) => tracing::warn!(error = %e, "wake word scoring failed"),
            _ => {}
        }

        if let Some(seq) = state.next_sequence() {
            queue.send(Outbound::audio_chunk(&frame, seq));
        }
    }
}
