//! Interaction state and stream bookkeeping

use std::fmt;
use std::str::FromStr;
use std::sync::Mutex;

use crate::Error;

/// What the agent is doing right now
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InteractionState {
    /// Waiting for a wake word
    #[default]
    Idle,
    /// Streaming captured audio to the backend
    Listening,
    /// Backend is working on the utterance
    Processing,
    /// Backend is playing a response
    Speaking,
}

impl FromStr for InteractionState {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "idle" => Ok(Self::Idle),
            "listening" => Ok(Self::Listening),
            "processing" => Ok(Self::Processing),
            "speaking" => Ok(Self::Speaking),
            other => Err(Error::InvalidState(other.to_string())),
        }
    }
}

impl fmt::Display for InteractionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Listening => "listening",
            Self::Processing => "processing",
            Self::Speaking => "speaking",
        };
        f.write_str(name)
    }
}

/// Ephemeral streaming session
///
/// At most one is active at a time; the sequence counts forwarded chunks
/// and resets to 0 whenever streaming turns on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamSession {
    /// Whether chunks are currently forwarded
    pub active: bool,
    /// Next chunk sequence number
    pub sequence: u64,
}

#[derive(Debug, Default)]
struct Inner {
    state: InteractionState,
    stream: StreamSession,
}

/// Shared interaction state
///
/// The session state machine is the single writer of the interaction state
/// and the streaming flag. The pump and heartbeat loops only read, except
/// that the pump claims chunk sequence numbers through [`Self::next_sequence`].
#[derive(Debug, Default)]
pub struct SessionState {
    inner: Mutex<Inner>,
}

impl SessionState {
    /// Create shared state starting at idle with streaming off
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current interaction state
    #[must_use]
    pub fn state(&self) -> InteractionState {
        self.inner
            .lock()
            .map(|inner| inner.state)
            .unwrap_or_default()
    }

    /// Replace the interaction state
    pub fn set_state(&self, state: InteractionState) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.state = state;
        }
    }

    /// Whether audio chunks are currently forwarded
    #[must_use]
    pub fn streaming(&self) -> bool {
        self.inner
            .lock()
            .map(|inner| inner.stream.active)
            .unwrap_or_default()
    }

    /// Snapshot of the stream session
    #[must_use]
    pub fn stream(&self) -> StreamSession {
        self.inner
            .lock()
            .map(|inner| inner.stream)
            .unwrap_or_default()
    }

    /// Turn streaming on; the sequence resets only on the off-to-on edge
    ///
    /// Returns true if streaming was off before the call.
    #[must_use]
    pub fn enable_streaming(&self) -> bool {
        self.inner
            .lock()
            .map(|mut inner| {
                if inner.stream.active {
                    false
                } else {
                    inner.stream = StreamSession {
                        active: true,
                        sequence: 0,
                    };
                    true
                }
            })
            .unwrap_or_default()
    }

    /// Turn streaming off
    ///
    /// Returns true if streaming was on before the call.
    #[must_use]
    pub fn disable_streaming(&self) -> bool {
        self.inner
            .lock()
            .map(|mut inner| {
                let was_active = inner.stream.active;
                inner.stream.active = false;
                was_active
            })
            .unwrap_or_default()
    }

    /// Claim the next chunk sequence number, or `None` when streaming is off
    #[must_use]
    pub fn next_sequence(&self) -> Option<u64> {
        self.inner
            .lock()
            .map(|mut inner| {
                if inner.stream.active {
                    let seq = inner.stream.sequence;
                    inner.stream.sequence += 1;
                    Some(seq)
                } else {
                    None
                }
            })
            .unwrap_or_default()
    }
}
