//! Heartbeat scheduler

use std::sync::Arc;
use std::time::Duration;

use crate::connection::OutboundQueue;
use crate::protocol::{self, Outbound};
use crate::session::{InteractionState, SessionState};

/// Heartbeat interval while the agent is speaking
///
/// Tighter than the configured interval so the backend notices a stalled
/// playback session quickly.
const SPEAKING_INTERVAL: Duration = Duration::from_secs(2);

/// Send liveness heartbeats forever
///
/// Sleeps first, then sends if connected; stopped only by process shutdown.
pub async fn run(state: Arc<SessionState>, queue: OutboundQueue, interval: Duration) {
    loop {
        let delay = if state.state() == InteractionState::Speaking {
            SPEAKING_INTERVAL
        } else {
            interval
        };
        tokio::time::sleep(delay).await;

        if queue.is_connected() {
            queue.send(Outbound::Heartbeat {
                timestamp: protocol::timestamp(),
            });
        }
    }
}
