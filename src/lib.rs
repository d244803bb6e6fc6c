//! Aria Edge - edge voice client for the Aria assistant backend
//!
//! Maintains a persistent session with the voice backend: captures audio,
//! watches for the wake word, streams sequenced chunks while listening,
//! and reconnects automatically when the link drops.
//!
//! # Architecture
//!
//! ```text
//!  microphone ──> Audio Pump ──> wake scorer
//!                     │               │ detection
//!                     │ chunks        ▼
//!                     │         Session State Machine ──> streaming on/off
//!                     ▼               ▲
//!              Connection Manager ────┘ remote commands
//!                     │  ▲
//!                     ▼  │
//!                 voice backend (WebSocket)
//! ```
//!
//! The session state machine is the single writer of the interaction state
//! and the streaming flag; the pump, heartbeat scheduler, and connection
//! supervisor run as independent tasks around it.

pub mod config;
pub mod connection;
pub mod error;
pub mod heartbeat;
pub mod protocol;
pub mod pump;
pub mod session;
pub mod voice;

pub use config::Config;
pub use connection::{ConnectionManager, MessageHandler, OutboundQueue};
pub use error::{Error, Result};
pub use protocol::{Envelope, Inbound, Outbound};
pub use session::{InteractionState, Session, SessionState, StreamSession};
