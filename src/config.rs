//! Configuration management for the edge client
//!
//! Loaded once at startup from environment variables and treated as
//! immutable afterwards.

use std::fmt::Display;
use std::str::FromStr;
use std::time::Duration;

use uuid::Uuid;

use crate::{Error, Result};

/// Edge client configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// WebSocket endpoint of the voice backend
    pub backend_url: String,

    /// Unique identifier for this client
    pub client_id: String,

    /// Audio capture parameters
    pub audio: AudioConfig,

    /// Wake word scoring parameters
    pub wake_word: WakeWordConfig,

    /// Session timing parameters
    pub session: SessionConfig,
}

/// Audio capture configuration
#[derive(Debug, Clone)]
pub struct AudioConfig {
    /// Capture sample rate in Hz
    pub sample_rate: u32,

    /// Capture channel count
    pub channels: u16,

    /// Samples per captured frame
    pub frame_samples: usize,
}

/// Wake word scoring configuration
#[derive(Debug, Clone)]
pub struct WakeWordConfig {
    /// Detection confidence threshold (0.0 to 1.0)
    pub threshold: f32,
}

/// Session timing configuration
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Interval between heartbeat messages
    pub heartbeat_interval: Duration,

    /// Minimum time between two accepted wake detections
    pub wake_cooldown: Duration,

    /// Pause letting residual playback drain during barge-in
    pub barge_in_settle: Duration,

    /// Upper bound on a best-effort mute/unmute request
    pub mute_timeout: Duration,

    /// Fixed delay between reconnection attempts
    pub reconnect_delay: Duration,

    /// Upper bound on a single connect attempt
    pub connect_timeout: Duration,
}

impl Config {
    /// Load configuration from environment variables
    ///
    /// Reads from:
    /// - `ARIA_BACKEND_URL`: WebSocket endpoint (default `ws://localhost:8000/api/voice/connect`)
    /// - `ARIA_CLIENT_ID`: client identifier (default: generated `edge-<uuid>`)
    /// - `ARIA_SAMPLE_RATE`: capture sample rate in Hz (default 16000)
    /// - `ARIA_CHANNELS`: capture channels (default 1)
    /// - `ARIA_FRAME_SAMPLES`: samples per frame (default 1024)
    /// - `ARIA_WAKE_THRESHOLD`: detection threshold 0.0-1.0 (default 0.5)
    /// - `ARIA_HEARTBEAT_SECS`: heartbeat interval (default 10)
    /// - `ARIA_WAKE_COOLDOWN_MS`: wake cooldown window (default 1000)
    /// - `ARIA_BARGE_IN_SETTLE_MS`: barge-in settle delay (default 300)
    /// - `ARIA_MUTE_TIMEOUT_MS`: mute request bound (default 100)
    /// - `ARIA_RECONNECT_SECS`: reconnect delay (default 3)
    /// - `ARIA_CONNECT_TIMEOUT_SECS`: connect attempt bound (default 10)
    ///
    /// # Errors
    ///
    /// Returns error if a variable is present but unparseable, or if the
    /// wake threshold is outside `0.0..=1.0`.
    pub fn from_env() -> Result<Self> {
        let backend_url = std::env::var("ARIA_BACKEND_URL")
            .unwrap_or_else(|_| "ws://localhost:8000/api/voice/connect".to_string());

        let client_id = std::env::var("ARIA_CLIENT_ID")
            .unwrap_or_else(|_| format!("edge-{}", Uuid::new_v4()));

        let threshold: f32 = env_parse("ARIA_WAKE_THRESHOLD", 0.5)?;
        if !(0.0..=1.0).contains(&threshold) {
            return Err(Error::Config(format!(
                "ARIA_WAKE_THRESHOLD must be within 0.0..=1.0, got {threshold}"
            )));
        }

        Ok(Self {
            backend_url,
            client_id,
            audio: AudioConfig {
                sample_rate: env_parse("ARIA_SAMPLE_RATE", 16_000)?,
                channels: env_parse("ARIA_CHANNELS", 1)?,
                frame_samples: env_parse("ARIA_FRAME_SAMPLES", 1024)?,
            },
            wake_word: WakeWordConfig { threshold },
            session: SessionConfig {
                heartbeat_interval: Duration::from_secs(env_parse("ARIA_HEARTBEAT_SECS", 10)?),
                wake_cooldown: Duration::from_millis(env_parse("ARIA_WAKE_COOLDOWN_MS", 1000)?),
                barge_in_settle: Duration::from_millis(env_parse(
                    "ARIA_BARGE_IN_SETTLE_MS",
                    300,
                )?),
                mute_timeout: Duration::from_millis(env_parse("ARIA_MUTE_TIMEOUT_MS", 100)?),
                reconnect_delay: Duration::from_secs(env_parse("ARIA_RECONNECT_SECS", 3)?),
                connect_timeout: Duration::from_secs(env_parse("ARIA_CONNECT_TIMEOUT_SECS", 10)?),
            },
        })
    }
}

/// Parse an environment variable, falling back to a default when unset
fn env_parse<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: Display,
{
    match std::env::var(key) {
        Ok(value) => value
            .parse()
            .map_err(|e| Error::Config(format!("{key}: {e}"))),
        Err(_) => Ok(default),
    }
}
