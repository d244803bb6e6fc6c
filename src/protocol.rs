//! Wire protocol codec
//!
//! JSON text frames shaped as `{"type": <string>, "data": {...}}`. This
//! module is pure (de)serialization: no retries, no validation beyond
//! structural parsing. Downstream components decide how to react to
//! malformed or unrecognized content.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::{Error, Result};

/// The wire message wrapper
///
/// Unknown fields inside `data` are preserved on decode and ignored by the
/// typed catalogs; they are never treated as an error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Message type, selecting the payload shape
    #[serde(rename = "type")]
    pub kind: String,

    /// Type-specific payload
    #[serde(default)]
    pub data: Map<String, Value>,
}

impl Envelope {
    /// Serialize to a JSON text frame
    ///
    /// # Errors
    ///
    /// Returns error if serialization fails
    pub fn encode(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parse a JSON text frame
    ///
    /// # Errors
    ///
    /// Returns error if the frame is not valid JSON or lacks a `type` field
    pub fn decode(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| Error::Protocol(e.to_string()))
    }
}

/// RFC 3339 UTC timestamp for outbound envelopes
#[must_use]
pub fn timestamp() -> String {
    chrono::Utc::now()
        .to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

/// Convert PCM16 samples to little-endian bytes for the wire
#[must_use]
pub fn pcm16_to_bytes(samples: &[i16]) -> Vec<u8> {
    samples.iter().flat_map(|s| s.to_le_bytes()).collect()
}

/// Messages the edge client sends to the backend
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    /// Announces a freshly opened connection
    ConnectionReady {
        /// Client identifier
        client_id: String,
        /// Current timestamp
        timestamp: String,
    },
    /// Wake word accepted while idle
    WakewordDetected {
        /// Detection confidence (0.0 to 1.0)
        confidence: f32,
        /// Current timestamp
        timestamp: String,
    },
    /// Wake word accepted during playback
    WakewordBargeIn {
        /// Detection confidence (0.0 to 1.0)
        confidence: f32,
        /// Current timestamp
        timestamp: String,
    },
    /// One sequenced chunk of captured audio
    AudioChunk {
        /// Raw PCM16 mono little-endian bytes
        audio: Vec<u8>,
        /// Per-stream sequence number
        seq: u64,
    },
    /// Streaming stopped
    StreamEnd {
        /// Why the stream ended
        reason: String,
    },
    /// Periodic liveness signal
    Heartbeat {
        /// Current timestamp
        timestamp: String,
    },
}

impl Outbound {
    /// Wrap a captured frame as a sequenced audio chunk
    #[must_use]
    pub fn audio_chunk(frame: &[i16], seq: u64) -> Self {
        Self::AudioChunk {
            audio: pcm16_to_bytes(frame),
            seq,
        }
    }

    /// Wire name of this message type
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::ConnectionReady { .. } => "connection_ready",
            Self::WakewordDetected { .. } => "wakeword_detected",
            Self::WakewordBargeIn { .. } => "wakeword_barge_in",
            Self::AudioChunk { .. } => "audio_chunk",
            Self::StreamEnd { .. } => "stream_end",
            Self::Heartbeat { .. } => "heartbeat",
        }
    }

    /// Build the wire envelope for this message
    #[must_use]
    pub fn into_envelope(self) -> Envelope {
        let kind = self.kind();
        let data = match self {
            Self::ConnectionReady {
                client_id,
                timestamp,
            } => json!({ "client_id": client_id, "timestamp": timestamp }),
            Self::WakewordDetected {
                confidence,
                timestamp,
            }
            | Self::WakewordBargeIn {
                confidence,
                timestamp,
            } => json!({ "confidence": confidence, "timestamp": timestamp }),
            Self::AudioChunk { audio, seq } => {
                json!({ "audio": BASE64.encode(audio), "seq": seq })
            }
            Self::StreamEnd { reason } => json!({ "reason": reason }),
            Self::Heartbeat { timestamp } => json!({ "timestamp": timestamp }),
        };

        let data = match data {
            Value::Object(map) => map,
            _ => Map::new(),
        };

        Envelope {
            kind: kind.to_string(),
            data,
        }
    }

    /// Serialize to a JSON text frame
    ///
    /// # Errors
    ///
    /// Returns error if serialization fails
    pub fn encode(self) -> Result<String> {
        self.into_envelope().encode()
    }
}

/// Commands and pushes the backend sends to the edge client
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    /// Force the interaction state
    SetState {
        /// Requested state name
        state: String,
    },
    /// Stop any in-flight playback
    InterruptTts,
    /// Synthesized speech to play
    TtsAudio {
        /// Decoded audio bytes
        audio: Vec<u8>,
        /// Audio format hint (e.g. "pcm")
        format: String,
    },
    /// Unconditionally return the session to idle
    SessionReset,
    /// Transcript update for display
    Transcript {
        /// Transcript text
        text: String,
        /// Whether this is the final transcript for the utterance
        is_final: bool,
    },
    /// Observational tool execution status
    ToolStatus {
        /// One of "started", "finished", "error"
        status: String,
        /// Tool name
        name: String,
    },
}

#[derive(Deserialize)]
struct SetStateData {
    state: String,
}

#[derive(Deserialize)]
struct TtsAudioData {
    audio: String,
    #[serde(default = "default_audio_format")]
    format: String,
}

fn default_audio_format() -> String {
    "pcm".to_string()
}

#[derive(Deserialize)]
struct TranscriptData {
    text: String,
    #[serde(default)]
    is_final: bool,
}

#[derive(Deserialize)]
struct ToolStatusData {
    status: String,
    name: String,
}

impl Inbound {
    /// Interpret a decoded envelope as a typed message
    ///
    /// Returns `Ok(None)` for well-formed envelopes whose type is not in
    /// the catalog; callers log and skip those.
    ///
    /// # Errors
    ///
    /// Returns error if a recognized type carries a malformed payload
    pub fn from_envelope(envelope: &Envelope) -> Result<Option<Self>> {
        let message = match envelope.kind.as_str() {
            "set_state" => {
                let payload: SetStateData = parse_data(envelope)?;
                Self::SetState {
                    state: payload.state,
                }
            }
            "interrupt_tts" => Self::InterruptTts,
            "tts_audio" => {
                let payload: TtsAudioData = parse_data(envelope)?;
                let audio = BASE64
                    .decode(payload.audio)
                    .map_err(|e| Error::Protocol(format!("tts_audio payload: {e}")))?;
                Self::TtsAudio {
                    audio,
                    format: payload.format,
                }
            }
            "session_reset" => Self::SessionReset,
            "transcript" => {
                let payload: TranscriptData = parse_data(envelope)?;
                Self::Transcript {
                    text: payload.text,
                    is_final: payload.is_final,
                }
            }
            "tool_status" => {
                let payload: ToolStatusData = parse_data(envelope)?;
                Self::ToolStatus {
                    status: payload.status,
                    name: payload.name,
                }
            }
            _ => return Ok(None),
        };

        Ok(Some(message))
    }
}

/// Deserialize an envelope's data payload into a typed struct
fn parse_data<T: DeserializeOwned>(envelope: &Envelope) -> Result<T> {
    serde_json::from_value(Value::Object(envelope.data.clone()))
        .map_err(|e| Error::Protocol(format!("{} payload: {e}", envelope.kind)))
}
