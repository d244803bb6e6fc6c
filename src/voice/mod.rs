//! Audio collaborators
//!
//! The session core talks to hardware through the traits in this module so
//! its logic stays testable without audio devices. Device-backed defaults
//! live in the submodules.

pub mod capture;
pub mod playback;
pub mod wake;

pub use capture::MicCapture;
pub use playback::AudioPlayback;
pub use wake::EnergyScorer;

use async_trait::async_trait;

use crate::Result;

/// Sample rate for audio capture (16kHz for speech)
pub const SAMPLE_RATE: u32 = 16_000;

/// A fixed-size PCM16 frame read from the capture source
pub type Frame = Vec<i16>;

/// Source of captured microphone frames
///
/// Implementations may hold platform audio handles that are not `Send`, so
/// the pump runs the source on the task it was created on.
#[async_trait(?Send)]
pub trait CaptureSource {
    /// Start capturing
    ///
    /// # Errors
    ///
    /// Returns error if the device cannot be opened
    fn start(&mut self) -> Result<()>;

    /// Stop capturing
    fn stop(&mut self);

    /// Read the next fixed-size frame, waiting until one is available
    ///
    /// # Errors
    ///
    /// Returns error on device failure
    async fn read_frame(&mut self) -> Result<Frame>;
}

/// Opaque wake-word scorer consuming one frame at a time
pub trait WakeWordScorer: Send {
    /// Prepare the scorer for detection
    ///
    /// # Errors
    ///
    /// Returns error if the model cannot be loaded
    fn load(&mut self) -> Result<()>;

    /// Score one frame; returns `(detected, confidence)`
    ///
    /// # Errors
    ///
    /// Returns error if scoring fails
    fn detect(&mut self, frame: &[i16]) -> Result<(bool, f32)>;

    /// Discard accumulated internal state
    fn reset(&mut self);
}

/// Best-effort output mute control used during barge-in
#[async_trait]
pub trait OutputControl: Send + Sync {
    /// Mute the output device
    ///
    /// # Errors
    ///
    /// Returns error on device failure; callers treat this as non-fatal
    async fn mute(&self) -> Result<()>;

    /// Unmute the output device
    ///
    /// # Errors
    ///
    /// Returns error on device failure; callers treat this as non-fatal
    async fn unmute(&self) -> Result<()>;
}

/// Sink for synthesized speech pushed by the backend
#[async_trait]
pub trait PlaybackSink: Send + Sync {
    /// Queue audio for playback
    ///
    /// # Errors
    ///
    /// Returns error if the format is unsupported or the device failed
    async fn play(&self, audio: &[u8], format: &str) -> Result<()>;

    /// Stop any in-flight playback
    fn stop(&self);
}

/// Sink for transcript updates pushed by the backend
pub trait TranscriptSink: Send + Sync {
    /// Deliver one transcript update
    fn transcript(&self, text: &str, is_final: bool);
}
