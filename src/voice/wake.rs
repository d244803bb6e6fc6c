//! Energy-based wake scoring
//!
//! A lightweight default scorer: sustained RMS energy above a floor counts
//! as a detection. Deployments with a real wake-word model plug it in
//! behind [`WakeWordScorer`] instead.

use super::WakeWordScorer;
use crate::{Error, Result};

/// Minimum normalized energy to consider speech
const ENERGY_FLOOR: f32 = 0.03;

/// Sustained speech needed to trigger (samples at 16kHz, 0.3 seconds)
const MIN_SPEECH_SAMPLES: usize = 4800;

/// Scores frames by sustained audio energy
pub struct EnergyScorer {
    threshold: f32,
    speech_samples: usize,
    loaded: bool,
}

impl EnergyScorer {
    /// Create a scorer with the given confidence threshold
    #[must_use]
    pub const fn new(threshold: f32) -> Self {
        Self {
            threshold,
            speech_samples: 0,
            loaded: false,
        }
    }
}

impl WakeWordScorer for EnergyScorer {
    fn load(&mut self) -> Result<()> {
        self.loaded = true;
        tracing::debug!(threshold = self.threshold, "energy scorer ready");
        Ok(())
    }

    fn detect(&mut self, frame: &[i16]) -> Result<(bool, f32)> {
        if !self.loaded {
            return Err(Error::WakeWord("scorer not loaded".to_string()));
        }

        let energy = normalized_energy(frame);
        let confidence = (energy / (ENERGY_FLOOR * 2.0)).clamp(0.0, 1.0);

        if energy > ENERGY_FLOOR {
            self.speech_samples += frame.len();
        } else {
            self.speech_samples = 0;
        }

        let detected = self.speech_samples >= MIN_SPEECH_SAMPLES && confidence >= self.threshold;
        if detected {
            // Rearm so one utterance yields one detection.
            self.speech_samples = 0;
        }

        Ok((detected, confidence))
    }

    fn reset(&mut self) {
        self.speech_samples = 0;
    }
}

/// RMS energy of PCM16 samples, normalized to 0.0-1.0
#[allow(clippy::cast_precision_loss)]
fn normalized_energy(samples: &[i16]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }

    let sum_squares: f32 = samples
        .iter()
        .map(|&s| {
            let normalized = f32::from(s) / 32768.0;
            normalized * normalized
        })
        .sum();
    (sum_squares / samples.len() as f32).sqrt()
}
