//! Audio playback to speakers
//!
//! Playback runs on a dedicated thread because cpal streams are not `Send`;
//! the async side only enqueues clips and flips the mute/stop flags.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{Receiver, Sender, channel};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleRate, StreamConfig};

use super::{OutputControl, PlaybackSink};
use crate::{Error, Result};

/// Sample rate for playback (matches common TTS output)
const PLAYBACK_SAMPLE_RATE: u32 = 24_000;

enum Command {
    Play(Vec<f32>),
}

/// Plays backend TTS audio on the default output device
pub struct AudioPlayback {
    commands: Sender<Command>,
    muted: Arc<AtomicBool>,
    stopped: Arc<AtomicBool>,
}

impl AudioPlayback {
    /// Create a playback instance and spawn its worker thread
    ///
    /// # Errors
    ///
    /// Returns error if no suitable output device is available
    pub fn new() -> Result<Self> {
        let host = cpal::default_host();

        let device = host
            .default_output_device()
            .ok_or_else(|| Error::Audio("no output device available".to_string()))?;

        let supported_config = device
            .supported_output_configs()
            .map_err(|e| Error::Audio(e.to_string()))?
            .find(|c| {
                c.channels() == 1
                    && c.min_sample_rate() <= SampleRate(PLAYBACK_SAMPLE_RATE)
                    && c.max_sample_rate() >= SampleRate(PLAYBACK_SAMPLE_RATE)
            })
            .or_else(|| {
                // Fallback: try stereo
                device.supported_output_configs().ok()?.find(|c| {
                    c.channels() == 2
                        && c.min_sample_rate() <= SampleRate(PLAYBACK_SAMPLE_RATE)
                        && c.max_sample_rate() >= SampleRate(PLAYBACK_SAMPLE_RATE)
                })
            })
            .ok_or_else(|| Error::Audio("no suitable output config found".to_string()))?;

        let config = supported_config
            .with_sample_rate(SampleRate(PLAYBACK_SAMPLE_RATE))
            .config();

        tracing::debug!(
            device = device.name().unwrap_or_default(),
            sample_rate = PLAYBACK_SAMPLE_RATE,
            channels = config.channels,
            "audio playback initialized"
        );

        let (commands, rx) = channel();
        let muted = Arc::new(AtomicBool::new(false));
        let stopped = Arc::new(AtomicBool::new(false));

        let worker_muted = Arc::clone(&muted);
        let worker_stopped = Arc::clone(&stopped);
        std::thread::spawn(move || worker(&rx, &config, &worker_muted, &worker_stopped));

        Ok(Self {
            commands,
            muted,
            stopped,
        })
    }
}

#[async_trait]
impl PlaybackSink for AudioPlayback {
    async fn play(&self, audio: &[u8], format: &str) -> Result<()> {
        let samples: Vec<f32> = match format {
            "pcm" | "pcm16" => audio
                .chunks_exact(2)
                .map(|c| f32::from(i16::from_le_bytes([c[0], c[1]])) / 32768.0)
                .collect(),
            other => {
                return Err(Error::Audio(format!("unsupported audio format: {other}")));
            }
        };

        self.stopped.store(false, Ordering::Relaxed);
        self.commands
            .send(Command::Play(samples))
            .map_err(|_| Error::Audio("playback worker stopped".to_string()))
    }

    fn stop(&self) {
        self.stopped.store(true, Ordering::Relaxed);
    }
}

#[async_trait]
impl OutputControl for AudioPlayback {
    async fn mute(&self) -> Result<()> {
        self.muted.store(true, Ordering::Relaxed);
        tracing::debug!("output muted");
        Ok(())
    }

    async fn unmute(&self) -> Result<()> {
        self.muted.store(false, Ordering::Relaxed);
        tracing::debug!("output unmuted");
        Ok(())
    }
}

/// Play queued clips until the command channel closes
fn worker(
    rx: &Receiver<Command>,
    config: &StreamConfig,
    muted: &Arc<AtomicBool>,
    stopped: &Arc<AtomicBool>,
) {
    while let Ok(Command::Play(samples)) = rx.recv() {
        if let Err(e) = play_clip(config, samples, muted, stopped) {
            tracing::error!(error = %e, "playback failed");
        }
    }
}

/// Play one clip to completion, honoring the mute and stop flags
fn play_clip(
    config: &StreamConfig,
    samples: Vec<f32>,
    muted: &Arc<AtomicBool>,
    stopped: &Arc<AtomicBool>,
) -> Result<()> {
    if samples.is_empty() {
        return Ok(());
    }

    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .ok_or_else(|| Error::Audio("no output device".to_string()))?;

    let channels = usize::from(config.channels);
    let sample_count = samples.len();

    let samples = Arc::new(samples);
    let position = Arc::new(Mutex::new(0usize));
    let finished = Arc::new(AtomicBool::new(false));

    let cb_samples = Arc::clone(&samples);
    let cb_position = Arc::clone(&position);
    let cb_finished = Arc::clone(&finished);
    let cb_muted = Arc::clone(muted);
    let cb_stopped = Arc::clone(stopped);

    let stream = device
        .build_output_stream(
            config,
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                let Ok(mut pos) = cb_position.lock() else {
                    return;
                };

                for frame in data.chunks_mut(channels) {
                    let sample = if cb_stopped.load(Ordering::Relaxed)
                        || *pos >= cb_samples.len()
                    {
                        cb_finished.store(true, Ordering::Relaxed);
                        0.0
                    } else {
                        let s = cb_samples[*pos];
                        *pos += 1;
                        if cb_muted.load(Ordering::Relaxed) { 0.0 } else { s }
                    };

                    for out in frame.iter_mut() {
                        *out = sample;
                    }
                }
            },
            |err| {
                tracing::error!(error = %err, "audio playback error");
            },
            None,
        )
        .map_err(|e| Error::Audio(e.to_string()))?;

    stream.play().map_err(|e| Error::Audio(e.to_string()))?;

    let duration_ms = (sample_count as u64 * 1000) / u64::from(PLAYBACK_SAMPLE_RATE);
    let timeout = std::time::Duration::from_millis(duration_ms + 500);
    let start = std::time::Instant::now();

    while !finished.load(Ordering::Relaxed) {
        if start.elapsed() > timeout {
            break;
        }
        std::thread::sleep(std::time::Duration::from_millis(50));
    }

    drop(stream);
    tracing::debug!(samples = sample_count, "playback complete");

    Ok(())
}
