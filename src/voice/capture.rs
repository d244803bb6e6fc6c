//! Microphone capture via cpal

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleRate, Stream, StreamConfig};

use super::{CaptureSource, Frame, SAMPLE_RATE};
use crate::{Error, Result};

/// Poll interval while waiting for the device to fill a frame
const FRAME_POLL: Duration = Duration::from_millis(10);

/// Captures fixed-size PCM16 frames from the default input device
pub struct MicCapture {
    config: StreamConfig,
    frame_samples: usize,
    buffer: Arc<Mutex<Vec<i16>>>,
    stream: Option<Stream>,
}

impl MicCapture {
    /// Create a new capture instance reading `frame_samples` per frame
    ///
    /// # Errors
    ///
    /// Returns error if no suitable input device is available
    pub fn new(frame_samples: usize) -> Result<Self> {
        let host = cpal::default_host();

        let device = host
            .default_input_device()
            .ok_or_else(|| Error::Audio("no input device available".to_string()))?;

        let supported_config = device
            .supported_input_configs()
            .map_err(|e| Error::Audio(e.to_string()))?
            .find(|c| {
                c.channels() == 1
                    && c.min_sample_rate() <= SampleRate(SAMPLE_RATE)
                    && c.max_sample_rate() >= SampleRate(SAMPLE_RATE)
            })
            .ok_or_else(|| Error::Audio("no suitable audio config found".to_string()))?;

        let config = supported_config
            .with_sample_rate(SampleRate(SAMPLE_RATE))
            .config();

        tracing::debug!(
            device = device.name().unwrap_or_default(),
            sample_rate = SAMPLE_RATE,
            channels = config.channels,
            frame_samples,
            "audio capture initialized"
        );

        Ok(Self {
            config,
            frame_samples,
            buffer: Arc::new(Mutex::new(Vec::new())),
            stream: None,
        })
    }

    /// Log the available input devices (startup diagnostics)
    pub fn list_devices() {
        let host = cpal::default_host();
        match host.input_devices() {
            Ok(devices) => {
                for device in devices {
                    tracing::info!(
                        device = device.name().unwrap_or_default(),
                        "input device"
                    );
                }
            }
            Err(e) => tracing::warn!(error = %e, "could not enumerate input devices"),
        }
    }
}

#[async_trait(?Send)]
impl CaptureSource for MicCapture {
    fn start(&mut self) -> Result<()> {
        if self.stream.is_some() {
            return Ok(());
        }

        let buffer = Arc::clone(&self.buffer);
        let host = cpal::default_host();
        let device = host
            .default_input_device()
            .ok_or_else(|| Error::Audio("no input device".to_string()))?;

        let config = self.config.clone();

        let stream = device
            .build_input_stream(
                &config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    if let Ok(mut buf) = buffer.lock() {
                        #[allow(clippy::cast_possible_truncation)]
                        buf.extend(
                            data.iter()
                                .map(|s| (s * 32767.0).clamp(-32768.0, 32767.0) as i16),
                        );
                    }
                },
                |err| {
                    tracing::error!(error = %err, "audio capture error");
                },
                None,
            )
            .map_err(|e| Error::Audio(e.to_string()))?;

        stream.play().map_err(|e| Error::Audio(e.to_string()))?;
        self.stream = Some(stream);

        tracing::debug!("audio capture started");
        Ok(())
    }

    fn stop(&mut self) {
        if let Some(stream) = self.stream.take() {
            drop(stream);
            tracing::debug!("audio capture stopped");
        }
    }

    async fn read_frame(&mut self) -> Result<Frame> {
        loop {
            if self.stream.is_none() {
                return Err(Error::Audio("capture not started".to_string()));
            }

            if let Ok(mut buf) = self.buffer.lock() {
                if buf.len() >= self.frame_samples {
                    return Ok(buf.drain(..self.frame_samples).collect());
                }
            }

            tokio::time::sleep(FRAME_POLL).await;
        }
    }
}
