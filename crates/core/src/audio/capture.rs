use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, Sample, SampleFormat, SizedSample};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TrySendError};

use super::{frame_duration, AudioFrame, FrameSource, FALLBACK_SAMPLE_RATE};
use crate::{Result, SeeingSoundError};

/// Chunks the audio callback may queue before it starts dropping data.
const CHANNEL_CAPACITY: usize = 64;
/// Frames of backlog the reader tolerates before skipping ahead to live audio.
const MAX_BACKLOG_FRAMES: usize = 4;
const MIN_READ_TIMEOUT: Duration = Duration::from_millis(50);

/// Input-capable device as presented to the operator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputDevice {
    pub index: usize,
    pub name: String,
    pub default_sample_rate: Option<u32>,
    pub is_default: bool,
}

/// Enumerates the input devices of the default host. Indices are stable for
/// the lifetime of the host and are what [`CpalFrameSource::open`] expects.
pub fn list_input_devices() -> Result<Vec<InputDevice>> {
    let host = cpal::default_host();
    let default_name = host.default_input_device().and_then(|d| d.name().ok());

    let devices = host
        .input_devices()
        .map_err(|e| SeeingSoundError::Audio(format!("failed to enumerate devices: {e}")))?;

    Ok(devices
        .enumerate()
        .map(|(index, device)| {
            let name = device.name().unwrap_or_else(|_| "(unnamed)".to_string());
            let default_sample_rate = device
                .default_input_config()
                .ok()
                .map(|config| config.sample_rate().0);
            InputDevice {
                index,
                is_default: default_name.as_deref() == Some(name.as_str()),
                name,
                default_sample_rate,
            }
        })
        .collect())
}

/// Microphone / line-in capture through cpal.
///
/// The audio callback downmixes to the first channel, converts to `i16` and
/// forwards each callback buffer over a bounded channel. The reader stitches
/// those chunks into fixed-size frames.
pub struct CpalFrameSource {
    stream: Option<cpal::Stream>,
    receiver: Receiver<Vec<i16>>,
    pending: Vec<i16>,
    overflowed: Arc<AtomicBool>,
    sample_rate: u32,
    frame_size: usize,
    device_name: String,
}

impl CpalFrameSource {
    /// Opens the device at `device_index` (see [`list_input_devices`]) or the
    /// host default, at the device's default sample rate.
    pub fn open(device_index: Option<usize>, frame_size: usize) -> Result<Self> {
        if frame_size == 0 {
            return Err(SeeingSoundError::Audio("frame size must be positive".into()));
        }

        let host = cpal::default_host();
        let device = match device_index {
            Some(index) => host
                .input_devices()
                .map_err(|e| SeeingSoundError::Audio(format!("failed to enumerate devices: {e}")))?
                .nth(index)
                .ok_or_else(|| {
                    SeeingSoundError::Audio(format!("no input device at index {index}"))
                })?,
            None => host
                .default_input_device()
                .ok_or_else(|| SeeingSoundError::Audio("no default input device".into()))?,
        };
        let device_name = device.name().unwrap_or_else(|_| "(unnamed)".to_string());

        let supported = device
            .default_input_config()
            .map_err(|e| SeeingSoundError::Audio(format!("{device_name}: {e}")))?;
        let sample_format = supported.sample_format();
        let mut stream_config: cpal::StreamConfig = supported.into();
        if stream_config.sample_rate.0 == 0 {
            stream_config.sample_rate = cpal::SampleRate(FALLBACK_SAMPLE_RATE);
        }
        let sample_rate = stream_config.sample_rate.0;

        let (sender, receiver) = crossbeam_channel::bounded(CHANNEL_CAPACITY);
        let overflowed = Arc::new(AtomicBool::new(false));

        let flag = overflowed.clone();
        let stream = match sample_format {
            SampleFormat::I8 => build_stream::<i8>(&device, &stream_config, sender, flag)?,
            SampleFormat::I16 => build_stream::<i16>(&device, &stream_config, sender, flag)?,
            SampleFormat::I32 => build_stream::<i32>(&device, &stream_config, sender, flag)?,
            SampleFormat::U8 => build_stream::<u8>(&device, &stream_config, sender, flag)?,
            SampleFormat::U16 => build_stream::<u16>(&device, &stream_config, sender, flag)?,
            SampleFormat::F32 => build_stream::<f32>(&device, &stream_config, sender, flag)?,
            SampleFormat::F64 => build_stream::<f64>(&device, &stream_config, sender, flag)?,
            other => {
                return Err(SeeingSoundError::Audio(format!(
                    "unsupported sample format {other:?}"
                )))
            }
        };

        stream
            .play()
            .map_err(|e| SeeingSoundError::Audio(format!("failed to start stream: {e}")))?;

        tracing::info!(
            device = %device_name,
            sample_rate,
            channels = stream_config.channels,
            frame_size,
            "audio stream opened"
        );

        Ok(Self {
            stream: Some(stream),
            receiver,
            pending: Vec::with_capacity(frame_size * 2),
            overflowed,
            sample_rate,
            frame_size,
            device_name,
        })
    }

    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    fn read_timeout(&self) -> Duration {
        (frame_duration(self.frame_size, self.sample_rate) * 2).max(MIN_READ_TIMEOUT)
    }
}

impl FrameSource for CpalFrameSource {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn frame_size(&self) -> usize {
        self.frame_size
    }

    fn read_frame(&mut self) -> Result<AudioFrame> {
        if self.stream.is_none() {
            return Err(SeeingSoundError::StreamClosed);
        }

        let timeout = self.read_timeout();
        while self.pending.len() < self.frame_size {
            match self.receiver.recv_timeout(timeout) {
                Ok(chunk) => self.pending.extend_from_slice(&chunk),
                Err(RecvTimeoutError::Timeout) => {
                    return Err(SeeingSoundError::StreamStalled(timeout))
                }
                Err(RecvTimeoutError::Disconnected) => return Err(SeeingSoundError::StreamClosed),
            }
        }

        let mut overflowed = self.overflowed.swap(false, Ordering::Relaxed);
        if self.pending.len() > self.frame_size * MAX_BACKLOG_FRAMES {
            let stale = self.pending.len() - self.frame_size;
            self.pending.drain(..stale);
            overflowed = true;
        }

        let samples: Vec<i16> = self.pending.drain(..self.frame_size).collect();
        Ok(AudioFrame::new(samples, self.sample_rate).with_overflow(overflowed))
    }

    fn close(&mut self) -> Result<()> {
        if let Some(stream) = self.stream.take() {
            let paused = stream.pause();
            drop(stream);
            self.pending.clear();
            tracing::info!(device = %self.device_name, "audio stream closed");
            paused.map_err(|e| SeeingSoundError::Audio(format!("failed to stop stream: {e}")))?;
        }
        Ok(())
    }
}

impl Drop for CpalFrameSource {
    fn drop(&mut self) {
        if let Err(err) = self.close() {
            tracing::warn!(%err, "audio stream did not stop cleanly");
        }
    }
}

impl std::fmt::Debug for CpalFrameSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CpalFrameSource")
            .field("device_name", &self.device_name)
            .field("sample_rate", &self.sample_rate)
            .field("frame_size", &self.frame_size)
            .field("open", &self.stream.is_some())
            .finish()
    }
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    sender: Sender<Vec<i16>>,
    overflowed: Arc<AtomicBool>,
) -> Result<cpal::Stream>
where
    T: Sample + SizedSample,
    i16: FromSample<T>,
{
    let channels = usize::from(config.channels.max(1));
    let stream = device
        .build_input_stream(
            config,
            move |data: &[T], _: &cpal::InputCallbackInfo| {
                let mono: Vec<i16> = data
                    .chunks(channels)
                    .map(|frame| frame[0].to_sample::<i16>())
                    .collect();
                if let Err(TrySendError::Full(_)) = sender.try_send(mono) {
                    overflowed.store(true, Ordering::Relaxed);
                }
            },
            |err| tracing::warn!(%err, "audio stream error"),
            None,
        )
        .map_err(|e| SeeingSoundError::Audio(format!("failed to build stream: {e}")))?;

    Ok(stream)
}
