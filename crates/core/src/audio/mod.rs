//! Frame acquisition. A [`FrameSource`] yields fixed-size mono 16-bit frames
//! at a known sample rate; the dispatch loop blocks on [`FrameSource::read_frame`].

mod capture;
mod tone;

pub use capture::{list_input_devices, CpalFrameSource, InputDevice};
pub use tone::ToneSource;

use crate::Result;

/// Samples per frame used when nothing else is requested.
pub const DEFAULT_FRAME_SIZE: usize = 1024;

/// Sample rate assumed when a device does not report one.
pub const FALLBACK_SAMPLE_RATE: u32 = 44_100;

/// One captured block of mono PCM audio.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioFrame {
    samples: Vec<i16>,
    sample_rate: u32,
    overflowed: bool,
}

impl AudioFrame {
    pub fn new(samples: Vec<i16>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
            overflowed: false,
        }
    }

    /// Marks the frame as best-effort data read after the source dropped samples.
    pub fn with_overflow(mut self, overflowed: bool) -> Self {
        self.overflowed = overflowed;
        self
    }

    pub fn samples(&self) -> &[i16] {
        &self.samples
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// True when samples were lost before this frame. The frame is still usable.
    pub fn overflowed(&self) -> bool {
        self.overflowed
    }

    /// Real-time duration covered by the frame.
    pub fn duration(&self) -> std::time::Duration {
        frame_duration(self.samples.len(), self.sample_rate)
    }
}

/// Continuous stream of fixed-size frames.
pub trait FrameSource {
    fn sample_rate(&self) -> u32;

    fn frame_size(&self) -> usize;

    /// Blocks until the next frame is available. Overflow is reported on the
    /// frame itself, never as an error.
    fn read_frame(&mut self) -> Result<AudioFrame>;

    /// Stops the stream and releases the device. Calling it twice is harmless.
    fn close(&mut self) -> Result<()>;
}

pub(crate) fn frame_duration(samples: usize, sample_rate: u32) -> std::time::Duration {
    if sample_rate == 0 {
        return std::time::Duration::ZERO;
    }
    std::time::Duration::from_secs_f64(samples as f64 / sample_rate as f64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_duration_matches_buffer_length() {
        let frame = AudioFrame::new(vec![0; 4410], 44_100);
        assert_eq!(frame.duration(), std::time::Duration::from_millis(100));
        assert!(!frame.overflowed());
    }

    #[test]
    fn zero_rate_has_zero_duration() {
        assert_eq!(frame_duration(1024, 0), std::time::Duration::ZERO);
    }
}
