use std::f64::consts::TAU;
use std::time::Instant;

use super::{frame_duration, AudioFrame, FrameSource};
use crate::{Result, SeeingSoundError};

/// Synthetic sine source. Useful without a microphone and in tests.
///
/// When `realtime` is set, reads are paced to the frame duration so the
/// dispatch loop sees the same cadence it would get from a device.
#[derive(Debug)]
pub struct ToneSource {
    frequency: f64,
    amplitude: f64,
    sample_rate: u32,
    frame_size: usize,
    phase: f64,
    realtime: bool,
    next_deadline: Option<Instant>,
    closed: bool,
}

impl ToneSource {
    pub fn new(frequency: f64, amplitude: i16, sample_rate: u32, frame_size: usize) -> Self {
        Self {
            frequency,
            amplitude: f64::from(amplitude),
            sample_rate,
            frame_size,
            phase: 0.0,
            realtime: false,
            next_deadline: None,
            closed: false,
        }
    }

    pub fn realtime(mut self, realtime: bool) -> Self {
        self.realtime = realtime;
        self
    }

    fn pace(&mut self) {
        let period = frame_duration(self.frame_size, self.sample_rate);
        let now = Instant::now();
        let deadline = self.next_deadline.unwrap_or(now);
        if deadline > now {
            std::thread::sleep(deadline - now);
        }
        // Never let the deadline fall more than one period behind the clock.
        self.next_deadline = Some(deadline.max(now.checked_sub(period).unwrap_or(now)) + period);
    }
}

impl FrameSource for ToneSource {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn frame_size(&self) -> usize {
        self.frame_size
    }

    fn read_frame(&mut self) -> Result<AudioFrame> {
        if self.closed {
            return Err(SeeingSoundError::StreamClosed);
        }
        if self.realtime {
            self.pace();
        }

        let step = TAU * self.frequency / f64::from(self.sample_rate.max(1));
        let samples = (0..self.frame_size)
            .map(|_| {
                let value = self.amplitude * self.phase.sin();
                self.phase = (self.phase + step) % TAU;
                value.round().clamp(f64::from(i16::MIN), f64::from(i16::MAX)) as i16
            })
            .collect();

        Ok(AudioFrame::new(samples, self.sample_rate))
    }

    fn close(&mut self) -> Result<()> {
        self.closed = true;
        Ok(())
    }
}

impl Default for ToneSource {
    fn default() -> Self {
        Self::new(440.0, 8_000, 44_100, super::DEFAULT_FRAME_SIZE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn produces_frames_of_requested_size() {
        let mut tone = ToneSource::new(1_000.0, 10_000, 8_000, 256);
        let frame = tone.read_frame().unwrap();

        assert_eq!(frame.len(), 256);
        assert_eq!(frame.sample_rate(), 8_000);
        let peak = frame.samples().iter().map(|s| s.unsigned_abs()).max().unwrap();
        assert!(peak <= 10_000 && peak > 9_000);
    }

    #[test]
    fn closed_tone_reports_stream_closed() {
        let mut tone = ToneSource::default();
        tone.close().unwrap();
        assert!(matches!(tone.read_frame(), Err(SeeingSoundError::StreamClosed)));
    }
}
