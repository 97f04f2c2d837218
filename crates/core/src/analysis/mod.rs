use std::{fmt, sync::Arc};

use realfft::{num_complex::Complex64, RealFftPlanner, RealToComplex};
use serde::{Deserialize, Serialize};

use crate::{AudioFrame, Result, SeeingSoundError};

/// Loudness and pitch estimate for a single frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct AudioFeatures {
    /// Root-mean-square amplitude on the 16-bit sample scale.
    pub rms: f64,
    /// Centre frequency in Hz of the strongest spectral bin. Bin 0 (DC) is a
    /// legitimate answer for silent or aperiodic input.
    pub dominant_frequency: f64,
}

impl AudioFeatures {
    pub const SILENT: AudioFeatures = AudioFeatures {
        rms: 0.0,
        dominant_frequency: 0.0,
    };
}

/// Computes [`AudioFeatures`] per frame. The FFT plan and its buffers are
/// cached and only rebuilt when the frame length changes.
pub struct FeatureExtractor {
    fft_planner: RealFftPlanner<f64>,
    fft: Option<FftResources>,
}

impl FeatureExtractor {
    pub fn new() -> Self {
        Self {
            fft_planner: RealFftPlanner::new(),
            fft: None,
        }
    }

    /// Extracts features from `frame`. Numerical failures are logged and the
    /// affected value is reported as zero; this never fails.
    pub fn extract(&mut self, frame: &AudioFrame) -> AudioFeatures {
        if frame.is_empty() {
            return AudioFeatures::SILENT;
        }

        let rms = match compute_rms(frame.samples()) {
            Ok(rms) => rms,
            Err(err) => {
                tracing::warn!(%err, "RMS calculation failed");
                0.0
            }
        };

        let dominant_frequency = match self.dominant_frequency(frame) {
            Ok(freq) => freq,
            Err(err) => {
                tracing::warn!(%err, "FFT calculation failed");
                0.0
            }
        };

        AudioFeatures {
            rms,
            dominant_frequency,
        }
    }

    fn dominant_frequency(&mut self, frame: &AudioFrame) -> Result<f64> {
        let len = frame.len();
        if len < 2 {
            // Only the DC bin exists.
            return Ok(0.0);
        }
        if frame.sample_rate() == 0 {
            return Err(SeeingSoundError::Fft("sample rate is zero".into()));
        }

        let fft = self.prepare_fft(len);
        for (slot, sample) in fft.input.iter_mut().zip(frame.samples()) {
            *slot = f64::from(*sample);
        }

        fft.plan
            .process_with_scratch(&mut fft.input, &mut fft.spectrum, &mut fft.scratch)?;

        let mut peak_bin = 0;
        let mut peak_magnitude = f64::NEG_INFINITY;
        for (bin, value) in fft.spectrum.iter().enumerate() {
            let magnitude = value.norm();
            if !magnitude.is_finite() {
                return Err(SeeingSoundError::Fft(format!(
                    "non-finite magnitude in bin {bin}"
                )));
            }
            if magnitude > peak_magnitude {
                peak_magnitude = magnitude;
                peak_bin = bin;
            }
        }

        let bin_hz = f64::from(frame.sample_rate()) / len as f64;
        Ok(peak_bin as f64 * bin_hz)
    }

    fn prepare_fft(&mut self, size: usize) -> &mut FftResources {
        if self.fft.as_ref().map_or(false, |fft| fft.size != size) {
            self.fft = None;
        }

        let planner = &mut self.fft_planner;
        self.fft.get_or_insert_with(|| {
            let plan = planner.plan_fft_forward(size);
            FftResources {
                size,
                scratch: plan.make_scratch_vec(),
                spectrum: plan.make_output_vec(),
                input: plan.make_input_vec(),
                plan,
            }
        })
    }
}

impl Default for FeatureExtractor {
    fn default() -> Self {
        Self::new()
    }
}

struct FftResources {
    size: usize,
    plan: Arc<dyn RealToComplex<f64>>,
    scratch: Vec<Complex64>,
    spectrum: Vec<Complex64>,
    input: Vec<f64>,
}

impl fmt::Debug for FeatureExtractor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FeatureExtractor")
            .field("fft_size", &self.fft.as_ref().map(|fft| fft.size))
            .finish()
    }
}

fn compute_rms(samples: &[i16]) -> Result<f64> {
    let sum: f64 = samples
        .iter()
        .map(|sample| {
            let value = f64::from(*sample);
            value * value
        })
        .sum();
    let rms = (sum / samples.len() as f64).sqrt();
    if rms.is_finite() {
        Ok(rms)
    } else {
        Err(SeeingSoundError::Fft(format!("non-finite RMS over {} samples", samples.len())))
    }
}
