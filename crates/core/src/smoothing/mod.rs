use crate::{ColorHsb, Result, SeeingSoundError};

/// Per-channel exponential moving average between emitted colors.
///
/// Each channel moves `(target - prev) * alpha` toward the target and is
/// truncated toward zero. When truncation would leave a channel stuck short of
/// its target it still advances by one unit, so repeated steps reach the
/// target exactly and never overshoot.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Smoother {
    alpha: f64,
}

impl Smoother {
    /// `alpha` must lie in `(0, 1]`; `1.0` emits the target unchanged.
    pub fn new(alpha: f64) -> Result<Self> {
        if !(alpha > 0.0 && alpha <= 1.0) {
            return Err(SeeingSoundError::invalid_config(format!(
                "smoothing factor must be in (0, 1], got {alpha}"
            )));
        }
        Ok(Self { alpha })
    }

    pub fn alpha(&self) -> f64 {
        self.alpha
    }

    pub fn step(&self, prev: ColorHsb, target: ColorHsb) -> ColorHsb {
        ColorHsb {
            hue: self.channel(prev.hue, target.hue),
            saturation: self.channel(prev.saturation, target.saturation),
            brightness: self.channel(prev.brightness, target.brightness),
        }
    }

    fn channel(&self, prev: u16, target: u16) -> u16 {
        let delta = f64::from(target) - f64::from(prev);
        let next = (f64::from(prev) + delta * self.alpha).trunc() as i64;
        let prev = i64::from(prev);
        let target = i64::from(target);

        let next = if next == prev && prev != target {
            prev + (target - prev).signum()
        } else {
            next
        };
        // Never pass the target.
        let next = if target >= prev { next.min(target) } else { next.max(target) };
        next as u16
    }
}
