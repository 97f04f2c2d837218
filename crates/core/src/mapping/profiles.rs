use super::{ColorHsb, ColorProfile, MappingTunables, CHANNEL_MAX};

/// Names accepted by [`profile_by_name`].
pub const PROFILE_NAMES: [&str; 3] = ["default", "warm", "cold"];

// Banded profile. Normalized frequency splits into three bands; each band
// sweeps `BAND_HUE_SPAN` of the hue wheel starting at its own offset.
const LOW_BAND_END: f64 = 0.33;
const MID_BAND_END: f64 = 0.66;
const BAND_HUE_SPAN: f64 = 0.16;
const BAND_WIDTH_SCALE: f64 = 3.0;

/// Low pitches: blues and purples, pastel.
const LOW_HUE_OFFSET: f64 = 0.5;
const LOW_SATURATION: f64 = 0.5;
/// Mid pitches: yellow-greens, medium saturation.
const MID_HUE_OFFSET: f64 = 0.16;
const MID_SATURATION: f64 = 0.75;
/// High pitches: reds to oranges, fully saturated.
const HIGH_HUE_OFFSET: f64 = 0.0;
const HIGH_SATURATION: f64 = 1.0;

const WARM_HUE_OFFSET: f64 = 0.05;
const WARM_HUE_SPAN: f64 = 0.10;
const WARM_SATURATION: f64 = 0.8;

const COLD_HUE_OFFSET: f64 = 0.55;
const COLD_HUE_SPAN: f64 = 0.15;
const COLD_SATURATION: f64 = 0.9;

/// Resolves a profile by case-insensitive name. Unknown names select the
/// banded default.
pub fn profile_by_name(name: &str) -> Box<dyn ColorProfile> {
    match name.trim().to_ascii_lowercase().as_str() {
        "default" => Box::new(BandedProfile),
        "warm" => Box::new(WarmProfile),
        "cold" => Box::new(ColdProfile),
        other => {
            tracing::info!(profile = other, "unknown color profile, using default");
            Box::new(BandedProfile)
        }
    }
}

/// Three-band mapping where rising pitch moves through distinct color families.
#[derive(Debug, Clone, Copy, Default)]
pub struct BandedProfile;

impl ColorProfile for BandedProfile {
    fn name(&self) -> &'static str {
        "default"
    }

    fn map(&self, rms: f64, freq: f64, tunables: &MappingTunables) -> ColorHsb {
        if tunables.is_clipped(rms) {
            return tunables.clip_color();
        }

        let norm = tunables.normalize(freq);
        let (band_start, hue_offset, saturation) = if norm < LOW_BAND_END {
            (0.0, LOW_HUE_OFFSET, LOW_SATURATION)
        } else if norm < MID_BAND_END {
            (LOW_BAND_END, MID_HUE_OFFSET, MID_SATURATION)
        } else {
            (MID_BAND_END, HIGH_HUE_OFFSET, HIGH_SATURATION)
        };

        let hue = hue_offset + (norm - band_start) * BAND_WIDTH_SCALE * BAND_HUE_SPAN;
        ColorHsb::new(
            scale(hue),
            scale(saturation),
            tunables.brightness(rms),
        )
    }
}

/// Red-orange to yellow regardless of pitch range.
#[derive(Debug, Clone, Copy, Default)]
pub struct WarmProfile;

impl ColorProfile for WarmProfile {
    fn name(&self) -> &'static str {
        "warm"
    }

    fn map(&self, rms: f64, freq: f64, tunables: &MappingTunables) -> ColorHsb {
        narrow_band(
            rms,
            freq,
            tunables,
            WARM_HUE_OFFSET,
            WARM_HUE_SPAN,
            WARM_SATURATION,
        )
    }
}

/// Blue to purple regardless of pitch range.
#[derive(Debug, Clone, Copy, Default)]
pub struct ColdProfile;

impl ColorProfile for ColdProfile {
    fn name(&self) -> &'static str {
        "cold"
    }

    fn map(&self, rms: f64, freq: f64, tunables: &MappingTunables) -> ColorHsb {
        narrow_band(
            rms,
            freq,
            tunables,
            COLD_HUE_OFFSET,
            COLD_HUE_SPAN,
            COLD_SATURATION,
        )
    }
}

fn narrow_band(
    rms: f64,
    freq: f64,
    tunables: &MappingTunables,
    hue_offset: f64,
    hue_span: f64,
    saturation: f64,
) -> ColorHsb {
    if tunables.is_clipped(rms) {
        return tunables.clip_color();
    }

    let norm = tunables.normalize(freq);
    ColorHsb::new(
        scale(hue_offset + hue_span * norm),
        scale(saturation),
        tunables.brightness(rms),
    )
}

/// Fraction of full scale to channel value, truncating.
fn scale(fraction: f64) -> u16 {
    (fraction * f64::from(CHANNEL_MAX)) as u16
}
