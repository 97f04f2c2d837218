//! Audio feature to color mapping.
//!
//! All colors use one canonical scale: every channel of [`ColorHsb`] spans
//! `0..=65535`. Light backends convert at their own boundary.

mod profiles;

pub use profiles::{profile_by_name, BandedProfile, ColdProfile, WarmProfile, PROFILE_NAMES};

use serde::{Deserialize, Serialize};

use crate::{AudioFeatures, RuntimeConfig};

/// Full-scale value shared by hue, saturation and brightness.
pub const CHANNEL_MAX: u16 = u16::MAX;

/// RMS at which brightness saturates to `max_brightness`.
pub const LOUDNESS_REFERENCE: f64 = 5_000.0;

/// Hue/saturation/brightness triple on the canonical 16-bit scale.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ColorHsb {
    pub hue: u16,
    pub saturation: u16,
    pub brightness: u16,
}

impl ColorHsb {
    /// All channels zero: lights dark.
    pub const OFF: ColorHsb = ColorHsb::new(0, 0, 0);

    pub const fn new(hue: u16, saturation: u16, brightness: u16) -> Self {
        Self {
            hue,
            saturation,
            brightness,
        }
    }

    /// Hue in degrees `[0, 360)`, saturation and brightness in percent.
    pub fn to_degrees_percent(&self) -> (f64, f64, f64) {
        let full = f64::from(CHANNEL_MAX);
        (
            f64::from(self.hue) / (full + 1.0) * 360.0,
            f64::from(self.saturation) / full * 100.0,
            f64::from(self.brightness) / full * 100.0,
        )
    }
}

/// The slice of [`RuntimeConfig`] a profile is allowed to see.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MappingTunables {
    pub min_frequency: f64,
    pub max_frequency: f64,
    pub clip_threshold: f64,
    pub max_brightness: u16,
}

impl From<&RuntimeConfig> for MappingTunables {
    fn from(config: &RuntimeConfig) -> Self {
        Self {
            min_frequency: config.min_frequency,
            max_frequency: config.max_frequency,
            clip_threshold: config.clip_threshold,
            max_brightness: config.max_brightness,
        }
    }
}

impl MappingTunables {
    /// Position of `freq` inside the configured band, clamped to `[0, 1]`.
    pub fn normalize(&self, freq: f64) -> f64 {
        ((freq - self.min_frequency) / (self.max_frequency - self.min_frequency)).clamp(0.0, 1.0)
    }

    /// Brightness proportional to loudness, saturating at [`LOUDNESS_REFERENCE`].
    pub fn brightness(&self, rms: f64) -> u16 {
        let level = (rms / LOUDNESS_REFERENCE).clamp(0.0, 1.0);
        (level * f64::from(self.max_brightness)).round() as u16
    }

    pub fn is_clipped(&self, rms: f64) -> bool {
        rms >= self.clip_threshold
    }

    /// Color emitted for clipped input: unsaturated at full brightness.
    pub fn clip_color(&self) -> ColorHsb {
        ColorHsb::new(0, 0, self.max_brightness)
    }

    fn is_usable(&self) -> bool {
        self.min_frequency.is_finite()
            && self.max_frequency.is_finite()
            && self.max_frequency > self.min_frequency
            && !self.clip_threshold.is_nan()
    }
}

/// A mapping policy. Implementations must be pure: identical inputs give
/// identical colors, and clipped input yields [`MappingTunables::clip_color`].
pub trait ColorProfile: Send + Sync + std::fmt::Debug {
    fn name(&self) -> &'static str;

    fn map(&self, rms: f64, freq: f64, tunables: &MappingTunables) -> ColorHsb;
}

/// Outcome of mapping one frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mapped {
    Color(ColorHsb),
    /// The frame is too quiet or its pitch is outside the configured band.
    NoSignal,
}

/// Applies the active profile plus the amplitude/frequency gate.
#[derive(Debug)]
pub struct ColorMapper {
    profile: Box<dyn ColorProfile>,
}

impl ColorMapper {
    pub fn new(profile: Box<dyn ColorProfile>) -> Self {
        Self { profile }
    }

    pub fn from_name(name: &str) -> Self {
        Self::new(profile_by_name(name))
    }

    pub fn profile_name(&self) -> &'static str {
        self.profile.name()
    }

    /// Maps `features` under `config`. Clipped frames always produce the clip
    /// color; otherwise frames failing the gate produce [`Mapped::NoSignal`].
    pub fn map(&self, features: &AudioFeatures, config: &RuntimeConfig) -> Mapped {
        let tunables = MappingTunables::from(config);
        let clipped = tunables.is_clipped(features.rms);
        if !clipped && !passes_gate(features, config) {
            return Mapped::NoSignal;
        }
        Mapped::Color(self.map_color(features, &tunables))
    }

    /// Runs the profile directly, without the gate. Unusable input yields
    /// [`ColorHsb::OFF`] and a warning.
    pub fn map_color(&self, features: &AudioFeatures, tunables: &MappingTunables) -> ColorHsb {
        if !tunables.is_usable()
            || !features.rms.is_finite()
            || !features.dominant_frequency.is_finite()
        {
            tracing::warn!(
                rms = features.rms,
                frequency = features.dominant_frequency,
                ?tunables,
                "color mapping failed, emitting black"
            );
            return ColorHsb::OFF;
        }
        self.profile
            .map(features.rms, features.dominant_frequency, tunables)
    }
}

impl Default for ColorMapper {
    fn default() -> Self {
        Self::new(Box::new(BandedProfile))
    }
}

/// True when the frame is loud enough and its pitch lies inside the band.
pub fn passes_gate(features: &AudioFeatures, config: &RuntimeConfig) -> bool {
    features.rms >= config.min_amplitude
        && features.dominant_frequency >= config.min_frequency
        && features.dominant_frequency <= config.max_frequency
}

#[cfg(test)]
mod tests {
    use super::*;

    fn features(rms: f64, dominant_frequency: f64) -> AudioFeatures {
        AudioFeatures {
            rms,
            dominant_frequency,
        }
    }

    #[test]
    fn normalization_is_clamped() {
        let tunables = MappingTunables::from(&RuntimeConfig::default());

        assert_eq!(tunables.normalize(0.0), 0.0);
        assert_eq!(tunables.normalize(-50.0), 0.0);
        assert_eq!(tunables.normalize(10_000.0), 1.0);
        assert!((tunables.normalize(2_050.0) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn brightness_saturates_at_reference() {
        let tunables = MappingTunables::from(&RuntimeConfig::default());

        assert_eq!(tunables.brightness(0.0), 0);
        assert_eq!(tunables.brightness(500.0), 6_000);
        assert_eq!(tunables.brightness(5_000.0), 60_000);
        assert_eq!(tunables.brightness(20_000.0), 60_000);
    }

    #[test]
    fn quiet_frames_are_gated() {
        let mapper = ColorMapper::default();
        let config = RuntimeConfig::default();

        assert_eq!(mapper.map(&features(10.0, 440.0), &config), Mapped::NoSignal);
        assert!(matches!(
            mapper.map(&features(1_000.0, 440.0), &config),
            Mapped::Color(_)
        ));
    }

    #[test]
    fn out_of_band_frames_are_gated() {
        let mapper = ColorMapper::default();
        let config = RuntimeConfig::default();

        assert_eq!(mapper.map(&features(1_000.0, 50.0), &config), Mapped::NoSignal);
        assert_eq!(mapper.map(&features(1_000.0, 9_000.0), &config), Mapped::NoSignal);
    }

    #[test]
    fn clipping_bypasses_the_gate() {
        let mapper = ColorMapper::default();
        let config = RuntimeConfig::default();

        assert_eq!(
            mapper.map(&features(32_767.0, 0.0), &config),
            Mapped::Color(ColorHsb::new(0, 0, config.max_brightness))
        );
    }

    #[test]
    fn degenerate_band_maps_to_black() {
        let mapper = ColorMapper::default();
        let tunables = MappingTunables {
            min_frequency: 500.0,
            max_frequency: 500.0,
            clip_threshold: 32_000.0,
            max_brightness: 60_000,
        };

        assert_eq!(mapper.map_color(&features(1_000.0, 500.0), &tunables), ColorHsb::OFF);
    }

    #[test]
    fn non_finite_features_map_to_black() {
        let mapper = ColorMapper::default();
        let tunables = MappingTunables::from(&RuntimeConfig::default());

        assert_eq!(mapper.map_color(&features(f64::NAN, 300.0), &tunables), ColorHsb::OFF);
    }

    #[test]
    fn degrees_percent_conversion() {
        let (h, s, b) = ColorHsb::new(32_768, CHANNEL_MAX, 0).to_degrees_percent();

        assert!((h - 180.0).abs() < 1e-9);
        assert!((s - 100.0).abs() < 1e-9);
        assert_eq!(b, 0.0);
    }
}
