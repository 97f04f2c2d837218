use super::Light;
use crate::{ColorHsb, Result};

/// Dry-run light: logs each color in degrees and percent instead of
/// talking to hardware.
#[derive(Debug, Clone)]
pub struct LoggingLight {
    label: String,
}

impl LoggingLight {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
        }
    }
}

impl Default for LoggingLight {
    fn default() -> Self {
        Self::new("dry-run")
    }
}

impl Light for LoggingLight {
    fn label(&self) -> &str {
        &self.label
    }

    fn set_color(&mut self, color: &ColorHsb, kelvin: u16) -> Result<()> {
        let (hue, saturation, brightness) = color.to_degrees_percent();
        tracing::info!(
            light = %self.label,
            hue = format_args!("{hue:.1}°"),
            saturation = format_args!("{saturation:.1}%"),
            brightness = format_args!("{brightness:.1}%"),
            kelvin,
            "set color"
        );
        Ok(())
    }
}
