//! Light-set capability.
//!
//! The pipeline never owns lights; it borrows a slice of them for the
//! duration of a write. Every light receives its own write and a failing
//! light never prevents writes to the others.

mod lifx;
mod logging;

pub use lifx::{connect_lifx, set_color_packet, LifxLight, LIFX_PORT};
pub use logging::LoggingLight;

use crate::{ColorHsb, Result};

/// One addressable light. Colors arrive on the canonical 16-bit scale;
/// implementations convert to their device range.
pub trait Light: Send {
    fn label(&self) -> &str;

    fn set_color(&mut self, color: &ColorHsb, kelvin: u16) -> Result<()>;
}

/// Outcome of writing one color to a set of lights.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub written: usize,
    pub failed: Vec<String>,
}

impl DispatchReport {
    pub fn all_succeeded(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Writes `color` to every light once. Failures are logged per light and
/// not retried.
pub fn dispatch(lights: &mut [Box<dyn Light>], color: &ColorHsb, kelvin: u16) -> DispatchReport {
    let mut report = DispatchReport::default();
    for light in lights.iter_mut() {
        match light.set_color(color, kelvin) {
            Ok(()) => {
                tracing::trace!(light = light.label(), ?color, "color sent");
                report.written += 1;
            }
            Err(err) => {
                tracing::warn!(light = light.label(), %err, "error sending color");
                report.failed.push(light.label().to_string());
            }
        }
    }
    report
}


#[cfg(test)]
mod tests {
    use super::testing::RecordingLight;
    use super::*;

    #[test]
    fn one_failure_does_not_skip_the_rest() {
        let (first, first_writes) = RecordingLight::new("kitchen");
        let (last, last_writes) = RecordingLight::new("hall");
        let mut lights: Vec<Box<dyn Light>> = vec![
            Box::new(first),
            Box::new(RecordingLight::failing("porch")),
            Box::new(last),
        ];

        let color = ColorHsb::new(1, 2, 3);
        let report = dispatch(&mut lights, &color, 3_500);

        assert_eq!(report.written, 2);
        assert_eq!(report.failed, vec!["porch".to_string()]);
        assert!(!report.all_succeeded());
        assert_eq!(*first_writes.lock().unwrap(), vec![color]);
        assert_eq!(*last_writes.lock().unwrap(), vec![color]);
    }

    #[test]
    fn empty_light_set_is_a_successful_noop() {
        let report = dispatch(&mut [], &ColorHsb::OFF, 3_500);
        assert_eq!(report, DispatchReport::default());
        assert!(report.all_succeeded());
    }
}
