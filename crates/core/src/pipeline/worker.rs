use std::thread::JoinHandle;

use super::{CancelToken, StopReason};
use crate::{Result, SeeingSoundError};

/// A dispatch loop running on its own thread.
///
/// Starting and stopping happen as a unit: [`Worker::stop`] signals the loop
/// and waits for its teardown, so the audio stream is released and the lights
/// are off once it returns.
#[derive(Debug)]
pub struct Worker {
    cancel: CancelToken,
    handle: JoinHandle<Result<StopReason>>,
}

impl Worker {
    /// Spawns `body` on a named thread. The frame source should be opened
    /// inside `body`; capture streams are tied to the thread that built them.
    pub fn spawn<F>(cancel: CancelToken, body: F) -> Result<Self>
    where
        F: FnOnce(CancelToken) -> Result<StopReason> + Send + 'static,
    {
        let token = cancel.clone();
        let handle = std::thread::Builder::new()
            .name("dispatch".into())
            .spawn(move || body(token))?;
        Ok(Self { cancel, handle })
    }

    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Cancels the loop and waits for it to tear down.
    pub fn stop(self) -> Result<StopReason> {
        self.cancel.cancel();
        self.join()
    }

    /// Waits for the loop to end on its own (cancel, deadline or failure).
    pub fn join(self) -> Result<StopReason> {
        self.handle
            .join()
            .map_err(|_| SeeingSoundError::msg("dispatch worker panicked"))?
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::audio::ToneSource;
    use crate::lights::testing::RecordingLight;
    use crate::lights::Light;
    use crate::mapping::ColorMapper;
    use crate::pipeline::Pipeline;
    use crate::{ColorHsb, RuntimeConfig};

    #[test]
    fn stop_waits_for_teardown() {
        let (light, writes) = RecordingLight::new("desk");

        let worker = Worker::spawn(CancelToken::new(), move |cancel| {
            let mut source = ToneSource::new(1_000.0, 2_000, 8_000, 256).realtime(true);
            let mut lights: Vec<Box<dyn Light>> = vec![Box::new(light)];
            Pipeline::new(RuntimeConfig::default(), ColorMapper::default()).run(
                &mut source,
                &mut lights,
                &cancel,
                None,
            )
        })
        .unwrap();

        std::thread::sleep(Duration::from_millis(150));
        assert!(!worker.is_finished());
        assert_eq!(worker.stop().unwrap(), StopReason::Cancelled);

        let writes = writes.lock().unwrap();
        assert!(writes.len() >= 2);
        assert_eq!(writes.last(), Some(&ColorHsb::OFF));
    }

    #[test]
    fn failures_surface_through_join() {
        let worker = Worker::spawn(CancelToken::new(), |_| Err(SeeingSoundError::StreamClosed))
            .unwrap();
        assert!(matches!(worker.join(), Err(SeeingSoundError::StreamClosed)));
    }
}
