//! The dispatch loop: capture, extract, map, gate, smooth, rate-check and
//! write, repeated until cancelled.

mod worker;

pub use worker::Worker;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use crate::idle::{IdleDecision, IdleDetector};
use crate::lights::{dispatch, DispatchReport, Light};
use crate::limiter::RateLimiter;
use crate::mapping::{ColorMapper, Mapped};
use crate::smoothing::Smoother;
use crate::{
    AudioFeatures, AudioFrame, ColorHsb, ConfigWatcher, FeatureExtractor, FrameSource, Result,
    RuntimeConfig,
};

/// Cooperative stop signal shared between the loop and whoever controls it.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Why [`Pipeline::run`] returned normally.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    Cancelled,
    DeadlineReached,
}

/// Result of one analysis cycle.
#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
    /// The mapped (and possibly smoothed) color was written.
    Dispatched {
        color: ColorHsb,
        report: DispatchReport,
    },
    /// The idle color was written; this happens once per idle episode.
    IdleDispatched {
        color: ColorHsb,
        report: DispatchReport,
    },
    /// A color was ready but the write budget for this interval is spent.
    RateLimited,
    /// No signal, and the idle timeout has not elapsed.
    Waiting,
    /// No signal, idle color already written.
    Suppressed,
}

impl CycleOutcome {
    pub fn wrote(&self) -> bool {
        matches!(self, Self::Dispatched { .. } | Self::IdleDispatched { .. })
    }
}

/// Per-run state owned by the loop and never shared.
#[derive(Debug, Default)]
pub struct PipelineState {
    limiter: RateLimiter,
    idle: IdleDetector,
    emitted: Option<ColorHsb>,
}

impl PipelineState {
    pub fn last_update(&self) -> Option<Instant> {
        self.limiter.last_update()
    }

    pub fn emitted(&self) -> Option<ColorHsb> {
        self.emitted
    }

    pub fn idle_since(&self) -> Option<Instant> {
        self.idle.idle_since()
    }
}

type ReloadHook = Box<dyn FnMut(&RuntimeConfig) + Send>;

pub struct Pipeline {
    config: RuntimeConfig,
    smoother: Option<Smoother>,
    watcher: Option<ConfigWatcher>,
    extractor: FeatureExtractor,
    mapper: ColorMapper,
    state: PipelineState,
    on_reload: Option<ReloadHook>,
}

impl Pipeline {
    pub fn new(config: RuntimeConfig, mapper: ColorMapper) -> Self {
        tracing::info!(profile = mapper.profile_name(), "color profile selected");
        Self {
            smoother: smoother_for(&config),
            config,
            watcher: None,
            extractor: FeatureExtractor::new(),
            mapper,
            state: PipelineState::default(),
            on_reload: None,
        }
    }

    /// Polls `watcher` at the start of every cycle.
    pub fn with_watcher(mut self, watcher: ConfigWatcher) -> Self {
        self.watcher = Some(watcher);
        self
    }

    /// Called with the new configuration after every successful reload.
    pub fn on_reload(mut self, hook: impl FnMut(&RuntimeConfig) + Send + 'static) -> Self {
        self.on_reload = Some(Box::new(hook));
        self
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn state(&self) -> &PipelineState {
        &self.state
    }

    /// Replaces the whole configuration. The profile stays as selected at
    /// startup.
    pub fn apply_config(&mut self, config: RuntimeConfig) {
        self.smoother = smoother_for(&config);
        self.config = config;
        if let Some(hook) = self.on_reload.as_mut() {
            hook(&self.config);
        }
    }

    /// Checks the watcher once; returns true when a new configuration took effect.
    pub fn reload_config(&mut self) -> bool {
        match self.watcher.as_mut().and_then(ConfigWatcher::poll) {
            Some(config) => {
                self.apply_config(config);
                true
            }
            None => false,
        }
    }

    /// Runs one cycle on an already captured frame.
    pub fn run_cycle(
        &mut self,
        frame: &AudioFrame,
        now: Instant,
        lights: &mut [Box<dyn Light>],
    ) -> CycleOutcome {
        self.reload_config();

        let features = self.extractor.extract(frame);
        let mapped = self.mapper.map(&features, &self.config);
        log_cycle(&features, &mapped);

        let decision = self.state.idle.observe(
            matches!(mapped, Mapped::Color(_)),
            now,
            self.config.idle_timeout(),
        );
        let target = match decision {
            IdleDecision::Waiting => return CycleOutcome::Waiting,
            IdleDecision::Suppress => return CycleOutcome::Suppressed,
            IdleDecision::EmitIdle => self.config.idle_color,
            IdleDecision::Active => match mapped {
                Mapped::Color(color) => color,
                Mapped::NoSignal => unreachable!("idle detector only reports signal as active"),
            },
        };

        if !self
            .state
            .limiter
            .is_ready(now, self.config.max_updates_per_second)
        {
            return CycleOutcome::RateLimited;
        }

        let color = match (decision, self.smoother, self.state.emitted) {
            (IdleDecision::Active, Some(smoother), Some(prev)) => smoother.step(prev, target),
            _ => target,
        };

        let report = dispatch(lights, &color, self.config.color_temperature);
        self.state.limiter.record(now);
        self.state.emitted = Some(color);

        if decision == IdleDecision::EmitIdle {
            self.state.idle.mark_idle_written();
            tracing::info!(?color, "no signal, switched lights to idle color");
            CycleOutcome::IdleDispatched { color, report }
        } else {
            CycleOutcome::Dispatched { color, report }
        }
    }

    /// Drives the loop until `cancel` fires or `deadline` passes, then tears
    /// down. Any other exit is an error; teardown still runs first.
    pub fn run(
        &mut self,
        source: &mut dyn FrameSource,
        lights: &mut [Box<dyn Light>],
        cancel: &CancelToken,
        deadline: Option<Instant>,
    ) -> Result<StopReason> {
        tracing::info!(
            sample_rate = source.sample_rate(),
            frame_size = source.frame_size(),
            lights = lights.len(),
            "dispatch loop started"
        );

        let outcome = loop {
            if cancel.is_cancelled() {
                tracing::info!("stopped by user");
                break Ok(StopReason::Cancelled);
            }
            if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
                tracing::info!("run duration elapsed");
                break Ok(StopReason::DeadlineReached);
            }

            let frame = match source.read_frame() {
                Ok(frame) => frame,
                Err(err) if err.is_transient() => {
                    tracing::warn!(%err, "skipping cycle");
                    continue;
                }
                Err(err) => {
                    tracing::error!(%err, "frame source failed");
                    break Err(err);
                }
            };
            if frame.overflowed() {
                tracing::debug!("input overflowed, using best-effort frame");
            }

            self.run_cycle(&frame, Instant::now(), lights);
        };

        self.shutdown(source, lights);
        outcome
    }

    /// Releases the stream and switches the lights off. Best effort: failures
    /// are logged only.
    pub fn shutdown(&mut self, source: &mut dyn FrameSource, lights: &mut [Box<dyn Light>]) {
        if let Err(err) = source.close() {
            tracing::warn!(%err, "failed to close audio stream");
        }

        let report = dispatch(lights, &ColorHsb::OFF, self.config.color_temperature);
        if !report.all_succeeded() {
            tracing::warn!(failed = ?report.failed, "could not switch off every light");
        }
        self.state.emitted = Some(ColorHsb::OFF);
        tracing::info!("stream closed");
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("config", &self.config)
            .field("smoother", &self.smoother)
            .field("watcher", &self.watcher)
            .field("mapper", &self.mapper)
            .field("state", &self.state)
            .finish()
    }
}

fn smoother_for(config: &RuntimeConfig) -> Option<Smoother> {
    config
        .smoothing_factor
        .and_then(|alpha| Smoother::new(alpha).ok())
}

fn log_cycle(features: &AudioFeatures, mapped: &Mapped) {
    match mapped {
        Mapped::Color(color) => tracing::debug!(
            rms = format_args!("{:.2}", features.rms),
            freq = format_args!("{:.2}", features.dominant_frequency),
            hue = color.hue,
            saturation = color.saturation,
            brightness = color.brightness,
            "analysed frame"
        ),
        Mapped::NoSignal => tracing::debug!(
            rms = format_args!("{:.2}", features.rms),
            freq = format_args!("{:.2}", features.dominant_frequency),
            "analysed frame, no signal"
        ),
    }
}
