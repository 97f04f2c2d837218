//! Core library for Seeing Sound: turns live audio into colors and pushes
//! them to smart lights.
//!
//! Each module owns one stage of the dispatch loop. [`audio`] produces
//! fixed-size frames, [`analysis`] reduces them to loudness and pitch,
//! [`mapping`] turns those into HSB colors, [`smoothing`], [`idle`] and
//! [`limiter`] decide what actually gets written, and [`lights`] writes it.
//! [`pipeline`] wires the stages together under a hot-reloadable
//! [`config`].

pub mod analysis;
pub mod audio;
pub mod config;
pub mod error;
pub mod idle;
pub mod lights;
pub mod limiter;
pub mod mapping;
pub mod pipeline;
pub mod smoothing;

pub use analysis::{AudioFeatures, FeatureExtractor};
pub use audio::{AudioFrame, FrameSource};
pub use config::{ConfigFormat, ConfigWatcher, RuntimeConfig};
pub use error::{Result, SeeingSoundError};
pub use lights::{DispatchReport, Light};
pub use mapping::{ColorHsb, ColorMapper, Mapped};
pub use pipeline::{CancelToken, CycleOutcome, Pipeline, StopReason, Worker};
