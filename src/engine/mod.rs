//! Engine module housing the live capture core.
//!
//! This module exposes the capture collaborator abstractions (`backend`),
//! the events published while recording (`events`) and the `CaptureLoop`
//! state machine (`core`).

pub mod backend;
pub mod core;
pub mod events;

pub use backend::{
    CaptureSettings, CaptureSource, SpectrumAnalyzer, StubTimeSource, SyntheticSource,
    SystemTimeSource, TimeSource, WavSource,
};
pub use core::{CaptureLoop, RecordingState};
pub use events::{ErrorEvent, FeatureEvent, MetricsEvent, Severity};
