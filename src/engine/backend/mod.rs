//! Capture collaborator abstractions for the capture loop.

use std::time::Instant;

use crate::analysis::features::Frame;
use crate::config::CaptureConfig;
use crate::error::CaptureError;

mod spectrum;
mod synthetic;
mod wav;

pub use spectrum::SpectrumAnalyzer;
pub use synthetic::{StubTimeSource, SyntheticSource};
pub use wav::WavSource;

/// Settings handed to a capture source when recording starts.
///
/// `sensitivity` and `noise_threshold` are opaque to the loop; each source
/// decides what they mean for its signal path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureSettings {
    pub sensitivity: u8,
    pub noise_threshold: u8,
    pub frame_size: usize,
    pub sample_rate: u32,
}

impl From<&CaptureConfig> for CaptureSettings {
    fn from(config: &CaptureConfig) -> Self {
        Self {
            sensitivity: config.sensitivity,
            noise_threshold: config.noise_threshold,
            frame_size: config.frame_size,
            sample_rate: config.sample_rate,
        }
    }
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self::from(&CaptureConfig::default())
    }
}

/// Trait implemented by anything that can deliver captured frames.
///
/// The loop calls `start` once per recording, `next_frame` once per tick and
/// `stop` when recording ends for any reason. `next_frame` must not block
/// for longer than a tick.
pub trait CaptureSource: Send {
    fn start(&mut self, settings: &CaptureSettings) -> Result<(), CaptureError>;
    fn next_frame(&mut self) -> Result<Frame, CaptureError>;
    fn stop(&mut self);
}

/// Trait representing a monotonic time source used for event timestamps.
pub trait TimeSource: Send + Sync {
    fn now(&self) -> Instant;
}

/// Default time source backed by `Instant::now`.
#[derive(Default)]
pub struct SystemTimeSource {
    _unit: (),
}

impl TimeSource for SystemTimeSource {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Gain applied by the reference sources: sensitivity 50 is unity.
pub(crate) fn sensitivity_gain(sensitivity: u8) -> f32 {
    f32::from(sensitivity.min(100)) / 50.0
}

/// Amplitude below which reference sources emit silence.
pub(crate) fn noise_floor(noise_threshold: u8) -> f32 {
    f32::from(noise_threshold.min(100)) / 1000.0
}

/// Apply gain, gate and clipping to raw samples in place.
pub(crate) fn condition_samples(samples: &mut [f32], settings: &CaptureSettings) {
    let gain = sensitivity_gain(settings.sensitivity);
    let floor = noise_floor(settings.noise_threshold);
    for sample in samples.iter_mut() {
        let scaled = (*sample * gain).clamp(-1.0, 1.0);
        *sample = if scaled.abs() < floor { 0.0 } else { scaled };
    }
}
