//! Offloaded engagement metrics.
//!
//! Heavier per-frame measurements computed by the worker's execution unit
//! instead of inside the capture tick. Spectral flatness and rolloff follow
//! the usual definitions (Peeters 2004); `engagement` is a display heuristic
//! blending loudness with spectral brightness and tonality.

use serde::{Deserialize, Serialize};

use crate::analysis::features::Frame;
use crate::error::FeatureError;

/// Spectral rolloff threshold (85% of spectral energy)
const ROLLOFF_THRESHOLD: f64 = 0.85;

/// RMS at which the loudness term of `engagement` saturates
const LOUDNESS_SATURATION_RMS: f64 = 0.5;

const MAGNITUDE_FLOOR: f64 = 1e-10;

/// Metrics returned by the background execution unit for one frame
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OffloadMetrics {
    /// Mean squared amplitude
    pub energy: f32,
    /// Largest absolute sample
    pub peak: f32,
    /// Peak over RMS; 0 for silence
    pub crest_factor: f32,
    /// Geometric over arithmetic mean of the spectrum (0 tonal, 1 noise-like)
    pub spectral_flatness: f32,
    /// Frequency below which 85% of spectral energy lies, in Hz
    pub spectral_rolloff_hz: f32,
    /// Heuristic 0..1 score for live engagement displays
    pub engagement: f32,
}

/// Compute offload metrics for one frame.
///
/// Bin-to-Hz conversion uses `sample_rate / frequency.len()`, matching the
/// pitch estimate of the synchronous path.
pub fn compute_metrics(frame: &Frame, sample_rate: u32) -> Result<OffloadMetrics, FeatureError> {
    if frame.amplitude.is_empty() {
        return Err(FeatureError::empty("amplitude"));
    }
    if frame.frequency.is_empty() {
        return Err(FeatureError::empty("frequency"));
    }

    let n = frame.amplitude.len() as f64;
    let energy = frame
        .amplitude
        .iter()
        .map(|&x| f64::from(x) * f64::from(x))
        .sum::<f64>()
        / n;
    let peak = frame
        .amplitude
        .iter()
        .fold(0.0_f64, |acc, &x| acc.max(f64::from(x).abs()));
    let rms = energy.sqrt();
    let crest_factor = if rms > MAGNITUDE_FLOOR { peak / rms } else { 0.0 };

    let bin_width = f64::from(sample_rate) / frame.frequency.len() as f64;
    let flatness = spectral_flatness(&frame.frequency);
    let rolloff_hz = spectral_rolloff_bin(&frame.frequency) as f64 * bin_width;

    let nyquist = f64::from(sample_rate) / 2.0;
    let loudness = (rms / LOUDNESS_SATURATION_RMS).min(1.0);
    let brightness = if nyquist > 0.0 {
        (rolloff_hz / nyquist).min(1.0)
    } else {
        0.0
    };
    let tonality = 1.0 - flatness;
    let engagement = (0.6 * loudness + 0.25 * brightness + 0.15 * tonality).clamp(0.0, 1.0);

    Ok(OffloadMetrics {
        energy: energy as f32,
        peak: peak as f32,
        crest_factor: crest_factor as f32,
        spectral_flatness: flatness as f32,
        spectral_rolloff_hz: rolloff_hz as f32,
        engagement: engagement as f32,
    })
}

/// Spectral flatness (Wiener entropy) over non-negligible bins.
fn spectral_flatness(spectrum: &[f32]) -> f64 {
    let (log_sum, sum, count) = spectrum
        .iter()
        .map(|&mag| f64::from(mag))
        .filter(|&mag| mag > MAGNITUDE_FLOOR)
        .fold((0.0, 0.0, 0usize), |(log_sum, sum, count), mag| {
            (log_sum + mag.ln(), sum + mag, count + 1)
        });

    if count == 0 {
        return 0.0;
    }

    let geometric_mean = (log_sum / count as f64).exp();
    let arithmetic_mean = sum / count as f64;
    if arithmetic_mean > MAGNITUDE_FLOOR {
        (geometric_mean / arithmetic_mean).min(1.0)
    } else {
        0.0
    }
}

/// Index of the bin where cumulative energy first reaches the threshold.
fn spectral_rolloff_bin(spectrum: &[f32]) -> usize {
    let total_energy: f64 = spectrum.iter().map(|&m| f64::from(m) * f64::from(m)).sum();
    if total_energy < MAGNITUDE_FLOOR {
        return 0;
    }

    let threshold = ROLLOFF_THRESHOLD * total_energy;
    let mut cumulative = 0.0;
    for (i, &mag) in spectrum.iter().enumerate() {
        cumulative += f64::from(mag) * f64::from(mag);
        if cumulative >= threshold {
            return i;
        }
    }
    spectrum.len() - 1
}
