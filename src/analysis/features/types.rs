// Types module - Data structures for frames and features
//
// This module defines the per-tick data flowing through the pipeline: the
// captured frame and the scalar features derived from it.

use serde::{Deserialize, Serialize};

/// One capture instant: mono time-domain samples plus the matching
/// magnitude spectrum.
///
/// Both sequences must be non-empty for features to be computed. Their
/// lengths are independent of each other.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    /// Time-domain samples, roughly in [-1, 1]
    pub amplitude: Vec<f32>,

    /// Non-negative magnitudes, one per bin, ascending bin frequency
    pub frequency: Vec<f32>,
}

impl Frame {
    pub fn new(amplitude: Vec<f32>, frequency: Vec<f32>) -> Self {
        Self {
            amplitude,
            frequency,
        }
    }
}

/// Features extracted from one frame
///
/// Recomputed every tick and never mutated in place.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Features {
    /// Root-mean-square amplitude (loudness proxy, >= 0)
    pub rms: f32,

    /// Magnitude-weighted mean bin index (brightness proxy)
    ///
    /// Expressed in bin units, not Hz.
    pub spectral_centroid: f32,

    /// Frequency of the most energetic bin in Hz
    pub pitch_hz: f32,

    /// Fraction of adjacent sample pairs that change sign (0.0 to 1.0)
    pub zero_crossing_rate: f32,
}
