// Temporal module - Time-domain feature extraction
//
// This module computes features directly from time-domain audio signals:
// RMS loudness and zero-crossing rate.

use crate::error::FeatureError;

/// Temporal feature computation functions
pub struct TemporalFeatures;

impl TemporalFeatures {
    /// Compute root-mean-square amplitude
    ///
    /// Formula: RMS = sqrt((1 / N) × Σ x[n]²)
    ///
    /// # Errors
    /// `EmptyInput` when `audio` has no samples (the mean would be 0/0).
    pub fn compute_rms(audio: &[f32]) -> Result<f32, FeatureError> {
        if audio.is_empty() {
            return Err(FeatureError::empty("amplitude"));
        }

        let sum_squares: f64 = audio.iter().map(|&x| f64::from(x) * f64::from(x)).sum();
        Ok((sum_squares / audio.len() as f64).sqrt() as f32)
    }

    /// Compute zero-crossing rate (ZCR)
    ///
    /// A crossing is an adjacent pair whose samples fall on opposite sides of
    /// zero, with zero itself counted as non-negative. The count is divided
    /// by the total number of samples, so an alternating buffer of length N
    /// yields (N - 1) / N.
    ///
    /// # Returns
    /// Zero-crossing rate (0.0 to 1.0)
    pub fn compute_zcr(audio: &[f32]) -> Result<f32, FeatureError> {
        if audio.is_empty() {
            return Err(FeatureError::empty("amplitude"));
        }

        let crossings = audio
            .windows(2)
            .filter(|pair| (pair[0] >= 0.0) != (pair[1] >= 0.0))
            .count();

        Ok((crossings as f64 / audio.len() as f64) as f32)
    }
}
