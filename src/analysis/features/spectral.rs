// Spectral module - Frequency-domain feature extraction
//
// This module computes spectral features from magnitude spectra supplied by
// the capture collaborator. No FFT happens here.

use crate::error::FeatureError;

/// Spectral feature computation functions
pub struct SpectralFeatures {
    sample_rate: u32,
}

impl SpectralFeatures {
    /// Create a new spectral features processor
    ///
    /// # Arguments
    /// * `sample_rate` - Audio sample rate in Hz, used only to express pitch in Hz
    pub fn new(sample_rate: u32) -> Self {
        Self { sample_rate }
    }

    /// Compute spectral centroid (weighted mean bin index)
    ///
    /// Formula: centroid = Σ(i × |X[i]|) / Σ|X[i]|
    ///
    /// # Errors
    /// * `EmptyInput` for an empty spectrum
    /// * `DegenerateSpectrum` when the magnitude sum is zero or not finite,
    ///   which would otherwise yield NaN or infinity
    pub fn compute_centroid(&self, spectrum: &[f32]) -> Result<f32, FeatureError> {
        if spectrum.is_empty() {
            return Err(FeatureError::empty("frequency"));
        }

        let (weighted_sum, magnitude_sum) = spectrum.iter().enumerate().fold(
            (0.0_f64, 0.0_f64),
            |(weighted, total), (i, &mag)| {
                let mag = f64::from(mag);
                (weighted + mag * i as f64, total + mag)
            },
        );

        if !magnitude_sum.is_finite() || magnitude_sum <= 0.0 {
            return Err(FeatureError::DegenerateSpectrum { magnitude_sum });
        }

        Ok((weighted_sum / magnitude_sum) as f32)
    }

    /// Estimate pitch from the dominant bin
    ///
    /// Returns `k × (sample_rate / N)` where `k` is the index of the largest
    /// magnitude and `N` the number of bins. Equal maxima resolve to the
    /// lowest index. Coarse by construction: no interpolation, no harmonic
    /// correction.
    pub fn compute_pitch(&self, spectrum: &[f32]) -> Result<f32, FeatureError> {
        let Some(&first) = spectrum.first() else {
            return Err(FeatureError::empty("frequency"));
        };

        let mut peak_index = 0;
        let mut peak = first;
        for (i, &mag) in spectrum.iter().enumerate().skip(1) {
            if mag > peak {
                peak = mag;
                peak_index = i;
            }
        }

        let bin_width = self.sample_rate as f32 / spectrum.len() as f32;
        Ok(peak_index as f32 * bin_width)
    }
}
