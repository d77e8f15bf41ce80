// FeatureExtractor - per-frame scalar features for live display
//
// This module turns one time-domain buffer and one frequency-domain buffer
// into a fixed set of scalar features. It holds no state and performs no I/O,
// so it runs synchronously inside a capture tick.
//
// Module organization:
// - types: Data structures (Frame, Features)
// - spectral: Frequency-domain features (centroid, dominant-bin pitch)
// - temporal: Time-domain features (RMS, ZCR)
// - mod.rs: Coordinator (FeatureExtractor)
//
// Features extracted:
// 1. RMS: Root-mean-square amplitude (loudness)
// 2. Spectral Centroid: Magnitude-weighted mean bin index (brightness)
// 3. Pitch: Frequency of the most energetic bin
// 4. Zero-Crossing Rate (ZCR): Fraction of sign changes (noisiness)

mod spectral;
mod temporal;
mod types;

pub use types::{Features, Frame};

use crate::error::FeatureError;
use spectral::SpectralFeatures;
use temporal::TemporalFeatures;

/// Default sample rate used to convert bin index to Hz.
pub const DEFAULT_SAMPLE_RATE: u32 = 44_100;

/// Extract all features from one pair of buffers
///
/// # Errors
/// * `EmptyInput` if either buffer is empty (amplitude is checked first)
/// * `DegenerateSpectrum` if the spectrum carries no finite energy
pub fn extract(
    amplitude: &[f32],
    frequency: &[f32],
    sample_rate: u32,
) -> Result<Features, FeatureError> {
    let spectral = SpectralFeatures::new(sample_rate);

    let rms = TemporalFeatures::compute_rms(amplitude)?;
    let zero_crossing_rate = TemporalFeatures::compute_zcr(amplitude)?;
    let spectral_centroid = spectral.compute_centroid(frequency)?;
    let pitch_hz = spectral.compute_pitch(frequency)?;

    Ok(Features {
        rms,
        spectral_centroid,
        pitch_hz,
        zero_crossing_rate,
    })
}

/// FeatureExtractor binds the sample rate used for pitch conversion
#[derive(Debug, Clone, Copy)]
pub struct FeatureExtractor {
    sample_rate: u32,
}

impl FeatureExtractor {
    /// Create a new FeatureExtractor with the specified sample rate
    ///
    /// # Arguments
    /// * `sample_rate` - Audio sample rate in Hz (e.g., 44100)
    pub fn new(sample_rate: u32) -> Self {
        Self { sample_rate }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Extract all features from a captured frame
    pub fn extract(&self, frame: &Frame) -> Result<Features, FeatureError> {
        extract(&frame.amplitude, &frame.frequency, self.sample_rate)
    }
}

impl Default for FeatureExtractor {
    fn default() -> Self {
        Self::new(DEFAULT_SAMPLE_RATE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Generate pure sine wave for testing
    fn generate_sine_wave(sample_rate: u32, frequency: f32, duration_samples: usize) -> Vec<f32> {
        (0..duration_samples)
            .map(|i| {
                let t = i as f32 / sample_rate as f32;
                (2.0 * std::f32::consts::PI * frequency * t).sin()
            })
            .collect()
    }

    fn peak_spectrum(len: usize, k: usize) -> Vec<f32> {
        let mut spectrum = vec![0.0; len];
        spectrum[k] = 1.0;
        spectrum
    }

    #[test]
    fn test_extract_sine_with_peak_spectrum() {
        let amplitude = generate_sine_wave(DEFAULT_SAMPLE_RATE, 440.0, 2048);
        let frequency = peak_spectrum(1024, 20);
        let features = extract(&amplitude, &frequency, DEFAULT_SAMPLE_RATE).unwrap();

        // Full-scale sine: RMS = 1/sqrt(2)
        assert!((features.rms - std::f32::consts::FRAC_1_SQRT_2).abs() < 0.01);
        assert_eq!(features.spectral_centroid, 20.0);
        assert_eq!(features.pitch_hz, 20.0 * (44_100.0 / 1024.0));
        // 440 Hz crosses zero ~880 times per second
        let expected_zcr = 880.0 / DEFAULT_SAMPLE_RATE as f32;
        assert!(
            (features.zero_crossing_rate - expected_zcr).abs() < 0.002,
            "Expected ZCR near {}, got {}",
            expected_zcr,
            features.zero_crossing_rate
        );
    }

    #[test]
    fn test_buffers_may_differ_in_length() {
        let extractor = FeatureExtractor::default();
        let frame = Frame::new(vec![0.5; 100], peak_spectrum(7, 3));
        let features = extractor.extract(&frame).unwrap();
        assert!((features.rms - 0.5).abs() < 1e-6);
        assert_eq!(features.spectral_centroid, 3.0);
    }

    #[test]
    fn test_silent_spectrum_is_surfaced_not_nan() {
        let result = extract(&[0.1, -0.1], &[0.0; 16], DEFAULT_SAMPLE_RATE);
        assert!(matches!(
            result,
            Err(FeatureError::DegenerateSpectrum { .. })
        ));
    }

    #[test]
    fn test_empty_amplitude_reported_before_frequency() {
        let result = extract(&[], &[], DEFAULT_SAMPLE_RATE);
        assert_eq!(result, Err(FeatureError::empty("amplitude")));

        let result = extract(&[0.1], &[], DEFAULT_SAMPLE_RATE);
        assert_eq!(result, Err(FeatureError::empty("frequency")));
    }

    #[test]
    fn test_features_in_valid_ranges() {
        let extractor = FeatureExtractor::new(48_000);
        let amplitude = generate_sine_wave(48_000, 1000.0, 1024);
        let frequency: Vec<f32> = (0..512).map(|i| 1.0 / (1.0 + i as f32)).collect();
        let features = extractor.extract(&Frame::new(amplitude, frequency)).unwrap();

        assert!(features.rms >= 0.0);
        assert!(features.zero_crossing_rate >= 0.0 && features.zero_crossing_rate <= 1.0);
        assert!(features.spectral_centroid >= 0.0 && features.spectral_centroid < 512.0);
        assert_eq!(features.pitch_hz, 0.0, "Bin 0 dominates a 1/(1+i) spectrum");
    }
}
