// Spectrum module - magnitude spectra for the reference capture sources
//
// Sources deliver frames that already carry a frequency-domain buffer, the
// way a browser analyser node does: Hann window, forward FFT, and
// `fft_size / 2` magnitude bins.

use rustfft::{num_complex::Complex, Fft, FftPlanner};
use std::sync::Arc;

/// Computes magnitude spectra for fixed-size windows
pub struct SpectrumAnalyzer {
    fft: Arc<dyn Fft<f32>>,
    fft_size: usize,
    /// Hann window (pre-computed)
    window: Vec<f32>,
}

impl SpectrumAnalyzer {
    /// Create an analyzer for windows of `fft_size` samples (minimum 2)
    pub fn new(fft_size: usize) -> Self {
        let fft_size = fft_size.max(2);
        let window = (0..fft_size)
            .map(|i| {
                0.5 * (1.0
                    - ((2.0 * std::f32::consts::PI * i as f32) / (fft_size as f32 - 1.0)).cos())
            })
            .collect();

        Self {
            fft: FftPlanner::new().plan_fft_forward(fft_size),
            fft_size,
            window,
        }
    }

    pub fn fft_size(&self) -> usize {
        self.fft_size
    }

    /// Number of bins produced per window
    pub fn bin_count(&self) -> usize {
        self.fft_size / 2
    }

    /// Window, transform and return `fft_size / 2` magnitudes
    ///
    /// Input longer than `fft_size` is truncated; shorter input is
    /// zero-padded.
    pub fn magnitude_spectrum(&self, audio: &[f32]) -> Vec<f32> {
        let mut buffer: Vec<Complex<f32>> = audio
            .iter()
            .zip(&self.window)
            .map(|(&sample, &w)| Complex::new(sample * w, 0.0))
            .collect();
        buffer.resize(self.fft_size, Complex::new(0.0, 0.0));

        self.fft.process(&mut buffer);

        buffer[..self.bin_count()].iter().map(|c| c.norm()).collect()
    }
}
