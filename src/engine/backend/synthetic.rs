use std::f32::consts::PI;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use rand::{rngs::StdRng, Rng, SeedableRng};

use crate::analysis::features::Frame;
use crate::error::CaptureError;

use super::{condition_samples, CaptureSettings, CaptureSource, SpectrumAnalyzer, TimeSource};

const DEFAULT_SEED: u64 = 0x5A5A_FFF0;

/// Deterministic tone-plus-noise source used by the CLI and tests.
///
/// Generates a sine at `frequency_hz` with optional seeded white noise. With
/// a frame limit it reports `SourceExhausted` once the limit is reached,
/// which the loop treats as a capture failure.
pub struct SyntheticSource {
    frequency_hz: f32,
    amplitude: f32,
    noise_level: f32,
    seed: u64,
    rng: StdRng,
    phase: f32,
    frame_limit: Option<u64>,
    frames_emitted: u64,
    active: Option<(CaptureSettings, SpectrumAnalyzer)>,
}

impl SyntheticSource {
    pub fn new(frequency_hz: f32) -> Self {
        Self {
            frequency_hz,
            amplitude: 0.8,
            noise_level: 0.0,
            seed: DEFAULT_SEED,
            rng: StdRng::seed_from_u64(DEFAULT_SEED),
            phase: 0.0,
            frame_limit: None,
            frames_emitted: 0,
            active: None,
        }
    }

    pub fn with_amplitude(mut self, amplitude: f32) -> Self {
        self.amplitude = amplitude;
        self
    }

    pub fn with_noise(mut self, level: f32, seed: u64) -> Self {
        self.noise_level = level;
        self.seed = seed;
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    pub fn with_frame_limit(mut self, frames: u64) -> Self {
        self.frame_limit = Some(frames);
        self
    }

    pub fn frames_emitted(&self) -> u64 {
        self.frames_emitted
    }
}

impl CaptureSource for SyntheticSource {
    fn start(&mut self, settings: &CaptureSettings) -> Result<(), CaptureError> {
        if settings.frame_size == 0 || settings.sample_rate == 0 {
            return Err(CaptureError::UnsupportedFormat {
                reason: format!(
                    "frame_size={} sample_rate={}",
                    settings.frame_size, settings.sample_rate
                ),
            });
        }
        if !self.frequency_hz.is_finite() || self.frequency_hz < 0.0 {
            return Err(CaptureError::UnsupportedFormat {
                reason: format!("tone frequency {} Hz", self.frequency_hz),
            });
        }
        if !self.noise_level.is_finite() || self.noise_level < 0.0 {
            return Err(CaptureError::UnsupportedFormat {
                reason: format!("noise level {}", self.noise_level),
            });
        }

        // Every recording replays the same signal.
        self.rng = StdRng::seed_from_u64(self.seed);
        self.phase = 0.0;
        self.frames_emitted = 0;
        self.active = Some((*settings, SpectrumAnalyzer::new(settings.frame_size)));
        log::debug!(
            "[SyntheticSource] Started: {} Hz, frame_size={}",
            self.frequency_hz,
            settings.frame_size
        );
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Frame, CaptureError> {
        let Some((settings, spectrum)) = self.active.as_ref() else {
            return Err(CaptureError::StreamFailure {
                reason: "source not started".to_string(),
            });
        };
        if self
            .frame_limit
            .is_some_and(|limit| self.frames_emitted >= limit)
        {
            return Err(CaptureError::SourceExhausted);
        }

        let step = self.frequency_hz / settings.sample_rate as f32;
        let mut samples = Vec::with_capacity(settings.frame_size);
        for _ in 0..settings.frame_size {
            let mut value = (2.0 * PI * self.phase).sin() * self.amplitude;
            if self.noise_level > 0.0 {
                value += self.rng.gen_range(-self.noise_level..=self.noise_level);
            }
            samples.push(value);
            self.phase = (self.phase + step).fract();
        }
        condition_samples(&mut samples, settings);

        let frequency = spectrum.magnitude_spectrum(&samples);
        self.frames_emitted += 1;
        Ok(Frame::new(samples, frequency))
    }

    fn stop(&mut self) {
        if self.active.take().is_some() {
            log::debug!(
                "[SyntheticSource] Stopped after {} frames",
                self.frames_emitted
            );
        }
    }
}

/// Deterministic time source for tests and offline runs.
///
/// Each call to `now()` advances by a fixed step (10ms by default) so
/// timestamps are monotonic and reproducible.
pub struct StubTimeSource {
    start: Instant,
    step_ms: u64,
    offset_ms: AtomicU64,
}

impl StubTimeSource {
    pub fn new() -> Self {
        Self::with_step(Duration::from_millis(10))
    }

    pub fn with_step(step: Duration) -> Self {
        Self {
            start: Instant::now(),
            step_ms: step.as_millis() as u64,
            offset_ms: AtomicU64::new(0),
        }
    }
}

impl Default for StubTimeSource {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeSource for StubTimeSource {
    fn now(&self) -> Instant {
        let ms = self.offset_ms.fetch_add(self.step_ms, Ordering::SeqCst);
        self.start + Duration::from_millis(ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::features::FeatureExtractor;

    fn settings(frame_size: usize) -> CaptureSettings {
        CaptureSettings {
            sensitivity: 50,
            noise_threshold: 0,
            frame_size,
            sample_rate: 44_100,
        }
    }

    #[test]
    fn test_frame_before_start_fails() {
        let mut source = SyntheticSource::new(440.0);
        assert!(matches!(
            source.next_frame(),
            Err(CaptureError::StreamFailure { .. })
        ));
    }

    #[test]
    fn test_tone_peaks_at_expected_bin() {
        let frame_size = 1024;
        let bin = 20;
        let frequency_hz = bin as f32 * 44_100.0 / frame_size as f32;
        let mut source = SyntheticSource::new(frequency_hz);
        source.start(&settings(frame_size)).unwrap();

        let frame = source.next_frame().unwrap();

        assert_eq!(frame.amplitude.len(), frame_size);
        assert_eq!(frame.frequency.len(), frame_size / 2);
        let features = FeatureExtractor::new(44_100).extract(&frame).unwrap();
        // Pitch is reported against the bin count, i.e. twice the tone.
        let bin_hz = 44_100.0 / (frame_size / 2) as f32;
        assert!((features.pitch_hz - bin as f32 * bin_hz).abs() < 1e-3);
    }

    #[test]
    fn test_frame_limit_exhausts_source() {
        let mut source = SyntheticSource::new(440.0).with_frame_limit(2);
        source.start(&settings(64)).unwrap();

        assert!(source.next_frame().is_ok());
        assert!(source.next_frame().is_ok());
        assert_eq!(source.next_frame(), Err(CaptureError::SourceExhausted));
        assert_eq!(source.frames_emitted(), 2);
    }

    #[test]
    fn test_seeded_noise_is_reproducible() {
        let mut a = SyntheticSource::new(0.0).with_noise(0.3, 7);
        let mut b = SyntheticSource::new(0.0).with_noise(0.3, 7);
        a.start(&settings(128)).unwrap();
        b.start(&settings(128)).unwrap();

        assert_eq!(a.next_frame().unwrap(), b.next_frame().unwrap());
    }

    #[test]
    fn test_sensitivity_scales_output() {
        let mut quiet = SyntheticSource::new(440.0).with_amplitude(0.25);
        let mut loud = SyntheticSource::new(440.0).with_amplitude(0.25);
        quiet.start(&settings(256)).unwrap();
        loud.start(&CaptureSettings {
            sensitivity: 100,
            ..settings(256)
        })
        .unwrap();

        let q = quiet.next_frame().unwrap();
        let l = loud.next_frame().unwrap();
        for (a, b) in q.amplitude.iter().zip(&l.amplitude) {
            assert!((b - 2.0 * a).abs() < 1e-6);
        }
    }

    #[test]
    fn test_non_finite_noise_is_rejected() {
        for level in [f32::INFINITY, f32::NAN, -0.1] {
            let mut source = SyntheticSource::new(440.0).with_noise(level, 1);
            assert!(matches!(
                source.start(&settings(64)),
                Err(CaptureError::UnsupportedFormat { .. })
            ));
            assert!(source.next_frame().is_err());
        }
    }

    #[test]
    fn test_stop_then_next_frame_fails() {
        let mut source = SyntheticSource::new(440.0);
        source.start(&settings(64)).unwrap();
        source.stop();
        assert!(source.next_frame().is_err());
    }

    #[test]
    fn test_stub_time_source_advances_fixed_step() {
        let clock = StubTimeSource::with_step(Duration::from_millis(25));
        let a = clock.now();
        let b = clock.now();
        assert_eq!(b - a, Duration::from_millis(25));
    }
}
