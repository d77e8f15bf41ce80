use std::path::{Path, PathBuf};

use crate::analysis::features::Frame;
use crate::error::CaptureError;

use super::{condition_samples, CaptureSettings, CaptureSource, SpectrumAnalyzer};

/// Mono WAV file played back one frame per tick.
///
/// Samples are decoded up front. The final partial frame is zero-padded;
/// after it the source reports `SourceExhausted`.
pub struct WavSource {
    path: PathBuf,
    samples: Vec<f32>,
    sample_rate: u32,
    cursor: usize,
    active: Option<(CaptureSettings, SpectrumAnalyzer)>,
}

impl WavSource {
    /// Decode `path`. Multi-channel files are rejected.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, CaptureError> {
        let path = path.as_ref().to_path_buf();
        let (samples, sample_rate) = read_wav(&path)?;
        log::info!(
            "[WavSource] Loaded {} samples at {} Hz from {}",
            samples.len(),
            sample_rate,
            path.display()
        );
        Ok(Self {
            path,
            samples,
            sample_rate,
            cursor: 0,
            active: None,
        })
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

impl CaptureSource for WavSource {
    fn start(&mut self, settings: &CaptureSettings) -> Result<(), CaptureError> {
        if settings.frame_size == 0 {
            return Err(CaptureError::UnsupportedFormat {
                reason: "frame_size must be > 0".to_string(),
            });
        }
        if settings.sample_rate != self.sample_rate {
            log::warn!(
                "[WavSource] {} is {} Hz but the pipeline expects {} Hz; pitch will be scaled",
                self.path.display(),
                self.sample_rate,
                settings.sample_rate
            );
        }
        self.active = Some((*settings, SpectrumAnalyzer::new(settings.frame_size)));
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Frame, CaptureError> {
        let Some((settings, spectrum)) = self.active.as_ref() else {
            return Err(CaptureError::StreamFailure {
                reason: "source not started".to_string(),
            });
        };
        if self.cursor >= self.samples.len() {
            return Err(CaptureError::SourceExhausted);
        }

        let end = (self.cursor + settings.frame_size).min(self.samples.len());
        let mut amplitude = self.samples[self.cursor..end].to_vec();
        amplitude.resize(settings.frame_size, 0.0);
        self.cursor = end;
        condition_samples(&mut amplitude, settings);

        let frequency = spectrum.magnitude_spectrum(&amplitude);
        Ok(Frame::new(amplitude, frequency))
    }

    fn stop(&mut self) {
        self.active = None;
    }
}

fn read_wav(path: &Path) -> Result<(Vec<f32>, u32), CaptureError> {
    let mut reader = hound::WavReader::open(path)?;
    let spec = reader.spec();
    if spec.channels != 1 {
        return Err(CaptureError::UnsupportedFormat {
            reason: format!(
                "{} must be mono (found {} channels)",
                path.display(),
                spec.channels
            ),
        });
    }

    let samples = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .samples::<f32>()
            .collect::<Result<Vec<f32>, _>>()?,
        hound::SampleFormat::Int => match spec.bits_per_sample {
            16 => reader
                .samples::<i16>()
                .map(|sample| sample.map(|v| v as f32 / i16::MAX as f32))
                .collect::<Result<Vec<f32>, _>>()?,
            24 | 32 => {
                let max = ((1i64 << (spec.bits_per_sample - 1)) - 1) as f32;
                reader
                    .samples::<i32>()
                    .map(|sample| sample.map(|v| v as f32 / max))
                    .collect::<Result<Vec<f32>, _>>()?
            }
            bits => {
                return Err(CaptureError::UnsupportedFormat {
                    reason: format!(
                        "unsupported bits_per_sample={} for {}",
                        bits,
                        path.display()
                    ),
                })
            }
        },
    };

    Ok((samples, spec.sample_rate))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_wav(channels: u16, samples: &[i16]) -> tempfile::NamedTempFile {
        let file = tempfile::Builder::new().suffix(".wav").tempfile().unwrap();
        let spec = hound::WavSpec {
            channels,
            sample_rate: 44_100,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(file.path(), spec).unwrap();
        for &sample in samples {
            writer.write_sample(sample).unwrap();
        }
        writer.finalize().unwrap();
        file
    }

    fn settings(frame_size: usize) -> CaptureSettings {
        CaptureSettings {
            sensitivity: 50,
            noise_threshold: 0,
            frame_size,
            sample_rate: 44_100,
        }
    }

    #[test]
    fn test_rejects_stereo() {
        let file = write_wav(2, &[0, 0, 100, 100]);
        match WavSource::open(file.path()) {
            Err(CaptureError::UnsupportedFormat { reason }) => assert!(reason.contains("mono")),
            other => panic!("Expected UnsupportedFormat, got {:?}", other.err()),
        }
    }

    #[test]
    fn test_missing_file_is_device_unavailable() {
        assert!(matches!(
            WavSource::open("/nonexistent/input.wav"),
            Err(CaptureError::DeviceUnavailable { .. })
        ));
    }

    #[test]
    fn test_frames_then_exhausted() {
        let file = write_wav(1, &[i16::MAX; 6]);
        let mut source = WavSource::open(file.path()).unwrap();
        assert_eq!(source.len(), 6);
        source.start(&settings(4)).unwrap();

        let first = source.next_frame().unwrap();
        assert_eq!(first.amplitude, vec![1.0; 4]);
        assert_eq!(first.frequency.len(), 2);

        let second = source.next_frame().unwrap();
        assert_eq!(second.amplitude, vec![1.0, 1.0, 0.0, 0.0]);

        assert_eq!(source.next_frame(), Err(CaptureError::SourceExhausted));
    }
}
