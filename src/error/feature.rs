// Feature extraction error types

use crate::error::ErrorCode;
use std::fmt;

/// Feature extraction error code constants
///
/// Error code range: 2001-2002
pub struct FeatureErrorCodes {}

impl FeatureErrorCodes {
    /// A required buffer was empty
    pub const EMPTY_INPUT: i32 = 2001;

    /// Spectrum carries no energy, so centroid is 0/0
    pub const DEGENERATE_SPECTRUM: i32 = 2002;
}

/// Malformed or degenerate frame reached the extractor
///
/// The capture loop skips that tick's features and publishes the error at
/// warning level.
#[derive(Debug, Clone, PartialEq)]
pub enum FeatureError {
    /// Named buffer (`amplitude` or `frequency`) had no samples
    EmptyInput { buffer: String },

    /// Sum of spectral magnitudes was zero or not finite
    DegenerateSpectrum { magnitude_sum: f64 },
}

impl FeatureError {
    pub(crate) fn empty(buffer: &str) -> Self {
        FeatureError::EmptyInput {
            buffer: buffer.to_string(),
        }
    }
}

impl ErrorCode for FeatureError {
    fn code(&self) -> i32 {
        match self {
            FeatureError::EmptyInput { .. } => FeatureErrorCodes::EMPTY_INPUT,
            FeatureError::DegenerateSpectrum { .. } => FeatureErrorCodes::DEGENERATE_SPECTRUM,
        }
    }

    fn message(&self) -> String {
        match self {
            FeatureError::EmptyInput { buffer } => {
                format!("Cannot extract features from empty {} buffer", buffer)
            }
            FeatureError::DegenerateSpectrum { magnitude_sum } => format!(
                "Spectrum is degenerate (magnitude sum {}); centroid undefined",
                magnitude_sum
            ),
        }
    }
}

impl fmt::Display for FeatureError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "FeatureError::{:?} (code {}): {}",
            self,
            self.code(),
            self.message()
        )
    }
}

impl std::error::Error for FeatureError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_feature_error_messages() {
        let err = FeatureError::empty("amplitude");
        assert_eq!(err.code(), 2001);
        assert!(err.message().contains("empty amplitude buffer"));

        let err = FeatureError::DegenerateSpectrum { magnitude_sum: 0.0 };
        assert_eq!(err.code(), 2002);
        assert!(err.message().contains("degenerate"));
    }
}
