// Error types for the live analyzer pipeline
//
// This module defines custom error types for capture, feature extraction,
// worker offload and recording lifecycle operations. Every error carries a
// stable numeric code so callers can route them without string matching.

mod capture;
mod feature;
mod worker;

pub use capture::{log_capture_error, CaptureError, CaptureErrorCodes};
pub use feature::{FeatureError, FeatureErrorCodes};
pub use worker::{log_worker_error, WorkerError, WorkerErrorCodes};

use std::fmt;

/// Error codes for structured error reporting
///
/// This trait provides a standard way to get error codes and messages
/// from custom error types, enabling consistent error handling across
/// the event channels and the CLI.
pub trait ErrorCode {
    /// Get the numeric error code
    fn code(&self) -> i32;

    /// Get the human-readable error message
    fn message(&self) -> String;
}

/// Recording lifecycle error code constants
///
/// Error code range: 4001-4002
pub struct PipelineErrorCodes {}

impl PipelineErrorCodes {
    /// `start_recording` called while already recording
    pub const ALREADY_RECORDING: i32 = 4001;

    /// `stop_recording` called while idle
    pub const NOT_RECORDING: i32 = 4002;
}

/// Top-level error surfaced by the capture loop and its error channel
///
/// State-machine misuse has its own codes; wrapped errors report the code of
/// the component that produced them.
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineError {
    /// Recording was already active
    AlreadyRecording,

    /// Recording was not active
    NotRecording,

    /// Capture collaborator failed
    Capture(CaptureError),

    /// A frame could not be turned into features
    Feature(FeatureError),

    /// Offloaded processing failed
    Worker(WorkerError),
}

impl PipelineError {
    /// True for errors that halt recording.
    pub fn is_fatal(&self) -> bool {
        matches!(self, PipelineError::Capture(_))
    }
}

impl ErrorCode for PipelineError {
    fn code(&self) -> i32 {
        match self {
            PipelineError::AlreadyRecording => PipelineErrorCodes::ALREADY_RECORDING,
            PipelineError::NotRecording => PipelineErrorCodes::NOT_RECORDING,
            PipelineError::Capture(err) => err.code(),
            PipelineError::Feature(err) => err.code(),
            PipelineError::Worker(err) => err.code(),
        }
    }

    fn message(&self) -> String {
        match self {
            PipelineError::AlreadyRecording => {
                "Recording already active. Call stop_recording() first.".to_string()
            }
            PipelineError::NotRecording => {
                "Recording not active. Call start_recording() first.".to_string()
            }
            PipelineError::Capture(err) => err.message(),
            PipelineError::Feature(err) => err.message(),
            PipelineError::Worker(err) => err.message(),
        }
    }
}

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineError::Capture(err) => err.fmt(f),
            PipelineError::Feature(err) => err.fmt(f),
            PipelineError::Worker(err) => err.fmt(f),
            _ => write!(
                f,
                "PipelineError::{:?} (code {}): {}",
                self,
                self.code(),
                self.message()
            ),
        }
    }
}

impl std::error::Error for PipelineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PipelineError::Capture(err) => Some(err),
            PipelineError::Feature(err) => Some(err),
            PipelineError::Worker(err) => Some(err),
            _ => None,
        }
    }
}

impl From<CaptureError> for PipelineError {
    fn from(err: CaptureError) -> Self {
        PipelineError::Capture(err)
    }
}

impl From<FeatureError> for PipelineError {
    fn from(err: FeatureError) -> Self {
        PipelineError::Feature(err)
    }
}

impl From<WorkerError> for PipelineError {
    fn from(err: WorkerError) -> Self {
        PipelineError::Worker(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pipeline_error_codes() {
        assert_eq!(PipelineError::AlreadyRecording.code(), 4001);
        assert_eq!(PipelineError::NotRecording.code(), 4002);
        assert_eq!(
            PipelineError::Capture(CaptureError::PermissionDenied).code(),
            CaptureErrorCodes::PERMISSION_DENIED
        );
        assert_eq!(
            PipelineError::Worker(WorkerError::ChannelTornDown).code(),
            WorkerErrorCodes::CHANNEL_TORN_DOWN
        );
    }

    #[test]
    fn test_wrapped_display_delegates() {
        let err: PipelineError = FeatureError::DegenerateSpectrum { magnitude_sum: 0.0 }.into();
        let display = format!("{}", err);
        assert!(display.starts_with("FeatureError::"));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_only_capture_errors_are_fatal() {
        assert!(PipelineError::Capture(CaptureError::SourceExhausted).is_fatal());
        assert!(!PipelineError::Worker(WorkerError::ChannelTornDown).is_fatal());
        assert!(!PipelineError::Feature(FeatureError::EmptyInput {
            buffer: "amplitude".to_string()
        })
        .is_fatal());
        assert!(!PipelineError::AlreadyRecording.is_fatal());
    }
}
