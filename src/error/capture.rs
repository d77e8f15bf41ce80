// Capture error types and constants

use crate::error::ErrorCode;
use log::error;
use std::fmt;

/// Capture error code constants
///
/// Error code range: 1001-1005
pub struct CaptureErrorCodes {}

impl CaptureErrorCodes {
    /// Capture device could not be opened
    pub const DEVICE_UNAVAILABLE: i32 = 1001;

    /// Microphone permission denied
    pub const PERMISSION_DENIED: i32 = 1002;

    /// Capture stream failed while running
    pub const STREAM_FAILURE: i32 = 1003;

    /// Finite source has no more frames
    pub const SOURCE_EXHAUSTED: i32 = 1004;

    /// Input format not supported (e.g. multi-channel)
    pub const UNSUPPORTED_FORMAT: i32 = 1005;
}

/// Log a capture error with structured context
///
/// The logging is non-blocking and will not panic on failure.
pub fn log_capture_error(err: &CaptureError, context: &str) {
    error!(
        "Capture error in {}: code={}, component=CaptureSource, message={}",
        context,
        err.code(),
        err.message()
    );
}

/// Errors raised by a capture collaborator
///
/// Any of these halts recording; the capture loop never retries them.
#[derive(Debug, Clone, PartialEq)]
pub enum CaptureError {
    /// Device could not be opened
    DeviceUnavailable { details: String },

    /// Microphone permission denied
    PermissionDenied,

    /// Stream failed mid-capture
    StreamFailure { reason: String },

    /// Finite source ran out of frames
    SourceExhausted,

    /// Input format cannot be captured as mono frames
    UnsupportedFormat { reason: String },
}

impl ErrorCode for CaptureError {
    fn code(&self) -> i32 {
        match self {
            CaptureError::DeviceUnavailable { .. } => CaptureErrorCodes::DEVICE_UNAVAILABLE,
            CaptureError::PermissionDenied => CaptureErrorCodes::PERMISSION_DENIED,
            CaptureError::StreamFailure { .. } => CaptureErrorCodes::STREAM_FAILURE,
            CaptureError::SourceExhausted => CaptureErrorCodes::SOURCE_EXHAUSTED,
            CaptureError::UnsupportedFormat { .. } => CaptureErrorCodes::UNSUPPORTED_FORMAT,
        }
    }

    fn message(&self) -> String {
        match self {
            CaptureError::DeviceUnavailable { details } => {
                format!("Capture device unavailable: {}", details)
            }
            CaptureError::PermissionDenied => {
                "Microphone permission denied. Please grant microphone access.".to_string()
            }
            CaptureError::StreamFailure { reason } => format!("Capture stream failed: {}", reason),
            CaptureError::SourceExhausted => "Capture source has no more frames".to_string(),
            CaptureError::UnsupportedFormat { reason } => {
                format!("Unsupported capture format: {}", reason)
            }
        }
    }
}

impl fmt::Display for CaptureError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "CaptureError::{:?} (code {}): {}",
            self,
            self.code(),
            self.message()
        )
    }
}

impl std::error::Error for CaptureError {}

impl From<std::io::Error> for CaptureError {
    fn from(err: std::io::Error) -> Self {
        CaptureError::DeviceUnavailable {
            details: err.to_string(),
        }
    }
}

impl From<hound::Error> for CaptureError {
    fn from(err: hound::Error) -> Self {
        match err {
            hound::Error::IoError(io) => io.into(),
            other => CaptureError::UnsupportedFormat {
                reason: other.to_string(),
            },
        }
    }
}
