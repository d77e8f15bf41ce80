// Worker channel error types and constants

use crate::error::ErrorCode;
use std::fmt;

/// Worker error code constants
///
/// Error code range: 3001-3008
pub struct WorkerErrorCodes {}

impl WorkerErrorCodes {
    /// `process` called before `initialize`
    pub const CHANNEL_NOT_INITIALIZED: i32 = 3001;

    /// Channel was torn down
    pub const CHANNEL_TORN_DOWN: i32 = 3002;

    /// Execution unit answered with a failure outcome
    pub const WORKER_FAILURE: i32 = 3003;

    /// No correlated response within the response timeout
    pub const RESPONSE_TIMEOUT: i32 = 3004;

    /// Execution unit stopped accepting requests
    pub const WORKER_UNAVAILABLE: i32 = 3005;

    /// Every retry attempt failed
    pub const RETRY_EXHAUSTED: i32 = 3006;

    /// Retry policy allows zero attempts
    pub const INVALID_RETRY_CONFIG: i32 = 3007;

    /// No tokio runtime to host the response router
    pub const RUNTIME_UNAVAILABLE: i32 = 3008;
}

/// Log a worker error with structured context
pub fn log_worker_error(err: &WorkerError, context: &str) {
    tracing::warn!(
        context,
        code = err.code(),
        component = "WorkerChannel",
        "{}",
        err.message()
    );
}

/// Errors raised by the worker channel and its offload path
///
/// Offload errors never stop the capture loop.
#[derive(Debug, Clone, PartialEq)]
pub enum WorkerError {
    /// `initialize()` was never called
    ChannelNotInitialized,

    /// `teardown()` already ran, or ran while the request was pending
    ChannelTornDown,

    /// Execution unit reported a failure for the request
    WorkerFailure { message: String },

    /// Correlated response did not arrive in time
    ResponseTimeout { request_id: u64, waited_ms: u64 },

    /// Execution unit dropped its request receiver
    WorkerUnavailable,

    /// All attempts failed; carries the last underlying error
    RetryExhausted { attempts: u32, last: Box<WorkerError> },

    /// Retry policy configured with zero attempts
    InvalidRetryConfig { max_attempts: u32 },

    /// `initialize()` called outside a tokio runtime
    RuntimeUnavailable,
}

impl WorkerError {
    /// Whether a fresh send may succeed where this attempt failed.
    ///
    /// Lifecycle errors are permanent for the call.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            WorkerError::WorkerFailure { .. }
                | WorkerError::ResponseTimeout { .. }
                | WorkerError::WorkerUnavailable
        )
    }
}

impl ErrorCode for WorkerError {
    fn code(&self) -> i32 {
        match self {
            WorkerError::ChannelNotInitialized => WorkerErrorCodes::CHANNEL_NOT_INITIALIZED,
            WorkerError::ChannelTornDown => WorkerErrorCodes::CHANNEL_TORN_DOWN,
            WorkerError::WorkerFailure { .. } => WorkerErrorCodes::WORKER_FAILURE,
            WorkerError::ResponseTimeout { .. } => WorkerErrorCodes::RESPONSE_TIMEOUT,
            WorkerError::WorkerUnavailable => WorkerErrorCodes::WORKER_UNAVAILABLE,
            WorkerError::RetryExhausted { .. } => WorkerErrorCodes::RETRY_EXHAUSTED,
            WorkerError::InvalidRetryConfig { .. } => WorkerErrorCodes::INVALID_RETRY_CONFIG,
            WorkerError::RuntimeUnavailable => WorkerErrorCodes::RUNTIME_UNAVAILABLE,
        }
    }

    fn message(&self) -> String {
        match self {
            WorkerError::ChannelNotInitialized => {
                "Worker channel not initialized. Call initialize() first.".to_string()
            }
            WorkerError::ChannelTornDown => "Worker channel has been torn down".to_string(),
            WorkerError::WorkerFailure { message } => format!("Worker failed: {}", message),
            WorkerError::ResponseTimeout {
                request_id,
                waited_ms,
            } => format!(
                "No response for request {} after {} ms",
                request_id, waited_ms
            ),
            WorkerError::WorkerUnavailable => "Worker stopped accepting requests".to_string(),
            WorkerError::RetryExhausted { attempts, last } => format!(
                "Offload failed after {} attempts: {}",
                attempts,
                last.message()
            ),
            WorkerError::InvalidRetryConfig { max_attempts } => format!(
                "Retry policy must allow at least one attempt (got {})",
                max_attempts
            ),
            WorkerError::RuntimeUnavailable => {
                "Worker channel requires a running tokio runtime".to_string()
            }
        }
    }
}

impl fmt::Display for WorkerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "WorkerError::{:?} (code {}): {}",
            self,
            self.code(),
            self.message()
        )
    }
}

impl std::error::Error for WorkerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            WorkerError::RetryExhausted { last, .. } => Some(last.as_ref()),
            _ => None,
        }
    }
}
