// Live Analyzer Core - real-time audio feature extraction
// Capture loop with synchronous features and offloaded metrics under retry

// Module declarations
pub mod analysis;
pub mod config;
pub mod engine;
pub mod error;
pub mod managers;
pub mod retry;
pub mod worker;

// Re-exports for convenience
pub use analysis::{FeatureExtractor, Features, Frame, OffloadMetrics};
pub use config::AnalyzerConfig;
pub use engine::{CaptureLoop, ErrorEvent, FeatureEvent, MetricsEvent, RecordingState, Severity};
pub use error::{ErrorCode, PipelineError};
pub use retry::{ExponentialBackoff, RetryConfig, RetryPolicy};
pub use worker::WorkerChannel;
