// Analysis module - per-frame DSP measurements
//
// Two paths share the same `Frame`:
// - features: cheap synchronous measurements computed inside every capture tick
// - metrics: heavier measurements computed by the worker's execution unit

pub mod features;
pub mod metrics;

pub use features::{extract, FeatureExtractor, Features, Frame};
pub use metrics::{compute_metrics, OffloadMetrics};
