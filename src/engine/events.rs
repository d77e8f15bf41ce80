//! Event types published by the capture loop on its three broadcast channels.

use serde::ser::SerializeStruct;
use serde::{Deserialize, Serialize, Serializer};

use crate::analysis::{Features, OffloadMetrics};
use crate::error::{ErrorCode, PipelineError};

/// Features extracted during one tick, published in tick order.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeatureEvent {
    pub tick: u64,
    /// Milliseconds since the loop was created
    pub timestamp_ms: u64,
    pub features: Features,
}

/// Outcome of the offload spawned by one tick. May arrive out of tick order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MetricsEvent {
    Ready { tick: u64, metrics: OffloadMetrics },
    Unavailable { tick: u64, reason: String },
}

impl MetricsEvent {
    pub fn tick(&self) -> u64 {
        match self {
            MetricsEvent::Ready { tick, .. } | MetricsEvent::Unavailable { tick, .. } => *tick,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// The loop keeps running
    Warning,
    /// Recording stopped
    Fatal,
}

/// Error observed by the loop. `tick` is `None` outside a tick (e.g. start).
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorEvent {
    pub severity: Severity,
    pub tick: Option<u64>,
    pub error: PipelineError,
}

impl ErrorEvent {
    pub fn warning(tick: Option<u64>, error: impl Into<PipelineError>) -> Self {
        Self {
            severity: Severity::Warning,
            tick,
            error: error.into(),
        }
    }

    pub fn fatal(tick: Option<u64>, error: impl Into<PipelineError>) -> Self {
        Self {
            severity: Severity::Fatal,
            tick,
            error: error.into(),
        }
    }
}

impl Serialize for ErrorEvent {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("ErrorEvent", 4)?;
        state.serialize_field("severity", &self.severity)?;
        state.serialize_field("tick", &self.tick)?;
        state.serialize_field("code", &self.error.code())?;
        state.serialize_field("message", &self.error.message())?;
        state.end()
    }
}
