//! Wire shapes exchanged with the execution unit.
//!
//! Every request carries a unique id and every response echoes it; the
//! channel routes responses by id only, never by outcome type.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::analysis::features::Frame;
use crate::analysis::OffloadMetrics;

/// Correlation identifier binding one request to its response
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(pub u64);

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// `{ requestId, frame }`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerRequest {
    pub request_id: RequestId,
    pub frame: Arc<Frame>,
}

/// `{ requestId, outcome }`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerResponse {
    pub request_id: RequestId,
    pub outcome: WorkerOutcome,
}

impl WorkerResponse {
    pub fn success(request_id: RequestId, metrics: OffloadMetrics) -> Self {
        Self {
            request_id,
            outcome: WorkerOutcome::Success(metrics),
        }
    }

    pub fn failure(request_id: RequestId, message: impl Into<String>) -> Self {
        Self {
            request_id,
            outcome: WorkerOutcome::Failure(message.into()),
        }
    }
}

/// Result computed by the execution unit for one request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum WorkerOutcome {
    Success(OffloadMetrics),
    Failure(String),
}
