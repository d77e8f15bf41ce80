//! Execution unit abstractions for the worker channel.

use std::thread::{self, JoinHandle};

use tokio::sync::mpsc;

use crate::analysis::metrics::compute_metrics;
use crate::error::{ErrorCode, WorkerError};

use super::protocol::{WorkerRequest, WorkerResponse};

/// Message-passing link handed to a freshly spawned execution unit.
///
/// The unit owns the request receiver and the response sender; nothing else
/// is shared with the channel.
pub struct WorkerLink {
    pub requests: mpsc::UnboundedReceiver<WorkerRequest>,
    pub responses: mpsc::UnboundedSender<WorkerResponse>,
}

/// A running background execution unit.
pub trait ExecutionUnit: Send {
    /// Release the unit's resources. Called exactly once, after the request
    /// sender has been dropped.
    fn terminate(self: Box<Self>);
}

/// Trait implemented by anything that can host the offload computation.
///
/// The default is [`ThreadBackend`]; tests and alternative transports plug in
/// their own implementation.
pub trait OffloadBackend: Send + Sync {
    fn spawn(&self, link: WorkerLink) -> Result<Box<dyn ExecutionUnit>, WorkerError>;
}

/// Runs the metrics computation on one dedicated OS thread.
pub struct ThreadBackend {
    sample_rate: u32,
}

impl ThreadBackend {
    pub fn new(sample_rate: u32) -> Self {
        Self { sample_rate }
    }
}

impl OffloadBackend for ThreadBackend {
    fn spawn(&self, link: WorkerLink) -> Result<Box<dyn ExecutionUnit>, WorkerError> {
        let sample_rate = self.sample_rate;
        let handle = thread::Builder::new()
            .name("offload-worker".to_string())
            .spawn(move || run_metrics_loop(link, sample_rate))
            .map_err(|err| WorkerError::WorkerFailure {
                message: format!("failed to spawn offload thread: {}", err),
            })?;

        log::info!("[WorkerChannel] Offload thread started");
        Ok(Box::new(ThreadUnit {
            handle: Some(handle),
        }))
    }
}

struct ThreadUnit {
    handle: Option<JoinHandle<()>>,
}

impl ExecutionUnit for ThreadUnit {
    fn terminate(mut self: Box<Self>) {
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                log::error!("[WorkerChannel] Offload thread panicked");
            } else {
                log::info!("[WorkerChannel] Offload thread joined");
            }
        }
    }
}

/// Worker loop: one response per request until the request channel closes.
fn run_metrics_loop(mut link: WorkerLink, sample_rate: u32) {
    while let Some(request) = link.requests.blocking_recv() {
        let response = match compute_metrics(&request.frame, sample_rate) {
            Ok(metrics) => WorkerResponse::success(request.request_id, metrics),
            Err(err) => WorkerResponse::failure(request.request_id, err.message()),
        };

        if link.responses.send(response).is_err() {
            break;
        }
    }
    log::debug!("[WorkerChannel] Offload loop exited");
}
