//! WorkerChannel: request/response offload to one background execution unit.
//!
//! Requests may overlap (the capture loop never waits for a previous offload),
//! so each attempt gets its own [`RequestId`] and a oneshot sender stored in a
//! correlation table. A single router task drains the response channel and
//! resolves only the entry whose id matches. Teardown rejects every entry still
//! pending.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::analysis::features::Frame;
use crate::analysis::OffloadMetrics;
use crate::error::WorkerError;
use crate::retry::{retry_if, RetryError, RetryPolicy};

pub mod backend;
pub mod protocol;

pub use backend::{ExecutionUnit, OffloadBackend, ThreadBackend, WorkerLink};
pub use protocol::{RequestId, WorkerOutcome, WorkerRequest, WorkerResponse};

type Resolution = Result<OffloadMetrics, WorkerError>;

/// Pending requests keyed by correlation id.
#[derive(Default)]
struct CorrelationTable {
    entries: Mutex<HashMap<RequestId, oneshot::Sender<Resolution>>>,
}

impl CorrelationTable {
    fn lock(&self) -> MutexGuard<'_, HashMap<RequestId, oneshot::Sender<Resolution>>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn insert(&self, id: RequestId, tx: oneshot::Sender<Resolution>) {
        self.lock().insert(id, tx);
    }

    fn remove(&self, id: RequestId) -> Option<oneshot::Sender<Resolution>> {
        self.lock().remove(&id)
    }

    fn len(&self) -> usize {
        self.lock().len()
    }

    fn reject_all(&self, err: WorkerError) -> usize {
        let drained: Vec<_> = self.lock().drain().collect();
        let count = drained.len();
        for (_, tx) in drained {
            let _ = tx.send(Err(err.clone()));
        }
        count
    }
}

enum ChannelState {
    Uninitialized,
    Active(ActiveChannel),
    TornDown,
}

struct ActiveChannel {
    requests: mpsc::UnboundedSender<WorkerRequest>,
    unit: Box<dyn ExecutionUnit>,
    router: JoinHandle<()>,
}

/// Owns one background execution unit for the lifetime of the pipeline.
pub struct WorkerChannel {
    backend: Arc<dyn OffloadBackend>,
    policy: Arc<dyn RetryPolicy>,
    response_timeout: Option<Duration>,
    state: Mutex<ChannelState>,
    pending: Arc<CorrelationTable>,
    next_request_id: AtomicU64,
}

impl WorkerChannel {
    pub fn new(backend: Arc<dyn OffloadBackend>, policy: Arc<dyn RetryPolicy>) -> Self {
        Self {
            backend,
            policy,
            response_timeout: None,
            state: Mutex::new(ChannelState::Uninitialized),
            pending: Arc::new(CorrelationTable::default()),
            next_request_id: AtomicU64::new(1),
        }
    }

    /// Bound how long one attempt waits for its response. A timeout counts
    /// as a failed attempt.
    pub fn with_response_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.response_timeout = timeout;
        self
    }

    fn lock_state(&self) -> MutexGuard<'_, ChannelState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Create the execution unit. Calling again while active is a no-op.
    ///
    /// # Errors
    /// * `ChannelTornDown` after `teardown()`
    /// * `RuntimeUnavailable` outside a tokio runtime
    pub fn initialize(&self) -> Result<(), WorkerError> {
        let mut state = self.lock_state();
        match *state {
            ChannelState::Active(_) => return Ok(()),
            ChannelState::TornDown => return Err(WorkerError::ChannelTornDown),
            ChannelState::Uninitialized => {}
        }

        let runtime =
            tokio::runtime::Handle::try_current().map_err(|_| WorkerError::RuntimeUnavailable)?;

        let (request_tx, request_rx) = mpsc::unbounded_channel();
        let (response_tx, response_rx) = mpsc::unbounded_channel();
        let unit = self.backend.spawn(WorkerLink {
            requests: request_rx,
            responses: response_tx,
        })?;
        let router = runtime.spawn(route_responses(response_rx, Arc::clone(&self.pending)));

        *state = ChannelState::Active(ActiveChannel {
            requests: request_tx,
            unit,
            router,
        });
        tracing::info!("Worker channel initialized");
        Ok(())
    }

    pub fn is_active(&self) -> bool {
        matches!(*self.lock_state(), ChannelState::Active(_))
    }

    /// Number of requests awaiting a response.
    pub fn pending_requests(&self) -> usize {
        self.pending.len()
    }

    /// Offload one frame and wait for its metrics.
    ///
    /// Transient failures (worker failure outcome, timeout, unit gone) are
    /// re-sent under the retry policy with a fresh request id each time.
    ///
    /// # Errors
    /// * `ChannelNotInitialized` / `ChannelTornDown` immediately, without retry
    /// * `RetryExhausted` carrying the last failure
    /// * `InvalidRetryConfig` if the policy allows zero attempts
    pub async fn process(&self, frame: Arc<Frame>) -> Result<OffloadMetrics, WorkerError> {
        self.ensure_usable()?;

        retry_if(
            || self.dispatch(Arc::clone(&frame)),
            self.policy.as_ref(),
            WorkerError::is_transient,
        )
        .await
        .map_err(|err| match err {
            RetryError::Permanent(err) => err,
            RetryError::Exhausted { attempts, last } => WorkerError::RetryExhausted {
                attempts,
                last: Box::new(last),
            },
            RetryError::InvalidConfig { max_attempts } => {
                WorkerError::InvalidRetryConfig { max_attempts }
            }
        })
    }

    fn ensure_usable(&self) -> Result<(), WorkerError> {
        match *self.lock_state() {
            ChannelState::Active(_) => Ok(()),
            ChannelState::Uninitialized => Err(WorkerError::ChannelNotInitialized),
            ChannelState::TornDown => Err(WorkerError::ChannelTornDown),
        }
    }

    /// One attempt: register, send, await the correlated response.
    async fn dispatch(&self, frame: Arc<Frame>) -> Resolution {
        let request_id = RequestId(self.next_request_id.fetch_add(1, Ordering::Relaxed));
        let (tx, rx) = oneshot::channel();

        {
            // Registration happens under the state lock so teardown either
            // sees the entry or rejects this attempt up front.
            let state = self.lock_state();
            let active = match &*state {
                ChannelState::Active(active) => active,
                ChannelState::Uninitialized => return Err(WorkerError::ChannelNotInitialized),
                ChannelState::TornDown => return Err(WorkerError::ChannelTornDown),
            };

            self.pending.insert(request_id, tx);
            if active
                .requests
                .send(WorkerRequest { request_id, frame })
                .is_err()
            {
                self.pending.remove(request_id);
                return Err(WorkerError::WorkerUnavailable);
            }
        }

        tracing::trace!(%request_id, "Dispatched offload request");

        let received = match self.response_timeout {
            Some(limit) => match tokio::time::timeout(limit, rx).await {
                Ok(received) => received,
                Err(_) => {
                    self.pending.remove(request_id);
                    return Err(WorkerError::ResponseTimeout {
                        request_id: request_id.0,
                        waited_ms: limit.as_millis() as u64,
                    });
                }
            },
            None => rx.await,
        };

        // Sender dropped without a value only happens on teardown.
        received.unwrap_or(Err(WorkerError::ChannelTornDown))
    }

    /// Destroy the execution unit and reject everything still pending.
    ///
    /// Idempotent; the channel cannot be re-initialized afterwards.
    pub fn teardown(&self) {
        let previous = std::mem::replace(&mut *self.lock_state(), ChannelState::TornDown);

        // No entry can be inserted once the state is TornDown, so everything
        // pending is rejected before the unit gets a chance to answer it.
        let rejected = self.pending.reject_all(WorkerError::ChannelTornDown);
        if rejected > 0 {
            tracing::debug!(rejected, "Rejected pending offload requests on teardown");
        }

        if let ChannelState::Active(active) = previous {
            let ActiveChannel {
                requests,
                unit,
                router,
            } = active;
            router.abort();
            drop(requests);
            unit.terminate();
            tracing::info!("Worker channel torn down");
        }
    }
}

impl Drop for WorkerChannel {
    fn drop(&mut self) {
        self.teardown();
    }
}

/// Resolve each response only for the request id it echoes.
async fn route_responses(
    mut responses: mpsc::UnboundedReceiver<WorkerResponse>,
    pending: Arc<CorrelationTable>,
) {
    while let Some(WorkerResponse {
        request_id,
        outcome,
    }) = responses.recv().await
    {
        let Some(tx) = pending.remove(request_id) else {
            tracing::warn!(%request_id, "Dropping response with no pending request");
            continue;
        };

        let resolution = match outcome {
            WorkerOutcome::Success(metrics) => Ok(metrics),
            WorkerOutcome::Failure(message) => Err(WorkerError::WorkerFailure { message }),
        };
        let _ = tx.send(resolution);
    }
}

#[cfg(test)]
mod tests;
