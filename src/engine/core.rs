//! CaptureLoop: Idle/Recording state machine driving the analysis pipeline.
//!
//! Each tick reads one frame from the capture source, extracts features
//! synchronously and publishes them, then hands the same frame to the worker
//! channel on its own task. A slow or failing offload never delays the next
//! tick, so metrics may arrive out of tick order while features never do.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, oneshot};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::analysis::features::{FeatureExtractor, Frame};
use crate::config::{AnalyzerConfig, CaptureConfig};
use crate::engine::backend::{CaptureSettings, CaptureSource, SystemTimeSource, TimeSource};
use crate::engine::events::{ErrorEvent, FeatureEvent, MetricsEvent};
use crate::error::{
    log_capture_error, log_worker_error, CaptureError, ErrorCode, PipelineError, WorkerError,
};
use crate::managers::EventChannelManager;
use crate::worker::{ThreadBackend, WorkerChannel};

/// Floor applied to the tick interval; tokio intervals reject zero.
const MIN_TICK_INTERVAL: Duration = Duration::from_millis(1);

/// Recording lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordingState {
    Idle,
    Recording,
}

struct Session {
    generation: u64,
    /// Taken by `stop_recording`; `None` while a stop is in progress.
    stop_tx: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

#[derive(Default)]
struct Lifecycle {
    session: Option<Session>,
    generation: u64,
}

/// State shared between the public handle, the tick task and offload tasks.
struct Shared {
    lifecycle: Mutex<Lifecycle>,
    source: Mutex<Box<dyn CaptureSource>>,
    events: EventChannelManager,
    worker: Arc<WorkerChannel>,
    extractor: FeatureExtractor,
    time_source: Arc<dyn TimeSource>,
    start_instant: Instant,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// CaptureLoop orchestrates capture, feature extraction and offload.
pub struct CaptureLoop {
    config: CaptureConfig,
    shared: Arc<Shared>,
}

impl CaptureLoop {
    pub fn new(
        config: CaptureConfig,
        source: Box<dyn CaptureSource>,
        worker: Arc<WorkerChannel>,
    ) -> Self {
        Self::with_time_source(
            config,
            source,
            worker,
            Arc::new(SystemTimeSource::default()),
        )
    }

    /// Create a loop whose event timestamps come from `time_source`.
    pub fn with_time_source(
        config: CaptureConfig,
        source: Box<dyn CaptureSource>,
        worker: Arc<WorkerChannel>,
        time_source: Arc<dyn TimeSource>,
    ) -> Self {
        let events = EventChannelManager::new();
        events.init();

        let shared = Shared {
            lifecycle: Mutex::new(Lifecycle::default()),
            source: Mutex::new(source),
            events,
            worker,
            extractor: FeatureExtractor::new(config.sample_rate),
            start_instant: time_source.now(),
            time_source,
        };

        Self {
            config,
            shared: Arc::new(shared),
        }
    }

    /// Build the loop with the default thread-backed worker channel.
    pub fn from_config(config: &AnalyzerConfig, source: Box<dyn CaptureSource>) -> Self {
        let worker = WorkerChannel::new(
            Arc::new(ThreadBackend::new(config.capture.sample_rate)),
            Arc::new(config.retry),
        )
        .with_response_timeout(config.worker.response_timeout());

        Self::new(config.capture.clone(), source, Arc::new(worker))
    }

    pub fn config(&self) -> &CaptureConfig {
        &self.config
    }

    pub fn worker(&self) -> &Arc<WorkerChannel> {
        &self.shared.worker
    }

    /// Current lifecycle state. A stop in progress still reports `Recording`.
    pub fn state(&self) -> RecordingState {
        if lock(&self.shared.lifecycle).session.is_some() {
            RecordingState::Recording
        } else {
            RecordingState::Idle
        }
    }

    // ========================================================================
    // RECORDING LIFECYCLE
    // ========================================================================

    /// Idle → Recording.
    ///
    /// Initializes the worker channel (idempotent), starts the capture
    /// source with the configured settings and spawns the tick task. Must be
    /// called inside a tokio runtime.
    ///
    /// # Errors
    /// * `AlreadyRecording` if a session is active
    /// * `Worker(_)` if the worker channel cannot be initialized
    /// * `Capture(_)` if the source fails to start (also published as a
    ///   fatal error event); the loop stays Idle
    pub fn start_recording(&self) -> Result<(), PipelineError> {
        let mut lifecycle = lock(&self.shared.lifecycle);
        if lifecycle.session.is_some() {
            return Err(PipelineError::AlreadyRecording);
        }

        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|_| WorkerError::RuntimeUnavailable)?;
        self.shared.worker.initialize()?;

        let settings = CaptureSettings::from(&self.config);
        if let Err(err) = lock(&self.shared.source).start(&settings) {
            log_capture_error(&err, "start_recording");
            self.shared
                .events
                .publish_error(ErrorEvent::fatal(None, err.clone()));
            return Err(err.into());
        }

        lifecycle.generation += 1;
        let generation = lifecycle.generation;
        let (stop_tx, stop_rx) = oneshot::channel();
        let period = self.config.update_interval().max(MIN_TICK_INTERVAL);
        let task = runtime.spawn(run_session(
            Arc::clone(&self.shared),
            period,
            stop_rx,
            generation,
        ));

        lifecycle.session = Some(Session {
            generation,
            stop_tx: Some(stop_tx),
            task: Some(task),
        });
        log::info!(
            "[CaptureLoop] Recording started (session {}, interval {:?})",
            generation,
            period
        );
        Ok(())
    }

    /// Recording → Idle.
    ///
    /// Signals the tick task, waits for it to exit and stops the source.
    /// Offloads already in flight are not cancelled and still publish.
    ///
    /// # Errors
    /// * `NotRecording` if no session is active (or another stop is running)
    pub async fn stop_recording(&self) -> Result<(), PipelineError> {
        let (stop_tx, task) = {
            let mut lifecycle = lock(&self.shared.lifecycle);
            match lifecycle.session.as_mut() {
                Some(session) if session.stop_tx.is_some() => {
                    (session.stop_tx.take(), session.task.take())
                }
                _ => return Err(PipelineError::NotRecording),
            }
        };

        if let Some(stop_tx) = stop_tx {
            let _ = stop_tx.send(());
        }
        if let Some(task) = task {
            if let Err(err) = task.await {
                log::error!("[CaptureLoop] Tick task ended abnormally: {}", err);
            }
        }

        let mut lifecycle = lock(&self.shared.lifecycle);
        lock(&self.shared.source).stop();
        lifecycle.session = None;
        log::info!("[CaptureLoop] Recording stopped");
        Ok(())
    }

    /// Stop recording if needed, close every event channel, then tear down
    /// the worker channel.
    ///
    /// Subscribers observe `Closed` after draining; in-flight offloads are
    /// rejected and publish nothing. The loop cannot record again afterwards.
    pub async fn shutdown(&self) {
        if self.stop_recording().await.is_ok() {
            log::debug!("[CaptureLoop] Stopped active recording during shutdown");
        }
        self.shared.events.close();
        self.shared.worker.teardown();
        log::info!("[CaptureLoop] Shut down");
    }

    // ========================================================================
    // SUBSCRIPTIONS
    // ========================================================================

    /// Per-tick features, in tick order. `None` after shutdown.
    pub fn subscribe_features(&self) -> Option<broadcast::Receiver<FeatureEvent>> {
        self.shared.events.subscribe_features()
    }

    /// Offload outcomes, possibly out of tick order. `None` after shutdown.
    pub fn subscribe_metrics(&self) -> Option<broadcast::Receiver<MetricsEvent>> {
        self.shared.events.subscribe_metrics()
    }

    /// Warnings and fatal errors. `None` after shutdown.
    pub fn subscribe_errors(&self) -> Option<broadcast::Receiver<ErrorEvent>> {
        self.shared.events.subscribe_errors()
    }
}

impl Drop for CaptureLoop {
    fn drop(&mut self) {
        let mut lifecycle = lock(&self.shared.lifecycle);
        // Dropping the stop sender ends the tick task at its next poll.
        if lifecycle.session.take().is_some() {
            lock(&self.shared.source).stop();
        }
    }
}

async fn run_session(
    shared: Arc<Shared>,
    period: Duration,
    mut stop_rx: oneshot::Receiver<()>,
    generation: u64,
) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut tick: u64 = 0;

    loop {
        tokio::select! {
            biased;
            _ = &mut stop_rx => break,
            _ = ticker.tick() => {
                if let Err(err) = shared.run_tick(tick) {
                    shared.fail_session(generation, tick, err);
                    break;
                }
                tick += 1;
            }
        }
    }

    log::debug!(
        "[CaptureLoop] Session {} ended after {} ticks",
        generation,
        tick
    );
}

impl Shared {
    fn elapsed_ms(&self) -> u64 {
        self.time_source
            .now()
            .saturating_duration_since(self.start_instant)
            .as_millis() as u64
    }

    /// One tick. Never suspends; only a capture failure is returned.
    fn run_tick(self: &Arc<Self>, tick: u64) -> Result<(), CaptureError> {
        let frame = Arc::new(lock(&self.source).next_frame()?);

        match self.extractor.extract(&frame) {
            Ok(features) => {
                self.events.publish_features(FeatureEvent {
                    tick,
                    timestamp_ms: self.elapsed_ms(),
                    features,
                });
            }
            Err(err) => {
                log::debug!("[CaptureLoop] Tick {}: {}", tick, err);
                self.events
                    .publish_error(ErrorEvent::warning(Some(tick), err));
            }
        }

        let shared = Arc::clone(self);
        tokio::spawn(async move { shared.offload(tick, frame).await });
        Ok(())
    }

    async fn offload(&self, tick: u64, frame: Arc<Frame>) {
        match self.worker.process(frame).await {
            Ok(metrics) => {
                self.events
                    .publish_metrics(MetricsEvent::Ready { tick, metrics });
            }
            Err(err) => {
                log_worker_error(&err, "offload");
                self.events.publish_metrics(MetricsEvent::Unavailable {
                    tick,
                    reason: err.message(),
                });
                self.events
                    .publish_error(ErrorEvent::warning(Some(tick), err));
            }
        }
    }

    /// Capture failed mid-session: Recording → Idle and a fatal event.
    ///
    /// Skipped when a stop for this session is already running; that stop
    /// owns the cleanup.
    fn fail_session(&self, generation: u64, tick: u64, err: CaptureError) {
        {
            let mut lifecycle = lock(&self.lifecycle);
            let owned = lifecycle
                .session
                .as_ref()
                .is_some_and(|s| s.generation == generation && s.stop_tx.is_some());
            if !owned {
                log::debug!(
                    "[CaptureLoop] Ignoring capture failure during stop: {}",
                    err
                );
                return;
            }
            lock(&self.source).stop();
            lifecycle.session = None;
        }

        log_capture_error(&err, "capture tick");
        self.events.publish_error(ErrorEvent::fatal(Some(tick), err));
    }
}
