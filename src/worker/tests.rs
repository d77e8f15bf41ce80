use super::*;
use crate::analysis::metrics::compute_metrics;
use crate::retry::RetryConfig;
use std::future::Future;
use std::sync::atomic::AtomicUsize;
use tokio::time::Instant;

/// Backend hosting a scripted execution unit on a tokio task.
struct TaskBackend<F> {
    spawned: AtomicUsize,
    script: F,
}

impl<F> TaskBackend<F> {
    fn new(script: F) -> Self {
        Self {
            spawned: AtomicUsize::new(0),
            script,
        }
    }

    fn spawned(&self) -> usize {
        self.spawned.load(Ordering::SeqCst)
    }
}

impl<F, Fut> OffloadBackend for TaskBackend<F>
where
    F: Fn(WorkerLink) -> Fut + Send + Sync,
    Fut: Future<Output = ()> + Send + 'static,
{
    fn spawn(&self, link: WorkerLink) -> Result<Box<dyn ExecutionUnit>, WorkerError> {
        self.spawned.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(TaskUnit(tokio::spawn((self.script)(link)))))
    }
}

struct TaskUnit(JoinHandle<()>);

impl ExecutionUnit for TaskUnit {
    fn terminate(self: Box<Self>) {
        self.0.abort();
    }
}

fn metrics_for(frame: &Frame) -> OffloadMetrics {
    compute_metrics(frame, 44_100).unwrap()
}

fn frame_with_level(level: f32) -> Arc<Frame> {
    Arc::new(Frame::new(vec![level; 32], vec![1.0; 16]))
}

async fn echo_worker(mut link: WorkerLink) {
    while let Some(request) = link.requests.recv().await {
        let metrics = metrics_for(&request.frame);
        let _ = link
            .responses
            .send(WorkerResponse::success(request.request_id, metrics));
    }
}

async fn silent_worker(mut link: WorkerLink) {
    while link.requests.recv().await.is_some() {}
}

async fn reverse_pairs_worker(mut link: WorkerLink) {
    loop {
        let Some(first) = link.requests.recv().await else {
            break;
        };
        let Some(second) = link.requests.recv().await else {
            break;
        };
        for request in [second, first] {
            let metrics = metrics_for(&request.frame);
            let _ = link
                .responses
                .send(WorkerResponse::success(request.request_id, metrics));
        }
    }
}

fn channel_with<B: OffloadBackend + 'static>(backend: Arc<B>, retry: RetryConfig) -> WorkerChannel {
    WorkerChannel::new(backend, Arc::new(retry))
}

#[tokio::test]
async fn process_before_initialize_fails_immediately() {
    let backend = Arc::new(TaskBackend::new(echo_worker));
    let channel = channel_with(backend.clone(), RetryConfig::default());

    let result = channel.process(frame_with_level(0.5)).await;

    assert_eq!(result, Err(WorkerError::ChannelNotInitialized));
    assert_eq!(backend.spawned(), 0);
}

#[tokio::test]
async fn initialize_twice_creates_one_unit() {
    let backend = Arc::new(TaskBackend::new(echo_worker));
    let channel = channel_with(backend.clone(), RetryConfig::default());

    channel.initialize().unwrap();
    channel.initialize().unwrap();

    assert_eq!(backend.spawned(), 1);
    assert!(channel.is_active());
}

#[tokio::test]
async fn process_resolves_with_metrics() {
    let backend = Arc::new(TaskBackend::new(echo_worker));
    let channel = channel_with(backend, RetryConfig::default());
    channel.initialize().unwrap();

    let frame = frame_with_level(0.5);
    let metrics = channel.process(Arc::clone(&frame)).await.unwrap();

    assert_eq!(metrics, metrics_for(&frame));
    assert_eq!(channel.pending_requests(), 0);
}

#[tokio::test]
async fn concurrent_requests_resolve_with_their_own_responses() {
    let backend = Arc::new(TaskBackend::new(reverse_pairs_worker));
    let channel = channel_with(backend, RetryConfig::default());
    channel.initialize().unwrap();

    let quiet = frame_with_level(0.1);
    let loud = frame_with_level(0.8);
    let (quiet_result, loud_result) = tokio::join!(
        channel.process(Arc::clone(&quiet)),
        channel.process(Arc::clone(&loud))
    );

    let quiet_metrics = quiet_result.unwrap();
    let loud_metrics = loud_result.unwrap();
    assert_eq!(quiet_metrics, metrics_for(&quiet));
    assert_eq!(loud_metrics, metrics_for(&loud));
    assert!((quiet_metrics.energy - 0.01).abs() < 1e-6);
    assert!((loud_metrics.energy - 0.64).abs() < 1e-6);
}

#[tokio::test]
async fn process_after_teardown_fails() {
    let backend = Arc::new(TaskBackend::new(echo_worker));
    let channel = channel_with(backend.clone(), RetryConfig::default());
    channel.initialize().unwrap();

    channel.teardown();
    channel.teardown();

    assert!(!channel.is_active());
    assert_eq!(
        channel.process(frame_with_level(0.5)).await,
        Err(WorkerError::ChannelTornDown)
    );
    assert_eq!(channel.initialize(), Err(WorkerError::ChannelTornDown));
    assert_eq!(backend.spawned(), 1);
}

#[tokio::test]
async fn teardown_without_initialize_blocks_later_use() {
    let backend = Arc::new(TaskBackend::new(echo_worker));
    let channel = channel_with(backend.clone(), RetryConfig::default());

    channel.teardown();

    assert_eq!(
        channel.process(frame_with_level(0.5)).await,
        Err(WorkerError::ChannelTornDown)
    );
    assert_eq!(backend.spawned(), 0);
}

#[tokio::test]
async fn teardown_rejects_pending_requests() {
    let backend = Arc::new(TaskBackend::new(silent_worker));
    let channel = Arc::new(channel_with(backend, RetryConfig::default()));
    channel.initialize().unwrap();

    let in_flight = tokio::spawn({
        let channel = Arc::clone(&channel);
        async move { channel.process(frame_with_level(0.3)).await }
    });

    while channel.pending_requests() == 0 {
        tokio::task::yield_now().await;
    }

    channel.teardown();

    let result = in_flight.await.unwrap();
    assert_eq!(result, Err(WorkerError::ChannelTornDown));
    assert_eq!(channel.pending_requests(), 0);
}

/// Thread-hosted unit that answers every queued request after a delay and
/// joins on terminate, like `ThreadBackend`.
struct SlowThreadBackend {
    delay: Duration,
}

struct JoinedUnit(Option<std::thread::JoinHandle<()>>);

impl ExecutionUnit for JoinedUnit {
    fn terminate(mut self: Box<Self>) {
        if let Some(handle) = self.0.take() {
            handle.join().unwrap();
        }
    }
}

impl OffloadBackend for SlowThreadBackend {
    fn spawn(&self, mut link: WorkerLink) -> Result<Box<dyn ExecutionUnit>, WorkerError> {
        let delay = self.delay;
        let handle = std::thread::spawn(move || {
            while let Some(request) = link.requests.blocking_recv() {
                std::thread::sleep(delay);
                let metrics = metrics_for(&request.frame);
                let _ = link
                    .responses
                    .send(WorkerResponse::success(request.request_id, metrics));
            }
        });
        Ok(Box::new(JoinedUnit(Some(handle))))
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn teardown_rejects_requests_the_unit_is_still_answering() {
    let backend = Arc::new(SlowThreadBackend {
        delay: Duration::from_millis(100),
    });
    let channel = Arc::new(channel_with(
        backend,
        RetryConfig::new(1, Duration::from_millis(1)),
    ));
    channel.initialize().unwrap();

    let in_flight = tokio::spawn({
        let channel = Arc::clone(&channel);
        async move { channel.process(frame_with_level(0.3)).await }
    });

    while channel.pending_requests() == 0 {
        tokio::task::yield_now().await;
    }

    channel.teardown();

    let result = in_flight.await.unwrap();
    assert_eq!(result, Err(WorkerError::ChannelTornDown));
    assert_eq!(channel.pending_requests(), 0);
    assert!(!channel.is_active());
}

#[tokio::test(start_paused = true)]
async fn transient_failures_are_resent_with_fresh_ids() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let backend = Arc::new(TaskBackend::new({
        let seen = Arc::clone(&seen);
        move |mut link: WorkerLink| {
            let seen = Arc::clone(&seen);
            async move {
                while let Some(request) = link.requests.recv().await {
                    let attempt = {
                        let mut seen = seen.lock().unwrap();
                        seen.push(request.request_id);
                        seen.len()
                    };
                    let response = if attempt <= 2 {
                        WorkerResponse::failure(request.request_id, "busy")
                    } else {
                        WorkerResponse::success(request.request_id, metrics_for(&request.frame))
                    };
                    let _ = link.responses.send(response);
                }
            }
        }
    }));
    let delay = Duration::from_millis(500);
    let channel = channel_with(backend, RetryConfig::new(3, delay));
    channel.initialize().unwrap();

    let started = Instant::now();
    let result = channel.process(frame_with_level(0.5)).await;

    assert!(result.is_ok());
    assert_eq!(started.elapsed(), delay * 2);
    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 3);
    assert!(seen[0] != seen[1] && seen[1] != seen[2] && seen[0] != seen[2]);
}

#[tokio::test(start_paused = true)]
async fn persistent_failure_exhausts_retries() {
    let backend = Arc::new(TaskBackend::new(|mut link: WorkerLink| async move {
        while let Some(request) = link.requests.recv().await {
            let _ = link
                .responses
                .send(WorkerResponse::failure(request.request_id, "decoder stalled"));
        }
    }));
    let delay = Duration::from_millis(100);
    let channel = channel_with(backend, RetryConfig::new(3, delay));
    channel.initialize().unwrap();

    let started = Instant::now();
    let result = channel.process(frame_with_level(0.5)).await;

    assert_eq!(
        result,
        Err(WorkerError::RetryExhausted {
            attempts: 3,
            last: Box::new(WorkerError::WorkerFailure {
                message: "decoder stalled".to_string()
            }),
        })
    );
    assert_eq!(started.elapsed(), delay * 2);
}

#[tokio::test(start_paused = true)]
async fn response_timeout_counts_as_failed_attempt() {
    let backend = Arc::new(TaskBackend::new(silent_worker));
    let channel = channel_with(backend, RetryConfig::new(2, Duration::from_millis(10)))
        .with_response_timeout(Some(Duration::from_millis(50)));
    channel.initialize().unwrap();

    let result = channel.process(frame_with_level(0.5)).await;

    assert_eq!(
        result,
        Err(WorkerError::RetryExhausted {
            attempts: 2,
            last: Box::new(WorkerError::ResponseTimeout {
                request_id: 2,
                waited_ms: 50
            }),
        })
    );
    assert_eq!(channel.pending_requests(), 0);
}

#[tokio::test]
async fn responses_for_unknown_ids_are_ignored() {
    let backend = Arc::new(TaskBackend::new(|mut link: WorkerLink| async move {
        while let Some(request) = link.requests.recv().await {
            let _ = link
                .responses
                .send(WorkerResponse::failure(RequestId(u64::MAX), "stale"));
            let _ = link.responses.send(WorkerResponse::success(
                request.request_id,
                metrics_for(&request.frame),
            ));
        }
    }));
    let channel = channel_with(backend, RetryConfig::new(1, Duration::ZERO));
    channel.initialize().unwrap();

    let frame = frame_with_level(0.25);
    assert_eq!(
        channel.process(Arc::clone(&frame)).await,
        Ok(metrics_for(&frame))
    );
}

#[tokio::test]
async fn zero_attempt_policy_is_rejected() {
    let backend = Arc::new(TaskBackend::new(echo_worker));
    let channel = channel_with(backend, RetryConfig::new(0, Duration::ZERO));
    channel.initialize().unwrap();

    assert_eq!(
        channel.process(frame_with_level(0.5)).await,
        Err(WorkerError::InvalidRetryConfig { max_attempts: 0 })
    );
}

#[test]
fn initialize_outside_runtime_fails() {
    let backend = Arc::new(TaskBackend::new(echo_worker));
    let channel = channel_with(backend.clone(), RetryConfig::default());

    assert_eq!(channel.initialize(), Err(WorkerError::RuntimeUnavailable));
    assert_eq!(backend.spawned(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn thread_backend_round_trip() {
    let channel = WorkerChannel::new(
        Arc::new(ThreadBackend::new(44_100)),
        Arc::new(RetryConfig::new(2, Duration::from_millis(5))),
    )
    .with_response_timeout(Some(Duration::from_secs(5)));
    channel.initialize().unwrap();

    let frame = frame_with_level(0.5);
    let metrics = channel.process(Arc::clone(&frame)).await.unwrap();
    assert_eq!(metrics, metrics_for(&frame));

    let empty = channel.process(Arc::new(Frame::default())).await;
    assert!(matches!(
        empty,
        Err(WorkerError::RetryExhausted { attempts: 2, .. })
    ));

    channel.teardown();
    assert_eq!(
        channel.process(frame).await,
        Err(WorkerError::ChannelTornDown)
    );
}
