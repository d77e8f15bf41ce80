// EventChannelManager: Centralized tokio broadcast channel management
// Single Responsibility: Event channel lifecycle and subscription

use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::broadcast;

use crate::engine::events::{ErrorEvent, FeatureEvent, MetricsEvent};

/// Default per-channel buffer (about 25 seconds of ticks at 100ms)
pub const DEFAULT_CHANNEL_CAPACITY: usize = 256;

/// Manages the features, metrics and error broadcast channels
///
/// Channels are created once by `init()` and closed once by `close()`.
/// Closing drops the senders, so subscribers drain what was already sent
/// and then observe `RecvError::Closed`; nothing published afterwards is
/// delivered.
///
/// # Notes
/// - Multiple subscribers supported via broadcast pattern
/// - Old messages dropped if a subscriber lags behind the buffer
pub struct EventChannelManager {
    capacity: usize,
    features: Mutex<Option<broadcast::Sender<FeatureEvent>>>,
    metrics: Mutex<Option<broadcast::Sender<MetricsEvent>>>,
    errors: Mutex<Option<broadcast::Sender<ErrorEvent>>>,
}

fn lock<T>(slot: &Mutex<T>) -> MutexGuard<'_, T> {
    slot.lock().unwrap_or_else(PoisonError::into_inner)
}

fn subscribe<T: Clone>(slot: &Mutex<Option<broadcast::Sender<T>>>) -> Option<broadcast::Receiver<T>> {
    lock(slot).as_ref().map(|tx| tx.subscribe())
}

/// Returns the number of receivers reached; 0 when closed or unobserved.
fn publish<T: Clone>(slot: &Mutex<Option<broadcast::Sender<T>>>, event: T) -> usize {
    lock(slot)
        .as_ref()
        .and_then(|tx| tx.send(event).ok())
        .unwrap_or(0)
}

impl EventChannelManager {
    /// Create a manager with all channels uninitialized
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            features: Mutex::new(None),
            metrics: Mutex::new(None),
            errors: Mutex::new(None),
        }
    }

    /// Create all three channels. Existing channels are kept.
    pub fn init(&self) {
        let capacity = self.capacity;
        lock(&self.features).get_or_insert_with(|| broadcast::channel(capacity).0);
        lock(&self.metrics).get_or_insert_with(|| broadcast::channel(capacity).0);
        lock(&self.errors).get_or_insert_with(|| broadcast::channel(capacity).0);
    }

    /// Drop every sender. Idempotent.
    pub fn close(&self) {
        lock(&self.features).take();
        lock(&self.metrics).take();
        lock(&self.errors).take();
        log::debug!("[EventChannelManager] Event channels closed");
    }

    pub fn is_open(&self) -> bool {
        lock(&self.features).is_some()
    }

    // ========================================================================
    // FEATURES CHANNEL
    // ========================================================================

    /// Subscribe to per-tick features
    ///
    /// Returns None if the channels were never initialized or are closed.
    pub fn subscribe_features(&self) -> Option<broadcast::Receiver<FeatureEvent>> {
        subscribe(&self.features)
    }

    pub fn publish_features(&self, event: FeatureEvent) -> usize {
        publish(&self.features, event)
    }

    // ========================================================================
    // METRICS CHANNEL
    // ========================================================================

    pub fn subscribe_metrics(&self) -> Option<broadcast::Receiver<MetricsEvent>> {
        subscribe(&self.metrics)
    }

    pub fn publish_metrics(&self, event: MetricsEvent) -> usize {
        publish(&self.metrics, event)
    }

    // ========================================================================
    // ERROR CHANNEL
    // ========================================================================

    pub fn subscribe_errors(&self) -> Option<broadcast::Receiver<ErrorEvent>> {
        subscribe(&self.errors)
    }

    pub fn publish_error(&self, event: ErrorEvent) -> usize {
        publish(&self.errors, event)
    }
}

impl Default for EventChannelManager {
    fn default() -> Self {
        Self::new()
    }
}
