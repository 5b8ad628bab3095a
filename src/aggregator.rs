//! Per-session shared state.
//!
//! An [`Aggregator`] owns the result store and the update counter for exactly
//! one session. Sources never touch it directly: each gets a [`Collector`]
//! scoped to its name, which writes the store and queues the matching sink
//! update in a single call.
//!
//! All sources of a session are polled on one task, so the store lock is never
//! contended and never held across a suspension point; each write is complete
//! before the next source gets to run.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc::UnboundedSender;
use tokio::time::Instant;
use uuid::Uuid;

use crate::signal::{Placeholder, SignalRecord, SignalUpdate};
use crate::store::ResultStore;

/// Shared state for one collection session.
#[derive(Debug)]
pub struct Aggregator {
    session_id: Uuid,
    started: Instant,
    store: Mutex<ResultStore>,
    points: AtomicU64,
}

impl Aggregator {
    /// Start a new session clock with an empty store.
    pub fn new() -> Self {
        Self {
            session_id: Uuid::new_v4(),
            started: Instant::now(),
            store: Mutex::new(ResultStore::new()),
            points: AtomicU64::new(0),
        }
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    /// Time since the session started.
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Insert a record; last write wins.
    pub fn insert(&self, record: SignalRecord) {
        let key = record.key.clone();
        if let Some(previous) = self.store.lock().insert(record) {
            tracing::debug!(%key, previous = %previous.value, "signal overwritten");
        }
    }

    /// Copy of the store as it is right now.
    pub fn store(&self) -> ResultStore {
        self.store.lock().clone()
    }

    /// Run `f` against the store without copying it.
    pub fn with_store<R>(&self, f: impl FnOnce(&ResultStore) -> R) -> R {
        f(&self.store.lock())
    }

    /// Count one delivered sink update.
    pub fn count_point(&self) -> u64 {
        self.points.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Sink updates delivered so far.
    pub fn points(&self) -> u64 {
        self.points.load(Ordering::SeqCst)
    }
}

impl Default for Aggregator {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Collector
// ---------------------------------------------------------------------------

/// Reporting handle given to one signal source.
#[derive(Debug)]
pub struct Collector {
    source: String,
    aggregator: Arc<Aggregator>,
    updates: UnboundedSender<SignalUpdate>,
    reported: Mutex<Vec<String>>,
}

impl Collector {
    pub fn new(
        source: impl Into<String>,
        aggregator: Arc<Aggregator>,
        updates: UnboundedSender<SignalUpdate>,
    ) -> Self {
        Self {
            source: source.into(),
            aggregator,
            updates,
            reported: Mutex::new(Vec::new()),
        }
    }

    /// Write `(key, value)` into the store and queue the same pair for the
    /// sink.
    pub fn record(&self, key: &str, value: impl Into<String>) {
        let value = value.into();
        let record = SignalRecord::new(key, value.clone(), self.aggregator.elapsed());
        tracing::debug!(
            source = %self.source,
            %key,
            %value,
            offset_ms = record.offset.as_millis() as u64,
            "signal recorded"
        );
        self.aggregator.insert(record);
        self.push(key, value, true);
    }

    /// Write `stored` into the store but show `shown` to the sink.
    pub fn record_shown(&self, key: &str, stored: impl Into<String>, shown: impl Into<String>) {
        let record = SignalRecord::new(key, stored, self.aggregator.elapsed());
        tracing::debug!(source = %self.source, %key, value = %record.value, "signal recorded");
        self.aggregator.insert(record);
        self.push(key, shown.into(), true);
    }

    /// Queue a sink update without touching the store.
    pub fn display(&self, key: &str, value: impl Into<String>) {
        self.push(key, value.into(), false);
    }

    /// Record a placeholder for `key`.
    pub fn fail(&self, key: &str, placeholder: Placeholder) {
        tracing::warn!(source = %self.source, %key, placeholder = %placeholder, "signal unavailable");
        self.record(key, placeholder);
    }

    /// Display a placeholder for `key` without recording it.
    pub fn fail_display(&self, key: &str, placeholder: Placeholder) {
        tracing::warn!(source = %self.source, %key, placeholder = %placeholder, "signal unavailable");
        self.display(key, placeholder);
    }

    /// Whether `key` has been reported through this collector.
    pub fn has_reported(&self, key: &str) -> bool {
        self.reported.lock().iter().any(|k| k == key)
    }

    fn push(&self, key: &str, value: String, recorded: bool) {
        self.reported.lock().push(key.to_string());
        let update = SignalUpdate {
            key: key.to_string(),
            value,
            recorded,
        };
        if self.updates.send(update).is_err() {
            tracing::trace!(source = %self.source, %key, "presenter closed; update dropped");
        }
    }
}

#[cfg(test)]
mod tests {
    use tokio::sync::mpsc;

    use super::*;

    #[test]
    fn test_record_writes_store_and_queues_update() {
        let aggregator = Arc::new(Aggregator::new());
        let (tx, mut rx) = mpsc::unbounded_channel();
        let collector = Collector::new("cpu", Arc::clone(&aggregator), tx);

        collector.record("cpu", "8");

        assert_eq!(aggregator.store().value("cpu"), Some("8"));
        let update = rx.try_recv().unwrap();
        assert_eq!(update.key, "cpu");
        assert!(update.recorded);
        assert!(collector.has_reported("cpu"));
    }

    #[test]
    fn test_display_skips_store() {
        let aggregator = Arc::new(Aggregator::new());
        let (tx, mut rx) = mpsc::unbounded_channel();
        let collector = Collector::new("ip", Arc::clone(&aggregator), tx);

        collector.display("ipv6", "no");

        assert!(aggregator.store().is_empty());
        assert!(!rx.try_recv().unwrap().recorded);
    }

    #[test]
    fn test_record_shown_splits_store_and_display() {
        let aggregator = Arc::new(Aggregator::new());
        let (tx, mut rx) = mpsc::unbounded_channel();
        let collector = Collector::new("audio", Arc::clone(&aggregator), tx);

        collector.record_shown("audio-fp", "1a2b3c4d5e6f7", "1a2b3c4d5e6f...");

        assert_eq!(aggregator.store().value("audio-fp"), Some("1a2b3c4d5e6f7"));
        assert_eq!(rx.try_recv().unwrap().value, "1a2b3c4d5e6f...");
    }

    #[test]
    fn test_fail_records_placeholder() {
        let aggregator = Arc::new(Aggregator::new());
        let (tx, _rx) = mpsc::unbounded_channel();
        let collector = Collector::new("ram", Arc::clone(&aggregator), tx);

        collector.fail("ram", Placeholder::NotAvailable);

        let record = aggregator.store().get("ram").cloned().unwrap();
        assert!(record.is_placeholder());
    }

    #[test]
    fn test_closed_presenter_still_records() {
        let aggregator = Arc::new(Aggregator::new());
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        let collector = Collector::new("os", Arc::clone(&aggregator), tx);

        collector.record("os", "linux");
        assert_eq!(aggregator.store().len(), 1);
    }

    #[test]
    fn test_point_counter() {
        let aggregator = Aggregator::new();
        assert_eq!(aggregator.points(), 0);
        assert_eq!(aggregator.count_point(), 1);
        assert_eq!(aggregator.count_point(), 2);
        assert_eq!(aggregator.points(), 2);
    }
}
