//! Presentation sink.
//!
//! The sink is the only outward surface of a session. It sees every update
//! after its cosmetic delay, and the fingerprint once it has been generated.
//! Updates are idempotent per key: a later update for the same key replaces
//! whatever was displayed.
//!
//! The sink has no say over aggregation. Early fingerprint generation is a
//! session setting ([`SessionConfig::finalize_on_completion`]), not something
//! an update can request.
//!
//! [`SessionConfig::finalize_on_completion`]: crate::config::SessionConfig::finalize_on_completion

use indexmap::IndexMap;
use parking_lot::Mutex;

use crate::fingerprint::FingerprintSnapshot;
use crate::signal::SignalUpdate;

/// Receives presentation updates for one session.
///
/// Both methods have no-op defaults so a sink only implements what it shows.
pub trait Sink: Send + Sync {
    /// A signal value is ready to display.
    fn notify(&self, _update: &SignalUpdate) {}

    /// The session fingerprint was generated.
    fn on_fingerprint(&self, _snapshot: &FingerprintSnapshot) {}
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl Sink for NullSink {}

/// Emits each update as a structured `tracing` event.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl Sink for TracingSink {
    fn notify(&self, update: &SignalUpdate) {
        tracing::info!(
            target: "signalprint::sink",
            key = %update.key,
            value = %update.value,
            recorded = update.recorded,
            "signal"
        );
    }

    fn on_fingerprint(&self, snapshot: &FingerprintSnapshot) {
        tracing::info!(
            target: "signalprint::sink",
            id = %snapshot.short_id,
            digest = %snapshot.digest,
            points = snapshot.point_count,
            trackable = %snapshot.trackability_score,
            "fingerprint"
        );
    }
}

#[derive(Debug, Default)]
struct Recorded {
    updates: Vec<SignalUpdate>,
    displayed: IndexMap<String, String>,
    fingerprint: Option<FingerprintSnapshot>,
}

/// Keeps every update in memory.
#[derive(Debug, Default)]
pub struct RecordingSink {
    inner: Mutex<Recorded>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every update in delivery order.
    pub fn updates(&self) -> Vec<SignalUpdate> {
        self.inner.lock().updates.clone()
    }

    /// Number of `notify` calls received.
    pub fn update_count(&self) -> usize {
        self.inner.lock().updates.len()
    }

    /// What is currently displayed for `key`.
    pub fn displayed(&self, key: &str) -> Option<String> {
        self.inner.lock().displayed.get(key).cloned()
    }

    /// Number of distinct display targets.
    pub fn target_count(&self) -> usize {
        self.inner.lock().displayed.len()
    }

    /// The fingerprint, once generated.
    pub fn fingerprint(&self) -> Option<FingerprintSnapshot> {
        self.inner.lock().fingerprint.clone()
    }
}

impl Sink for RecordingSink {
    fn notify(&self, update: &SignalUpdate) {
        let mut inner = self.inner.lock();
        inner
            .displayed
            .insert(update.key.clone(), update.value.clone());
        inner.updates.push(update.clone());
    }

    fn on_fingerprint(&self, snapshot: &FingerprintSnapshot) {
        self.inner.lock().fingerprint = Some(snapshot.clone());
    }
}
