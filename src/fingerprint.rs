//! Fingerprint generation.
//!
//! The generator runs once per session. It serializes whatever the store holds
//! at that instant, digests it, and freezes the result into a
//! [`FingerprintSnapshot`]. Writes that land afterwards change the store but
//! never the snapshot.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::aggregator::Aggregator;
use crate::hasher::digest;
use crate::store::{ResultStore, SerializationOrder};

/// Length of the short identifier.
pub const SHORT_ID_LEN: usize = 8;

/// The one-time identifier bundle of a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FingerprintSnapshot {
    /// Hash input: the store as a flat JSON object.
    pub serialized_form: String,
    /// Full digest, uppercase hex.
    pub digest: String,
    /// First eight characters of the digest, uppercase.
    pub short_id: String,
    pub trackability_score: String,
    /// Sink updates delivered before generation. Not the number of store keys.
    pub point_count: u64,
    /// Distinct store keys at generation time.
    pub record_count: usize,
    pub generated_at: DateTime<Utc>,
}

/// Derives a [`FingerprintSnapshot`] from a session's store.
#[derive(Debug, Clone)]
pub struct FingerprintGenerator {
    order: SerializationOrder,
    trackability_score: String,
}

impl FingerprintGenerator {
    pub fn new(order: SerializationOrder, trackability_score: impl Into<String>) -> Self {
        Self {
            order,
            trackability_score: trackability_score.into(),
        }
    }

    /// Snapshot the aggregator's current store and point count.
    pub fn generate(&self, aggregator: &Aggregator) -> FingerprintSnapshot {
        let points = aggregator.points();
        let snapshot = aggregator.with_store(|store| self.from_store(store, points));
        tracing::info!(
            session = %aggregator.session_id(),
            id = %snapshot.short_id,
            records = snapshot.record_count,
            points = snapshot.point_count,
            elapsed_ms = aggregator.elapsed().as_millis() as u64,
            "fingerprint generated"
        );
        snapshot
    }

    /// Build a snapshot from a store and an externally tracked point count.
    pub fn from_store(&self, store: &ResultStore, point_count: u64) -> FingerprintSnapshot {
        let serialized_form = store.canonical(self.order);
        let digest = digest(&serialized_form).to_uppercase();
        let short_id = digest.chars().take(SHORT_ID_LEN).collect();

        FingerprintSnapshot {
            serialized_form,
            digest,
            short_id,
            trackability_score: self.trackability_score.clone(),
            point_count,
            record_count: store.len(),
            generated_at: Utc::now(),
        }
    }
}

impl Default for FingerprintGenerator {
    fn default() -> Self {
        Self::new(SerializationOrder::Completion, "99.9%")
    }
}
