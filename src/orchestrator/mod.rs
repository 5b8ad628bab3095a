//! Session orchestration.
//!
//! [`Orchestrator::run`] drives one collection session on the calling task:
//!
//! - every registered source starts at once (or after its declared start
//!   delay) and is polled concurrently;
//! - completions go through a per-source [`Collector`] into the store and the
//!   presenter queue;
//! - the fingerprint is generated once, at the deadline (or earlier when
//!   `finalize_on_completion` is set and every source has resolved);
//! - stragglers may keep writing until the hard stop, then they are dropped.
//!
//! No source can block or fail another: they share nothing but the
//! aggregator, panics are caught per source, and every suspension is bounded
//! by the session's hard stop.

mod presenter;

use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use futures::FutureExt;
use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{sleep, timeout};
use tracing::Instrument;
use uuid::Uuid;

use crate::aggregator::{Aggregator, Collector};
use crate::config::SessionConfig;
use crate::error::ProbeError;
use crate::fingerprint::{FingerprintGenerator, FingerprintSnapshot};
use crate::host::Host;
use crate::probes;
use crate::signal::{Placeholder, SignalSource};
use crate::sink::Sink;
use crate::store::ResultStore;

use presenter::Presenter;

/// Time a source may run past its declared bound before it is flagged.
const OVERRUN_SLACK: Duration = Duration::from_millis(50);

const PENDING: usize = 0;
const RESOLVED: usize = 1;
const OVERRAN: usize = 2;

/// Everything a finished session produced.
#[derive(Debug, Clone, Serialize)]
pub struct SessionReport {
    pub session_id: Uuid,
    /// The fingerprint, frozen at generation time.
    pub snapshot: FingerprintSnapshot,
    /// The store at session end, including writes made after the snapshot.
    pub store: ResultStore,
    /// Sink updates delivered over the whole session.
    pub points: u64,
    /// Sources that were still pending at the hard stop.
    pub abandoned: Vec<String>,
    /// Sources that resolved later than their shape's declared bound.
    pub overran: Vec<String>,
    pub elapsed_ms: u64,
}

/// Launches signal sources and aggregates their results.
pub struct Orchestrator {
    config: SessionConfig,
    sources: Vec<Arc<dyn SignalSource>>,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.sources.iter().map(|s| s.name()).collect();
        f.debug_struct("Orchestrator")
            .field("config", &self.config)
            .field("sources", &names)
            .finish()
    }
}

impl Orchestrator {
    /// An orchestrator with no sources.
    pub fn new(config: SessionConfig) -> Self {
        Self {
            config,
            sources: Vec::new(),
        }
    }

    /// An orchestrator with the full default probe catalog.
    ///
    /// Fails only if an HTTP client cannot be built.
    pub fn with_default_sources(config: SessionConfig) -> Result<Self, ProbeError> {
        let sources = probes::default_sources(&config)?;
        Ok(Self { config, sources })
    }

    /// Register a source.
    pub fn register(&mut self, source: impl SignalSource + 'static) -> &mut Self {
        self.sources.push(Arc::new(source));
        self
    }

    /// Register a shared source.
    pub fn register_shared(&mut self, source: Arc<dyn SignalSource>) -> &mut Self {
        self.sources.push(source);
        self
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Names of the registered sources, in registration order.
    pub fn source_names(&self) -> Vec<&str> {
        self.sources.iter().map(|s| s.name()).collect()
    }

    /// Run one session against `host`, reporting to `sink`.
    pub async fn run(&self, host: &dyn Host, sink: Arc<dyn Sink>) -> SessionReport {
        let aggregator = Arc::new(Aggregator::new());
        let span = tracing::info_span!("session", id = %aggregator.session_id());
        self.run_session(host, sink, aggregator).instrument(span).await
    }

    async fn run_session(
        &self,
        host: &dyn Host,
        sink: Arc<dyn Sink>,
        aggregator: Arc<Aggregator>,
    ) -> SessionReport {
        let config = &self.config;
        let sources = &self.sources;
        tracing::info!(
            sources = sources.len(),
            deadline_ms = config.deadline.as_millis() as u64,
            "session started"
        );

        let (updates_tx, updates_rx) = mpsc::unbounded_channel();
        let (resolved_tx, resolved_rx) = oneshot::channel::<()>();
        let collectors: Vec<Collector> = sources
            .iter()
            .map(|s| Collector::new(s.name(), Arc::clone(&aggregator), updates_tx.clone()))
            .collect();
        drop(updates_tx);

        let presenter = Presenter::new(
            updates_rx,
            Arc::clone(&sink),
            Arc::clone(&aggregator),
            config.cosmetic_delay,
        );
        let generator =
            FingerprintGenerator::new(config.serialization, config.trackability_score.clone());

        let collecting = async move {
            let states: Vec<AtomicUsize> =
                sources.iter().map(|_| AtomicUsize::new(PENDING)).collect();
            let runs = sources
                .iter()
                .zip(&collectors)
                .zip(&states)
                .map(|((source, out), state)| async move {
                    let overran = run_source(source.as_ref(), host, out).await;
                    state.store(if overran { OVERRAN } else { RESOLVED }, Ordering::SeqCst);
                });

            let outcome = timeout(config.hard_stop(), join_all(runs)).await;
            let in_state = |wanted: usize| -> Vec<String> {
                sources
                    .iter()
                    .zip(&states)
                    .filter(|(_, state)| state.load(Ordering::SeqCst) == wanted)
                    .map(|(source, _)| source.name().to_string())
                    .collect()
            };
            let abandoned = in_state(PENDING);
            let overran = in_state(OVERRAN);

            match outcome {
                Ok(_) => tracing::debug!("all sources resolved"),
                Err(_) => tracing::warn!(?abandoned, "hard stop reached; dropping pending sources"),
            }
            if resolved_tx.send(()).is_err() {
                tracing::trace!("snapshot already taken");
            }
            // Dropping the collectors closes the presenter queue.
            drop(collectors);
            (abandoned, overran)
        };

        let agg = Arc::clone(&aggregator);
        let snapshotting = async move {
            let deadline = sleep(config.deadline);
            if config.finalize_on_completion {
                tokio::select! {
                    _ = deadline => {}
                    _ = resolved_rx => tracing::debug!("every source resolved before the deadline"),
                }
            } else {
                deadline.await;
            }

            let snapshot = generator.generate(&agg);
            let shown =
                std::panic::catch_unwind(AssertUnwindSafe(|| sink.on_fingerprint(&snapshot)));
            if shown.is_err() {
                tracing::error!("sink panicked while displaying the fingerprint");
            }
            snapshot
        };

        let ((abandoned, overran), (), snapshot) =
            tokio::join!(collecting, presenter.run(), snapshotting);

        let report = SessionReport {
            session_id: aggregator.session_id(),
            snapshot,
            store: aggregator.store(),
            points: aggregator.points(),
            abandoned,
            overran,
            elapsed_ms: aggregator.elapsed().as_millis() as u64,
        };
        tracing::info!(
            records = report.store.len(),
            points = report.points,
            overran = report.overran.len(),
            elapsed_ms = report.elapsed_ms,
            "session finished"
        );
        report
    }
}

/// Run one source to completion, containing panics and filling any key it
/// left unreported. Returns whether it ran past its declared bound.
async fn run_source(source: &dyn SignalSource, host: &dyn Host, out: &Collector) -> bool {
    let shape = source.shape();
    let span = tracing::info_span!("signal_source", source = source.name(), shape = %shape);

    let delay = source.start_delay();
    if !delay.is_zero() {
        tracing::debug!(parent: &span, delay_ms = delay.as_millis() as u64, "delayed start");
        sleep(delay).await;
    }
    let started = tokio::time::Instant::now();

    let outcome = AssertUnwindSafe(source.collect(host, out))
        .catch_unwind()
        .instrument(span.clone())
        .await;

    let _guard = span.enter();
    let elapsed: Duration = started.elapsed();
    if outcome.is_err() {
        tracing::error!(elapsed_ms = elapsed.as_millis() as u64, "source panicked");
    } else {
        tracing::debug!(elapsed_ms = elapsed.as_millis() as u64, "source resolved");
    }

    for key in source.keys() {
        if !out.has_reported(key) {
            tracing::warn!(%key, "declared key never reported");
            out.fail(key, Placeholder::NotAvailable);
        }
    }

    match shape.bound() {
        Some(bound) if elapsed > bound + OVERRUN_SLACK => {
            tracing::warn!(
                elapsed_ms = elapsed.as_millis() as u64,
                bound_ms = bound.as_millis() as u64,
                "source overran its declared bound"
            );
            true
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;
    use crate::config::CosmeticDelay;
    use crate::host::StaticHost;
    use crate::signal::{InstantSource, SourceShape};
    use crate::sink::RecordingSink;

    struct Delayed {
        key: &'static str,
        keys: [&'static str; 1],
        after: Duration,
    }

    impl Delayed {
        fn new(key: &'static str, after_ms: u64) -> Self {
            Self {
                key,
                keys: [key],
                after: Duration::from_millis(after_ms),
            }
        }
    }

    #[async_trait]
    impl SignalSource for Delayed {
        fn name(&self) -> &str {
            self.key
        }

        fn shape(&self) -> SourceShape {
            SourceShape::Async
        }

        fn keys(&self) -> &[&'static str] {
            &self.keys
        }

        async fn collect(&self, _host: &dyn Host, out: &Collector) {
            sleep(self.after).await;
            out.record(self.key, format!("after {}ms", self.after.as_millis()));
        }
    }

    /// Declares a race bound it does not honour.
    struct Unbounded;

    #[async_trait]
    impl SignalSource for Unbounded {
        fn name(&self) -> &str {
            "unbounded"
        }

        fn shape(&self) -> SourceShape {
            SourceShape::Race {
                bound: Duration::from_millis(100),
            }
        }

        fn keys(&self) -> &[&'static str] {
            &["unbounded"]
        }

        async fn collect(&self, _host: &dyn Host, out: &Collector) {
            sleep(Duration::from_millis(500)).await;
            out.record("unbounded", "late");
        }
    }

    struct Deferred;

    #[async_trait]
    impl SignalSource for Deferred {
        fn name(&self) -> &str {
            "deferred"
        }

        fn shape(&self) -> SourceShape {
            SourceShape::Synchronous
        }

        fn keys(&self) -> &[&'static str] {
            &["deferred"]
        }

        fn start_delay(&self) -> Duration {
            Duration::from_millis(1000)
        }

        async fn collect(&self, _host: &dyn Host, out: &Collector) {
            out.record("deferred", "settled");
        }
    }

    struct Panics;

    #[async_trait]
    impl SignalSource for Panics {
        fn name(&self) -> &str {
            "broken"
        }

        fn shape(&self) -> SourceShape {
            SourceShape::Synchronous
        }

        fn keys(&self) -> &[&'static str] {
            &["broken"]
        }

        async fn collect(&self, _host: &dyn Host, _out: &Collector) {
            panic!("probe blew up");
        }
    }

    fn quiet_config() -> SessionConfig {
        SessionConfig {
            cosmetic_delay: CosmeticDelay::none(),
            ..SessionConfig::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_snapshot_taken_at_deadline() {
        let mut orchestrator = Orchestrator::new(quiet_config());
        orchestrator
            .register(Delayed::new("early", 100))
            .register(Delayed::new("late", 4500));

        let sink = Arc::new(RecordingSink::new());
        let report = orchestrator.run(&StaticHost::default(), sink.clone()).await;

        assert_eq!(report.snapshot.serialized_form, r#"{"early":"after 100ms"}"#);
        assert_eq!(report.store.len(), 2);
        assert!(report.abandoned.is_empty());
        assert_eq!(sink.fingerprint(), Some(report.snapshot.clone()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_hard_stop_abandons_stalled_source() {
        let mut orchestrator = Orchestrator::new(quiet_config());
        orchestrator
            .register(Delayed::new("ok", 10))
            .register(Delayed::new("stalled", 60_000));

        let report = orchestrator
            .run(&StaticHost::default(), Arc::new(RecordingSink::new()))
            .await;

        assert_eq!(report.abandoned, vec!["stalled".to_string()]);
        assert!(!report.store.contains("stalled"));
        assert!(report.elapsed_ms <= 9_100);
    }

    #[tokio::test(start_paused = true)]
    async fn test_panicking_source_gets_placeholder() {
        let mut orchestrator = Orchestrator::new(quiet_config());
        orchestrator.register(Panics).register(Delayed::new("fine", 50));

        let report = orchestrator
            .run(&StaticHost::default(), Arc::new(RecordingSink::new()))
            .await;

        assert_eq!(report.store.value("broken"), Some("not available"));
        assert_eq!(report.store.value("fine"), Some("after 50ms"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_finalize_on_completion_fires_early() {
        let config = SessionConfig {
            finalize_on_completion: true,
            ..quiet_config()
        };
        let mut orchestrator = Orchestrator::new(config);
        orchestrator.register(Delayed::new("only", 300));

        let start = tokio::time::Instant::now();
        let sink = Arc::new(RecordingSink::new());
        let report = orchestrator.run(&StaticHost::default(), sink.clone()).await;

        assert_eq!(report.snapshot.record_count, 1);
        assert!(start.elapsed() < Duration::from_millis(1000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_instant_sources_resolve_immediately() {
        let mut orchestrator = Orchestrator::new(quiet_config());
        orchestrator.register(InstantSource::new("fixed", |_| "value".to_string()));

        let report = orchestrator
            .run(&StaticHost::default(), Arc::new(RecordingSink::new()))
            .await;
        assert_eq!(report.store.get("fixed").map(|r| r.offset), Some(Duration::ZERO));
    }

    #[tokio::test(start_paused = true)]
    async fn test_source_overrunning_its_bound_is_flagged() {
        let mut orchestrator = Orchestrator::new(quiet_config());
        orchestrator.register(Unbounded).register(Delayed::new("fine", 50));

        let report = orchestrator
            .run(&StaticHost::default(), Arc::new(RecordingSink::new()))
            .await;

        assert_eq!(report.overran, vec!["unbounded".to_string()]);
        assert_eq!(report.store.value("unbounded"), Some("late"));
        assert!(report.abandoned.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_delay_defers_launch() {
        let mut orchestrator = Orchestrator::new(quiet_config());
        orchestrator.register(Deferred).register(Delayed::new("prompt", 10));

        let report = orchestrator
            .run(&StaticHost::default(), Arc::new(RecordingSink::new()))
            .await;

        let deferred = report.store.get("deferred").cloned().unwrap();
        assert!(deferred.offset >= Duration::from_millis(1000));
        assert!(deferred.offset < Duration::from_millis(1010));
        assert_eq!(report.store.keys().collect::<Vec<_>>(), vec!["prompt", "deferred"]);
        // The delay is not counted against the synchronous bound.
        assert!(report.overran.is_empty());
    }
}
