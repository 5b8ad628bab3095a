//! # signalprint
//!
//! Host signal collection and fingerprint aggregation.
//!
//! A session launches every registered [`SignalSource`] at once on a single
//! task. Each source reports its findings through a [`Collector`] into a
//! per-session [`Aggregator`]; at a fixed deadline the [`FingerprintGenerator`]
//! serializes whatever has accumulated, digests it and freezes the result into
//! a [`FingerprintSnapshot`]. A [`Sink`] receives every update after a
//! randomized cosmetic delay, and the fingerprint once.
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use signalprint::{Orchestrator, SessionConfig, SystemHost, TracingSink};
//!
//! # async fn demo() -> anyhow::Result<()> {
//! let orchestrator = Orchestrator::with_default_sources(SessionConfig::from_env()?)?;
//! let report = orchestrator.run(&SystemHost::new(), Arc::new(TracingSink)).await;
//! println!("{}", report.snapshot.short_id);
//! # Ok(())
//! # }
//! ```

pub mod aggregator;
pub mod config;
pub mod error;
pub mod fingerprint;
pub mod hasher;
pub mod host;
pub mod orchestrator;
pub mod policy;
pub mod probes;
pub mod providers;
pub mod signal;
pub mod sink;
pub mod store;

pub use aggregator::{Aggregator, Collector};
pub use config::{CosmeticDelay, SessionConfig};
pub use error::{ConfigError, FailureKind, ProbeError};
pub use fingerprint::{FingerprintGenerator, FingerprintSnapshot};
pub use hasher::digest;
pub use host::{
    DeviceInventory, EventChannel, Host, ManualEvent, StaticHost, Subscription, SystemHost,
};
pub use orchestrator::{Orchestrator, SessionReport};
pub use policy::{Raced, TimeoutPolicy};
pub use signal::{InstantSource, Placeholder, SignalRecord, SignalSource, SignalUpdate, SourceShape};
pub use sink::{NullSink, RecordingSink, Sink, TracingSink};
pub use store::{ResultStore, SerializationOrder};
