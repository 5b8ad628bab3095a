//! The signal source abstraction.
//!
//! A source reads one or more facts from the host and reports them through a
//! [`Collector`]. Sources never return errors: every failure is converted into
//! a [`Placeholder`](super::Placeholder) before it is reported.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;

use crate::aggregator::Collector;
use crate::host::Host;

/// Execution shape of a source. The orchestrator logs it and flags sources
/// that run past [`bound`](Self::bound).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceShape {
    /// Reads a property and returns without suspending.
    Synchronous,
    /// Awaits one or more dependent asynchronous calls.
    Async,
    /// Waits for a one-shot event, with a fallback timer.
    Event { fallback: Duration },
    /// Races a real result against a deadline sentinel.
    Race { bound: Duration },
}

impl SourceShape {
    /// Upper bound on the time this shape may suspend, if it declares one.
    pub fn bound(&self) -> Option<Duration> {
        match self {
            SourceShape::Event { fallback } => Some(*fallback),
            SourceShape::Race { bound } => Some(*bound),
            SourceShape::Synchronous => Some(Duration::ZERO),
            SourceShape::Async => None,
        }
    }
}

impl fmt::Display for SourceShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceShape::Synchronous => write!(f, "sync"),
            SourceShape::Async => write!(f, "async"),
            SourceShape::Event { fallback } => write!(f, "event({}ms)", fallback.as_millis()),
            SourceShape::Race { bound } => write!(f, "race({}ms)", bound.as_millis()),
        }
    }
}

/// A single probe.
///
/// Implementors report every key listed in [`keys`](Self::keys), using a
/// placeholder when the underlying read fails. If a source panics, the
/// orchestrator fills the keys it did not report with
/// [`Placeholder::NotAvailable`](super::Placeholder::NotAvailable).
#[async_trait]
pub trait SignalSource: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &str;

    /// Execution shape.
    fn shape(&self) -> SourceShape;

    /// Keys this source reports, recorded or display-only.
    fn keys(&self) -> &[&'static str];

    /// How long after session start the source is launched.
    fn start_delay(&self) -> Duration {
        Duration::ZERO
    }

    /// Collect and report.
    async fn collect(&self, host: &dyn Host, out: &Collector);
}

/// Reads a host property and formats it, without suspending.
pub type ReadFn = fn(&dyn Host) -> String;

/// A synchronous source built from a plain read function.
///
/// Most host properties are one-line reads; this keeps them out of the trait
/// boilerplate.
pub struct InstantSource {
    keys: [&'static str; 1],
    read: ReadFn,
}

impl InstantSource {
    /// Create a source that records `read(host)` under `key`.
    pub const fn new(key: &'static str, read: ReadFn) -> Self {
        Self { keys: [key], read }
    }
}

impl fmt::Debug for InstantSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "InstantSource({})", self.keys[0])
    }
}

#[async_trait]
impl SignalSource for InstantSource {
    fn name(&self) -> &str {
        self.keys[0]
    }

    fn shape(&self) -> SourceShape {
        SourceShape::Synchronous
    }

    fn keys(&self) -> &[&'static str] {
        &self.keys
    }

    async fn collect(&self, host: &dyn Host, out: &Collector) {
        out.record(self.keys[0], (self.read)(host));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shape_bounds() {
        assert_eq!(
            SourceShape::Race { bound: Duration::from_millis(200) }.bound(),
            Some(Duration::from_millis(200))
        );
        assert_eq!(SourceShape::Async.bound(), None);
        assert_eq!(SourceShape::Synchronous.to_string(), "sync");
        assert_eq!(
            SourceShape::Event { fallback: Duration::from_secs(1) }.to_string(),
            "event(1000ms)"
        );
    }
}
