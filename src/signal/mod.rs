//! Signal data types shared by sources, the store and the sink.

pub mod source;

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{FailureKind, ProbeError};

pub use source::{InstantSource, ReadFn, SignalSource, SourceShape};

// ---------------------------------------------------------------------------
// SignalRecord
// ---------------------------------------------------------------------------

/// One collected fact about the host.
///
/// Created once per probe completion, successful or not, and never mutated.
/// A later write to the same key replaces the whole record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignalRecord {
    /// Store key, e.g. `"timezone"`.
    pub key: String,
    /// Displayable value or a placeholder sentinel.
    pub value: String,
    /// Wall-clock time of completion.
    pub collected_at: DateTime<Utc>,
    /// Time since session start, measured on the runtime clock.
    #[serde(with = "duration_millis")]
    pub offset: Duration,
}

impl SignalRecord {
    /// Create a record stamped with the current wall-clock time.
    pub fn new(key: impl Into<String>, value: impl Into<String>, offset: Duration) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            collected_at: Utc::now(),
            offset,
        }
    }

    /// Whether the value is one of the [`Placeholder`] sentinels.
    pub fn is_placeholder(&self) -> bool {
        Placeholder::parse(&self.value).is_some()
    }
}

// ---------------------------------------------------------------------------
// SignalUpdate
// ---------------------------------------------------------------------------

/// A presentation update handed to the [`Sink`](crate::sink::Sink).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignalUpdate {
    /// Display target; usually equal to the store key.
    pub key: String,
    /// Text to display.
    pub value: String,
    /// Whether the same pair was also written to the result store.
    pub recorded: bool,
}

// ---------------------------------------------------------------------------
// Placeholder
// ---------------------------------------------------------------------------

/// Sentinel values written in place of a failed probe's result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Placeholder {
    NotAvailable,
    NotSupported,
    PermissionDenied,
    Timeout,
    Unreachable,
    NotTestable,
    NotDetected,
    Error,
}

impl Placeholder {
    const ALL: [Placeholder; 8] = [
        Placeholder::NotAvailable,
        Placeholder::NotSupported,
        Placeholder::PermissionDenied,
        Placeholder::Timeout,
        Placeholder::Unreachable,
        Placeholder::NotTestable,
        Placeholder::NotDetected,
        Placeholder::Error,
    ];

    /// The displayable sentinel string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Placeholder::NotAvailable => "not available",
            Placeholder::NotSupported => "not supported",
            Placeholder::PermissionDenied => "permission denied",
            Placeholder::Timeout => "timeout",
            Placeholder::Unreachable => "unreachable",
            Placeholder::NotTestable => "not testable",
            Placeholder::NotDetected => "not detected",
            Placeholder::Error => "error",
        }
    }

    /// Recognise a sentinel string.
    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.as_str() == value)
    }

    /// Default placeholder for a failure class.
    pub fn for_kind(kind: FailureKind) -> Self {
        match kind {
            FailureKind::Unavailable => Placeholder::NotSupported,
            FailureKind::PermissionDenied => Placeholder::PermissionDenied,
            FailureKind::Timeout => Placeholder::Timeout,
            FailureKind::Transient => Placeholder::NotAvailable,
        }
    }

    /// Default placeholder for a provider error.
    pub fn for_error(err: &ProbeError) -> Self {
        Self::for_kind(err.kind())
    }
}

impl fmt::Display for Placeholder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<Placeholder> for String {
    fn from(p: Placeholder) -> Self {
        p.as_str().to_string()
    }
}

mod duration_millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_placeholder_round_trip() {
        for p in Placeholder::ALL {
            assert_eq!(Placeholder::parse(p.as_str()), Some(p));
        }
        assert_eq!(Placeholder::parse("Europe/Paris"), None);
    }

    #[test]
    fn test_placeholder_for_error() {
        let err = ProbeError::PermissionDenied("clipboard".into());
        assert_eq!(Placeholder::for_error(&err), Placeholder::PermissionDenied);
        assert_eq!(
            Placeholder::for_kind(FailureKind::Unavailable).as_str(),
            "not supported"
        );
    }

    #[test]
    fn test_record_flags_placeholder() {
        let ok = SignalRecord::new("cpu", "8", Duration::ZERO);
        let failed = SignalRecord::new("ram", Placeholder::NotAvailable, Duration::ZERO);
        assert!(!ok.is_placeholder());
        assert!(failed.is_placeholder());
    }

    #[test]
    fn test_record_serializes_offset_as_millis() {
        let record = SignalRecord::new("cpu", "8", Duration::from_millis(1500));
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["offset"], 1500);
        assert_eq!(json["key"], "cpu");
    }
}
