//! Capture and playback device inventory.

use async_trait::async_trait;

use crate::aggregator::Collector;
use crate::host::Host;
use crate::signal::{Placeholder, SignalSource, SourceShape};

const KEYS: [&str; 3] = ["cameras", "microphones", "speakers"];

/// Counts cameras, microphones and speakers in one enumeration.
///
/// A refused or unsupported enumeration puts the same placeholder on all
/// three keys.
#[derive(Debug, Clone, Copy, Default)]
pub struct MediaDevicesSource;

fn count(n: usize) -> String {
    match n {
        0 => "none".to_string(),
        n => format!("{n} detected"),
    }
}

#[async_trait]
impl SignalSource for MediaDevicesSource {
    fn name(&self) -> &str {
        "media-devices"
    }

    fn shape(&self) -> SourceShape {
        SourceShape::Synchronous
    }

    fn keys(&self) -> &[&'static str] {
        &KEYS
    }

    async fn collect(&self, host: &dyn Host, out: &Collector) {
        match host.media_devices() {
            Ok(inventory) => {
                out.record("cameras", count(inventory.cameras));
                out.record("microphones", count(inventory.microphones));
                out.record("speakers", count(inventory.speakers));
            }
            Err(err) => {
                tracing::debug!(error = %err, "device enumeration failed");
                let placeholder = Placeholder::for_error(&err);
                for key in KEYS {
                    out.fail(key, placeholder);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tokio::sync::mpsc;

    use super::*;
    use crate::aggregator::Aggregator;
    use crate::error::FailureKind;
    use crate::host::{DeviceInventory, StaticHost};

    async fn collect(host: &StaticHost) -> crate::store::ResultStore {
        let aggregator = Arc::new(Aggregator::new());
        let (tx, _rx) = mpsc::unbounded_channel();
        let out = Collector::new("media-devices", Arc::clone(&aggregator), tx);
        MediaDevicesSource.collect(host, &out).await;
        aggregator.store()
    }

    #[tokio::test]
    async fn test_counts_each_device_kind() {
        let host = StaticHost {
            media_devices: Some(Ok(DeviceInventory {
                cameras: 1,
                microphones: 2,
                speakers: 0,
            })),
            ..StaticHost::default()
        };
        let store = collect(&host).await;

        assert_eq!(store.keys().collect::<Vec<_>>(), KEYS.to_vec());
        assert_eq!(store.value("cameras"), Some("1 detected"));
        assert_eq!(store.value("microphones"), Some("2 detected"));
        assert_eq!(store.value("speakers"), Some("none"));
    }

    #[tokio::test]
    async fn test_permission_denied_fills_every_key() {
        let host = StaticHost {
            media_devices: Some(Err(FailureKind::PermissionDenied)),
            ..StaticHost::default()
        };
        let store = collect(&host).await;

        for key in KEYS {
            assert_eq!(store.value(key), Some("permission denied"), "{key}");
        }
    }

    #[tokio::test]
    async fn test_unsupported_enumeration() {
        let store = collect(&StaticHost::default()).await;
        for key in KEYS {
            assert_eq!(store.value(key), Some("not supported"), "{key}");
        }
    }
}
