//! Synchronous host probes.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::aggregator::Collector;
use crate::host::Host;
use crate::signal::{InstantSource, Placeholder, SignalSource, SourceShape};

const GIB: u64 = 1024 * 1024 * 1024;

/// Every synchronous probe, in launch order.
pub fn sources() -> Vec<Arc<dyn SignalSource>> {
    vec![
        Arc::new(TimezoneSource),
        Arc::new(InstantSource::new("os", read_os)),
        Arc::new(InstantSource::new("arch", read_arch)),
        Arc::new(InstantSource::new("language", read_language)),
        Arc::new(InstantSource::new("cpu", read_cpu)),
        Arc::new(InstantSource::new("ram", read_ram)),
        Arc::new(InstantSource::new("hostname", read_hostname)),
        Arc::new(InstantSource::new("terminal", read_terminal)),
    ]
}

fn or_unavailable(value: Option<String>) -> String {
    value.unwrap_or_else(|| Placeholder::NotAvailable.into())
}

fn read_os(host: &dyn Host) -> String {
    match (host.os_name(), host.os_version()) {
        (Some(name), Some(version)) => format!("{name} ({version})"),
        (name, _) => or_unavailable(name),
    }
}

fn read_arch(host: &dyn Host) -> String {
    or_unavailable(host.arch())
}

fn read_language(host: &dyn Host) -> String {
    let languages = host.languages();
    if languages.is_empty() {
        return Placeholder::NotAvailable.into();
    }
    languages.join(", ")
}

fn read_cpu(host: &dyn Host) -> String {
    or_unavailable(host.cpu_cores().map(|n| format!("{n} cores")))
}

fn read_ram(host: &dyn Host) -> String {
    or_unavailable(host.memory_bytes().map(|bytes| format!("~{} GB", (bytes + GIB / 2) / GIB)))
}

fn read_hostname(host: &dyn Host) -> String {
    or_unavailable(host.hostname())
}

fn read_terminal(host: &dyn Host) -> String {
    or_unavailable(host.terminal())
}

/// `"UTC+2"`, `"UTC-5.5"`.
fn format_offset(minutes: i32) -> String {
    let sign = if minutes < 0 { '-' } else { '+' };
    let hours = f64::from(minutes.unsigned_abs()) / 60.0;
    format!("UTC{sign}{hours}")
}

/// Records the zone name; shows it with the current UTC offset.
#[derive(Debug, Clone, Copy)]
pub struct TimezoneSource;

#[async_trait]
impl SignalSource for TimezoneSource {
    fn name(&self) -> &str {
        "timezone"
    }

    fn shape(&self) -> SourceShape {
        SourceShape::Synchronous
    }

    fn keys(&self) -> &[&'static str] {
        &["timezone"]
    }

    async fn collect(&self, host: &dyn Host, out: &Collector) {
        match host.timezone() {
            Some(zone) => {
                let shown = format!("{zone} ({})", format_offset(host.utc_offset_minutes()));
                out.record_shown("timezone", zone, shown);
            }
            None => out.fail("timezone", Placeholder::NotAvailable),
        }
    }
}

/// `"2d 3h 14m"`, `"5m"`.
fn format_uptime(uptime: Duration) -> String {
    let minutes = uptime.as_secs() / 60;
    let (days, hours, minutes) = (minutes / 1440, minutes / 60 % 24, minutes % 60);
    match (days, hours) {
        (0, 0) => format!("{minutes}m"),
        (0, _) => format!("{hours}h {minutes}m"),
        _ => format!("{days}d {hours}h {minutes}m"),
    }
}

/// Process age and host uptime, read once the process has settled.
///
/// The launch is delayed so the process age reflects a running session
/// rather than the first instants of startup.
#[derive(Debug, Clone, Copy)]
pub struct ProcessTimingSource {
    delay: Duration,
}

impl ProcessTimingSource {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

#[async_trait]
impl SignalSource for ProcessTimingSource {
    fn name(&self) -> &str {
        "process-timing"
    }

    fn shape(&self) -> SourceShape {
        SourceShape::Synchronous
    }

    fn keys(&self) -> &[&'static str] {
        &["load-time", "uptime"]
    }

    fn start_delay(&self) -> Duration {
        self.delay
    }

    async fn collect(&self, host: &dyn Host, out: &Collector) {
        match host.process_age() {
            Some(age) => out.record("load-time", format!("{}ms", age.as_millis())),
            None => out.fail("load-time", Placeholder::NotAvailable),
        }
        match host.system_uptime() {
            Some(uptime) => out.record("uptime", format_uptime(uptime)),
            None => out.fail("uptime", Placeholder::NotAvailable),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::StaticHost;

    fn host() -> StaticHost {
        StaticHost {
            os_name: Some("linux".into()),
            os_version: Some("Debian GNU/Linux 12 (bookworm)".into()),
            cpu_cores: Some(8),
            memory_bytes: Some(16 * GIB - 300 * 1024 * 1024),
            languages: vec!["fr-FR".into(), "en-US".into()],
            ..StaticHost::default()
        }
    }

    #[test]
    fn test_formatting() {
        let host = host();
        assert_eq!(read_os(&host), "linux (Debian GNU/Linux 12 (bookworm))");
        assert_eq!(read_cpu(&host), "8 cores");
        assert_eq!(read_ram(&host), "~16 GB");
        assert_eq!(read_language(&host), "fr-FR, en-US");
    }

    #[test]
    fn test_missing_reads_become_placeholders() {
        let host = StaticHost::default();
        assert_eq!(read_os(&host), "not available");
        assert_eq!(read_language(&host), "not available");
        assert_eq!(read_ram(&host), "not available");
        assert_eq!(read_terminal(&host), "not available");
    }

    #[test]
    fn test_offset_formatting() {
        assert_eq!(format_offset(120), "UTC+2");
        assert_eq!(format_offset(0), "UTC+0");
        assert_eq!(format_offset(-330), "UTC-5.5");
    }

    #[test]
    fn test_catalog_keys_are_unique() {
        let sources = sources();
        let mut keys: Vec<&str> = sources.iter().flat_map(|s| s.keys().to_vec()).collect();
        let total = keys.len();
        keys.sort_unstable();
        keys.dedup();
        assert_eq!(keys.len(), total);
    }

    #[test]
    fn test_uptime_formatting() {
        assert_eq!(format_uptime(Duration::from_secs(5 * 60 + 59)), "5m");
        assert_eq!(format_uptime(Duration::from_secs(3 * 3600 + 14 * 60)), "3h 14m");
        assert_eq!(
            format_uptime(Duration::from_secs(2 * 86_400 + 3 * 3600 + 14 * 60)),
            "2d 3h 14m"
        );
    }

    #[tokio::test]
    async fn test_process_timing_reads() {
        use crate::aggregator::Aggregator;

        let host = StaticHost {
            process_age: Some(Duration::from_millis(1250)),
            ..StaticHost::default()
        };
        let aggregator = Arc::new(Aggregator::new());
        let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();
        let out = Collector::new("process-timing", Arc::clone(&aggregator), tx);

        let source = ProcessTimingSource::new(Duration::from_millis(1000));
        assert_eq!(source.start_delay(), Duration::from_millis(1000));
        source.collect(&host, &out).await;

        let store = aggregator.store();
        assert_eq!(store.value("load-time"), Some("1250ms"));
        assert_eq!(store.value("uptime"), Some("not available"));
    }
}
