//! Host environment capabilities.
//!
//! Probes only read the host through [`Host`]. Every read returns `None` when
//! the capability does not exist, which the probe reports as a placeholder.

pub mod event;

use std::io;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use chrono::{Local, Offset};
use once_cell::sync::Lazy;

use crate::error::{FailureKind, ProbeError};

pub use event::{EventChannel, ManualEvent, Subscription};

/// Kernel clock ticks per second as reported in `/proc` (`USER_HZ`).
const USER_HZ: u64 = 100;

/// Capture and playback devices attached to the host.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeviceInventory {
    pub cameras: usize,
    pub microphones: usize,
    pub speakers: usize,
}

/// Read access to the machine a session runs on.
pub trait Host: Send + Sync {
    /// IANA zone name, e.g. `Europe/Paris`.
    fn timezone(&self) -> Option<String>;

    /// Local offset from UTC in minutes (east positive).
    fn utc_offset_minutes(&self) -> i32;

    /// Operating system family, e.g. `linux`.
    fn os_name(&self) -> Option<String>;

    /// Distribution or release string.
    fn os_version(&self) -> Option<String>;

    /// CPU architecture.
    fn arch(&self) -> Option<String>;

    /// Logical cores available to the process.
    fn cpu_cores(&self) -> Option<usize>;

    /// Total physical memory in bytes.
    fn memory_bytes(&self) -> Option<u64>;

    /// Preferred languages, most preferred first, as BCP 47 tags.
    fn languages(&self) -> Vec<String>;

    /// Host name.
    fn hostname(&self) -> Option<String>;

    /// Terminal type.
    fn terminal(&self) -> Option<String>;

    /// Enumerate capture and playback devices.
    fn media_devices(&self) -> Result<DeviceInventory, ProbeError> {
        Err(ProbeError::Unavailable("device enumeration".to_string()))
    }

    /// Time since this process started.
    fn process_age(&self) -> Option<Duration> {
        None
    }

    /// Time since the host booted.
    fn system_uptime(&self) -> Option<Duration> {
        None
    }

    /// Fires once with rendered audio samples.
    fn audio_render(&self) -> Option<Arc<dyn EventChannel>> {
        None
    }

    /// Fires once when the speech voice list is populated.
    fn voice_catalog(&self) -> Option<Arc<dyn EventChannel>> {
        None
    }
}

// ---------------------------------------------------------------------------
// SystemHost
// ---------------------------------------------------------------------------

static OS_RELEASE: Lazy<Option<String>> = Lazy::new(|| {
    std::fs::read_to_string("/etc/os-release")
        .ok()
        .and_then(|text| parse_os_release(&text))
});

/// [`Host`] backed by the current process environment.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemHost;

impl SystemHost {
    pub fn new() -> Self {
        Self
    }
}

impl Host for SystemHost {
    fn timezone(&self) -> Option<String> {
        if let Some(tz) = std::env::var("TZ").ok().filter(|v| !v.is_empty()) {
            return Some(tz.trim_start_matches(':').to_string());
        }
        if let Ok(name) = std::fs::read_to_string("/etc/timezone") {
            let name = name.trim();
            if !name.is_empty() {
                return Some(name.to_string());
            }
        }
        std::fs::read_link("/etc/localtime")
            .ok()
            .and_then(|target| zone_from_localtime(&target))
    }

    fn utc_offset_minutes(&self) -> i32 {
        Local::now().offset().fix().local_minus_utc() / 60
    }

    fn os_name(&self) -> Option<String> {
        Some(std::env::consts::OS.to_string())
    }

    fn os_version(&self) -> Option<String> {
        OS_RELEASE.clone()
    }

    fn arch(&self) -> Option<String> {
        Some(std::env::consts::ARCH.to_string())
    }

    fn cpu_cores(&self) -> Option<usize> {
        std::thread::available_parallelism().ok().map(|n| n.get())
    }

    fn memory_bytes(&self) -> Option<u64> {
        std::fs::read_to_string("/proc/meminfo")
            .ok()
            .and_then(|text| parse_meminfo_total(&text))
    }

    fn languages(&self) -> Vec<String> {
        if let Ok(list) = std::env::var("LANGUAGE") {
            let langs: Vec<String> = list.split(':').filter_map(normalize_locale).collect();
            if !langs.is_empty() {
                return langs;
            }
        }
        ["LC_ALL", "LC_MESSAGES", "LANG"]
            .iter()
            .filter_map(|var| std::env::var(var).ok())
            .find_map(|value| normalize_locale(&value))
            .into_iter()
            .collect()
    }

    fn hostname(&self) -> Option<String> {
        std::env::var("HOSTNAME")
            .ok()
            .or_else(|| std::fs::read_to_string("/etc/hostname").ok())
            .map(|h| h.trim().to_string())
            .filter(|h| !h.is_empty())
    }

    fn terminal(&self) -> Option<String> {
        std::env::var("TERM").ok().filter(|t| !t.is_empty())
    }

    fn media_devices(&self) -> Result<DeviceInventory, ProbeError> {
        if !cfg!(target_os = "linux") {
            return Err(ProbeError::Unavailable(format!(
                "device nodes are not listed on {}",
                std::env::consts::OS
            )));
        }
        let dev = list_nodes(Path::new("/dev"))?;
        let snd = list_nodes(Path::new("/dev/snd"))?;
        Ok(inventory_from_nodes(&dev, &snd))
    }

    fn process_age(&self) -> Option<Duration> {
        let uptime = self.system_uptime()?;
        let stat = std::fs::read_to_string("/proc/self/stat").ok()?;
        let started = Duration::from_millis(parse_start_ticks(&stat)? * 1000 / USER_HZ);
        uptime.checked_sub(started)
    }

    fn system_uptime(&self) -> Option<Duration> {
        std::fs::read_to_string("/proc/uptime")
            .ok()
            .and_then(|text| parse_uptime(&text))
    }
}

// ---------------------------------------------------------------------------
// StaticHost
// ---------------------------------------------------------------------------

/// A [`Host`] with fixed answers, for embedding and tests.
#[derive(Default, Clone)]
pub struct StaticHost {
    pub timezone: Option<String>,
    pub utc_offset_minutes: i32,
    pub os_name: Option<String>,
    pub os_version: Option<String>,
    pub arch: Option<String>,
    pub cpu_cores: Option<usize>,
    pub memory_bytes: Option<u64>,
    pub languages: Vec<String>,
    pub hostname: Option<String>,
    pub terminal: Option<String>,
    /// `None` means enumeration is unsupported.
    pub media_devices: Option<Result<DeviceInventory, FailureKind>>,
    pub process_age: Option<Duration>,
    pub system_uptime: Option<Duration>,
    pub audio_render: Option<Arc<ManualEvent>>,
    pub voice_catalog: Option<Arc<ManualEvent>>,
}

impl std::fmt::Debug for StaticHost {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StaticHost")
            .field("timezone", &self.timezone)
            .field("os_name", &self.os_name)
            .field("cpu_cores", &self.cpu_cores)
            .finish_non_exhaustive()
    }
}

impl Host for StaticHost {
    fn timezone(&self) -> Option<String> {
        self.timezone.clone()
    }

    fn utc_offset_minutes(&self) -> i32 {
        self.utc_offset_minutes
    }

    fn os_name(&self) -> Option<String> {
        self.os_name.clone()
    }

    fn os_version(&self) -> Option<String> {
        self.os_version.clone()
    }

    fn arch(&self) -> Option<String> {
        self.arch.clone()
    }

    fn cpu_cores(&self) -> Option<usize> {
        self.cpu_cores
    }

    fn memory_bytes(&self) -> Option<u64> {
        self.memory_bytes
    }

    fn languages(&self) -> Vec<String> {
        self.languages.clone()
    }

    fn hostname(&self) -> Option<String> {
        self.hostname.clone()
    }

    fn terminal(&self) -> Option<String> {
        self.terminal.clone()
    }

    fn media_devices(&self) -> Result<DeviceInventory, ProbeError> {
        match self.media_devices {
            Some(Ok(inventory)) => Ok(inventory),
            Some(Err(FailureKind::PermissionDenied)) => {
                Err(ProbeError::PermissionDenied("device enumeration".to_string()))
            }
            Some(Err(FailureKind::Timeout | FailureKind::Transient)) => {
                Err(ProbeError::transient("device enumeration"))
            }
            Some(Err(FailureKind::Unavailable)) | None => {
                Err(ProbeError::Unavailable("device enumeration".to_string()))
            }
        }
    }

    fn process_age(&self) -> Option<Duration> {
        self.process_age
    }

    fn system_uptime(&self) -> Option<Duration> {
        self.system_uptime
    }

    fn audio_render(&self) -> Option<Arc<dyn EventChannel>> {
        self.audio_render
            .clone()
            .map(|e| e as Arc<dyn EventChannel>)
    }

    fn voice_catalog(&self) -> Option<Arc<dyn EventChannel>> {
        self.voice_catalog
            .clone()
            .map(|e| e as Arc<dyn EventChannel>)
    }
}

// ---------------------------------------------------------------------------
// Parsing helpers
// ---------------------------------------------------------------------------

/// `PRETTY_NAME` from an os-release file.
fn parse_os_release(text: &str) -> Option<String> {
    text.lines()
        .find_map(|line| line.strip_prefix("PRETTY_NAME="))
        .map(|v| v.trim().trim_matches('"').to_string())
        .filter(|v| !v.is_empty())
}

/// `MemTotal` from `/proc/meminfo`, converted to bytes.
fn parse_meminfo_total(text: &str) -> Option<u64> {
    let line = text.lines().find(|l| l.starts_with("MemTotal:"))?;
    let kib: u64 = line.split_whitespace().nth(1)?.parse().ok()?;
    Some(kib * 1024)
}

/// `en_US.UTF-8` -> `en-US`. `C` and `POSIX` are not languages.
fn normalize_locale(value: &str) -> Option<String> {
    let base = value.split(['.', '@']).next()?.trim();
    if base.is_empty() || base == "C" || base == "POSIX" {
        return None;
    }
    Some(base.replace('_', "-"))
}

/// Entry names of a device directory. A missing directory has no devices.
fn list_nodes(dir: &Path) -> io::Result<Vec<String>> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(err) => return Err(err),
    };
    let mut names = Vec::new();
    for entry in entries {
        names.push(entry?.file_name().to_string_lossy().into_owned());
    }
    Ok(names)
}

/// `videoN` nodes are cameras; ALSA `pcmCxDyc` / `pcmCxDyp` nodes are capture
/// and playback endpoints.
fn inventory_from_nodes(dev: &[String], snd: &[String]) -> DeviceInventory {
    let pcm = |suffix: char| {
        snd.iter()
            .filter(|n| n.starts_with("pcmC") && n.ends_with(suffix))
            .count()
    };
    DeviceInventory {
        cameras: dev
            .iter()
            .filter(|n| {
                n.strip_prefix("video")
                    .is_some_and(|rest| !rest.is_empty() && rest.chars().all(|c| c.is_ascii_digit()))
            })
            .count(),
        microphones: pcm('c'),
        speakers: pcm('p'),
    }
}

/// First field of `/proc/uptime`, in seconds with a fractional part.
fn parse_uptime(text: &str) -> Option<Duration> {
    let secs: f64 = text.split_whitespace().next()?.parse().ok()?;
    Duration::try_from_secs_f64(secs).ok()
}

/// Field 22 (`starttime`) of `/proc/self/stat`, in clock ticks. The command
/// name may contain spaces, so fields are counted from its closing paren.
fn parse_start_ticks(stat: &str) -> Option<u64> {
    let (_, rest) = stat.rsplit_once(')')?;
    rest.split_whitespace().nth(19)?.parse().ok()
}

/// `/usr/share/zoneinfo/Europe/Paris` -> `Europe/Paris`.
fn zone_from_localtime(target: &Path) -> Option<String> {
    let text = target.to_string_lossy();
    text.split_once("zoneinfo/")
        .map(|(_, zone)| zone.to_string())
        .filter(|zone| !zone.is_empty())
}
