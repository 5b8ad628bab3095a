//! Session configuration.
//!
//! Every timing constant and endpoint of the engine lives in
//! [`SessionConfig`]. Defaults match the documented timings; a deployment
//! can override them through `SIGNALPRINT_*` environment variables (there is
//! no configuration file).

use std::ops::RangeInclusive;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::store::SerializationOrder;

/// Ports probed on localhost by default.
pub const DEFAULT_PORTS: [u16; 5] = [80, 443, 3000, 8080, 8443];

/// Randomized presentation delay applied to each sink update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CosmeticDelay {
    #[serde(with = "millis")]
    pub min: Duration,
    #[serde(with = "millis")]
    pub max: Duration,
}

impl CosmeticDelay {
    pub const fn new(min: Duration, max: Duration) -> Self {
        Self { min, max }
    }

    /// No presentation delay at all.
    pub const fn none() -> Self {
        Self::new(Duration::ZERO, Duration::ZERO)
    }

    /// Inclusive range in milliseconds.
    pub fn range_ms(&self) -> RangeInclusive<u64> {
        self.min.as_millis() as u64..=self.max.as_millis() as u64
    }
}

impl Default for CosmeticDelay {
    fn default() -> Self {
        Self::new(Duration::from_millis(500), Duration::from_millis(1500))
    }
}

/// Configuration for one collection session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Delay from session start to fingerprint generation.
    #[serde(with = "millis")]
    pub deadline: Duration,
    /// How long stragglers may keep writing after the snapshot before they
    /// are dropped.
    #[serde(with = "millis")]
    pub linger: Duration,
    pub cosmetic_delay: CosmeticDelay,
    /// Fallback bound for event-based sources.
    #[serde(with = "millis")]
    pub event_fallback: Duration,
    /// Bound on peer candidate gathering.
    #[serde(with = "millis")]
    pub peer_bound: Duration,
    /// Bound on each localhost port probe.
    #[serde(with = "millis")]
    pub port_bound: Duration,
    pub ports: Vec<u16>,
    /// Start delay of the process timing probe.
    #[serde(with = "millis")]
    pub timing_delay: Duration,
    pub serialization: SerializationOrder,
    /// Generate the fingerprint as soon as every source has resolved, if
    /// that happens before the deadline.
    pub finalize_on_completion: bool,
    pub trackability_score: String,
    pub ip_lookup_url: String,
    /// Geolocation endpoint; `{ip}` is replaced by the looked-up address.
    pub geo_lookup_url: String,
    pub stun_server: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            deadline: Duration::from_millis(4000),
            linger: Duration::from_millis(5000),
            cosmetic_delay: CosmeticDelay::default(),
            event_fallback: Duration::from_millis(1000),
            peer_bound: Duration::from_millis(3000),
            port_bound: Duration::from_millis(200),
            ports: DEFAULT_PORTS.to_vec(),
            timing_delay: Duration::from_millis(1000),
            serialization: SerializationOrder::Completion,
            finalize_on_completion: false,
            trackability_score: "99.9%".to_string(),
            ip_lookup_url: "https://api.ipify.org?format=json".to_string(),
            geo_lookup_url: "https://ipapi.co/{ip}/json/".to_string(),
            stun_server: "stun.l.google.com:19302".to_string(),
        }
    }
}

impl SessionConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults with `SIGNALPRINT_*` environment overrides applied.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Defaults with overrides read through `lookup`.
    ///
    /// | variable | field |
    /// |---|---|
    /// | `SIGNALPRINT_DEADLINE_MS` | `deadline` |
    /// | `SIGNALPRINT_LINGER_MS` | `linger` |
    /// | `SIGNALPRINT_DELAY_MIN_MS` / `SIGNALPRINT_DELAY_MAX_MS` | `cosmetic_delay` |
    /// | `SIGNALPRINT_EVENT_FALLBACK_MS` | `event_fallback` |
    /// | `SIGNALPRINT_PEER_BOUND_MS` | `peer_bound` |
    /// | `SIGNALPRINT_PORT_BOUND_MS` | `port_bound` |
    /// | `SIGNALPRINT_PORTS` (comma separated) | `ports` |
    /// | `SIGNALPRINT_TIMING_DELAY_MS` | `timing_delay` |
    /// | `SIGNALPRINT_SORT_KEYS` | `serialization` |
    /// | `SIGNALPRINT_FINALIZE_EARLY` | `finalize_on_completion` |
    /// | `SIGNALPRINT_IP_URL` / `SIGNALPRINT_GEO_URL` / `SIGNALPRINT_STUN` | endpoints |
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        let millis = |var: &str| -> Result<Option<Duration>, ConfigError> {
            lookup(var)
                .map(|raw| {
                    raw.trim()
                        .parse::<u64>()
                        .map(Duration::from_millis)
                        .map_err(|e| invalid(var, &raw, e))
                })
                .transpose()
        };
        let flag = |var: &str| -> Result<Option<bool>, ConfigError> {
            lookup(var).map(|raw| parse_flag(var, &raw)).transpose()
        };

        if let Some(d) = millis("SIGNALPRINT_DEADLINE_MS")? {
            config.deadline = d;
        }
        if let Some(d) = millis("SIGNALPRINT_LINGER_MS")? {
            config.linger = d;
        }
        if let Some(d) = millis("SIGNALPRINT_DELAY_MIN_MS")? {
            config.cosmetic_delay.min = d;
        }
        if let Some(d) = millis("SIGNALPRINT_DELAY_MAX_MS")? {
            config.cosmetic_delay.max = d;
        }
        if let Some(d) = millis("SIGNALPRINT_EVENT_FALLBACK_MS")? {
            config.event_fallback = d;
        }
        if let Some(d) = millis("SIGNALPRINT_PEER_BOUND_MS")? {
            config.peer_bound = d;
        }
        if let Some(d) = millis("SIGNALPRINT_PORT_BOUND_MS")? {
            config.port_bound = d;
        }
        if let Some(d) = millis("SIGNALPRINT_TIMING_DELAY_MS")? {
            config.timing_delay = d;
        }
        if let Some(raw) = lookup("SIGNALPRINT_PORTS") {
            config.ports = parse_ports(&raw)?;
        }
        if let Some(sorted) = flag("SIGNALPRINT_SORT_KEYS")? {
            config.serialization = if sorted {
                SerializationOrder::Sorted
            } else {
                SerializationOrder::Completion
            };
        }
        if let Some(early) = flag("SIGNALPRINT_FINALIZE_EARLY")? {
            config.finalize_on_completion = early;
        }
        if let Some(url) = lookup("SIGNALPRINT_IP_URL") {
            config.ip_lookup_url = url;
        }
        if let Some(url) = lookup("SIGNALPRINT_GEO_URL") {
            config.geo_lookup_url = url;
        }
        if let Some(server) = lookup("SIGNALPRINT_STUN") {
            config.stun_server = server;
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject contradictory settings.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cosmetic_delay.min > self.cosmetic_delay.max {
            return Err(ConfigError::Inconsistent(format!(
                "cosmetic delay min {:?} exceeds max {:?}",
                self.cosmetic_delay.min, self.cosmetic_delay.max
            )));
        }
        if !self.geo_lookup_url.contains("{ip}") {
            return Err(ConfigError::Inconsistent(
                "geo lookup url must contain an {ip} placeholder".to_string(),
            ));
        }
        Ok(())
    }

    /// Time after which unfinished sources are dropped.
    pub fn hard_stop(&self) -> Duration {
        self.deadline + self.linger
    }
}

fn invalid(var: &str, raw: &str, reason: impl ToString) -> ConfigError {
    ConfigError::InvalidValue {
        var: var.to_string(),
        value: raw.to_string(),
        reason: reason.to_string(),
    }
}

fn parse_flag(var: &str, raw: &str) -> Result<bool, ConfigError> {
    match raw.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(invalid(var, raw, "expected a boolean")),
    }
}

fn parse_ports(raw: &str) -> Result<Vec<u16>, ConfigError> {
    raw.split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(|p| {
            p.parse::<u16>()
                .map_err(|e| invalid("SIGNALPRINT_PORTS", raw, e))
        })
        .collect()
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}
