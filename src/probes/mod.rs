//! The probe catalog.
//!
//! | key | shape | recorded |
//! |---|---|---|
//! | `timezone`, `os`, `arch`, `language`, `cpu`, `ram`, `hostname`, `terminal` | sync | yes |
//! | `cameras`, `microphones`, `speakers` | sync, one enumeration | yes |
//! | `load-time`, `uptime` | sync, delayed start | yes |
//! | `ip`, `location`, `isp` | async chain | yes |
//! | `ipv6` | async chain | display only |
//! | `webrtc`, `local-ip` | race | yes |
//! | `ports` | race per port | yes |
//! | `audio-fp` | event | yes (preview shown) |
//! | `voices` | event | yes |

pub mod devices;
pub mod media;
pub mod network;
pub mod system;

use std::sync::Arc;

use crate::config::SessionConfig;
use crate::error::ProbeError;
use crate::providers::{
    GeoLookup, HttpGeoLookup, HttpIpLookup, IpLookup, PeerNegotiator, PortProber,
    StunNegotiator, TcpPortProber,
};
use crate::signal::SignalSource;

pub use devices::MediaDevicesSource;
pub use media::{AudioFingerprintSource, VoicesSource};
pub use network::{IpChainSource, PeerCandidateSource, PortScanSource};
pub use system::{ProcessTimingSource, TimezoneSource};

/// The external providers the network probes depend on.
#[derive(Clone)]
pub struct Providers {
    pub ip: Arc<dyn IpLookup>,
    pub geo: Arc<dyn GeoLookup>,
    pub peers: Arc<dyn PeerNegotiator>,
    pub ports: Arc<dyn PortProber>,
}

impl Providers {
    /// Real network providers for the endpoints in `config`.
    pub fn from_config(config: &SessionConfig) -> Result<Self, ProbeError> {
        Ok(Self {
            ip: Arc::new(HttpIpLookup::new(&config.ip_lookup_url)?),
            geo: Arc::new(HttpGeoLookup::new(&config.geo_lookup_url)?),
            peers: Arc::new(StunNegotiator::new(&config.stun_server)),
            ports: Arc::new(TcpPortProber::new()),
        })
    }
}

impl std::fmt::Debug for Providers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Providers").finish_non_exhaustive()
    }
}

/// The full catalog wired to `providers`.
pub fn catalog(config: &SessionConfig, providers: &Providers) -> Vec<Arc<dyn SignalSource>> {
    let mut sources = system::sources();
    sources.push(Arc::new(MediaDevicesSource));
    sources.push(Arc::new(IpChainSource::new(
        Arc::clone(&providers.ip),
        Arc::clone(&providers.geo),
    )));
    sources.push(Arc::new(PeerCandidateSource::new(
        Arc::clone(&providers.peers),
        config.peer_bound,
    )));
    sources.push(Arc::new(PortScanSource::new(
        Arc::clone(&providers.ports),
        config.ports.clone(),
        config.port_bound,
    )));
    sources.push(Arc::new(AudioFingerprintSource::new(config.event_fallback)));
    sources.push(Arc::new(VoicesSource::new(config.event_fallback)));
    sources.push(Arc::new(ProcessTimingSource::new(config.timing_delay)));
    sources
}

/// The full catalog with real network providers.
pub fn default_sources(config: &SessionConfig) -> Result<Vec<Arc<dyn SignalSource>>, ProbeError> {
    Ok(catalog(config, &Providers::from_config(config)?))
}
