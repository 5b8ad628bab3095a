//! Opaque data providers.
//!
//! Providers talk to the outside world (lookup services, a STUN server,
//! localhost sockets). Their only contract with the engine is "return a value
//! or fail"; the probes that own them turn failures into placeholders.

pub mod http;
pub mod ports;
pub mod stun;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::error::ProbeError;

pub use http::{HttpGeoLookup, HttpIpLookup};
pub use ports::TcpPortProber;
pub use stun::StunNegotiator;

/// Resolves the public address of this host.
#[async_trait]
pub trait IpLookup: Send + Sync {
    async fn lookup(&self) -> Result<String, ProbeError>;
}

/// Geolocation answer for an address. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeoInfo {
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub country_name: Option<String>,
    #[serde(default)]
    pub org: Option<String>,
}

impl GeoInfo {
    /// `"City, Region Country"`, with `"unknown"` for a missing city.
    pub fn location(&self) -> String {
        format!(
            "{}, {} {}",
            self.city.as_deref().unwrap_or("unknown"),
            self.region.as_deref().unwrap_or(""),
            self.country_name.as_deref().unwrap_or("")
        )
    }
}

/// Geolocates an address.
#[async_trait]
pub trait GeoLookup: Send + Sync {
    async fn locate(&self, ip: &str) -> Result<GeoInfo, ProbeError>;
}

/// Gathers peer-connection candidates.
///
/// Candidates arrive as text lines whose fifth space-separated token is an
/// address. The channel closes when gathering completes; it may also simply
/// stall, which the caller bounds.
#[async_trait]
pub trait PeerNegotiator: Send + Sync {
    async fn gather(&self) -> Result<mpsc::Receiver<String>, ProbeError>;
}

/// Checks whether something answers on a localhost port.
#[async_trait]
pub trait PortProber: Send + Sync {
    async fn probe(&self, port: u16) -> Result<bool, ProbeError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_location_formatting() {
        let geo = GeoInfo {
            city: Some("Lyon".into()),
            region: Some("Auvergne-Rhone-Alpes".into()),
            country_name: Some("France".into()),
            org: None,
        };
        assert_eq!(geo.location(), "Lyon, Auvergne-Rhone-Alpes France");
        assert_eq!(GeoInfo::default().location(), "unknown,  ");
    }

    #[test]
    fn test_geo_info_ignores_extra_fields() {
        let geo: GeoInfo =
            serde_json::from_str(r#"{"ip":"1.2.3.4","city":"Paris","org":"AS3215 Orange"}"#)
                .unwrap();
        assert_eq!(geo.city.as_deref(), Some("Paris"));
        assert_eq!(geo.org.as_deref(), Some("AS3215 Orange"));
        assert_eq!(geo.region, None);
    }
}
