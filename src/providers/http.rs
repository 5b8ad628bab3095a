//! HTTP lookup providers backed by `reqwest`.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use super::{GeoInfo, GeoLookup, IpLookup};
use crate::error::ProbeError;

/// Per-request timeout. The session deadline bounds the probe anyway; this
/// only keeps sockets from outliving the session by much.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

fn build_client() -> Result<reqwest::Client, ProbeError> {
    reqwest::Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .user_agent(concat!("signalprint/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(ProbeError::from)
}

#[derive(Debug, Deserialize)]
struct IpResponse {
    ip: String,
}

/// Public address from a JSON endpoint answering `{"ip": "..."}`.
#[derive(Debug, Clone)]
pub struct HttpIpLookup {
    client: reqwest::Client,
    url: String,
}

impl HttpIpLookup {
    pub fn new(url: impl Into<String>) -> Result<Self, ProbeError> {
        Ok(Self {
            client: build_client()?,
            url: url.into(),
        })
    }
}

#[async_trait]
impl IpLookup for HttpIpLookup {
    async fn lookup(&self) -> Result<String, ProbeError> {
        let response = self.client.get(&self.url).send().await?.error_for_status()?;
        let body: IpResponse = response.json().await?;
        if body.ip.is_empty() {
            return Err(ProbeError::transient("empty ip in lookup response"));
        }
        Ok(body.ip)
    }
}

/// Geolocation from a URL template containing `{ip}`.
#[derive(Debug, Clone)]
pub struct HttpGeoLookup {
    client: reqwest::Client,
    template: String,
}

impl HttpGeoLookup {
    pub fn new(template: impl Into<String>) -> Result<Self, ProbeError> {
        Ok(Self {
            client: build_client()?,
            template: template.into(),
        })
    }

    fn url_for(&self, ip: &str) -> String {
        self.template.replace("{ip}", ip)
    }
}

#[async_trait]
impl GeoLookup for HttpGeoLookup {
    async fn locate(&self, ip: &str) -> Result<GeoInfo, ProbeError> {
        let url = self.url_for(ip);
        tracing::debug!(%url, "geolocation request");
        let response = self.client.get(&url).send().await?.error_for_status()?;
        Ok(response.json().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_template() {
        let geo = HttpGeoLookup::new("https://ipapi.co/{ip}/json/").unwrap();
        assert_eq!(geo.url_for("203.0.113.9"), "https://ipapi.co/203.0.113.9/json/");
    }

    #[test]
    fn test_ip_response_shape() {
        let body: IpResponse = serde_json::from_str(r#"{"ip":"198.51.100.4"}"#).unwrap();
        assert_eq!(body.ip, "198.51.100.4");
    }
}
