//! Network probes: the address lookup chain, peer candidates and localhost
//! ports.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;
use once_cell::sync::Lazy;
use regex::Regex;
use tokio::sync::mpsc;

use crate::aggregator::Collector;
use crate::host::Host;
use crate::policy::{race, Raced, TimeoutPolicy};
use crate::providers::{GeoLookup, IpLookup, PeerNegotiator, PortProber};
use crate::signal::{Placeholder, SignalSource, SourceShape};

static PRIVATE_V4: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(192\.168\.|10\.|172\.(1[6-9]|2[0-9]|3[0-1])\.)").unwrap());

/// Whether a candidate address is on the local network. Any IPv6 address
/// counts as local.
pub fn is_local_address(addr: &str) -> bool {
    PRIVATE_V4.is_match(addr) || addr.contains(':')
}

// ---------------------------------------------------------------------------
// IpChainSource
// ---------------------------------------------------------------------------

/// Public address, then geolocation for that address.
///
/// `ip`, `location` and `isp` are recorded; `ipv6` is shown only. The second
/// stage never starts unless the first produced an address.
pub struct IpChainSource {
    ip: Arc<dyn IpLookup>,
    geo: Arc<dyn GeoLookup>,
}

impl IpChainSource {
    pub fn new(ip: Arc<dyn IpLookup>, geo: Arc<dyn GeoLookup>) -> Self {
        Self { ip, geo }
    }
}

#[async_trait]
impl SignalSource for IpChainSource {
    fn name(&self) -> &str {
        "ip-chain"
    }

    fn shape(&self) -> SourceShape {
        SourceShape::Async
    }

    fn keys(&self) -> &[&'static str] {
        &["ip", "location", "isp", "ipv6"]
    }

    async fn collect(&self, _host: &dyn Host, out: &Collector) {
        let ip = match self.ip.lookup().await {
            Ok(ip) => ip,
            Err(err) => {
                tracing::debug!(error = %err, "address lookup failed");
                out.fail("ip", Placeholder::Unreachable);
                out.fail("location", Placeholder::NotAvailable);
                out.fail("isp", Placeholder::NotAvailable);
                out.fail_display("ipv6", Placeholder::NotTestable);
                return;
            }
        };
        out.record("ip", ip.as_str());

        match self.geo.locate(&ip).await {
            Ok(geo) => {
                out.record("location", geo.location());
                match geo.org {
                    Some(org) => out.record("isp", org),
                    None => out.record("isp", Placeholder::NotDetected),
                }
                let family = if ip.contains(':') { "yes (IPv6)" } else { "no (IPv4 only)" };
                out.display("ipv6", family);
            }
            Err(err) => {
                tracing::debug!(%ip, error = %err, "geolocation failed");
                out.fail("location", Placeholder::NotAvailable);
                out.fail("isp", Placeholder::NotAvailable);
                out.fail_display("ipv6", Placeholder::NotTestable);
            }
        }
    }
}

// ---------------------------------------------------------------------------
// PeerCandidateSource
// ---------------------------------------------------------------------------

/// Addresses exposed through peer-connection candidate gathering.
pub struct PeerCandidateSource {
    negotiator: Arc<dyn PeerNegotiator>,
    policy: TimeoutPolicy,
}

impl PeerCandidateSource {
    pub fn new(negotiator: Arc<dyn PeerNegotiator>, bound: Duration) -> Self {
        Self {
            negotiator,
            policy: TimeoutPolicy::timeout(bound),
        }
    }
}

/// Read candidates until the stream closes, collecting distinct addresses.
async fn drain_candidates(rx: &mut mpsc::Receiver<String>, seen: &mut Vec<String>) {
    while let Some(line) = rx.recv().await {
        let Some(addr) = line.split(' ').nth(4) else {
            tracing::trace!(%line, "candidate without address token");
            continue;
        };
        if !seen.iter().any(|s| s == addr) {
            seen.push(addr.to_string());
        }
    }
}

#[async_trait]
impl SignalSource for PeerCandidateSource {
    fn name(&self) -> &str {
        "webrtc"
    }

    fn shape(&self) -> SourceShape {
        SourceShape::Race {
            bound: self.policy.bound,
        }
    }

    fn keys(&self) -> &[&'static str] {
        &["webrtc", "local-ip"]
    }

    async fn collect(&self, _host: &dyn Host, out: &Collector) {
        let mut seen = Vec::new();
        let outcome = race(&self.policy, async {
            let mut rx = self.negotiator.gather().await?;
            drain_candidates(&mut rx, &mut seen).await;
            Ok::<_, crate::error::ProbeError>(())
        })
        .await;

        let local: Vec<&str> = seen
            .iter()
            .map(String::as_str)
            .filter(|a| is_local_address(a))
            .collect();

        match outcome {
            Raced::Completed(Err(err)) => {
                tracing::debug!(error = %err, "candidate gathering failed");
                out.fail("webrtc", Placeholder::NotTestable);
                out.fail("local-ip", Placeholder::Error);
            }
            Raced::Completed(Ok(())) => {
                if seen.is_empty() {
                    out.record("webrtc", "no leak");
                } else {
                    out.record("webrtc", format!("leak: {} IP", seen.len()));
                }
                if local.is_empty() {
                    out.record("local-ip", Placeholder::NotDetected);
                } else {
                    out.record("local-ip", local.join(", "));
                }
            }
            Raced::Expired(placeholder) => {
                if seen.is_empty() {
                    out.fail("webrtc", placeholder);
                } else {
                    out.record("webrtc", format!("{} IP detected", seen.len()));
                }
                match local.first() {
                    Some(addr) => out.record("local-ip", *addr),
                    None => out.record("local-ip", Placeholder::NotDetected),
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// PortScanSource
// ---------------------------------------------------------------------------

/// Open localhost ports. Every port is probed at once, each under its own
/// bound, so the whole scan takes at most one bound.
pub struct PortScanSource {
    prober: Arc<dyn PortProber>,
    ports: Vec<u16>,
    policy: TimeoutPolicy,
}

impl PortScanSource {
    pub fn new(prober: Arc<dyn PortProber>, ports: Vec<u16>, bound: Duration) -> Self {
        Self {
            prober,
            ports,
            policy: TimeoutPolicy::timeout(bound),
        }
    }

    async fn is_open(&self, port: u16) -> bool {
        match race(&self.policy, self.prober.probe(port)).await {
            Raced::Completed(Ok(open)) => open,
            Raced::Completed(Err(err)) => {
                tracing::trace!(port, error = %err, "port probe failed");
                false
            }
            Raced::Expired(_) => false,
        }
    }
}

#[async_trait]
impl SignalSource for PortScanSource {
    fn name(&self) -> &str {
        "ports"
    }

    fn shape(&self) -> SourceShape {
        SourceShape::Race {
            bound: self.policy.bound,
        }
    }

    fn keys(&self) -> &[&'static str] {
        &["ports"]
    }

    async fn collect(&self, _host: &dyn Host, out: &Collector) {
        let results = join_all(self.ports.iter().map(|&port| self.is_open(port))).await;
        let open: Vec<String> = self
            .ports
            .iter()
            .zip(results)
            .filter(|(_, open)| *open)
            .map(|(port, _)| port.to_string())
            .collect();

        if open.is_empty() {
            out.record("ports", Placeholder::NotDetected);
        } else {
            out.record("ports", open.join(", "));
        }
    }
}
