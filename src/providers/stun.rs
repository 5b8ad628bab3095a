//! Peer candidate gathering over STUN (RFC 5389 binding requests).
//!
//! Emits a host candidate for the local socket address right away, then a
//! server-reflexive candidate once the STUN server answers. Candidates use the
//! ICE attribute layout, so the address is always the fifth token.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::time::timeout;

use super::PeerNegotiator;
use crate::error::ProbeError;

const MAGIC_COOKIE: u32 = 0x2112_A442;
const BINDING_REQUEST: u16 = 0x0001;
const BINDING_SUCCESS: u16 = 0x0101;
const ATTR_MAPPED_ADDRESS: u16 = 0x0001;
const ATTR_XOR_MAPPED_ADDRESS: u16 = 0x0020;
const HEADER_LEN: usize = 20;

/// How long the background exchange waits for the server before giving up.
const RESPONSE_WAIT: Duration = Duration::from_secs(5);

/// Gathers candidates against one STUN server.
#[derive(Debug, Clone)]
pub struct StunNegotiator {
    server: String,
}

impl StunNegotiator {
    /// `server` is a `host:port` pair.
    pub fn new(server: impl Into<String>) -> Self {
        Self {
            server: server.into(),
        }
    }
}

#[async_trait]
impl PeerNegotiator for StunNegotiator {
    async fn gather(&self) -> Result<mpsc::Receiver<String>, ProbeError> {
        let socket = UdpSocket::bind("0.0.0.0:0").await?;
        socket.connect(&self.server).await?;
        let local = socket.local_addr()?;

        let (tx, rx) = mpsc::channel(4);
        if tx.send(candidate(1, "host", local, None)).await.is_err() {
            tracing::trace!("candidate receiver gone");
        }

        let server = self.server.clone();
        tokio::spawn(async move {
            match timeout(RESPONSE_WAIT, exchange(&socket)).await {
                Ok(Ok(mapped)) => {
                    let line = candidate(2, "srflx", mapped, Some(local));
                    if tx.send(line).await.is_err() {
                        tracing::trace!("candidate receiver gone");
                    }
                }
                Ok(Err(err)) => tracing::debug!(%server, error = %err, "stun exchange failed"),
                Err(_) => tracing::debug!(%server, "stun server did not answer"),
            }
        });

        Ok(rx)
    }
}

async fn exchange(socket: &UdpSocket) -> Result<SocketAddr, ProbeError> {
    let mut transaction = [0u8; 12];
    rand::rng().fill(&mut transaction);
    socket.send(&binding_request(&transaction)).await?;

    let mut buf = [0u8; 576];
    loop {
        let n = socket.recv(&mut buf).await?;
        match parse_binding_response(&buf[..n], &transaction)? {
            Some(addr) => return Ok(addr),
            None => tracing::trace!("stun datagram for another transaction ignored"),
        }
    }
}

fn candidate(foundation: u32, kind: &str, addr: SocketAddr, related: Option<SocketAddr>) -> String {
    let priority = match kind {
        "host" => 2_122_260_223u32,
        _ => 1_686_052_607,
    };
    let mut line = format!(
        "candidate:{foundation} 1 udp {priority} {} {} typ {kind}",
        addr.ip(),
        addr.port()
    );
    if let Some(rel) = related {
        line.push_str(&format!(" raddr {} rport {}", rel.ip(), rel.port()));
    }
    line
}

fn binding_request(transaction: &[u8; 12]) -> [u8; HEADER_LEN] {
    let mut msg = [0u8; HEADER_LEN];
    msg[0..2].copy_from_slice(&BINDING_REQUEST.to_be_bytes());
    // Message length stays zero: no attributes.
    msg[4..8].copy_from_slice(&MAGIC_COOKIE.to_be_bytes());
    msg[8..20].copy_from_slice(transaction);
    msg
}

/// Mapped address from a binding response, or `None` when the datagram
/// belongs to another transaction.
fn parse_binding_response(
    buf: &[u8],
    transaction: &[u8; 12],
) -> Result<Option<SocketAddr>, ProbeError> {
    if buf.len() < HEADER_LEN {
        return Err(ProbeError::transient("short stun message"));
    }
    if buf[8..20] != transaction[..] {
        return Ok(None);
    }
    let kind = u16::from_be_bytes([buf[0], buf[1]]);
    if kind != BINDING_SUCCESS {
        return Err(ProbeError::transient(format!("unexpected stun message 0x{kind:04x}")));
    }
    let length = u16::from_be_bytes([buf[2], buf[3]]) as usize;
    let body = buf
        .get(HEADER_LEN..HEADER_LEN + length)
        .ok_or_else(|| ProbeError::transient("truncated stun message"))?;

    let mut fallback = None;
    let mut offset = 0;
    while offset + 4 <= body.len() {
        let attr = u16::from_be_bytes([body[offset], body[offset + 1]]);
        let len = u16::from_be_bytes([body[offset + 2], body[offset + 3]]) as usize;
        let value = body
            .get(offset + 4..offset + 4 + len)
            .ok_or_else(|| ProbeError::transient("truncated stun attribute"))?;
        match attr {
            ATTR_XOR_MAPPED_ADDRESS => return decode_address(value, Some(transaction)).map(Some),
            ATTR_MAPPED_ADDRESS => fallback = Some(decode_address(value, None)?),
            _ => {}
        }
        // Attributes are padded to four bytes.
        offset += 4 + len.div_ceil(4) * 4;
    }
    fallback
        .map(Some)
        .ok_or_else(|| ProbeError::transient("no mapped address in stun response"))
}

fn decode_address(value: &[u8], xor_with: Option<&[u8; 12]>) -> Result<SocketAddr, ProbeError> {
    if value.len() < 8 {
        return Err(ProbeError::transient("short address attribute"));
    }
    let cookie = MAGIC_COOKIE.to_be_bytes();
    let mut port = u16::from_be_bytes([value[2], value[3]]);
    if xor_with.is_some() {
        port ^= (MAGIC_COOKIE >> 16) as u16;
    }

    let ip = match value[1] {
        0x01 => {
            let mut octets = [value[4], value[5], value[6], value[7]];
            if xor_with.is_some() {
                for (o, c) in octets.iter_mut().zip(cookie) {
                    *o ^= c;
                }
            }
            IpAddr::V4(Ipv4Addr::from(octets))
        }
        0x02 => {
            let raw = value
                .get(4..20)
                .ok_or_else(|| ProbeError::transient("short ipv6 address attribute"))?;
            let mut octets = [0u8; 16];
            octets.copy_from_slice(raw);
            if let Some(transaction) = xor_with {
                let mask = cookie.iter().chain(transaction.iter());
                for (o, m) in octets.iter_mut().zip(mask) {
                    *o ^= m;
                }
            }
            IpAddr::V6(Ipv6Addr::from(octets))
        }
        family => {
            return Err(ProbeError::transient(format!("unknown address family {family}")));
        }
    };
    Ok(SocketAddr::new(ip, port))
}
