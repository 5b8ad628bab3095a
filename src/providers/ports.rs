//! Localhost port probing over TCP.

use std::io::ErrorKind;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use async_trait::async_trait;
use tokio::net::TcpStream;

use super::PortProber;
use crate::error::ProbeError;

/// Probes ports with a plain TCP connect.
///
/// A refused connection means closed; any completed handshake means open.
/// The connect itself is unbounded here, the caller races it.
#[derive(Debug, Clone)]
pub struct TcpPortProber {
    host: IpAddr,
}

impl TcpPortProber {
    pub fn new() -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::LOCALHOST),
        }
    }
}

impl Default for TcpPortProber {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PortProber for TcpPortProber {
    async fn probe(&self, port: u16) -> Result<bool, ProbeError> {
        match TcpStream::connect(SocketAddr::new(self.host, port)).await {
            Ok(_) => Ok(true),
            Err(err) if err.kind() == ErrorKind::ConnectionRefused => Ok(false),
            Err(err) => Err(err.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use tokio::net::TcpListener;

    use super::*;

    #[tokio::test]
    async fn test_detects_listener() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let prober = TcpPortProber::new();
        assert!(prober.probe(port).await.unwrap());
    }

    #[tokio::test]
    async fn test_closed_port() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let prober = TcpPortProber::new();
        assert!(!prober.probe(port).await.unwrap());
    }
}
