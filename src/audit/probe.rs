// ABOUTME: Bounded-time TCP reachability probe used by the exposure audit.
// ABOUTME: Refused, unreachable and timed-out connects all count as closed.

use async_trait::async_trait;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

/// Observed state of a port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PortState {
    Open,
    Closed,
}

#[async_trait]
pub trait PortProbe: Send + Sync {
    async fn probe(&self, address: IpAddr, port: u16, timeout: Duration) -> PortState;
}

/// Plain TCP connect; the connection is dropped as soon as it is made.
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpProbe;

#[async_trait]
impl PortProbe for TcpProbe {
    async fn probe(&self, address: IpAddr, port: u16, timeout: Duration) -> PortState {
        let target = SocketAddr::new(address, port);
        match tokio::time::timeout(timeout, tokio::net::TcpStream::connect(target)).await {
            Ok(Ok(_stream)) => PortState::Open,
            Ok(Err(e)) => {
                tracing::debug!("{}: {}", target, e);
                PortState::Closed
            }
            Err(_) => {
                tracing::debug!("{}: no answer within {:?}", target, timeout);
                PortState::Closed
            }
        }
    }
}
