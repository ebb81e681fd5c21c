use std::io::{Error, ErrorKind, Result};
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};

use async_trait::async_trait;
use log::info;
use tokio::net::{lookup_host, UdpSocket};
use tokio::time::timeout;

use super::{connect_tcp, Dial, Target};
use crate::config::CONNECT_TIMEOUT;
use crate::conn::{Connection, Network};
use crate::error::DialError;

/// Connects straight to the destination, no handshake.
#[derive(Debug, Clone, Copy, Default)]
pub struct DirectDialer;

impl DirectDialer {
    pub async fn connect(
        &self,
        network: Network,
        address: &str,
    ) -> std::result::Result<Connection, DialError> {
        info!("{} -> DIRECT", address);

        let conn = match network {
            Network::Tcp => Connection::Tcp(connect_tcp(address).await?),
            Network::Udp => Connection::Udp(connect_udp(address).await?),
        };
        Ok(conn)
    }
}

#[async_trait]
impl Dial for DirectDialer {
    async fn dial(
        &self,
        network: Network,
        target: &Target,
    ) -> std::result::Result<Connection, DialError> {
        self.connect(network, &target.addr).await
    }
}

async fn connect_udp(address: &str) -> Result<UdpSocket> {
    timeout(CONNECT_TIMEOUT, async {
        let peer = lookup_host(address).await?.next().ok_or_else(|| {
            Error::new(ErrorKind::NotFound, format!("no address for {}", address))
        })?;

        let local = match peer {
            SocketAddr::V4(_) => SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0)),
            SocketAddr::V6(_) => SocketAddr::from((Ipv6Addr::UNSPECIFIED, 0)),
        };
        let socket = UdpSocket::bind(local).await?;
        socket.connect(peer).await?;
        Ok::<_, Error>(socket)
    })
    .await
    .map_err(|_| Error::new(ErrorKind::TimedOut, format!("connect {} timed out", address)))?
}
