use async_trait::async_trait;
use log::{debug, info};
use tokio::io::AsyncWriteExt;

use super::{connect_tcp, tune, Dial, Target};
use crate::conn::{Connection, Network};
use crate::error::DialError;
use crate::proto::{self, AddrSpec, CMD_CONNECT, CMD_UDP_ASSOCIATE, METHOD_REQUEST};

/// Tunnels through a SOCKS5 proxy using the NO AUTH method.
#[derive(Debug, Clone)]
pub struct Socks5ProxyDialer {
    proxy: String,
}

impl Socks5ProxyDialer {
    pub fn new<S: Into<String>>(proxy: S) -> Self {
        Self {
            proxy: proxy.into(),
        }
    }

    /// Streams get CONNECT; datagrams get UDP ASSOCIATE, and the returned
    /// connection is the control stream holding the association open.
    pub async fn connect(
        &self,
        network: Network,
        address: &str,
        is_ip: bool,
    ) -> Result<Connection, DialError> {
        let dst = AddrSpec::parse(address, is_ip)?;
        let cmd = if network.is_stream() {
            CMD_CONNECT
        } else {
            CMD_UDP_ASSOCIATE
        };

        info!("{} -> PROXY[{}]", address, self.proxy);
        let mut stream = connect_tcp(&self.proxy).await?;

        stream.write_all(&METHOD_REQUEST).await?;
        proto::read_method_reply(&mut stream).await?;

        stream.write_all(&proto::build_request(cmd, &dst)).await?;

        let reply = proto::read_reply(&mut stream).await?;
        if !reply.is_success() {
            return Err(DialError::handshake(format!(
                "SOCKS5 CONNECT ERROR: ver {} rep {} ({})",
                reply.ver,
                reply.rep,
                proto::reply_message(reply.rep)
            )));
        }

        if cmd == CMD_UDP_ASSOCIATE {
            debug!("{} udp relay bound at {}", address, reply.bind);
        } else {
            debug!("{} bound at {}", address, reply.bind);
        }

        tune(&stream, None);
        Ok(Connection::Tcp(stream))
    }
}

#[async_trait]
impl Dial for Socks5ProxyDialer {
    async fn dial(&self, network: Network, target: &Target) -> Result<Connection, DialError> {
        self.connect(network, &target.addr, target.is_ip).await
    }
}
