mod direct;
mod http;
mod socks5;

pub use direct::DirectDialer;
pub use http::HttpProxyDialer;
pub use socks5::Socks5ProxyDialer;

use std::io::{Error, ErrorKind, Result};
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use log::debug;
use serde::Deserialize;
use socket2::{SockRef, TcpKeepalive};
use tokio::net::TcpStream;
use tokio::time::{timeout, timeout_at, Instant};

use crate::config::{DialerConfig, CONNECT_TIMEOUT, KEEPALIVE_PERIOD};
use crate::conn::{Connection, Network};
use crate::error::DialError;

/// Destination of a dial. `is_ip` tells the SOCKS5 path whether the host
/// is already an IP literal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub addr: String,
    pub is_ip: bool,
}

impl Target {
    pub fn ip<S: Into<String>>(addr: S) -> Self {
        Self {
            addr: addr.into(),
            is_ip: true,
        }
    }

    pub fn host<S: Into<String>>(addr: S) -> Self {
        Self {
            addr: addr.into(),
            is_ip: false,
        }
    }

    /// Treats the target as an IP literal when its host parses as one.
    pub fn guess<S: Into<String>>(addr: S) -> Self {
        let addr = addr.into();
        let is_ip = addr.parse::<SocketAddr>().is_ok()
            || addr
                .rsplit_once(':')
                .map_or(false, |(host, _)| host.parse::<IpAddr>().is_ok());
        Self { addr, is_ip }
    }
}

impl From<SocketAddr> for Target {
    fn from(addr: SocketAddr) -> Self {
        Target::ip(addr.to_string())
    }
}

#[async_trait]
pub trait Dial: Send + Sync {
    async fn dial(
        &self,
        network: Network,
        target: &Target,
    ) -> std::result::Result<Connection, DialError>;
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Deserialize)]
pub enum Strategy {
    Direct,
    HttpProxy,
    Socks5Proxy,
}

impl FromStr for Strategy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "direct" => Ok(Strategy::Direct),
            "http" | "httpproxy" => Ok(Strategy::HttpProxy),
            "socks5" | "socks5proxy" => Ok(Strategy::Socks5Proxy),
            s => Err(Error::new(
                ErrorKind::InvalidInput,
                format!("unknown strategy {}", s),
            )),
        }
    }
}

/// Dials destinations directly or through the proxies named in its config.
#[derive(Debug, Clone, Default)]
pub struct Dialer {
    config: Arc<DialerConfig>,
}

impl Dialer {
    pub fn new(config: DialerConfig) -> Self {
        Self {
            config: Arc::new(config),
        }
    }

    pub fn config(&self) -> &DialerConfig {
        &self.config
    }

    pub async fn dial_direct(
        &self,
        network: Network,
        address: &str,
    ) -> std::result::Result<Connection, DialError> {
        DirectDialer.connect(network, address).await
    }

    pub async fn dial_via_http_proxy(
        &self,
        address: &str,
    ) -> std::result::Result<Connection, DialError> {
        let proxy = self
            .config
            .http
            .as_deref()
            .ok_or(DialError::ProxyNotConfigured("http"))?;
        HttpProxyDialer::new(proxy).connect(address).await
    }

    pub async fn dial_via_socks5_proxy(
        &self,
        network: Network,
        address: &str,
        is_ip: bool,
    ) -> std::result::Result<Connection, DialError> {
        let proxy = self
            .config
            .socks5
            .as_deref()
            .ok_or(DialError::ProxyNotConfigured("socks5"))?;
        Socks5ProxyDialer::new(proxy)
            .connect(network, address, is_ip)
            .await
    }

    /// The leaf dialer implementing `strategy` with this config's endpoints.
    pub fn select(&self, strategy: Strategy) -> std::result::Result<Box<dyn Dial>, DialError> {
        let dialer: Box<dyn Dial> = match strategy {
            Strategy::Direct => Box::new(DirectDialer),
            Strategy::HttpProxy => match &self.config.http {
                Some(proxy) => Box::new(HttpProxyDialer::new(proxy.as_str())),
                None => return Err(DialError::ProxyNotConfigured("http")),
            },
            Strategy::Socks5Proxy => match &self.config.socks5 {
                Some(proxy) => Box::new(Socks5ProxyDialer::new(proxy.as_str())),
                None => return Err(DialError::ProxyNotConfigured("socks5")),
            },
        };
        Ok(dialer)
    }

    pub async fn dial(
        &self,
        strategy: Strategy,
        network: Network,
        target: &Target,
    ) -> std::result::Result<Connection, DialError> {
        self.select(strategy)?.dial(network, target).await
    }

    /// Like [`Dialer::dial`], abandoning the attempt once `deadline` passes.
    /// The half-open transport is dropped with the abandoned future.
    pub async fn dial_until(
        &self,
        deadline: Instant,
        strategy: Strategy,
        network: Network,
        target: &Target,
    ) -> std::result::Result<Connection, DialError> {
        timeout_at(deadline, self.dial(strategy, network, target))
            .await
            .map_err(|_| DialError::Canceled)?
    }
}

pub(crate) fn unsupported_datagram(proxy: &str) -> DialError {
    DialError::Transport(Error::new(
        ErrorKind::Unsupported,
        format!("{} proxy cannot carry datagrams", proxy),
    ))
}

/// Opens a TCP connection bounded by [`CONNECT_TIMEOUT`] with keepalive on.
pub(crate) async fn connect_tcp(addr: &str) -> Result<TcpStream> {
    let stream = timeout(CONNECT_TIMEOUT, TcpStream::connect(addr))
        .await
        .map_err(|_| Error::new(ErrorKind::TimedOut, format!("connect {} timed out", addr)))??;

    set_keepalive(&stream);
    Ok(stream)
}

fn set_keepalive(stream: &TcpStream) {
    let keepalive = TcpKeepalive::new().with_time(KEEPALIVE_PERIOD);
    #[cfg(any(
        target_os = "android",
        target_os = "freebsd",
        target_os = "ios",
        target_os = "linux",
        target_os = "macos",
        target_os = "netbsd",
        target_os = "windows",
    ))]
    let keepalive = keepalive.with_interval(KEEPALIVE_PERIOD);
    if let Err(e) = SockRef::from(stream).set_tcp_keepalive(&keepalive) {
        debug!("set keepalive failed: {}", e);
    }
}

/// Best-effort post-handshake tuning. Failures are logged and ignored.
pub(crate) fn tune(stream: &TcpStream, buffer_size: Option<usize>) {
    if let Err(e) = stream.set_nodelay(true) {
        debug!("set nodelay failed: {}", e);
    }
    set_keepalive(stream);

    if let Some(size) = buffer_size {
        let sock = SockRef::from(stream);
        if let Err(e) = sock.set_recv_buffer_size(size) {
            debug!("set recv buffer failed: {}", e);
        }
        if let Err(e) = sock.set_send_buffer_size(size) {
            debug!("set send buffer failed: {}", e);
        }
    }
}
