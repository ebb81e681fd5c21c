use std::io::{Error, ErrorKind, Result};
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
pub const KEEPALIVE_PERIOD: Duration = Duration::from_secs(30);

/// Socket send/recv buffer size applied after a successful HTTP CONNECT.
pub const HTTP_SOCKET_BUFFER: usize = 1024 * 1024;

/// Scratch buffer the HTTP CONNECT response header must fit into.
pub const HTTP_RESPONSE_BUFFER: usize = 256;

/// Upstream proxy endpoints. Immutable once a dialer owns it.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct DialerConfig {
    pub http: Option<String>,
    pub socks5: Option<String>,
}

impl DialerConfig {
    pub fn new(http: Option<String>, socks5: Option<String>) -> Self {
        Self { http, socks5 }
    }

    pub fn direct_only() -> Self {
        Self::default()
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub proxy: DialerConfig,
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::new(ErrorKind::InvalidData, e))
    }
}
