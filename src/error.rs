use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DialError {
    #[error("transport: {0}")]
    Transport(#[from] io::Error),

    #[error("{0}")]
    ProxyHandshake(String),

    #[error("Invalid address for socks proxy: {0}")]
    InvalidAddress(String),

    #[error("Invalid port for socks proxy: {0}")]
    InvalidPort(String),

    #[error("dial canceled")]
    Canceled,

    #[error("{0} proxy is not configured")]
    ProxyNotConfigured(&'static str),
}

impl DialError {
    pub(crate) fn handshake<S: Into<String>>(msg: S) -> Self {
        DialError::ProxyHandshake(msg.into())
    }
}

impl From<DialError> for io::Error {
    fn from(e: DialError) -> Self {
        match e {
            DialError::Transport(e) => e,
            DialError::Canceled => io::Error::new(io::ErrorKind::TimedOut, e),
            DialError::InvalidAddress(_) | DialError::InvalidPort(_) => {
                io::Error::new(io::ErrorKind::InvalidInput, e)
            }
            e => io::Error::new(io::ErrorKind::Other, e),
        }
    }
}
