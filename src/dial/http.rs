use std::io::{Error, ErrorKind};

use async_trait::async_trait;
use log::{debug, info};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};

use super::{connect_tcp, tune, unsupported_datagram, Dial, Target};
use crate::config::{HTTP_RESPONSE_BUFFER, HTTP_SOCKET_BUFFER};
use crate::conn::{Connection, Network};
use crate::error::DialError;

const HEADER_END: &[u8] = b"\r\n\r\n";

/// Tunnels through an HTTP proxy with a bare `CONNECT` request.
#[derive(Debug, Clone)]
pub struct HttpProxyDialer {
    proxy: String,
}

impl HttpProxyDialer {
    pub fn new<S: Into<String>>(proxy: S) -> Self {
        Self {
            proxy: proxy.into(),
        }
    }

    /// `address` is the final destination and is sent verbatim.
    pub async fn connect(&self, address: &str) -> Result<Connection, DialError> {
        info!("{} -> PROXY[{}]", address, self.proxy);

        let mut stream = connect_tcp(&self.proxy).await?;
        let req = format!("CONNECT {} HTTP/1.1\r\n\r\n", address);
        stream.write_all(req.as_bytes()).await?;

        let header = read_response_header(&mut stream).await?;
        if !is_established(&header) {
            debug!(
                "{} proxy response: {}",
                self.proxy,
                String::from_utf8_lossy(&header).trim_end()
            );
            return Err(DialError::handshake("PROXY CONNECT ERROR"));
        }

        tune(&stream, Some(HTTP_SOCKET_BUFFER));
        Ok(Connection::Tcp(stream))
    }
}

#[async_trait]
impl Dial for HttpProxyDialer {
    async fn dial(&self, network: Network, target: &Target) -> Result<Connection, DialError> {
        if !network.is_stream() {
            return Err(unsupported_datagram("http"));
        }
        self.connect(&target.addr).await
    }
}

/// Reads until the blank line ending the response header, which must fit in
/// [`HTTP_RESPONSE_BUFFER`] bytes. Bytes read past it are discarded.
async fn read_response_header<R>(reader: &mut R) -> Result<Vec<u8>, DialError>
where
    R: AsyncRead + Unpin,
{
    let mut buf = [0u8; HTTP_RESPONSE_BUFFER];
    let mut len = 0;

    loop {
        if len == buf.len() {
            return Err(DialError::handshake("proxy response too large"));
        }

        let size = reader.read(&mut buf[len..]).await?;
        if size == 0 {
            return Err(Error::new(ErrorKind::UnexpectedEof, "proxy closed").into());
        }

        let scanned = len;
        len += size;

        if let Some(end) = find_header_end(&buf[..len], scanned) {
            if end < len {
                debug!("dropping {} bytes after proxy response header", len - end);
            }
            return Ok(buf[..end].to_vec());
        }
    }
}

/// Offset just past the first `\r\n\r\n`, looking only at windows that
/// overlap bytes from `from` onwards.
fn find_header_end(buf: &[u8], from: usize) -> Option<usize> {
    let start = from.saturating_sub(HEADER_END.len() - 1);
    buf[start..]
        .windows(HEADER_END.len())
        .position(|w| w == HEADER_END)
        .map(|pos| start + pos + HEADER_END.len())
}

fn is_established(header: &[u8]) -> bool {
    header.windows(3).any(|w| w == b"200")
}
