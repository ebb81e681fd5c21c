use std::io::{Error, ErrorKind, Result};
use std::net::SocketAddr;
use std::pin::Pin;
use std::str::FromStr;
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::{TcpStream, UdpSocket};

/// Transport family of a dial: a byte stream or connected datagrams.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Network {
    Tcp,
    Udp,
}

impl Network {
    pub fn is_stream(self) -> bool {
        self == Network::Tcp
    }
}

impl FromStr for Network {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "tcp" | "tcp4" | "tcp6" => Ok(Network::Tcp),
            "udp" | "udp4" | "udp6" => Ok(Network::Udp),
            n => Err(Error::new(
                ErrorKind::InvalidInput,
                format!("unknown network {}", n),
            )),
        }
    }
}

/// An established connection handed to the caller.
///
/// Reads and writes on the datagram variant map to one datagram each.
#[derive(Debug)]
pub enum Connection {
    Tcp(TcpStream),
    Udp(UdpSocket),
}

impl Connection {
    pub fn peer_addr(&self) -> Result<SocketAddr> {
        match self {
            Connection::Tcp(s) => s.peer_addr(),
            Connection::Udp(s) => s.peer_addr(),
        }
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        match self {
            Connection::Tcp(s) => s.local_addr(),
            Connection::Udp(s) => s.local_addr(),
        }
    }

    pub fn into_tcp(self) -> Option<TcpStream> {
        match self {
            Connection::Tcp(s) => Some(s),
            Connection::Udp(_) => None,
        }
    }
}

impl From<TcpStream> for Connection {
    fn from(stream: TcpStream) -> Self {
        Connection::Tcp(stream)
    }
}

impl From<UdpSocket> for Connection {
    fn from(socket: UdpSocket) -> Self {
        Connection::Udp(socket)
    }
}

impl AsyncRead for Connection {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<Result<()>> {
        match self.get_mut() {
            Connection::Tcp(s) => Pin::new(s).poll_read(cx, buf),
            Connection::Udp(s) => s.poll_recv(cx, buf),
        }
    }
}

impl AsyncWrite for Connection {
    fn poll_write(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &[u8]) -> Poll<Result<usize>> {
        match self.get_mut() {
            Connection::Tcp(s) => Pin::new(s).poll_write(cx, buf),
            Connection::Udp(s) => s.poll_send(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<()>> {
        match self.get_mut() {
            Connection::Tcp(s) => Pin::new(s).poll_flush(cx),
            Connection::Udp(_) => Poll::Ready(Ok(())),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<()>> {
        match self.get_mut() {
            Connection::Tcp(s) => Pin::new(s).poll_shutdown(cx),
            Connection::Udp(_) => Poll::Ready(Ok(())),
        }
    }
}
