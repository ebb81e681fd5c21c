//! SOCKS5 client-side framing: method selection, requests, replies and the
//! address encoding they share.

use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr};

use tokio::io::{AsyncRead, AsyncReadExt};

use crate::error::DialError;

pub const VER: u8 = 5;
pub const NO_AUTH: u8 = 0;
pub const NO_ACCEPTABLE_METHODS: u8 = 0xff;

pub const CMD_CONNECT: u8 = 1;
pub const CMD_UDP_ASSOCIATE: u8 = 3;

pub const ATYP_IPV4: u8 = 1;
pub const ATYP_DOMAIN: u8 = 3;
pub const ATYP_IPV6: u8 = 4;

pub const REP_SUCCESS: u8 = 0;

/// Method selection advertising only "no authentication required".
pub const METHOD_REQUEST: [u8; 3] = [VER, 1, NO_AUTH];

/// Destination or bound address as framed on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddrSpec {
    V4(Ipv4Addr, u16),
    V6(Ipv6Addr, u16),
    Domain(String, u16),
}

impl AddrSpec {
    /// Builds the spec for `address` (`host:port`).
    ///
    /// With `is_ip` set the host must be an IP literal: a single colon means
    /// IPv4, more than one means IPv6 (optionally bracketed). Otherwise the
    /// address must be exactly `domain:port`.
    pub fn parse(address: &str, is_ip: bool) -> Result<Self, DialError> {
        let invalid_address = || DialError::InvalidAddress(address.to_string());
        let invalid_port = || DialError::InvalidPort(address.to_string());

        let (host, port) = address.rsplit_once(':').ok_or_else(invalid_address)?;
        let colons = address.matches(':').count();

        if is_ip {
            if colons > 1 {
                let host = host
                    .strip_prefix('[')
                    .and_then(|h| h.strip_suffix(']'))
                    .unwrap_or(host);
                let ip: Ipv6Addr = host.parse().map_err(|_| invalid_address())?;
                let port = port.parse().map_err(|_| invalid_port())?;
                Ok(AddrSpec::V6(ip, port))
            } else {
                let ip: Ipv4Addr = host.parse().map_err(|_| invalid_address())?;
                let port = port.parse().map_err(|_| invalid_port())?;
                Ok(AddrSpec::V4(ip, port))
            }
        } else {
            if colons != 1 || host.is_empty() || host.len() > u8::MAX as usize {
                return Err(invalid_address());
            }
            let port = port.parse().map_err(|_| invalid_port())?;
            Ok(AddrSpec::Domain(host.to_string(), port))
        }
    }

    pub fn atyp(&self) -> u8 {
        match self {
            AddrSpec::V4(..) => ATYP_IPV4,
            AddrSpec::V6(..) => ATYP_IPV6,
            AddrSpec::Domain(..) => ATYP_DOMAIN,
        }
    }

    pub fn port(&self) -> u16 {
        match self {
            AddrSpec::V4(_, port) | AddrSpec::V6(_, port) | AddrSpec::Domain(_, port) => *port,
        }
    }

    /// Appends ATYP, address and big-endian port.
    pub fn write_to(&self, buf: &mut Vec<u8>) {
        buf.push(self.atyp());
        match self {
            AddrSpec::V4(ip, _) => buf.extend_from_slice(&ip.octets()),
            AddrSpec::V6(ip, _) => buf.extend_from_slice(&ip.octets()),
            AddrSpec::Domain(host, _) => {
                buf.push(host.len() as u8);
                buf.extend_from_slice(host.as_bytes());
            }
        }
        buf.extend_from_slice(&self.port().to_be_bytes());
    }

    pub async fn read_from<R>(reader: &mut R, atyp: u8) -> Result<Self, DialError>
    where
        R: AsyncRead + Unpin,
    {
        match atyp {
            ATYP_IPV4 => {
                let ip = Ipv4Addr::from(reader.read_u32().await?);
                let port = reader.read_u16().await?;
                Ok(AddrSpec::V4(ip, port))
            }
            ATYP_IPV6 => {
                let ip = Ipv6Addr::from(reader.read_u128().await?);
                let port = reader.read_u16().await?;
                Ok(AddrSpec::V6(ip, port))
            }
            ATYP_DOMAIN => {
                let len = reader.read_u8().await?;
                let mut domain = vec![0u8; len as usize];
                reader.read_exact(&mut domain).await?;
                let port = reader.read_u16().await?;
                Ok(AddrSpec::Domain(
                    String::from_utf8_lossy(&domain).into_owned(),
                    port,
                ))
            }
            t => Err(DialError::handshake(format!(
                "socks5: unknown addr type {}",
                t
            ))),
        }
    }
}

impl fmt::Display for AddrSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AddrSpec::V4(ip, port) => write!(f, "{}:{}", ip, port),
            AddrSpec::V6(ip, port) => write!(f, "[{}]:{}", ip, port),
            AddrSpec::Domain(host, port) => write!(f, "{}:{}", host, port),
        }
    }
}

pub fn build_request(cmd: u8, dst: &AddrSpec) -> Vec<u8> {
    let mut request = Vec::with_capacity(22);
    request.extend_from_slice(&[VER, cmd, 0]);
    dst.write_to(&mut request);
    request
}

/// Reads the two-byte method selection reply and checks for NO AUTH.
pub async fn read_method_reply<R>(reader: &mut R) -> Result<(), DialError>
where
    R: AsyncRead + Unpin,
{
    let mut response = [0u8; 2];
    reader.read_exact(&mut response).await?;

    if response[0] != VER || response[1] != NO_AUTH {
        return Err(DialError::handshake(format!(
            "SOCKS5 METHOD ERROR: ver {} method {}",
            response[0], response[1]
        )));
    }

    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub ver: u8,
    pub rep: u8,
    pub bind: AddrSpec,
}

impl Reply {
    pub fn is_success(&self) -> bool {
        self.ver == VER && self.rep == REP_SUCCESS
    }
}

/// Reads a full reply so the stream is left right after the bound port.
pub async fn read_reply<R>(reader: &mut R) -> Result<Reply, DialError>
where
    R: AsyncRead + Unpin,
{
    let mut header = [0u8; 4];
    reader.read_exact(&mut header).await?;
    let bind = AddrSpec::read_from(reader, header[3]).await?;

    Ok(Reply {
        ver: header[0],
        rep: header[1],
        bind,
    })
}

pub fn reply_message(rep: u8) -> &'static str {
    match rep {
        0 => "succeeded",
        1 => "general SOCKS server failure",
        2 => "connection not allowed by ruleset",
        3 => "network unreachable",
        4 => "host unreachable",
        5 => "connection refused",
        6 => "TTL expired",
        7 => "command not supported",
        8 => "address type not supported",
        _ => "unknown reply",
    }
}
