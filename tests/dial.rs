use std::net::SocketAddr;
use std::time::Duration;

use proxydial::config::{HTTP_SOCKET_BUFFER, KEEPALIVE_PERIOD};
use proxydial::{DialError, Dialer, DialerConfig, Network, Strategy, Target};
use socket2::SockRef;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// HTTP proxy that answers any CONNECT with `response` and returns the
/// request line it saw.
async fn http_proxy(response: &'static str) -> (SocketAddr, JoinHandle<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let handle = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let mut buf = Vec::new();
        while !buf.ends_with(b"\r\n\r\n") {
            buf.push(stream.read_u8().await.unwrap());
        }
        stream.write_all(response.as_bytes()).await.unwrap();

        // bytes sent together with the header would be dropped by the dialer
        let mut ping = [0u8; 4];
        if stream.read_exact(&mut ping).await.is_ok() {
            let _ = stream.write_all(b"tunnel").await;
        }
        String::from_utf8(buf).unwrap()
    });
    (addr, handle)
}

/// SOCKS5 proxy accepting NO AUTH that returns the raw CONNECT request.
async fn socks5_proxy() -> (SocketAddr, JoinHandle<Vec<u8>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let handle = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let mut methods = [0u8; 3];
        stream.read_exact(&mut methods).await.unwrap();
        assert_eq!(methods, [5, 1, 0]);
        stream.write_all(&[5, 0]).await.unwrap();

        let mut request = vec![0u8; 5];
        stream.read_exact(&mut request).await.unwrap();
        assert_eq!(request[3], 3);
        let mut rest = vec![0u8; request[4] as usize + 2];
        stream.read_exact(&mut rest).await.unwrap();
        request.extend_from_slice(&rest);

        stream
            .write_all(&[5, 0, 0, 1, 0, 0, 0, 0, 0, 0])
            .await
            .unwrap();
        let _ = stream.write_all(b"tunnel").await;
        request
    });
    (addr, handle)
}

#[derive(Debug, PartialEq, Eq)]
struct Buffers {
    recv: usize,
    send: usize,
}

impl Buffers {
    fn of(stream: &TcpStream) -> Self {
        let sock = SockRef::from(stream);
        Self {
            recv: sock.recv_buffer_size().unwrap(),
            send: sock.send_buffer_size().unwrap(),
        }
    }
}

/// Buffer sizes the kernel reports for an untouched socket and for one
/// resized like the HTTP path does.
async fn buffer_baseline() -> (Buffers, Buffers) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let plain = TcpStream::connect(addr).await.unwrap();
    let resized = TcpStream::connect(addr).await.unwrap();
    let sock = SockRef::from(&resized);
    sock.set_recv_buffer_size(HTTP_SOCKET_BUFFER).unwrap();
    sock.set_send_buffer_size(HTTP_SOCKET_BUFFER).unwrap();

    (Buffers::of(&plain), Buffers::of(&resized))
}

fn assert_keepalive(stream: &TcpStream) {
    let sock = SockRef::from(stream);
    assert!(sock.keepalive().unwrap());
    assert_eq!(sock.tcp_keepalive_time().unwrap(), KEEPALIVE_PERIOD);
    #[cfg(target_os = "linux")]
    assert_eq!(sock.tcp_keepalive_interval().unwrap(), KEEPALIVE_PERIOD);
}

fn proxies(http: Option<SocketAddr>, socks5: Option<SocketAddr>) -> Dialer {
    Dialer::new(DialerConfig::new(
        http.map(|a| a.to_string()),
        socks5.map(|a| a.to_string()),
    ))
}

#[tokio::test]
async fn direct_dial_local() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = listener.accept().await;
    });

    let conn = Dialer::default()
        .dial(Strategy::Direct, Network::Tcp, &Target::from(addr))
        .await
        .unwrap();
    assert_eq!(conn.peer_addr().unwrap(), addr);
}

#[tokio::test]
#[ignore = "needs public internet access"]
async fn direct_dial_public_host() {
    let dialer = Dialer::new(DialerConfig::direct_only());
    let conn = dialer
        .dial_direct(Network::Tcp, "93.184.216.34:80")
        .await
        .unwrap();
    assert_eq!(
        conn.peer_addr().unwrap(),
        "93.184.216.34:80".parse::<SocketAddr>().unwrap()
    );
}

#[tokio::test]
async fn socks5_dial_domain() {
    let (proxy, handle) = socks5_proxy().await;
    let dialer = proxies(None, Some(proxy));

    let conn = dialer
        .dial_via_socks5_proxy(Network::Tcp, "example.com:443", false)
        .await
        .unwrap();

    let request = handle.await.unwrap();
    let mut expected = vec![5, 1, 0, 3, 11];
    expected.extend_from_slice(b"example.com");
    expected.extend_from_slice(&443u16.to_be_bytes());
    assert_eq!(request, expected);

    let mut stream = conn.into_tcp().unwrap();
    assert!(stream.nodelay().unwrap());
    assert_keepalive(&stream);

    // buffers are only resized on the HTTP path
    let (plain, resized) = buffer_baseline().await;
    if plain.recv != resized.recv {
        assert_ne!(Buffers::of(&stream).recv, resized.recv);
    }

    let mut buf = [0u8; 6];
    stream.read_exact(&mut buf).await.unwrap();
    assert_eq!(&buf, b"tunnel");
}

#[tokio::test]
async fn http_dial_established() {
    let (proxy, handle) = http_proxy("HTTP/1.1 200 Connection Established\r\n\r\n").await;
    let dialer = proxies(Some(proxy), None);

    let conn = dialer.dial_via_http_proxy("10.0.0.5:22").await.unwrap();

    let mut stream = conn.into_tcp().unwrap();
    assert!(stream.nodelay().unwrap());
    assert_keepalive(&stream);
    let (_, resized) = buffer_baseline().await;
    assert_eq!(Buffers::of(&stream), resized);

    stream.write_all(b"ping").await.unwrap();
    let mut buf = [0u8; 6];
    stream.read_exact(&mut buf).await.unwrap();
    assert_eq!(&buf, b"tunnel");

    assert_eq!(handle.await.unwrap(), "CONNECT 10.0.0.5:22 HTTP/1.1\r\n\r\n");
}

#[tokio::test]
async fn http_dial_forbidden() {
    let (proxy, _handle) = http_proxy("HTTP/1.1 403 Forbidden\r\n\r\n").await;
    let dialer = proxies(Some(proxy), None);

    let err = dialer
        .dial(Strategy::HttpProxy, Network::Tcp, &Target::ip("10.0.0.5:22"))
        .await
        .unwrap_err();
    assert!(matches!(err, DialError::ProxyHandshake(_)));
}

#[tokio::test]
async fn deadline_before_connect() {
    let dialer = Dialer::default();
    let result = dialer
        .dial_until(
            Instant::now(),
            Strategy::Direct,
            Network::Tcp,
            &Target::ip("10.255.255.1:9"),
        )
        .await;
    assert!(matches!(
        result,
        Err(DialError::Canceled) | Err(DialError::Transport(_))
    ));
}

#[tokio::test]
async fn deadline_mid_handshake_closes_transport() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let proxy = listener.local_addr().unwrap();
    let server = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let mut methods = [0u8; 3];
        stream.read_exact(&mut methods).await.unwrap();
        // never answer; the dialer should give up and hang up
        let mut buf = [0u8; 16];
        stream.read(&mut buf).await.unwrap_or(0)
    });

    let dialer = proxies(None, Some(proxy));
    let err = dialer
        .dial_until(
            Instant::now() + Duration::from_millis(200),
            Strategy::Socks5Proxy,
            Network::Tcp,
            &Target::host("example.com:443"),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, DialError::Canceled));

    let n = tokio::time::timeout(Duration::from_secs(5), server)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(n, 0);
}

#[tokio::test]
async fn concurrent_dials_share_config() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let proxy = listener.local_addr().unwrap();
    tokio::spawn(async move {
        loop {
            let (mut stream, _) = listener.accept().await.unwrap();
            tokio::spawn(async move {
                let mut buf = [0u8; 256];
                let _ = stream.read(&mut buf).await;
                let _ = stream.write_all(b"HTTP/1.1 200 OK\r\n\r\n").await;
                let _ = stream.read(&mut buf).await;
            });
        }
    });

    let dialer = proxies(Some(proxy), None);
    let mut handles = Vec::new();
    for i in 0..8 {
        let dialer = dialer.clone();
        handles.push(tokio::spawn(async move {
            dialer
                .dial_via_http_proxy(&format!("10.0.0.{}:22", i))
                .await
                .map(|_| ())
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }
}
