//! Length-prefixed message transport over TCP, optionally wrapped in TLS.
//!
//! Every message on the socket is a 4-byte unsigned length in native byte
//! order followed by that many payload bytes.

#[cfg(feature = "tls")]
mod tls;

use std::future::Future;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, trace};

use crate::{Result, ScannerError};

#[cfg(feature = "tls")]
pub use tls::TlsIdentity;

/// Default port of the plaintext protocol.
pub const DEFAULT_PORT: u16 = 8000;

/// Default port of the TLS protocol.
pub const DEFAULT_TLS_PORT: u16 = 8800;

/// Largest payload accepted from the peer.
pub const MAX_FRAME_LEN: usize = 64 * 1024 * 1024;

/// A byte stream a connection can run on.
pub trait AsyncStream: AsyncRead + AsyncWrite + Send + Unpin + 'static {}

impl<T: AsyncRead + AsyncWrite + Send + Unpin + 'static> AsyncStream for T {}

/// Plain or TLS socket behind one type.
pub type BoxedStream = Box<dyn AsyncStream>;

/// Host and port of a device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    /// Parses `host`, `host:port`, `[v6]`, `[v6]:port` or a bare IPv6 literal.
    pub fn parse(address: &str, default_port: u16) -> Result<Self> {
        let address = address.trim();
        if address.is_empty() {
            return Err(ScannerError::connection_aborted("empty device address"));
        }

        if let Some(rest) = address.strip_prefix('[') {
            let (host, tail) = rest.split_once(']').ok_or_else(|| {
                ScannerError::connection_aborted(format!("unterminated IPv6 address '{}'", address))
            })?;
            let port = match tail.strip_prefix(':') {
                Some(port) => parse_port(address, port)?,
                None if tail.is_empty() => default_port,
                None => {
                    return Err(ScannerError::connection_aborted(format!(
                        "unexpected characters after IPv6 address '{}'",
                        address
                    )));
                }
            };
            return Ok(Self { host: host.to_string(), port });
        }

        match address.matches(':').count() {
            0 => Ok(Self { host: address.to_string(), port: default_port }),
            1 => {
                let (host, port) = address.split_once(':').unwrap_or((address, ""));
                Ok(Self { host: host.to_string(), port: parse_port(address, port)? })
            }
            // Bare IPv6 literal
            _ => Ok(Self { host: address.to_string(), port: default_port }),
        }
    }
}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

fn parse_port(address: &str, port: &str) -> Result<u16> {
    port.parse::<u16>().map_err(|e| {
        ScannerError::connection_aborted_with_source(
            format!("invalid port in device address '{}'", address),
            e,
        )
    })
}

/// How to reach a device.
#[derive(Clone, Default)]
pub struct ConnectOptions {
    pub connect_timeout: Option<Duration>,
    #[cfg(feature = "tls")]
    pub tls: Option<TlsIdentity>,
}

impl ConnectOptions {
    /// Port used when the address does not name one.
    pub fn default_port(&self) -> u16 {
        #[cfg(feature = "tls")]
        if self.tls.is_some() {
            return DEFAULT_TLS_PORT;
        }
        DEFAULT_PORT
    }
}

impl std::fmt::Debug for ConnectOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut debug = f.debug_struct("ConnectOptions");
        debug.field("connect_timeout", &self.connect_timeout);
        #[cfg(feature = "tls")]
        debug.field("tls", &self.tls.is_some());
        debug.finish()
    }
}

/// Resolves, connects and (if configured) performs the TLS handshake.
///
/// The whole sequence races against `connect_timeout`; a connect that fails
/// after the timer fired is still reported as a timeout.
pub async fn connect(endpoint: &Endpoint, options: &ConnectOptions) -> Result<BoxedStream> {
    debug!("Connecting to {}", endpoint);
    let attempt = async {
        let tcp = TcpStream::connect((endpoint.host.as_str(), endpoint.port)).await.map_err(|e| {
            ScannerError::connection_aborted_with_source(
                format!("failed to connect to {}", endpoint),
                e,
            )
        })?;
        tcp.set_nodelay(true).map_err(|e| {
            ScannerError::connection_aborted_with_source("failed to configure socket", e)
        })?;

        #[cfg(feature = "tls")]
        if let Some(identity) = &options.tls {
            let stream = identity.handshake(&endpoint.host, tcp).await?;
            return Ok(Box::new(stream) as BoxedStream);
        }

        Ok::<BoxedStream, ScannerError>(Box::new(tcp))
    };

    let stream = within_timeout("connect", options.connect_timeout, attempt).await?;
    debug!("Connected to {}", endpoint);
    Ok(stream)
}

/// Runs `operation`, failing with a transport fault if `timeout` elapses first.
pub async fn within_timeout<T, F>(operation: &str, timeout: Option<Duration>, future: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match timeout {
        Some(duration) => tokio::time::timeout(duration, future)
            .await
            .map_err(|_| ScannerError::timed_out(operation, duration))?,
        None => future.await,
    }
}

/// Writes one length-prefixed message.
pub async fn write_framed<W>(writer: &mut W, payload: &[u8]) -> Result<()>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    let len = u32::try_from(payload.len()).map_err(|_| {
        ScannerError::connection_aborted(format!(
            "message of {} bytes exceeds the frame length limit",
            payload.len()
        ))
    })?;

    let mut frame = Vec::with_capacity(4 + payload.len());
    frame.extend_from_slice(&len.to_ne_bytes());
    frame.extend_from_slice(payload);

    writer.write_all(&frame).await.map_err(write_failed)?;
    writer.flush().await.map_err(write_failed)?;
    trace!("Wrote message of {} bytes", payload.len());
    Ok(())
}

/// Reads one length-prefixed message.
///
/// `timeout` bounds the whole message, prefix included.
pub async fn read_framed<R>(reader: &mut R, timeout: Option<Duration>) -> Result<Vec<u8>>
where
    R: AsyncRead + Unpin + ?Sized,
{
    within_timeout("read", timeout, async {
        let mut prefix = [0u8; 4];
        reader.read_exact(&mut prefix).await.map_err(read_failed)?;

        let len = u32::from_ne_bytes(prefix) as usize;
        if len > MAX_FRAME_LEN {
            return Err(ScannerError::connection_aborted(format!(
                "peer announced a message of {} bytes (limit {})",
                len, MAX_FRAME_LEN
            )));
        }

        let mut payload = vec![0u8; len];
        reader.read_exact(&mut payload).await.map_err(read_failed)?;
        trace!("Read message of {} bytes", len);
        Ok(payload)
    })
    .await
}

fn read_failed(e: std::io::Error) -> ScannerError {
    if e.kind() == std::io::ErrorKind::UnexpectedEof {
        ScannerError::connection_aborted_with_source("connection closed by peer", e)
    } else {
        ScannerError::connection_aborted_with_source("failed to read from socket", e)
    }
}

fn write_failed(e: std::io::Error) -> ScannerError {
    ScannerError::connection_aborted_with_source("failed to write to socket", e)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[test]
    fn endpoint_parsing() {
        let cases = [
            ("scanner", "scanner", DEFAULT_PORT),
            ("scanner:9000", "scanner", 9000),
            ("192.168.26.26", "192.168.26.26", DEFAULT_PORT),
            ("[fe80::1]", "fe80::1", DEFAULT_PORT),
            ("[fe80::1]:8800", "fe80::1", 8800),
            ("fe80::1", "fe80::1", DEFAULT_PORT),
            ("  scanner  ", "scanner", DEFAULT_PORT),
        ];
        for (input, host, port) in cases {
            let endpoint = Endpoint::parse(input, DEFAULT_PORT).unwrap();
            assert_eq!(endpoint, Endpoint { host: host.to_string(), port }, "{input}");
        }
    }

    #[test]
    fn endpoint_rejects_bad_ports() {
        for input in ["", "scanner:", "scanner:99999", "[fe80::1", "[fe80::1]x"] {
            let err = Endpoint::parse(input, DEFAULT_PORT).unwrap_err();
            assert!(matches!(err, ScannerError::ConnectionAbort { .. }), "{input}");
        }
    }

    #[test]
    fn endpoint_display_brackets_ipv6() {
        let endpoint = Endpoint::parse("fe80::1", 8000).unwrap();
        assert_eq!(endpoint.to_string(), "[fe80::1]:8000");
    }

    #[tokio::test]
    async fn framed_messages_survive_the_socket() {
        let (mut client, mut server) = tokio::io::duplex(1024);

        write_framed(&mut client, b"hello").await.unwrap();
        write_framed(&mut client, b"").await.unwrap();

        assert_eq!(read_framed(&mut server, None).await.unwrap(), b"hello");
        assert_eq!(read_framed(&mut server, None).await.unwrap(), b"");
    }

    #[tokio::test]
    async fn length_prefix_is_native_endian() {
        let (mut client, mut server) = tokio::io::duplex(64);
        write_framed(&mut client, &[7, 8, 9]).await.unwrap();

        let mut raw = [0u8; 7];
        server.read_exact(&mut raw).await.unwrap();
        assert_eq!(raw[..4], 3u32.to_ne_bytes());
        assert_eq!(raw[4..], [7, 8, 9]);
    }

    #[tokio::test]
    async fn short_read_is_a_connection_abort() {
        let (mut client, mut server) = tokio::io::duplex(64);
        client.write_all(&10u32.to_ne_bytes()).await.unwrap();
        client.write_all(&[1, 2, 3]).await.unwrap();
        drop(client);

        let err = read_framed(&mut server, None).await.unwrap_err();
        assert!(matches!(err, ScannerError::ConnectionAbort { .. }));
    }

    #[tokio::test]
    async fn oversized_prefix_is_rejected() {
        let (mut client, mut server) = tokio::io::duplex(64);
        client.write_all(&u32::MAX.to_ne_bytes()).await.unwrap();

        let err = read_framed(&mut server, None).await.unwrap_err();
        assert!(err.to_string().contains("limit"));
    }

    #[tokio::test]
    async fn read_timeout_elapses() {
        let (_client, mut server) = tokio::io::duplex(64);
        let started = Instant::now();
        let err = read_framed(&mut server, Some(Duration::from_millis(100))).await.unwrap_err();
        assert!(matches!(err, ScannerError::ConnectionAbort { .. }));
        assert!(started.elapsed() >= Duration::from_millis(100));
    }

    #[tokio::test]
    async fn timeout_races_a_hanging_connect() {
        let started = Instant::now();
        let hanging = std::future::pending::<Result<()>>();
        let err = within_timeout("connect", Some(Duration::from_millis(300)), hanging)
            .await
            .unwrap_err();

        let elapsed = started.elapsed();
        assert!(matches!(err, ScannerError::ConnectionAbort { .. }));
        assert!(elapsed >= Duration::from_millis(300), "returned too early: {elapsed:?}");
        assert!(elapsed < Duration::from_secs(3), "returned too late: {elapsed:?}");
    }

    #[tokio::test]
    async fn refused_connect_is_a_connection_abort() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let endpoint = Endpoint { host: "127.0.0.1".to_string(), port };
        let options =
            ConnectOptions { connect_timeout: Some(Duration::from_secs(1)), ..Default::default() };
        let err = connect(&endpoint, &options).await.err().unwrap();
        assert!(matches!(err, ScannerError::ConnectionAbort { .. }));
    }

    #[tokio::test]
    #[ignore = "network_required"]
    async fn unreachable_host_times_out_after_configured_duration() {
        let endpoint = Endpoint { host: "10.255.255.1".to_string(), port: DEFAULT_PORT };
        let options =
            ConnectOptions { connect_timeout: Some(Duration::from_secs(1)), ..Default::default() };

        let started = Instant::now();
        let err = connect(&endpoint, &options).await.err().unwrap();
        let elapsed = started.elapsed();

        assert!(matches!(err, ScannerError::ConnectionAbort { .. }));
        assert!(elapsed >= Duration::from_millis(900));
        assert!(elapsed < Duration::from_secs(3));
    }
}
