//! Transport abstraction (TCP with optional TLS vs Unix socket)

use crate::client::{ConnectTarget, TlsMaterial};
use crate::connection::tls;
use crate::connection::TransportOpener;
use crate::{Error, Result};
use bytes::BytesMut;
use std::path::Path;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpStream, UnixStream};

/// TCP stream variant: plain or TLS-encrypted
#[allow(clippy::large_enum_variant)]
pub enum TcpVariant {
    /// Plain TCP connection
    Plain(TcpStream),
    /// TLS-encrypted TCP connection
    Tls(tokio_rustls::client::TlsStream<TcpStream>),
}

impl std::fmt::Debug for TcpVariant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TcpVariant::Plain(_) => f.write_str("TcpVariant::Plain(TcpStream)"),
            TcpVariant::Tls(_) => f.write_str("TcpVariant::Tls(TlsStream)"),
        }
    }
}

impl TcpVariant {
    /// Write all bytes to the stream
    pub async fn write_all(&mut self, buf: &[u8]) -> Result<()> {
        match self {
            TcpVariant::Plain(stream) => stream.write_all(buf).await?,
            TcpVariant::Tls(stream) => stream.write_all(buf).await?,
        }
        Ok(())
    }

    /// Flush the stream
    pub async fn flush(&mut self) -> Result<()> {
        match self {
            TcpVariant::Plain(stream) => stream.flush().await?,
            TcpVariant::Tls(stream) => stream.flush().await?,
        }
        Ok(())
    }

    /// Read into buffer
    pub async fn read_buf(&mut self, buf: &mut BytesMut) -> Result<usize> {
        let n = match self {
            TcpVariant::Plain(stream) => stream.read_buf(buf).await?,
            TcpVariant::Tls(stream) => stream.read_buf(buf).await?,
        };
        Ok(n)
    }

    /// Shutdown the stream
    pub async fn shutdown(&mut self) -> Result<()> {
        match self {
            TcpVariant::Plain(stream) => stream.shutdown().await?,
            TcpVariant::Tls(stream) => stream.shutdown().await?,
        }
        Ok(())
    }

    /// Whether the stream is TLS-encrypted
    pub fn is_tls(&self) -> bool {
        matches!(self, TcpVariant::Tls(_))
    }
}

/// Transport layer abstraction
#[derive(Debug)]
#[allow(clippy::large_enum_variant)]
pub enum Transport {
    /// TCP socket (plain or TLS)
    Tcp(TcpVariant),
    /// Unix domain socket
    Unix(UnixStream),
}

impl Transport {
    /// Connect via plain TCP
    pub async fn connect_tcp(host: &str, port: u16) -> Result<Self> {
        let stream = TcpStream::connect((host, port)).await?;
        Ok(Transport::Tcp(TcpVariant::Plain(stream)))
    }

    /// Connect via TLS-encrypted TCP
    pub async fn connect_tcp_tls(host: &str, port: u16, material: &TlsMaterial) -> Result<Self> {
        let tcp_stream = TcpStream::connect((host, port)).await?;

        let server_name = tls::server_name(host)?;
        let client_config = tls::client_config(material)?;
        let tls_connector = tokio_rustls::TlsConnector::from(client_config);
        let tls_stream = tls_connector
            .connect(server_name, tcp_stream)
            .await
            .map_err(|e| Error::Tls(format!("TLS handshake with {} failed: {}", host, e)))?;

        Ok(Transport::Tcp(TcpVariant::Tls(tls_stream)))
    }

    /// Connect via Unix socket
    pub async fn connect_unix(path: &Path) -> Result<Self> {
        let stream = UnixStream::connect(path).await?;
        Ok(Transport::Unix(stream))
    }

    /// Write bytes to the transport
    pub async fn write_all(&mut self, buf: &[u8]) -> Result<()> {
        match self {
            Transport::Tcp(variant) => variant.write_all(buf).await?,
            Transport::Unix(stream) => stream.write_all(buf).await?,
        }
        Ok(())
    }

    /// Flush the transport
    pub async fn flush(&mut self) -> Result<()> {
        match self {
            Transport::Tcp(variant) => variant.flush().await?,
            Transport::Unix(stream) => stream.flush().await?,
        }
        Ok(())
    }

    /// Read bytes into buffer
    pub async fn read_buf(&mut self, buf: &mut BytesMut) -> Result<usize> {
        let n = match self {
            Transport::Tcp(variant) => variant.read_buf(buf).await?,
            Transport::Unix(stream) => stream.read_buf(buf).await?,
        };
        Ok(n)
    }

    /// Shutdown the transport
    pub async fn shutdown(&mut self) -> Result<()> {
        match self {
            Transport::Tcp(variant) => variant.shutdown().await?,
            Transport::Unix(stream) => stream.shutdown().await?,
        }
        Ok(())
    }

    /// Whether the transport is TLS-encrypted
    pub fn is_tls(&self) -> bool {
        match self {
            Transport::Tcp(variant) => variant.is_tls(),
            Transport::Unix(_) => false,
        }
    }
}

/// The real network opener: dials TCP (with TLS when material is present)
/// or Unix sockets.
///
/// Dial failures and dial timeouts are network errors, so the failover
/// loop advances past them. TLS handshake and certificate problems are
/// not: every router of a farm shares the TLS deployment, so retrying
/// elsewhere cannot help.
#[derive(Debug, Clone, Copy, Default)]
pub struct NetOpener;

impl TransportOpener for NetOpener {
    type Handle = Transport;

    async fn open(
        &self,
        target: &ConnectTarget,
        tls_material: Option<&TlsMaterial>,
        timeout: Duration,
    ) -> Result<Transport> {
        let dial = async {
            match target {
                ConnectTarget::Tcp { host, port } => match tls_material {
                    Some(material) => Transport::connect_tcp_tls(host, *port, material).await,
                    None => Transport::connect_tcp(host, *port).await,
                },
                // TLS material never applies to local sockets
                ConnectTarget::Socket { path } => Transport::connect_unix(path).await,
            }
        };

        match tokio::time::timeout(timeout, dial).await {
            Ok(Ok(transport)) => Ok(transport),
            Ok(Err(Error::Io(err))) => Err(Error::Network(err)),
            Ok(Err(err)) => Err(err),
            Err(_elapsed) => Err(Error::Network(std::io::Error::new(
                std::io::ErrorKind::TimedOut,
                format!("connection to {} timed out", target),
            ))),
        }
    }
}
