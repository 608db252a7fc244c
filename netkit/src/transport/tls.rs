//! Blocking TLS transport on top of [`super::tcp`], built with `rustls` in
//! its synchronous `Stream` mode rather than an async integration — this
//! crate's whole transport layer is blocking-socket-based, so `rustls`
//! sits directly over `std::net::TcpStream` with no `tokio-rustls` wrapper
//! layer in between.

use std::fs::File;
use std::io::{self, BufReader, Read, Write};
use std::net::TcpStream;
use std::os::unix::io::{AsRawFd, RawFd};
use std::path::Path;
use std::sync::Arc;

use rustls::{ClientConfig, ClientConnection, ServerConfig, ServerConnection, StreamOwned};
use rustls_pki_types::{CertificateDer, PrivateKeyDer, ServerName};

use crate::error::{NetError, Result};

use super::tcp::TcpClient;

/// Certificate/key material and the derived `rustls` configs, shared across
/// every connection a [`TlsServer`] or [`TlsClient`] accepts or opens.
pub struct TlsContext {
    server_config: Option<Arc<ServerConfig>>,
    client_config: Arc<ClientConfig>,
}

impl TlsContext {
    /// Builds a server-capable context from a PEM certificate chain and
    /// private key on disk.
    pub fn from_pem_files(cert_path: impl AsRef<Path>, key_path: impl AsRef<Path>) -> Result<Self> {
        let certs = load_certs(cert_path.as_ref())?;
        let key = load_private_key(key_path.as_ref())?;

        let server_config = ServerConfig::builder()
            .with_no_client_auth()
            .with_single_cert(certs, key)
            .map_err(|e| NetError::Tls(e.to_string()))?;

        Ok(Self {
            server_config: Some(Arc::new(server_config)),
            client_config: Arc::new(default_client_config(rustls::RootCertStore::empty())?),
        })
    }

    /// Builds a client-only context with an empty trust store: useful as a
    /// base when the embedder is about to add its own roots, but unable to
    /// verify any server on its own.
    pub fn client_only() -> Result<Self> {
        Ok(Self {
            server_config: None,
            client_config: Arc::new(default_client_config(rustls::RootCertStore::empty())?),
        })
    }

    /// Builds a client-only context trusting exactly the certificates in
    /// `pem_path` — the shape an embedder reaches for to pin a self-signed
    /// or privately-issued server cert rather than a public CA chain. This
    /// crate doesn't reach for a system trust store via `rustls-native-certs`;
    /// an embedder with a public CA bundle can pass its PEM file here just
    /// the same.
    pub fn client_trusting(pem_path: impl AsRef<Path>) -> Result<Self> {
        let certs = load_certs(pem_path.as_ref())?;
        let mut roots = rustls::RootCertStore::empty();
        for cert in certs {
            roots
                .add(cert)
                .map_err(|e| NetError::Tls(format!("failed to add trusted cert: {e}")))?;
        }
        Ok(Self {
            server_config: None,
            client_config: Arc::new(default_client_config(roots)?),
        })
    }
}

fn default_client_config(roots: rustls::RootCertStore) -> Result<ClientConfig> {
    Ok(ClientConfig::builder()
        .with_root_certificates(roots)
        .with_no_client_auth())
}

fn load_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>> {
    let file = File::open(path).map_err(|e| NetError::io("open cert file", e))?;
    let mut reader = BufReader::new(file);
    rustls_pemfile::certs(&mut reader)
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| NetError::Tls(format!("failed to parse certificate chain: {e}")))
}

fn load_private_key(path: &Path) -> Result<PrivateKeyDer<'static>> {
    let file = File::open(path).map_err(|e| NetError::io("open key file", e))?;
    let mut reader = BufReader::new(file);
    rustls_pemfile::private_key(&mut reader)
        .map_err(|e| NetError::Tls(format!("failed to parse private key: {e}")))?
        .ok_or_else(|| NetError::Tls("no private key found in file".into()))
}

/// A TLS-wrapped, already-accepted TCP connection on the server side.
pub struct TlsServer {
    context: Arc<ServerConfig>,
}

impl TlsServer {
    pub fn new(ctx: &TlsContext) -> Result<Self> {
        let context = ctx
            .server_config
            .clone()
            .ok_or_else(|| NetError::Config("TlsContext has no server certificate loaded".into()))?;
        Ok(Self { context })
    }

    /// Performs the server-side TLS handshake over an already-accepted TCP
    /// stream, blocking until complete.
    pub fn accept(&self, tcp: TcpClient) -> Result<TlsStream> {
        let conn = ServerConnection::new(self.context.clone())
            .map_err(|e| NetError::Tls(e.to_string()))?;
        let stream = StreamOwned::new(conn, tcp.into_stream());
        Ok(TlsStream::Server(stream))
    }
}

/// A TLS client able to dial a remote [`TcpServer`] counterpart.
pub struct TlsClient {
    config: Arc<ClientConfig>,
}

impl TlsClient {
    pub fn new(ctx: &TlsContext) -> Self {
        Self {
            config: ctx.client_config.clone(),
        }
    }

    /// Connects to `endpoint`, then performs the client-side TLS handshake
    /// with `sni_name` as the `ServerName`.
    pub fn connect(&self, endpoint: &str, sni_name: &str) -> Result<TlsStream> {
        let tcp = TcpClient::connect(endpoint)?;
        let name = ServerName::try_from(sni_name.to_string())
            .map_err(|e| NetError::Tls(format!("invalid server name {sni_name}: {e}")))?;
        let conn = ClientConnection::new(self.config.clone(), name)
            .map_err(|e| NetError::Tls(e.to_string()))?;
        let stream = StreamOwned::new(conn, tcp.into_stream());
        Ok(TlsStream::Client(stream))
    }
}

/// Either half of a blocking TLS connection, implementing `Read`/`Write`
/// so the HTTP codec can treat it exactly like a plain `TcpStream`.
pub enum TlsStream {
    Server(StreamOwned<ServerConnection, TcpStream>),
    Client(StreamOwned<ClientConnection, TcpStream>),
}

impl io::Read for TlsStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            TlsStream::Server(s) => s.read(buf),
            TlsStream::Client(s) => s.read(buf),
        }
    }
}

impl io::Write for TlsStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            TlsStream::Server(s) => s.write(buf),
            TlsStream::Client(s) => s.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            TlsStream::Server(s) => s.flush(),
            TlsStream::Client(s) => s.flush(),
        }
    }
}

impl AsRawFd for TlsStream {
    fn as_raw_fd(&self) -> RawFd {
        match self {
            TlsStream::Server(s) => s.sock.as_raw_fd(),
            TlsStream::Client(s) => s.sock.as_raw_fd(),
        }
    }
}
