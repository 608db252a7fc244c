//! Blocking HTTP client with every verb spec §4.7 + the original source's
//! `HttpClient` name (`original_source/net/application/include/http_client.hpp`):
//! GET/POST/PUT/DELETE/HEAD/OPTIONS/PATCH/CONNECT/TRACE. Each verb has a
//! synchronous form plus an async-via-worker-pool form that returns a
//! [`crate::pool::TaskHandle`].

use std::io::{Read, Write};
use std::sync::Arc;

use crate::error::{NetError, Result};
use crate::http::{Headers, HttpCodec, HttpMethod, HttpRequest, HttpResponse};
use crate::pool::{TaskHandle, WorkerPool};
use crate::server::ConnStream;
use crate::transport::TcpClient;

#[cfg(feature = "tls")]
use crate::transport::{TlsClient, TlsContext};

/// A single-connection HTTP client: one connection, opened once and kept
/// across calls, and one codec per client instance (spec §4.7's "no
/// implicit connection pooling inside a single client instance" — pooling
/// across clients is the forward proxy's job, see
/// [`crate::http::HttpClientPool`]).
pub struct HttpClient {
    endpoint: String,
    host_header: String,
    #[cfg(feature = "tls")]
    tls: Option<Arc<TlsContext>>,
    pool: Option<Arc<WorkerPool>>,
    conn: parking_lot::Mutex<Option<(ConnStream, HttpCodec)>>,
}

impl HttpClient {
    pub fn new(endpoint: impl Into<String>) -> Self {
        let endpoint = endpoint.into();
        let host_header = endpoint.clone();
        Self {
            endpoint,
            host_header,
            #[cfg(feature = "tls")]
            tls: None,
            pool: None,
            conn: parking_lot::Mutex::new(None),
        }
    }

    #[cfg(feature = "tls")]
    pub fn with_tls(mut self, ctx: Arc<TlsContext>) -> Self {
        self.tls = Some(ctx);
        self
    }

    /// Attaches a worker pool so `*_async` methods have somewhere to run.
    pub fn with_worker_pool(mut self, pool: Arc<WorkerPool>) -> Self {
        self.pool = Some(pool);
        self
    }

    fn open(&self) -> Result<ConnStream> {
        #[cfg(feature = "tls")]
        if let Some(ctx) = &self.tls {
            let host = self.host_header.split(':').next().unwrap_or(&self.host_header);
            let client = TlsClient::new(ctx);
            return Ok(ConnStream::Tls(client.connect(&self.endpoint, host)?));
        }
        let tcp = TcpClient::connect(&self.endpoint)?;
        Ok(ConnStream::Plain(tcp.into_stream()))
    }

    /// Dials the endpoint if this client doesn't already hold a live
    /// connection. A no-op when already connected, so callers can call it
    /// up front or just let [`send`](Self::send) lazily connect on first
    /// use.
    pub fn connect_server(&self) -> Result<()> {
        let mut guard = self.conn.lock();
        if guard.is_some() {
            return Ok(());
        }
        let stream = self.open()?;
        *guard = Some((stream, HttpCodec::new_client()));
        Ok(())
    }

    /// Drops the held connection, if any. The next [`send`](Self::send)
    /// reconnects.
    pub fn close(&self) {
        *self.conn.lock() = None;
    }

    /// Sends one request on the client's persistent connection, dialing it
    /// first if necessary, and returns the response.
    pub fn send(&self, mut request: HttpRequest) -> Result<HttpResponse> {
        if !request.headers.contains("Host") {
            request.headers.insert("Host", self.host_header.clone());
        }
        if !request.headers.contains("Content-Length") {
            request
                .headers
                .insert("Content-Length", request.body.len().to_string());
        }
        self.connect_server()?;
        let mut guard = self.conn.lock();
        let (stream, codec) = guard
            .as_mut()
            .expect("connect_server just ensured a connection");
        codec.write_request(stream, &request)?;
        codec.read_response(stream)
    }

    /// Writes raw bytes straight to the held connection, bypassing the
    /// HTTP codec. For callers (e.g. [`crate::ws::WebSocketClient`]) that
    /// have upgraded this connection to another protocol and need to keep
    /// using it without going back through request/response framing.
    pub fn write_raw(&self, bytes: &[u8]) -> Result<()> {
        let mut guard = self.conn.lock();
        let (stream, _) = guard
            .as_mut()
            .ok_or_else(|| NetError::Config("HttpClient has no open connection".into()))?;
        stream.write_all(bytes).map_err(|e| NetError::io("write", e))
    }

    /// Reads raw bytes straight from the held connection, bypassing the
    /// HTTP codec. See [`write_raw`](Self::write_raw).
    pub fn read_raw(&self, buf: &mut [u8]) -> Result<usize> {
        let mut guard = self.conn.lock();
        let (stream, _) = guard
            .as_mut()
            .ok_or_else(|| NetError::Config("HttpClient has no open connection".into()))?;
        stream.read(buf).map_err(|e| NetError::io("read", e))
    }

    /// Runs `send` on the attached worker pool, over a connection of its
    /// own rather than the one this client otherwise keeps.
    pub fn send_async(&self, request: HttpRequest) -> Result<TaskHandle<Result<HttpResponse>>>
    where
        Self: Sized,
    {
        let pool = self
            .pool
            .clone()
            .ok_or_else(|| NetError::Config("HttpClient has no worker pool attached".into()))?;
        let endpoint = self.endpoint.clone();
        let host_header = self.host_header.clone();
        #[cfg(feature = "tls")]
        let tls = self.tls.clone();
        pool.submit(move || -> Result<HttpResponse> {
            let client = HttpClient {
                endpoint,
                host_header,
                #[cfg(feature = "tls")]
                tls,
                pool: None,
                conn: parking_lot::Mutex::new(None),
            };
            client.send(request)
        })
    }

    fn build(&self, method: HttpMethod, path: &str, headers: Option<Headers>, version: Option<(u8, u8)>) -> HttpRequest {
        let mut request = HttpRequest::new(method, path);
        if let Some(headers) = headers {
            request.headers = headers;
        }
        if let Some(version) = version {
            request.version = version;
        }
        request
    }

    pub fn get(&self, path: &str) -> Result<HttpResponse> {
        self.get_with(path, None, None)
    }

    pub fn get_with(&self, path: &str, headers: Option<Headers>, version: Option<(u8, u8)>) -> Result<HttpResponse> {
        self.send(self.build(HttpMethod::Get, path, headers, version))
    }

    pub fn post(&self, path: &str, body: impl Into<Vec<u8>>) -> Result<HttpResponse> {
        self.post_with(path, body, None, None)
    }

    pub fn post_with(
        &self,
        path: &str,
        body: impl Into<Vec<u8>>,
        headers: Option<Headers>,
        version: Option<(u8, u8)>,
    ) -> Result<HttpResponse> {
        self.send(self.build(HttpMethod::Post, path, headers, version).with_body(body))
    }

    pub fn put(&self, path: &str, body: impl Into<Vec<u8>>) -> Result<HttpResponse> {
        self.put_with(path, body, None, None)
    }

    pub fn put_with(
        &self,
        path: &str,
        body: impl Into<Vec<u8>>,
        headers: Option<Headers>,
        version: Option<(u8, u8)>,
    ) -> Result<HttpResponse> {
        self.send(self.build(HttpMethod::Put, path, headers, version).with_body(body))
    }

    pub fn delete(&self, path: &str) -> Result<HttpResponse> {
        self.delete_with(path, None, None)
    }

    pub fn delete_with(&self, path: &str, headers: Option<Headers>, version: Option<(u8, u8)>) -> Result<HttpResponse> {
        self.send(self.build(HttpMethod::Delete, path, headers, version))
    }

    pub fn head(&self, path: &str) -> Result<HttpResponse> {
        self.head_with(path, None, None)
    }

    pub fn head_with(&self, path: &str, headers: Option<Headers>, version: Option<(u8, u8)>) -> Result<HttpResponse> {
        self.send(self.build(HttpMethod::Head, path, headers, version))
    }

    pub fn options(&self, path: &str) -> Result<HttpResponse> {
        self.options_with(path, None, None)
    }

    pub fn options_with(&self, path: &str, headers: Option<Headers>, version: Option<(u8, u8)>) -> Result<HttpResponse> {
        self.send(self.build(HttpMethod::Options, path, headers, version))
    }

    pub fn patch(&self, path: &str, body: impl Into<Vec<u8>>) -> Result<HttpResponse> {
        self.patch_with(path, body, None, None)
    }

    pub fn patch_with(
        &self,
        path: &str,
        body: impl Into<Vec<u8>>,
        headers: Option<Headers>,
        version: Option<(u8, u8)>,
    ) -> Result<HttpResponse> {
        self.send(self.build(HttpMethod::Patch, path, headers, version).with_body(body))
    }

    pub fn trace(&self, path: &str) -> Result<HttpResponse> {
        self.trace_with(path, None, None)
    }

    pub fn trace_with(&self, path: &str, headers: Option<Headers>, version: Option<(u8, u8)>) -> Result<HttpResponse> {
        self.send(self.build(HttpMethod::Trace, path, headers, version))
    }

    /// `CONNECT` is parsed and can be sent, but this client never switches
    /// the underlying stream to raw tunnel mode afterward — CONNECT-based
    /// proxy tunneling is out of scope (spec Non-goals).
    pub fn connect_method(&self, authority: &str) -> Result<HttpResponse> {
        self.send(HttpRequest::new(HttpMethod::Connect, authority))
    }
}
