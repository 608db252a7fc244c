//! The generic accept-loop/worker-pool/event-loop runtime shared by
//! [`crate::http::HttpServer`] and [`crate::ws::WebSocketServer`] (spec
//! §4.3 "Server runtime").
//!
//! Implements spec §4.3's event-loop accept algorithm directly: the
//! listening socket's accept-readiness is driven by the pluggable
//! [`EventLoop`], and so is every connection it accepts afterward — each
//! accepted descriptor is registered with the same event loop for READ,
//! so an idle keep-alive connection occupies no worker thread at all. When
//! a descriptor becomes readable, its registration is removed and a single
//! unit of work (read what's available, process it, write any response) is
//! handed to the [`WorkerPool`]; only once that unit finishes is the
//! descriptor re-registered (spec §5 "per-target re-arm" — the mechanism
//! that keeps at most one worker touching a given [`RemoteTarget`] at a
//! time without needing a dedicated thread per connection).

use std::collections::HashMap;
use std::net::TcpStream;
use std::os::unix::io::{AsRawFd, RawFd};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::time::Duration;

use crate::error::{NetError, Result};
use crate::eventloop::{new_event_loop, EventHandler, EventLoopKind};
use crate::pool::WorkerPool;
use crate::remote::{RemotePool, RemoteTarget};
use crate::transport::TcpServer;

#[cfg(feature = "tls")]
use crate::transport::{TlsContext, TlsServer, TlsStream};

/// States a [`Server`] moves through: spec §4.3 "DISCONNECTED → LISTENING
/// → CONNECTED", re-purposed here at the server (not per-connection)
/// granularity — `CONNECTED` means "accepting and actively serving".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    Disconnected,
    Listening,
    Connected,
}

/// Construction-time configuration for a [`Server`].
pub struct ServerConfig {
    pub endpoint: String,
    pub worker_threads: usize,
    pub event_loop: EventLoopKind,
    pub accept_backlog: i32,
    #[cfg(feature = "tls")]
    pub tls: Option<TlsConfig>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            endpoint: "127.0.0.1:0".to_string(),
            worker_threads: 4,
            event_loop: EventLoopKind::Poll,
            accept_backlog: 128,
            #[cfg(feature = "tls")]
            tls: None,
        }
    }
}

/// TLS material for a server that terminates TLS itself rather than
/// leaving that to a reverse proxy in front of it.
#[cfg(feature = "tls")]
pub struct TlsConfig {
    pub cert_path: std::path::PathBuf,
    pub key_path: std::path::PathBuf,
}

/// Either a plain TCP connection or a TLS-wrapped one, implementing
/// `Read`/`Write` uniformly so protocol layers never need to know which.
pub enum ConnStream {
    Plain(TcpStream),
    #[cfg(feature = "tls")]
    Tls(TlsStream),
}

impl std::io::Read for ConnStream {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        match self {
            ConnStream::Plain(s) => s.read(buf),
            #[cfg(feature = "tls")]
            ConnStream::Tls(s) => s.read(buf),
        }
    }
}

impl std::io::Write for ConnStream {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        match self {
            ConnStream::Plain(s) => s.write(buf),
            #[cfg(feature = "tls")]
            ConnStream::Tls(s) => s.write(buf),
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        match self {
            ConnStream::Plain(s) => s.flush(),
            #[cfg(feature = "tls")]
            ConnStream::Tls(s) => s.flush(),
        }
    }
}

/// What a per-connection `on_read` callback tells the runtime to do with
/// the descriptor once its unit of work finishes (spec §4.3's accept-loop
/// step "later READ events on that descriptor invoke `on_read`").
pub enum ReadOutcome {
    /// Keep the connection open and re-register it for the next readiness
    /// notification.
    Pending,
    /// The connection is done (peer requested close, `Connection: close`,
    /// or the protocol layer above decided to tear down); close it.
    Close,
}

struct Slot<S> {
    stream: Arc<parking_lot::Mutex<ConnStream>>,
    session: Arc<parking_lot::Mutex<S>>,
}

enum ConnCommand {
    Rearm(RawFd),
    Drop(RawFd),
}

/// The shared connection-handling runtime. Protocol-specific servers wrap
/// this and supply a per-connection session factory plus a readiness
/// callback; see [`Server::run`].
pub struct Server {
    listener: Arc<TcpServer>,
    pool: Arc<WorkerPool>,
    remotes: Arc<RemotePool>,
    event_loop_kind: EventLoopKind,
    state: Arc<parking_lot::Mutex<ServerState>>,
    stopping: Arc<AtomicBool>,
    #[cfg(feature = "tls")]
    tls_context: Option<Arc<TlsContext>>,
}

impl Server {
    pub fn new(config: ServerConfig) -> Result<Self> {
        let listener = TcpServer::listen(&config.endpoint, config.accept_backlog)?;

        #[cfg(feature = "tls")]
        let tls_context = match &config.tls {
            Some(tls) => Some(Arc::new(TlsContext::from_pem_files(&tls.cert_path, &tls.key_path)?)),
            None => None,
        };

        Ok(Self {
            listener: Arc::new(listener),
            pool: Arc::new(WorkerPool::new(config.worker_threads)?),
            remotes: Arc::new(RemotePool::new()),
            event_loop_kind: config.event_loop,
            state: Arc::new(parking_lot::Mutex::new(ServerState::Disconnected)),
            stopping: Arc::new(AtomicBool::new(false)),
            #[cfg(feature = "tls")]
            tls_context,
        })
    }

    pub fn local_addr(&self) -> std::net::SocketAddr {
        self.listener.local_addr()
    }

    pub fn state(&self) -> ServerState {
        *self.state.lock()
    }

    /// Runs the accept loop until [`Server::stop`] is called.
    ///
    /// `new_session` is called once per accepted connection (spec §4.3's
    /// `on_start`) to build whatever per-connection state the protocol
    /// layer needs to carry across readiness events (an `HttpCodec`, an
    /// upgrade-in-progress marker, ...). `on_read` is then called once per
    /// readiness notification on that connection (spec §4.3's `on_read`):
    /// it must perform at most one bounded unit of work — read whatever is
    /// currently available, process as many complete messages as that
    /// yields, write any responses — and return without blocking for more
    /// bytes than are already on the wire.
    pub fn run<S, NewSession, OnRead>(&self, new_session: NewSession, on_read: OnRead) -> Result<()>
    where
        S: Send + 'static,
        NewSession: Fn() -> S + Send + Sync + 'static,
        OnRead: Fn(&mut S, &mut ConnStream) -> Result<ReadOutcome> + Send + Sync + 'static,
    {
        *self.state.lock() = ServerState::Listening;
        let mut event_loop = new_event_loop(self.event_loop_kind)?;

        let listener_fd = self.listener.as_raw_fd();
        let accept_ready = Arc::new(AtomicBool::new(false));
        {
            let accept_ready = accept_ready.clone();
            event_loop.add_event(
                listener_fd,
                EventHandler {
                    on_read: Some(Arc::new(move |_fd| {
                        accept_ready.store(true, Ordering::Release);
                    })),
                    on_write: None,
                    on_error: None,
                },
            )?;
        }

        *self.state.lock() = ServerState::Connected;

        let new_session = Arc::new(new_session);
        let on_read = Arc::new(on_read);
        let connections: Arc<parking_lot::Mutex<HashMap<RawFd, Slot<S>>>> =
            Arc::new(parking_lot::Mutex::new(HashMap::new()));
        let (cmd_tx, cmd_rx) = mpsc::channel::<ConnCommand>();

        while !self.stopping.load(Ordering::Acquire) {
            event_loop.wait_for_events(Duration::from_millis(200))?;

            // Re-arm or drop descriptors whose worker task finished since
            // the last wait. The event loop's fd table is only ever
            // touched from this thread (spec §5), so re-registration
            // happens here rather than from the worker thread itself.
            while let Ok(cmd) = cmd_rx.try_recv() {
                match cmd {
                    ConnCommand::Rearm(fd) => {
                        if connections.lock().contains_key(&fd) {
                            let handler = build_read_handler(
                                fd,
                                connections.clone(),
                                on_read.clone(),
                                cmd_tx.clone(),
                                self.pool.clone(),
                            );
                            let _ = event_loop.add_event(fd, handler);
                        }
                    }
                    ConnCommand::Drop(fd) => {
                        event_loop.remove_event(fd);
                        connections.lock().remove(&fd);
                        self.remotes.remove(fd);
                    }
                }
            }

            if !accept_ready.swap(false, Ordering::AcqRel) {
                continue;
            }

            while let Some(client) = self.listener.accept()? {
                let peer = client.peer_addr();
                let fd = client.as_raw_fd();

                if let Err(err) = client.set_nonblocking(true) {
                    tracing::warn!(error = %err, "failed to set accepted socket nonblocking");
                    continue;
                }

                let target = Arc::new(RemoteTarget::new(fd, peer));

                #[cfg(feature = "tls")]
                let stream = match &self.tls_context {
                    Some(ctx) => match TlsServer::new(ctx).and_then(|s| s.accept(client)) {
                        Ok(s) => ConnStream::Tls(s),
                        Err(err) => {
                            tracing::warn!(error = %err, "tls setup failed for accepted connection");
                            continue;
                        }
                    },
                    None => ConnStream::Plain(client.into_stream()),
                };
                #[cfg(not(feature = "tls"))]
                let stream = ConnStream::Plain(client.into_stream());

                self.remotes.insert(target.clone());
                let session = new_session();
                connections.lock().insert(
                    fd,
                    Slot {
                        stream: Arc::new(parking_lot::Mutex::new(stream)),
                        session: Arc::new(parking_lot::Mutex::new(session)),
                    },
                );

                let handler = build_read_handler(
                    fd,
                    connections.clone(),
                    on_read.clone(),
                    cmd_tx.clone(),
                    self.pool.clone(),
                );
                if let Err(err) = event_loop.add_event(fd, handler) {
                    tracing::warn!(error = %err, "failed to register accepted connection with event loop");
                    connections.lock().remove(&fd);
                    self.remotes.remove(fd);
                }
            }
        }

        event_loop.remove_event(listener_fd);
        for fd in connections.lock().keys().copied().collect::<Vec<_>>() {
            event_loop.remove_event(fd);
        }
        connections.lock().clear();
        self.remotes.clear();
        *self.state.lock() = ServerState::Disconnected;
        Ok(())
    }

    /// Signals the accept loop to exit after its current wait timeout.
    pub fn stop(&self) {
        self.stopping.store(true, Ordering::Release);
    }

    pub fn connection_count(&self) -> usize {
        self.remotes.len()
    }
}

/// Builds the `EventHandler` registered for one connection's descriptor.
/// Firing it doesn't run `on_read` inline on the accept thread — it looks
/// up the connection's stream/session, hands both to the worker pool, and
/// lets the worker report back via `cmd_tx` whether to re-arm or drop the
/// descriptor. The descriptor is deliberately *not* re-registered here:
/// that only happens once the worker's task completes, which is what
/// guarantees at most one worker is ever touching this descriptor at a
/// time (spec §5).
fn build_read_handler<S, OnRead>(
    fd: RawFd,
    connections: Arc<parking_lot::Mutex<HashMap<RawFd, Slot<S>>>>,
    on_read: Arc<OnRead>,
    cmd_tx: mpsc::Sender<ConnCommand>,
    pool: Arc<WorkerPool>,
) -> EventHandler
where
    S: Send + 'static,
    OnRead: Fn(&mut S, &mut ConnStream) -> Result<ReadOutcome> + Send + Sync + 'static,
{
    let error_cmd_tx = cmd_tx.clone();
    EventHandler {
        on_read: Some(Arc::new(move |_fd: RawFd| {
            let found = connections
                .lock()
                .get(&fd)
                .map(|slot| (slot.stream.clone(), slot.session.clone()));
            let Some((stream_arc, session_arc)) = found else {
                return;
            };
            let on_read = on_read.clone();
            let cmd_tx = cmd_tx.clone();
            let _ = pool.submit(move || {
                let outcome = {
                    let mut stream = stream_arc.lock();
                    let mut session = session_arc.lock();
                    on_read(&mut *session, &mut *stream)
                };
                match outcome {
                    Ok(ReadOutcome::Pending) => {
                        let _ = cmd_tx.send(ConnCommand::Rearm(fd));
                    }
                    Ok(ReadOutcome::Close) => {
                        let _ = cmd_tx.send(ConnCommand::Drop(fd));
                    }
                    Err(err) => {
                        if !matches!(err, NetError::PeerClosed) {
                            tracing::warn!(error = %err, "connection handler failed");
                        }
                        let _ = cmd_tx.send(ConnCommand::Drop(fd));
                    }
                }
            });
        })),
        on_write: None,
        on_error: Some(Arc::new(move |_fd: RawFd| {
            let _ = error_cmd_tx.send(ConnCommand::Drop(fd));
        })),
    }
}
