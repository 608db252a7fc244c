//! HTTP server: exact-path routing per method, a 404/405 fallback that
//! distinguishes "path unknown" from "method not allowed on this path",
//! and a configurable error-handler table for both (spec §4.6, §6
//! `add_error_handler`).
//!
//! Built on [`crate::server::Server`], the generic accept-loop/worker-pool/
//! event-loop runtime; this module supplies only the per-connection
//! request/response translation the generic runtime calls into.

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::Result;
use crate::http::{HttpCodec, HttpMethod, HttpRequest, HttpResponse, StatusCode};
use crate::server::{ReadOutcome, Server, ServerConfig};

/// A route handler: receives the parsed request, returns either a response
/// to send or a status code to fall back to an error response for.
pub type HttpHandler = Arc<dyn Fn(&HttpRequest) -> std::result::Result<HttpResponse, StatusCode> + Send + Sync>;

/// Builds the response for a fallback status (405, 404, or any code a
/// route handler returned as its `Err` case) instead of the default empty
/// text body (spec §6 `add_error_handler`).
pub type ErrorHandler = Arc<dyn Fn(&HttpRequest, StatusCode) -> HttpResponse + Send + Sync>;

/// Routes requests to registered handlers by exact `(method, path)` match
/// (spec §4.6 "exact-path dispatch only — no wildcard or parameterized
/// routes"). Falls back to 405 when the path is registered under a
/// different method, 404 when the path is registered under no method at
/// all — spec §4.6 step 4 treats these as distinct outcomes.
#[derive(Default)]
pub struct Router {
    routes: HashMap<(HttpMethod, String), HttpHandler>,
    error_handlers: HashMap<u16, ErrorHandler>,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn route(&mut self, method: HttpMethod, path: impl Into<String>, handler: HttpHandler) {
        self.routes.insert((method, path.into()), handler);
    }

    pub fn add_error_handler(&mut self, status: StatusCode, handler: ErrorHandler) {
        self.error_handlers.insert(status.0, handler);
    }

    fn path_is_registered(&self, path: &str) -> bool {
        self.routes.keys().any(|(_, p)| p == path)
    }

    /// Resolves and invokes the handler for `request`, normalizing the
    /// path used for matching by stripping any query string.
    pub fn dispatch(&self, request: &HttpRequest) -> HttpResponse {
        let path = request.target.split('?').next().unwrap_or(&request.target);
        match self.routes.get(&(request.method, path.to_string())) {
            Some(handler) => match handler(request) {
                Ok(response) => response,
                Err(status) => self.error_response(status, request),
            },
            None => {
                let status = if self.path_is_registered(path) {
                    StatusCode::METHOD_NOT_ALLOWED
                } else {
                    StatusCode::NOT_FOUND
                };
                self.error_response(status, request)
            }
        }
    }

    fn error_response(&self, status: StatusCode, request: &HttpRequest) -> HttpResponse {
        match self.error_handlers.get(&status.0) {
            Some(handler) => handler(request, status),
            None => HttpResponse::text(status, status.reason_phrase()),
        }
    }
}

/// Per-connection state carried across readiness events: one codec per
/// accepted descriptor (spec §9 "per-descriptor codec map").
struct HttpSession {
    codec: HttpCodec,
}

/// An HTTP server: a [`Router`] plus the generic connection runtime.
pub struct HttpServer {
    router: Arc<parking_lot::RwLock<Router>>,
    server: Server,
}

impl HttpServer {
    pub fn new(config: ServerConfig) -> Result<Self> {
        Ok(Self {
            router: Arc::new(parking_lot::RwLock::new(Router::new())),
            server: Server::new(config)?,
        })
    }

    pub fn route(
        &self,
        method: HttpMethod,
        path: impl Into<String>,
        handler: impl Fn(&HttpRequest) -> std::result::Result<HttpResponse, StatusCode> + Send + Sync + 'static,
    ) {
        self.router.write().route(method, path, Arc::new(handler));
    }

    /// Registers a fallback response builder for `status` (spec §6
    /// `add_error_handler`) — e.g. a custom 404 page, or a 405 handler
    /// that lists the allowed methods.
    pub fn add_error_handler(
        &self,
        status: StatusCode,
        handler: impl Fn(&HttpRequest, StatusCode) -> HttpResponse + Send + Sync + 'static,
    ) {
        self.router.write().add_error_handler(status, Arc::new(handler));
    }

    /// Runs the accept/event loop until [`Server::stop`] is called. Each
    /// accepted connection is registered with the event loop rather than
    /// pinned to one worker for its whole lifetime: `try_read_request`
    /// drains whatever is already on the wire, dispatches every complete
    /// (possibly pipelined) request it yields, and returns without
    /// blocking for more once the connection goes idle, at which point
    /// the descriptor is re-armed (spec §4.3's accept-loop algorithm).
    pub fn run(&self) -> Result<()> {
        let router = self.router.clone();
        self.server.run(
            || HttpSession {
                codec: HttpCodec::new_server(),
            },
            move |session, stream| -> Result<ReadOutcome> {
                loop {
                    let request = match session.codec.try_read_request(stream)? {
                        Some(req) => req,
                        None => return Ok(ReadOutcome::Pending),
                    };
                    let keep_alive = !matches!(
                        request.headers.get("Connection"),
                        Some(v) if v.eq_ignore_ascii_case("close")
                    );
                    let response = router.read().dispatch(&request);
                    session.codec.write_response(stream, &response)?;
                    if !keep_alive {
                        return Ok(ReadOutcome::Close);
                    }
                }
            },
        )
    }

    pub fn stop(&self) {
        self.server.stop();
    }

    pub fn local_addr(&self) -> std::net::SocketAddr {
        self.server.local_addr()
    }
}
