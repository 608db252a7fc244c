//! WebSocket server: accepts the HTTP upgrade handshake on one allowed
//! path, then hands every decoded frame to a per-frame handler (spec §4.9
//! "the WebSocket handler is invoked per inbound frame, and may produce an
//! outbound frame in response").
//!
//! Built on [`crate::server::Server`] the same way [`crate::http::HttpServer`]
//! is: one session per accepted connection, carried across readiness events,
//! moving through two phases — reading the upgrade request, then decoding
//! frames — rather than a worker owning the connection for its whole
//! lifetime.

use std::io::{Read, Write};
use std::sync::Arc;

use crate::error::{NetError, Result};
use crate::http::{HttpCodec, HttpMethod, HttpRequest, HttpResponse, StatusCode};
use crate::server::{ConnStream, ReadOutcome, Server, ServerConfig};
use crate::ws::codec::{WebSocketFrame, WebSocketReader, WebSocketWriter};
use crate::ws::handshake::accept_key;
use crate::ws::Opcode;

/// A frame handler: given an inbound data frame (control frames are
/// answered automatically before this is called), returns the frame to
/// send back, if any.
pub type WebSocketHandler =
    Arc<dyn Fn(&WebSocketFrame) -> Result<Option<WebSocketFrame>> + Send + Sync>;

/// Per-connection state carried across readiness events: still doing the
/// HTTP upgrade, or already exchanging frames.
enum WsConnState {
    AwaitingUpgrade(HttpCodec),
    Upgraded {
        reader: WebSocketReader,
        writer: WebSocketWriter,
    },
}

pub struct WebSocketServer {
    allowed_path: String,
    handler: Arc<parking_lot::Mutex<Option<WebSocketHandler>>>,
    server: Server,
}

impl WebSocketServer {
    pub fn new(config: ServerConfig, allowed_path: impl Into<String>) -> Result<Self> {
        Ok(Self {
            allowed_path: allowed_path.into(),
            handler: Arc::new(parking_lot::Mutex::new(None)),
            server: Server::new(config)?,
        })
    }

    pub fn on_connection(
        &self,
        handler: impl Fn(&WebSocketFrame) -> Result<Option<WebSocketFrame>> + Send + Sync + 'static,
    ) {
        *self.handler.lock() = Some(Arc::new(handler));
    }

    /// Runs the accept/event loop until [`Server::stop`] is called.
    pub fn run(&self) -> Result<()> {
        let allowed_path = self.allowed_path.clone();
        let handler = self.handler.clone();
        self.server.run(
            || WsConnState::AwaitingUpgrade(HttpCodec::new_server()),
            move |state, stream| -> Result<ReadOutcome> {
                loop {
                    match state {
                        WsConnState::AwaitingUpgrade(codec) => {
                            let request = match codec.try_read_request(stream)? {
                                Some(req) => req,
                                None => return Ok(ReadOutcome::Pending),
                            };
                            match handle_upgrade(codec, stream, &request, &allowed_path)? {
                                true => {
                                    *state = WsConnState::Upgraded {
                                        // A server reads client frames, which
                                        // RFC 6455 §5.1 requires to be masked.
                                        reader: WebSocketReader::new(true),
                                        writer: WebSocketWriter::new(false),
                                    };
                                }
                                false => return Ok(ReadOutcome::Close),
                            }
                        }
                        WsConnState::Upgraded { reader, writer } => {
                            return drive_frames(reader, writer, stream, &handler);
                        }
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

/// Validates and answers the upgrade request. Returns `true` if the
/// connection should move to the upgraded phase, `false` if an error
/// response was written and the connection should close.
fn handle_upgrade(
    codec: &HttpCodec,
    stream: &mut ConnStream,
    request: &HttpRequest,
    allowed_path: &str,
) -> Result<bool> {
    let path = request.target.split('?').next().unwrap_or(&request.target);
    if path != allowed_path || !is_upgrade_request(request) {
        let response = HttpResponse::text(StatusCode::UPGRADE_REQUIRED, "Upgrade Required");
        codec.write_response(stream, &response)?;
        return Ok(false);
    }

    let client_key = match request.headers.get("Sec-WebSocket-Key") {
        Some(key) => key.to_string(),
        None => {
            let response = HttpResponse::text(StatusCode::BAD_REQUEST, "missing Sec-WebSocket-Key");
            codec.write_response(stream, &response)?;
            return Ok(false);
        }
    };

    let response = HttpResponse::new(StatusCode::SWITCHING_PROTOCOLS)
        .with_header("Upgrade", "websocket")
        .with_header("Connection", "Upgrade")
        .with_header("Sec-WebSocket-Accept", accept_key(&client_key));
    codec.write_response(stream, &response)?;
    Ok(true)
}

/// Drains whatever is already on the wire, decoding and dispatching every
/// complete frame it yields, until the stream reports it has nothing more
/// to offer right now (spec §4.1's edge-triggered-drain precondition on
/// `on_read`).
fn drive_frames(
    reader: &mut WebSocketReader,
    writer: &mut WebSocketWriter,
    stream: &mut ConnStream,
    handler: &Arc<parking_lot::Mutex<Option<WebSocketHandler>>>,
) -> Result<ReadOutcome> {
    loop {
        while let Some(frame) = reader.try_decode()? {
            match frame.opcode {
                Opcode::Ping => {
                    let bytes = writer.encode(&WebSocketFrame::pong(frame.payload));
                    stream.write_all(&bytes).map_err(|e| NetError::io("write", e))?;
                }
                Opcode::Pong => {}
                Opcode::Close => {
                    let bytes = writer.encode(&WebSocketFrame::close(1000, ""));
                    let _ = stream.write_all(&bytes);
                    return Ok(ReadOutcome::Close);
                }
                Opcode::Text | Opcode::Binary | Opcode::Continuation => {
                    let reply = match handler.lock().as_ref() {
                        Some(handler) => handler(&frame)?,
                        None => None,
                    };
                    if let Some(reply) = reply {
                        let bytes = writer.encode(&reply);
                        stream.write_all(&bytes).map_err(|e| NetError::io("write", e))?;
                    }
                }
            }
        }

        let mut buf = [0u8; 4096];
        match stream.read(&mut buf) {
            Ok(0) => return Err(NetError::PeerClosed),
            Ok(n) => reader.push(&buf[..n]),
            Err(e) if would_block(&e) => return Ok(ReadOutcome::Pending),
            Err(e) => return Err(NetError::io("read", e)),
        }
    }
}

fn would_block(err: &std::io::Error) -> bool {
    matches!(
        err.kind(),
        std::io::ErrorKind::WouldBlock | std::io::ErrorKind::Interrupted
    )
}

fn is_upgrade_request(request: &HttpRequest) -> bool {
    request.method == HttpMethod::Get
        && request
            .headers
            .get("Upgrade")
            .map(|v| v.eq_ignore_ascii_case("websocket"))
            .unwrap_or(false)
        && request
            .headers
            .get("Connection")
            .map(|v| v.to_ascii_lowercase().contains("upgrade"))
            .unwrap_or(false)
}
