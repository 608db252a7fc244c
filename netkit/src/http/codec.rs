//! Wraps a read-half parser, a write-half serializer, and a byte stream
//! into the unit the server/client loops drive directly (spec §4.5
//! "HttpCodec"). One codec handles exactly one direction of traffic at a
//! time from the caller's point of view: a server reads requests and
//! writes responses; a client writes requests and reads responses.

use std::io::{Read, Write};

use crate::error::{NetError, Result};
use crate::http::{HttpParser, HttpRequest, HttpResponse, ParseOutcome};

/// Server-facing codec: parses incoming requests, serializes outgoing
/// responses.
pub struct HttpCodec {
    parser: HttpParser,
    read_buf: [u8; 8192],
}

impl HttpCodec {
    pub fn new_server() -> Self {
        Self {
            parser: HttpParser::new_request(),
            read_buf: [0u8; 8192],
        }
    }

    pub fn new_client() -> Self {
        Self {
            parser: HttpParser::new_response(),
            read_buf: [0u8; 8192],
        }
    }

    /// Reads from `stream` until one complete request is parsed, feeding
    /// the parser incrementally so partial reads (and reads that land in
    /// the middle of the header/body boundary) are handled transparently.
    /// Pipelined requests are returned one at a time on successive calls;
    /// bytes already buffered from a prior over-read are consumed first.
    pub fn read_request(&mut self, stream: &mut impl Read) -> Result<HttpRequest> {
        loop {
            match self.parser.push_request(&[])? {
                ParseOutcome::Complete { message, .. } => return Ok(message),
                ParseOutcome::NeedMoreData => {}
            }
            let n = stream
                .read(&mut self.read_buf)
                .map_err(|e| NetError::io("read", e))?;
            if n == 0 {
                return Err(NetError::PeerClosed);
            }
            match self.parser.push_request(&self.read_buf[..n])? {
                ParseOutcome::Complete { message, .. } => return Ok(message),
                ParseOutcome::NeedMoreData => continue,
            }
        }
    }

    /// Non-blocking-tolerant counterpart to [`read_request`](Self::read_request),
    /// for event-loop-driven servers whose connections are registered with
    /// readiness dispatch rather than owned by one blocking worker for their
    /// whole lifetime (spec §4.3's accept-loop algorithm, §4.1's
    /// edge-triggered-drain precondition on `on_read`). Drains the stream in
    /// a loop, feeding every byte it can get into the parser, until either a
    /// full request is assembled or the stream reports it has nothing more
    /// to offer right now (`WouldBlock`/`Interrupted`), at which point `Ok(None)`
    /// tells the caller to wait for the next readiness notification.
    pub fn try_read_request(&mut self, stream: &mut impl Read) -> Result<Option<HttpRequest>> {
        loop {
            match self.parser.push_request(&[])? {
                ParseOutcome::Complete { message, .. } => return Ok(Some(message)),
                ParseOutcome::NeedMoreData => {}
            }
            match stream.read(&mut self.read_buf) {
                Ok(0) => return Err(NetError::PeerClosed),
                Ok(n) => match self.parser.push_request(&self.read_buf[..n])? {
                    ParseOutcome::Complete { message, .. } => return Ok(Some(message)),
                    ParseOutcome::NeedMoreData => continue,
                },
                Err(e) if would_block(&e) => return Ok(None),
                Err(e) => return Err(NetError::io("read", e)),
            }
        }
    }

    /// Non-blocking-tolerant counterpart to [`read_response`](Self::read_response).
    pub fn try_read_response(&mut self, stream: &mut impl Read) -> Result<Option<HttpResponse>> {
        loop {
            match self.parser.push_response(&[])? {
                ParseOutcome::Complete { message, .. } => return Ok(Some(message)),
                ParseOutcome::NeedMoreData => {}
            }
            match stream.read(&mut self.read_buf) {
                Ok(0) => return Err(NetError::PeerClosed),
                Ok(n) => match self.parser.push_response(&self.read_buf[..n])? {
                    ParseOutcome::Complete { message, .. } => return Ok(Some(message)),
                    ParseOutcome::NeedMoreData => continue,
                },
                Err(e) if would_block(&e) => return Ok(None),
                Err(e) => return Err(NetError::io("read", e)),
            }
        }
    }

    pub fn read_response(&mut self, stream: &mut impl Read) -> Result<HttpResponse> {
        loop {
            match self.parser.push_response(&[])? {
                ParseOutcome::Complete { message, .. } => return Ok(message),
                ParseOutcome::NeedMoreData => {}
            }
            let n = stream
                .read(&mut self.read_buf)
                .map_err(|e| NetError::io("read", e))?;
            if n == 0 {
                return Err(NetError::PeerClosed);
            }
            match self.parser.push_response(&self.read_buf[..n])? {
                ParseOutcome::Complete { message, .. } => return Ok(message),
                ParseOutcome::NeedMoreData => continue,
            }
        }
    }

    pub fn write_request(&self, stream: &mut impl Write, request: &HttpRequest) -> Result<()> {
        let bytes = encode_request(request);
        stream.write_all(&bytes).map_err(|e| NetError::io("write", e))
    }

    pub fn write_response(&self, stream: &mut impl Write, response: &HttpResponse) -> Result<()> {
        let bytes = encode_response(response);
        stream.write_all(&bytes).map_err(|e| NetError::io("write", e))
    }
}

fn would_block(err: &std::io::Error) -> bool {
    matches!(
        err.kind(),
        std::io::ErrorKind::WouldBlock | std::io::ErrorKind::Interrupted
    )
}

fn encode_request(request: &HttpRequest) -> Vec<u8> {
    let mut out = Vec::with_capacity(256 + request.body.len());
    out.extend_from_slice(
        format!(
            "{} {} HTTP/{}.{}\r\n",
            request.method, request.target, request.version.0, request.version.1
        )
        .as_bytes(),
    );
    for (name, value) in request.headers.iter() {
        out.extend_from_slice(format!("{name}: {value}\r\n").as_bytes());
    }
    if !request.headers.contains("Content-Length") {
        out.extend_from_slice(format!("Content-Length: {}\r\n", request.body.len()).as_bytes());
    }
    out.extend_from_slice(b"\r\n");
    out.extend_from_slice(&request.body);
    out
}

fn encode_response(response: &HttpResponse) -> Vec<u8> {
    let mut out = Vec::with_capacity(256 + response.body.len());
    out.extend_from_slice(
        format!(
            "HTTP/{}.{} {} {}\r\n",
            response.version.0,
            response.version.1,
            response.status.0,
            response.status.reason_phrase()
        )
        .as_bytes(),
    );
    for (name, value) in response.headers.iter() {
        out.extend_from_slice(format!("{name}: {value}\r\n").as_bytes());
    }
    if !response.headers.contains("Content-Length") {
        out.extend_from_slice(format!("Content-Length: {}\r\n", response.body.len()).as_bytes());
    }
    out.extend_from_slice(b"\r\n");
    out.extend_from_slice(&response.body);
    out
}
