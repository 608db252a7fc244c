//! Incremental HTTP/1.1 parser: a two-phase state machine that accepts
//! bytes as they arrive off the wire, in any chunk boundary, and supports
//! pipelined requests (more than one message per `push`).
//!
//! Grounded on `original_source/net/application/include/http_parser.hpp`'s
//! `HttpParser::push_chunk`: accumulate into a header buffer, search for
//! `\r\n\r\n` starting at `max(0, old_size - 3)` so the boundary can't be
//! missed when it straddles two reads, then switch to accumulating exactly
//! `Content-Length` body bytes.

use crate::error::{NetError, Result};
use crate::http::{HttpMethod, HttpRequest, HttpResponse, StatusCode};

const MAX_HEADER_BYTES: usize = 64 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Headers,
    Body { content_length: usize },
}

/// One incremental request-or-response parse in progress. `T` is the
/// message type being assembled (`HttpRequest` or `HttpResponse`); the
/// phase machinery is identical for both, only the start-line grammar
/// differs (see [`HttpParser::new_request`]/[`HttpParser::new_response`]).
pub struct HttpParser {
    buf: Vec<u8>,
    phase: Phase,
    is_request: bool,
    pending_method: Option<HttpMethod>,
    pending_target: Option<String>,
    pending_status: Option<StatusCode>,
    pending_version: (u8, u8),
    pending_headers: crate::http::Headers,
}

/// Outcome of feeding bytes into the parser: either more bytes are needed,
/// or zero-or-more complete messages were produced along with how many
/// input bytes they consumed (the codec uses the byte count to know how
/// much of its read buffer to drop, supporting pipelining within one read).
pub enum ParseOutcome<T> {
    NeedMoreData,
    Complete { message: T, consumed: usize },
}

impl HttpParser {
    pub fn new_request() -> Self {
        Self::new(true)
    }

    pub fn new_response() -> Self {
        Self::new(false)
    }

    fn new(is_request: bool) -> Self {
        Self {
            buf: Vec::new(),
            phase: Phase::Headers,
            is_request,
            pending_method: None,
            pending_target: None,
            pending_status: None,
            pending_version: (1, 1),
            pending_headers: crate::http::Headers::new(),
        }
    }

    /// Resets to await the next message, preserving no state from the one
    /// just parsed. Called by the codec immediately after a `Complete`.
    pub fn reset(&mut self) {
        self.buf.clear();
        self.phase = Phase::Headers;
        self.pending_method = None;
        self.pending_target = None;
        self.pending_status = None;
        self.pending_version = (1, 1);
        self.pending_headers = crate::http::Headers::new();
    }

    /// Appends `chunk` to the internal buffer and attempts to make
    /// progress. Returns `NeedMoreData` if no complete message is available
    /// yet; the caller should append more bytes and call again.
    pub fn push_request(&mut self, chunk: &[u8]) -> Result<ParseOutcome<HttpRequest>> {
        debug_assert!(self.is_request);
        self.buf.extend_from_slice(chunk);
        self.advance_request()
    }

    pub fn push_response(&mut self, chunk: &[u8]) -> Result<ParseOutcome<HttpResponse>> {
        debug_assert!(!self.is_request);
        self.buf.extend_from_slice(chunk);
        self.advance_response()
    }

    /// Finds the end of the header block (index just past `\r\n\r\n`), if
    /// present.
    fn find_header_terminator(&self) -> Option<usize> {
        if self.buf.len() < 4 {
            return None;
        }
        self.buf
            .windows(4)
            .position(|w| w == b"\r\n\r\n")
            .map(|pos| pos + 4)
    }

    fn advance_request(&mut self) -> Result<ParseOutcome<HttpRequest>> {
        loop {
            match self.phase {
                Phase::Headers => {
                    if self.buf.len() > MAX_HEADER_BYTES {
                        return Err(NetError::Protocol("request headers too large".into()));
                    }
                    let Some(header_end) = self.find_header_terminator() else {
                        return Ok(ParseOutcome::NeedMoreData);
                    };
                    let head = &self.buf[..header_end];
                    let (method, target, version, headers) = parse_request_head(head)?;
                    let content_length = content_length_of(&headers)?;
                    self.pending_method = Some(method);
                    self.pending_target = Some(target);
                    self.pending_version = version;
                    self.pending_headers = headers;
                    self.buf.drain(..header_end);
                    self.phase = Phase::Body { content_length };
                }
                Phase::Body { content_length } => {
                    if self.buf.len() < content_length {
                        return Ok(ParseOutcome::NeedMoreData);
                    }
                    let body = self.buf[..content_length].to_vec();
                    let consumed = content_length;
                    self.buf.drain(..consumed);
                    let message = HttpRequest {
                        method: self.pending_method.take().unwrap(),
                        target: self.pending_target.take().unwrap(),
                        version: self.pending_version,
                        headers: std::mem::take(&mut self.pending_headers),
                        body,
                    };
                    self.phase = Phase::Headers;
                    return Ok(ParseOutcome::Complete {
                        message,
                        consumed,
                    });
                }
            }
        }
    }

    fn advance_response(&mut self) -> Result<ParseOutcome<HttpResponse>> {
        loop {
            match self.phase {
                Phase::Headers => {
                    if self.buf.len() > MAX_HEADER_BYTES {
                        return Err(NetError::Protocol("response headers too large".into()));
                    }
                    let Some(header_end) = self.find_header_terminator() else {
                        return Ok(ParseOutcome::NeedMoreData);
                    };
                    let head = &self.buf[..header_end];
                    let (status, version, headers) = parse_response_head(head)?;
                    let content_length = content_length_of(&headers)?;
                    self.pending_status = Some(status);
                    self.pending_version = version;
                    self.pending_headers = headers;
                    self.buf.drain(..header_end);
                    self.phase = Phase::Body { content_length };
                }
                Phase::Body { content_length } => {
                    if self.buf.len() < content_length {
                        return Ok(ParseOutcome::NeedMoreData);
                    }
                    let body = self.buf[..content_length].to_vec();
                    let consumed = content_length;
                    self.buf.drain(..consumed);
                    let message = HttpResponse {
                        status: self.pending_status.take().unwrap(),
                        version: self.pending_version,
                        headers: std::mem::take(&mut self.pending_headers),
                        body,
                    };
                    self.phase = Phase::Headers;
                    return Ok(ParseOutcome::Complete {
                        message,
                        consumed,
                    });
                }
            }
        }
    }
}

fn content_length_of(headers: &crate::http::Headers) -> Result<usize> {
    match headers.get("Content-Length") {
        Some(v) => v
            .trim()
            .parse::<usize>()
            .map_err(|_| NetError::Protocol(format!("invalid Content-Length: {v}"))),
        None => Ok(0),
    }
}

fn split_lines(head: &[u8]) -> std::result::Result<Vec<&[u8]>, NetError> {
    let head = &head[..head.len().saturating_sub(2)]; // trim trailing CRLFCRLF's second CRLF
    Ok(head.split(|&b| b == b'\n').map(|l| l.strip_suffix(b"\r").unwrap_or(l)).collect())
}

fn parse_version(token: &str) -> Result<(u8, u8)> {
    let rest = token
        .strip_prefix("HTTP/")
        .ok_or_else(|| NetError::Protocol(format!("bad HTTP version token: {token}")))?;
    let (major, minor) = rest
        .split_once('.')
        .ok_or_else(|| NetError::Protocol(format!("bad HTTP version token: {token}")))?;
    Ok((
        major.parse().map_err(|_| NetError::Protocol("bad HTTP major version".into()))?,
        minor.parse().map_err(|_| NetError::Protocol("bad HTTP minor version".into()))?,
    ))
}

fn parse_headers(lines: &[&[u8]]) -> Result<crate::http::Headers> {
    let mut headers = crate::http::Headers::new();
    for line in lines {
        if line.is_empty() {
            continue;
        }
        let line = std::str::from_utf8(line)
            .map_err(|_| NetError::Protocol("header line is not valid UTF-8".into()))?;
        let (name, value) = line
            .split_once(':')
            .ok_or_else(|| NetError::Protocol(format!("malformed header line: {line}")))?;
        headers.insert(name.trim().to_string(), value.trim().to_string());
    }
    Ok(headers)
}

fn parse_request_head(head: &[u8]) -> Result<(HttpMethod, String, (u8, u8), crate::http::Headers)> {
    let lines = split_lines(head)?;
    let request_line = std::str::from_utf8(lines.first().copied().unwrap_or(&[]))
        .map_err(|_| NetError::Protocol("request line is not valid UTF-8".into()))?;
    let mut parts = request_line.split(' ');
    let method_str = parts
        .next()
        .ok_or_else(|| NetError::Protocol("missing method in request line".into()))?;
    let target = parts
        .next()
        .ok_or_else(|| NetError::Protocol("missing target in request line".into()))?
        .to_string();
    let version_str = parts
        .next()
        .ok_or_else(|| NetError::Protocol("missing HTTP version in request line".into()))?;
    let method = HttpMethod::parse(method_str);
    let version = parse_version(version_str)?;
    let headers = parse_headers(&lines[1..])?;
    Ok((method, target, version, headers))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_request_split_across_two_pushes() {
        let mut parser = HttpParser::new_request();
        let first = b"GET /path HTTP/1.1\r\nHost: exa";
        let second = b"mple.com\r\nContent-Length: 5\r\n\r\nhello";

        match parser.push_request(first).unwrap() {
            ParseOutcome::NeedMoreData => {}
            ParseOutcome::Complete { .. } => panic!("should not be complete yet"),
        }
        match parser.push_request(second).unwrap() {
            ParseOutcome::Complete { message, .. } => {
                assert_eq!(message.target, "/path");
                assert_eq!(message.headers.get("Host"), Some("example.com"));
                assert_eq!(message.body, b"hello");
            }
            ParseOutcome::NeedMoreData => panic!("expected a complete request"),
        }
    }

    #[test]
    fn pipelined_requests_are_parsed_one_after_another() {
        let mut parser = HttpParser::new_request();
        let both = b"GET /a HTTP/1.1\r\nHost: x\r\nContent-Length: 0\r\n\r\nGET /b HTTP/1.1\r\nHost: x\r\nContent-Length: 0\r\n\r\n";

        let first = match parser.push_request(both).unwrap() {
            ParseOutcome::Complete { message, .. } => message,
            ParseOutcome::NeedMoreData => panic!("expected first request to be complete"),
        };
        assert_eq!(first.target, "/a");

        let second = match parser.push_request(&[]).unwrap() {
            ParseOutcome::Complete { message, .. } => message,
            ParseOutcome::NeedMoreData => panic!("expected second request already buffered"),
        };
        assert_eq!(second.target, "/b");
    }

    #[test]
    fn missing_content_length_defaults_to_empty_body() {
        let mut parser = HttpParser::new_request();
        let raw = b"GET /noop HTTP/1.1\r\nHost: x\r\n\r\n";
        match parser.push_request(raw).unwrap() {
            ParseOutcome::Complete { message, .. } => assert!(message.body.is_empty()),
            ParseOutcome::NeedMoreData => panic!("expected a complete request"),
        }
    }

    #[test]
    fn unknown_method_parses_as_unknown_instead_of_erroring() {
        let mut parser = HttpParser::new_request();
        let raw = b"FOO /x HTTP/1.1\r\nHost: x\r\nContent-Length: 0\r\n\r\n";
        match parser.push_request(raw).unwrap() {
            ParseOutcome::Complete { message, .. } => {
                assert_eq!(message.method, HttpMethod::Unknown);
                assert_eq!(message.target, "/x");
            }
            ParseOutcome::NeedMoreData => panic!("expected a complete request"),
        }
    }
}

fn parse_response_head(head: &[u8]) -> Result<(StatusCode, (u8, u8), crate::http::Headers)> {
    let lines = split_lines(head)?;
    let status_line = std::str::from_utf8(lines.first().copied().unwrap_or(&[]))
        .map_err(|_| NetError::Protocol("status line is not valid UTF-8".into()))?;
    let mut parts = status_line.splitn(3, ' ');
    let version_str = parts
        .next()
        .ok_or_else(|| NetError::Protocol("missing HTTP version in status line".into()))?;
    let code_str = parts
        .next()
        .ok_or_else(|| NetError::Protocol("missing status code in status line".into()))?;
    let version = parse_version(version_str)?;
    let code: u16 = code_str
        .parse()
        .map_err(|_| NetError::Protocol(format!("invalid status code: {code_str}")))?;
    let headers = parse_headers(&lines[1..])?;
    Ok((StatusCode(code), version, headers))
}
