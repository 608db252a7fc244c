//! RFC 6455 §5 frame format: fin/rsv/opcode byte, masked+length byte,
//! optional extended length, optional 4-byte mask key, payload.
//!
//! Grounded on `original_source/net/application/include/websocket.hpp`'s
//! `websocket_parser`/`websocket_writer`, with one deliberate correction:
//! the original never XORs the payload back out with the mask key before
//! handing it to the application, which is a protocol bug. This port
//! unmasks on read and masks on write, matching RFC 6455 §5.3 and the
//! technique `littledivy-fastwebsockets`'s `mask` module uses.

use rand::RngCore;

use crate::error::{NetError, Result};
use crate::ws::Opcode;

/// One decoded WebSocket frame, payload already unmasked (if it arrived
/// masked) or ready to be masked (if about to be sent by a client).
#[derive(Debug, Clone)]
pub struct WebSocketFrame {
    pub fin: bool,
    pub opcode: Opcode,
    pub payload: Vec<u8>,
}

impl WebSocketFrame {
    pub fn text(payload: impl Into<String>) -> Self {
        Self {
            fin: true,
            opcode: Opcode::Text,
            payload: payload.into().into_bytes(),
        }
    }

    pub fn binary(payload: impl Into<Vec<u8>>) -> Self {
        Self {
            fin: true,
            opcode: Opcode::Binary,
            payload: payload.into(),
        }
    }

    pub fn ping(payload: impl Into<Vec<u8>>) -> Self {
        Self {
            fin: true,
            opcode: Opcode::Ping,
            payload: payload.into(),
        }
    }

    pub fn pong(payload: impl Into<Vec<u8>>) -> Self {
        Self {
            fin: true,
            opcode: Opcode::Pong,
            payload: payload.into(),
        }
    }

    pub fn close(code: u16, reason: &str) -> Self {
        let mut payload = Vec::with_capacity(2 + reason.len());
        payload.extend_from_slice(&code.to_be_bytes());
        payload.extend_from_slice(reason.as_bytes());
        Self {
            fin: true,
            opcode: Opcode::Close,
            payload,
        }
    }
}

fn apply_mask(payload: &mut [u8], key: [u8; 4]) {
    for (i, byte) in payload.iter_mut().enumerate() {
        *byte ^= key[i % 4];
    }
}

/// Incrementally decodes frames from a byte stream. One instance per
/// connection direction, same incremental-buffer approach as
/// [`crate::http::HttpParser`].
pub struct WebSocketReader {
    buf: Vec<u8>,
    /// Whether frames on this connection are expected to be masked
    /// (`true` for a server reading from a client, per RFC 6455 §5.1 —
    /// a server MUST reject unmasked frames).
    expect_masked: bool,
}

impl WebSocketReader {
    pub fn new(expect_masked: bool) -> Self {
        Self {
            buf: Vec::new(),
            expect_masked,
        }
    }

    pub fn push(&mut self, chunk: &[u8]) {
        self.buf.extend_from_slice(chunk);
    }

    /// Attempts to decode one complete frame from the buffered bytes.
    /// Returns `None` if more bytes are needed.
    pub fn try_decode(&mut self) -> Result<Option<WebSocketFrame>> {
        if self.buf.len() < 2 {
            return Ok(None);
        }

        let first = self.buf[0];
        let second = self.buf[1];

        let fin = first & 0b1000_0000 != 0;
        let opcode_bits = first & 0b0000_1111;
        let opcode = Opcode::from_byte(opcode_bits)
            .ok_or_else(|| NetError::Protocol(format!("unknown websocket opcode: {opcode_bits:#x}")))?;

        let masked = second & 0b1000_0000 != 0;
        if masked != self.expect_masked {
            return Err(NetError::Protocol(format!(
                "frame masking mismatch: expected masked={}, got masked={}",
                self.expect_masked, masked
            )));
        }

        let len_byte = second & 0b0111_1111;
        let mut offset = 2usize;

        let payload_len: usize = match len_byte {
            126 => {
                if self.buf.len() < offset + 2 {
                    return Ok(None);
                }
                let len = u16::from_be_bytes([self.buf[offset], self.buf[offset + 1]]) as usize;
                offset += 2;
                len
            }
            127 => {
                if self.buf.len() < offset + 8 {
                    return Ok(None);
                }
                let mut bytes = [0u8; 8];
                bytes.copy_from_slice(&self.buf[offset..offset + 8]);
                offset += 8;
                u64::from_be_bytes(bytes) as usize
            }
            n => n as usize,
        };

        let mask_key = if masked {
            if self.buf.len() < offset + 4 {
                return Ok(None);
            }
            let mut key = [0u8; 4];
            key.copy_from_slice(&self.buf[offset..offset + 4]);
            offset += 4;
            Some(key)
        } else {
            None
        };

        if self.buf.len() < offset + payload_len {
            return Ok(None);
        }

        let mut payload = self.buf[offset..offset + payload_len].to_vec();
        if let Some(key) = mask_key {
            apply_mask(&mut payload, key);
        }

        let consumed = offset + payload_len;
        self.buf.drain(..consumed);

        Ok(Some(WebSocketFrame {
            fin,
            opcode,
            payload,
        }))
    }
}

impl Default for WebSocketReader {
    fn default() -> Self {
        Self::new(true)
    }
}

/// Encodes frames for writing. `mask_outgoing` is `true` on the client
/// side (RFC 6455 §5.1 requires every client-to-server frame to be
/// masked) and `false` on the server side.
pub struct WebSocketWriter {
    mask_outgoing: bool,
}

impl WebSocketWriter {
    pub fn new(mask_outgoing: bool) -> Self {
        Self { mask_outgoing }
    }

    pub fn encode(&self, frame: &WebSocketFrame) -> Vec<u8> {
        let mut out = Vec::with_capacity(frame.payload.len() + 14);

        let first = (if frame.fin { 0b1000_0000 } else { 0 }) | frame.opcode.as_byte();
        out.push(first);

        let mask_bit = if self.mask_outgoing { 0b1000_0000 } else { 0 };
        let len = frame.payload.len();
        if len < 126 {
            out.push(mask_bit | len as u8);
        } else if len <= u16::MAX as usize {
            out.push(mask_bit | 126);
            out.extend_from_slice(&(len as u16).to_be_bytes());
        } else {
            out.push(mask_bit | 127);
            out.extend_from_slice(&(len as u64).to_be_bytes());
        }

        let mut payload = frame.payload.clone();
        if self.mask_outgoing {
            let mut key = [0u8; 4];
            rand::rng().fill_bytes(&mut key);
            out.extend_from_slice(&key);
            apply_mask(&mut payload, key);
        }
        out.extend_from_slice(&payload);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn masked_frame_unmasks_to_the_original_payload() {
        let writer = WebSocketWriter::new(true);
        let frame = WebSocketFrame::text("hello");
        let bytes = writer.encode(&frame);

        // Masked client frame: second byte must have the mask bit set.
        assert_ne!(bytes[1] & 0b1000_0000, 0);

        let mut reader = WebSocketReader::new(true);
        reader.push(&bytes);
        let decoded = reader.try_decode().unwrap().unwrap();
        assert_eq!(decoded.payload, b"hello");
        assert_eq!(decoded.opcode, Opcode::Text);
        assert!(decoded.fin);
    }

    #[test]
    fn unmasked_server_frame_rejected_by_a_reader_expecting_masked() {
        let writer = WebSocketWriter::new(false);
        let frame = WebSocketFrame::pong(Vec::new());
        let bytes = writer.encode(&frame);

        let mut reader = WebSocketReader::new(true);
        reader.push(&bytes);
        assert!(reader.try_decode().is_err());
    }

    #[test]
    fn extended_16_bit_length_round_trips() {
        let payload = vec![7u8; 300];
        let writer = WebSocketWriter::new(false);
        let frame = WebSocketFrame::binary(payload.clone());
        let bytes = writer.encode(&frame);
        assert_eq!(bytes[1] & 0b0111_1111, 126);

        let mut reader = WebSocketReader::new(false);
        reader.push(&bytes);
        let decoded = reader.try_decode().unwrap().unwrap();
        assert_eq!(decoded.payload, payload);
    }

    #[test]
    fn partial_frame_needs_more_data() {
        let writer = WebSocketWriter::new(false);
        let bytes = writer.encode(&WebSocketFrame::text("partial"));
        let mut reader = WebSocketReader::new(false);
        reader.push(&bytes[..bytes.len() - 2]);
        assert!(reader.try_decode().unwrap().is_none());
    }
}
