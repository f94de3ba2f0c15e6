//! Wire framing for streamed chunks.
//!
//! ```text
//! +----------------+-----------+-------------------+---------+
//! | name_len u32BE | name utf8 | payload_len u32BE | payload |
//! +----------------+-----------+-------------------+---------+
//! ```
//!
//! A frame with an empty name and an empty payload terminates the stream.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::errors::MeshError;

use super::chunk::Chunk;

pub const HEADER_LEN: usize = 8;
/// Longest artifact name a frame may carry (typical filesystem limit).
pub const MAX_NAME_LEN: usize = 255;

/// Upper bound on the encoded size of a frame holding `chunk_size` payload bytes.
pub fn max_frame_len(chunk_size: usize) -> usize {
    HEADER_LEN + MAX_NAME_LEN + chunk_size
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Chunk(Chunk),
    End,
}

pub fn encode_chunk(chunk: &Chunk) -> Result<Bytes, MeshError> {
    let name = chunk.name.as_bytes();
    if name.is_empty() || name.len() > MAX_NAME_LEN {
        return Err(MeshError::Transfer(format!(
            "artifact name length {} outside 1..={MAX_NAME_LEN}",
            name.len()
        )));
    }
    let payload_len = u32::try_from(chunk.data.len())
        .map_err(|_| MeshError::Transfer("chunk payload exceeds u32 length".into()))?;

    let mut buf = BytesMut::with_capacity(HEADER_LEN + name.len() + chunk.data.len());
    buf.put_u32(name.len() as u32);
    buf.put_slice(name);
    buf.put_u32(payload_len);
    buf.put_slice(&chunk.data);
    Ok(buf.freeze())
}

pub fn end_of_stream() -> Bytes {
    Bytes::from_static(&[0u8; HEADER_LEN])
}

/// Incremental decoder; feed body bytes as they arrive in any split.
#[derive(Debug)]
pub struct FrameDecoder {
    buf: BytesMut,
    max_message_bytes: usize,
    ended: bool,
}

impl FrameDecoder {
    pub fn new(max_message_bytes: usize) -> Self {
        Self {
            buf: BytesMut::new(),
            max_message_bytes,
            ended: false,
        }
    }

    pub fn extend(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    pub fn is_ended(&self) -> bool {
        self.ended
    }

    /// Next complete frame, or `None` when more bytes are needed.
    pub fn next_frame(&mut self) -> Result<Option<Frame>, MeshError> {
        if self.ended {
            if self.buf.is_empty() {
                return Ok(None);
            }
            return Err(MeshError::Transfer("data after end-of-stream frame".into()));
        }
        if self.buf.len() < 4 {
            return Ok(None);
        }

        let name_len = read_u32(&self.buf[..4]);
        if name_len > MAX_NAME_LEN {
            return Err(MeshError::Transfer(format!(
                "frame name length {name_len} exceeds {MAX_NAME_LEN}"
            )));
        }
        if self.buf.len() < 4 + name_len + 4 {
            return Ok(None);
        }

        let payload_len = read_u32(&self.buf[4 + name_len..8 + name_len]);
        let frame_len = HEADER_LEN + name_len + payload_len;
        if frame_len > self.max_message_bytes {
            return Err(MeshError::Transfer(format!(
                "frame of {frame_len} bytes exceeds max message size {}",
                self.max_message_bytes
            )));
        }
        if self.buf.len() < frame_len {
            return Ok(None);
        }

        self.buf.advance(4);
        let name = self.buf.split_to(name_len).freeze();
        self.buf.advance(4);
        let payload = self.buf.split_to(payload_len).freeze();

        if name.is_empty() {
            if !payload.is_empty() {
                return Err(MeshError::Transfer("unnamed chunk with payload".into()));
            }
            self.ended = true;
            return Ok(Some(Frame::End));
        }

        let name = String::from_utf8(name.to_vec())
            .map_err(|_| MeshError::Transfer("artifact name is not valid utf-8".into()))?;
        Ok(Some(Frame::Chunk(Chunk { name, data: payload })))
    }

    /// Call once the body is exhausted.
    pub fn finish(&self) -> Result<(), MeshError> {
        if !self.ended {
            return Err(MeshError::Transfer(
                "stream ended without end-of-stream frame".into(),
            ));
        }
        if !self.buf.is_empty() {
            return Err(MeshError::Transfer("data after end-of-stream frame".into()));
        }
        Ok(())
    }
}

fn read_u32(b: &[u8]) -> usize {
    u32::from_be_bytes([b[0], b[1], b[2], b[3]]) as usize
}
