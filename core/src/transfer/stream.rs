//! Streaming delivery on top of [`chunk`](super::chunk) and [`frame`](super::frame).

use bytes::Bytes;
use futures::{Stream, StreamExt};
use tracing::debug;

use crate::artifact::Artifact;
use crate::errors::MeshError;

use super::chunk::{Chunks, Reassembler};
use super::frame::{self, Frame, FrameDecoder};

/// Sender side: encoded chunk frames followed by the end-of-stream frame.
pub struct FrameEncoder {
    chunks: Chunks,
    done: bool,
}

impl FrameEncoder {
    pub fn new(artifacts: Vec<Artifact>, chunk_size: usize) -> Self {
        Self {
            chunks: Chunks::new(artifacts, chunk_size),
            done: false,
        }
    }
}

impl Iterator for FrameEncoder {
    type Item = Result<Bytes, MeshError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.chunks.next() {
            Some(chunk) => Some(frame::encode_chunk(&chunk)),
            None => {
                self.done = true;
                Some(Ok(frame::end_of_stream()))
            }
        }
    }
}

/// Receiver side: decodes a framed body and reassembles the artifacts.
///
/// Fails with `Transfer` on transport errors, oversized frames, or a body
/// that ends before the end-of-stream frame.
pub async fn collect_artifacts<S, E>(
    body: S,
    max_message_bytes: usize,
) -> Result<Vec<Artifact>, MeshError>
where
    S: Stream<Item = Result<Bytes, E>>,
    E: std::fmt::Display,
{
    let mut body = std::pin::pin!(body);
    let mut decoder = FrameDecoder::new(max_message_bytes);
    let mut reassembler = Reassembler::new();
    let mut chunks = 0usize;

    while let Some(piece) = body.next().await {
        let piece = piece.map_err(|e| MeshError::Transfer(e.to_string()))?;
        decoder.extend(&piece);
        while let Some(frame) = decoder.next_frame()? {
            match frame {
                Frame::Chunk(chunk) => {
                    chunks += 1;
                    reassembler.push(chunk);
                }
                Frame::End => break,
            }
        }
    }
    decoder.finish()?;

    let artifacts = reassembler.finish();
    debug!(chunks, artifacts = artifacts.len(), "stream reassembled");
    Ok(artifacts)
}
