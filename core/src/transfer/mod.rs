//! Artifact transfer: single payload, zip batch, or framed chunk stream.

pub mod archive;
pub mod chunk;
pub mod frame;
pub mod stream;

use crate::artifact::Artifact;

pub use archive::{archive_name, build_archive};
pub use chunk::{chunk_artifacts, reassemble, Chunk, Chunks, Reassembler};
pub use frame::{Frame, FrameDecoder};
pub use stream::{collect_artifacts, FrameEncoder};

/// Content type of a framed chunk stream.
pub const CHUNK_STREAM_CONTENT_TYPE: &str = "application/x-molmesh-chunks";

/// How a finished render is handed back to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryMode {
    Single,
    Batch,
    Stream,
}

impl DeliveryMode {
    /// Client flags `--batch` / `--stream`; neither means single.
    pub fn from_flags(batch: bool, stream: bool) -> Self {
        match (batch, stream) {
            (true, _) => DeliveryMode::Batch,
            (false, true) => DeliveryMode::Stream,
            (false, false) => DeliveryMode::Single,
        }
    }

    /// Trailing path segment of the identifier route, if any.
    pub fn route_segment(self) -> Option<&'static str> {
        match self {
            DeliveryMode::Single => None,
            DeliveryMode::Batch => Some("batch"),
            DeliveryMode::Stream => Some("stream"),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DeliveryMode::Single => "single",
            DeliveryMode::Batch => "batch",
            DeliveryMode::Stream => "stream",
        }
    }
}

/// Single mode uses the first artifact in enumeration order; the workspace
/// scan sorts by name, so this is the lexicographically smallest one.
pub fn select_single(mut artifacts: Vec<Artifact>) -> Option<Artifact> {
    if artifacts.is_empty() {
        None
    } else {
        Some(artifacts.swap_remove(0))
    }
}
