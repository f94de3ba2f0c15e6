//! Splitting artifacts into bounded chunks and regrouping them.

use bytes::{Bytes, BytesMut};

use crate::artifact::Artifact;

/// Transport unit: a slice of one artifact, tagged with the artifact name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub name: String,
    pub data: Bytes,
}

impl Chunk {
    pub fn new(name: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Self {
            name: name.into(),
            data: data.into(),
        }
    }
}

/// Iterator over the chunks of a sequence of artifacts.
///
/// All chunks of artifact *i* come before any chunk of artifact *i + 1*; the
/// reassembly rule depends on it. A zero-byte artifact yields one empty chunk
/// so it is not lost on the way.
#[derive(Debug)]
pub struct Chunks {
    artifacts: std::vec::IntoIter<Artifact>,
    current: Option<Artifact>,
    offset: usize,
    chunk_size: usize,
}

impl Chunks {
    pub fn new(artifacts: Vec<Artifact>, chunk_size: usize) -> Self {
        Self {
            artifacts: artifacts.into_iter(),
            current: None,
            offset: 0,
            chunk_size: chunk_size.max(1),
        }
    }
}

impl Iterator for Chunks {
    type Item = Chunk;

    fn next(&mut self) -> Option<Chunk> {
        loop {
            if self.current.is_none() {
                let next = self.artifacts.next()?;
                self.offset = 0;
                if next.data.is_empty() {
                    return Some(Chunk::new(next.name, Bytes::new()));
                }
                self.current = Some(next);
            }

            let Some(artifact) = self.current.as_ref() else {
                continue;
            };
            let len = artifact.data.len();
            if self.offset >= len {
                self.current = None;
                continue;
            }

            let end = (self.offset + self.chunk_size).min(len);
            let chunk = Chunk {
                name: artifact.name.clone(),
                data: artifact.data.slice(self.offset..end),
            };
            self.offset = end;
            return Some(chunk);
        }
    }
}

pub fn chunk_artifacts(artifacts: Vec<Artifact>, chunk_size: usize) -> Chunks {
    Chunks::new(artifacts, chunk_size)
}

/// Receiver side: groups contiguous same-name chunks back into artifacts.
#[derive(Debug, Default)]
pub struct Reassembler {
    current: Option<String>,
    buffer: BytesMut,
    completed: Vec<Artifact>,
}

impl Reassembler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, chunk: Chunk) {
        if self.current.as_deref() != Some(chunk.name.as_str()) {
            self.flush();
            self.current = Some(chunk.name);
        }
        self.buffer.extend_from_slice(&chunk.data);
    }

    /// Artifacts completed so far (excluding the one still accumulating).
    pub fn completed(&self) -> &[Artifact] {
        &self.completed
    }

    pub fn finish(mut self) -> Vec<Artifact> {
        self.flush();
        self.completed
    }

    fn flush(&mut self) {
        if let Some(name) = self.current.take() {
            let data = self.buffer.split().freeze();
            self.completed.push(Artifact { name, data });
        }
    }
}

pub fn reassemble<I>(chunks: I) -> Vec<Artifact>
where
    I: IntoIterator<Item = Chunk>,
{
    let mut r = Reassembler::new();
    for chunk in chunks {
        r.push(chunk);
    }
    r.finish()
}
