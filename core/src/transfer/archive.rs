//! Batch delivery: every artifact as one entry of a deflate-compressed zip.

use std::io::{Cursor, Write};

use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::artifact::Artifact;
use crate::errors::MeshError;

/// Archive file name for a request label (`1x8x` → `1x8x.zip`).
pub fn archive_name(label: &str) -> String {
    format!("{label}.zip")
}

pub fn build_archive(artifacts: &[Artifact]) -> Result<Vec<u8>, MeshError> {
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .large_file(artifacts.iter().any(|a| a.len() as u64 >= u32::MAX as u64));

    for artifact in artifacts {
        zip.start_file(artifact.name.as_str(), options)
            .map_err(MeshError::Archive)?;
        zip.write_all(&artifact.data)
            .map_err(|e| MeshError::Archive(e.into()))?;
    }

    let cursor = zip.finish().map_err(MeshError::Archive)?;
    Ok(cursor.into_inner())
}
