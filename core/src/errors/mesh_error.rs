// core/src/errors/mesh_error.rs
use thiserror::Error;

/// Fixed diagnostic used when the renderer exits quietly but writes nothing.
pub const NO_ARTIFACT_PRODUCED: &str = "no artifact produced";

/// Request-level failures of the artifact pipeline.
#[derive(Debug, Error)]
pub enum MeshError {
    #[error("unsupported input format: {name}")]
    UnsupportedFormat { name: String },

    #[error("no valid molecule record found in {name}")]
    NoMoleculeFound { name: String },

    #[error("invalid structure identifier: {0:?}")]
    InvalidIdentifier(String),

    #[error("scratch storage error: {context}")]
    Storage {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("render failed: {0}")]
    RenderFailed(String),

    #[error("conversion failed ({stage}): {message}")]
    Conversion { stage: &'static str, message: String },

    #[error("failed to spawn process: {program}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to package artifacts")]
    Archive(#[source] zip::result::ZipError),

    #[error("transfer error: {0}")]
    Transfer(String),

    /// The render worker pool itself failed (closed or a worker panicked).
    #[error("render worker failed: {0}")]
    Worker(String),
}

impl MeshError {
    pub(crate) fn storage(context: impl Into<String>, source: std::io::Error) -> Self {
        MeshError::Storage {
            context: context.into(),
            source,
        }
    }

    /// Stable machine-readable name, used as `error_code` on the wire.
    pub fn kind(&self) -> &'static str {
        match self {
            MeshError::UnsupportedFormat { .. } => "unsupported_format",
            MeshError::NoMoleculeFound { .. } => "no_molecule_found",
            MeshError::InvalidIdentifier(_) => "invalid_identifier",
            MeshError::Storage { .. } => "storage_error",
            MeshError::RenderFailed(_) => "render_failed",
            MeshError::Conversion { .. } => "conversion_failed",
            MeshError::Spawn { .. } => "spawn_failed",
            MeshError::Archive(_) => "archive_failed",
            MeshError::Transfer(_) => "transfer_error",
            MeshError::Worker(_) => "worker_failed",
        }
    }

    /// Errors the caller caused; reported before any scratch space exists.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            MeshError::UnsupportedFormat { .. }
                | MeshError::NoMoleculeFound { .. }
                | MeshError::InvalidIdentifier(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_failed_keeps_diagnostic_verbatim() {
        let err = MeshError::RenderFailed("unknown id\n".into());
        assert_eq!(err.to_string(), "render failed: unknown id\n");
        assert_eq!(err.kind(), "render_failed");
        assert!(!err.is_client_error());
    }

    #[test]
    fn upload_errors_are_client_errors() {
        let err = MeshError::UnsupportedFormat {
            name: "notes.txt".into(),
        };
        assert!(err.is_client_error());
        assert!(MeshError::NoMoleculeFound {
            name: "ligand.sdf".into()
        }
        .is_client_error());
    }

    #[test]
    fn worker_failures_are_not_render_failures() {
        let err = MeshError::Worker("render worker aborted".into());
        assert_eq!(err.kind(), "worker_failed");
        assert!(!err.is_client_error());
    }
}
