use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use molmesh_core::api::{ConfigError, MeshError, RenderOptionsPatch};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
    pub error_code: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub session_id: String,
    pub started_at: String,
    pub uptime_seconds: u64,
    pub requests_handled: u64,
    pub errors: u64,
    pub artifacts_sent: u64,
    pub idle_workers: usize,
    pub pending_cleanup: usize,
}

/// Render options plus delivery switches accepted on every render route.
///
/// Fields are spelled out instead of flattening [`RenderOptionsPatch`]:
/// flattened query structs lose their boolean parsing.
#[derive(Debug, Default, Deserialize)]
pub struct RenderQuery {
    pub mode: Option<String>,
    pub show_hydrogens: Option<bool>,
    pub show_branched_sticks: Option<bool>,
    pub ensemble_shades: Option<bool>,
    pub force_bfactor: Option<bool>,
    /// Upload route only: answer with a zip of every artifact.
    #[serde(default)]
    pub batch: bool,
}

impl RenderQuery {
    pub fn patch(&self) -> RenderOptionsPatch {
        RenderOptionsPatch {
            mode: self.mode.clone(),
            show_hydrogens: self.show_hydrogens,
            show_branched_sticks: self.show_branched_sticks,
            ensemble_shades: self.ensemble_shades,
            force_bfactor: self.force_bfactor,
        }
    }
}

#[derive(Debug, Error)]
pub enum HttpServerError {
    #[error(transparent)]
    Mesh(#[from] MeshError),

    #[error("{0}")]
    InvalidOptions(#[from] ConfigError),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl HttpServerError {
    pub fn status(&self) -> StatusCode {
        match self {
            HttpServerError::Mesh(e) => match e {
                MeshError::UnsupportedFormat { .. } | MeshError::InvalidIdentifier(_) => {
                    StatusCode::BAD_REQUEST
                }
                MeshError::NoMoleculeFound { .. } => StatusCode::UNPROCESSABLE_ENTITY,
                MeshError::RenderFailed(_) => StatusCode::BAD_GATEWAY,
                MeshError::Storage { .. }
                | MeshError::Conversion { .. }
                | MeshError::Spawn { .. }
                | MeshError::Archive(_)
                | MeshError::Transfer(_)
                | MeshError::Worker(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            HttpServerError::InvalidOptions(_) | HttpServerError::BadRequest(_) => {
                StatusCode::BAD_REQUEST
            }
            HttpServerError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            HttpServerError::Mesh(e) => e.kind(),
            HttpServerError::InvalidOptions(_) => "invalid_options",
            HttpServerError::BadRequest(_) => "bad_request",
            HttpServerError::Internal(_) => "internal_error",
        }
    }
}

impl IntoResponse for HttpServerError {
    fn into_response(self) -> Response {
        let body = ErrorResponse {
            success: false,
            error: self.to_string(),
            error_code: self.code().to_string(),
        };
        (self.status(), Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping_matches_error_kind() {
        let cases = [
            (
                HttpServerError::from(MeshError::UnsupportedFormat { name: "a.txt".into() }),
                StatusCode::BAD_REQUEST,
                "unsupported_format",
            ),
            (
                HttpServerError::from(MeshError::NoMoleculeFound { name: "l.sdf".into() }),
                StatusCode::UNPROCESSABLE_ENTITY,
                "no_molecule_found",
            ),
            (
                HttpServerError::from(MeshError::RenderFailed("unknown id".into())),
                StatusCode::BAD_GATEWAY,
                "render_failed",
            ),
            (
                HttpServerError::from(MeshError::Worker("render worker aborted".into())),
                StatusCode::INTERNAL_SERVER_ERROR,
                "worker_failed",
            ),
            (
                HttpServerError::from(ConfigError::UnknownMode("wireframe".into())),
                StatusCode::BAD_REQUEST,
                "invalid_options",
            ),
        ];
        for (err, status, code) in cases {
            assert_eq!(err.status(), status);
            assert_eq!(err.code(), code);
        }
    }
}
