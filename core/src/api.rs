//! Stable re-exports for consumers (`cli`, `plugins`, and external crates).
//!
//! Prefer importing from `molmesh_core::api` instead of reaching into internal modules.

use std::sync::Arc;

pub use crate::artifact::Artifact;
pub use crate::config::{AppConfig, CommandTemplate, ConvertersConfig, LoggingConfig, RendererConfig};
pub use crate::context::AppContext;
pub use crate::errors::{ConfigError, MeshError, NO_ARTIFACT_PRODUCED};
pub use crate::normalize::StructureConverter;
pub use crate::options::{RenderOptions, RenderOptionsPatch, RepresentationMode};
pub use crate::pipeline::{MeshPipeline, RenderInput, RenderOutcome};
pub use crate::process::{normalize_exit, CapturedOutput, CommandRunner, CommandSpec};
pub use crate::transfer::{
    archive_name, build_archive, collect_artifacts, select_single, DeliveryMode, FrameEncoder,
    CHUNK_STREAM_CONTENT_TYPE,
};
pub use crate::workspace::{CleanupScheduler, CleanupTicket};

/// External collaborators the pipeline drives.
#[derive(Clone)]
pub struct Services {
    pub runner: Arc<dyn CommandRunner>,
    pub converter: Arc<dyn StructureConverter>,
}

/// Builds [`Services`] from configuration; implemented by the plugins crate.
pub trait ServicesFactory: Send + Sync {
    fn build_services(&self, cfg: &AppConfig) -> Result<Services, ConfigError>;
}
