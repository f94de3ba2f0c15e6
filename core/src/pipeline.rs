//! Request orchestration: validate → workspace → normalize → render.
//!
//! Everything that can be rejected without scratch space is rejected first.
//! The blocking part runs on tokio's blocking pool, gated by a semaphore sized
//! to `server.max_workers`.

use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use tokio::sync::Semaphore;
use tracing::{info, warn};
use uuid::Uuid;

use crate::api::Services;
use crate::artifact::Artifact;
use crate::config::AppConfig;
use crate::errors::MeshError;
use crate::normalize::{Normalizer, PreparedUpload};
use crate::options::RenderOptions;
use crate::process::CommandRunner;
use crate::renderer::{self, normalize_identifier, InputSpec};
use crate::workspace::{CleanupScheduler, CleanupTicket, Workspace};

/// What a caller asked to render.
#[derive(Debug, Clone)]
pub enum RenderInput {
    Identifier(String),
    Upload { file_name: String, data: Bytes },
}

/// A successful render. The workspace stays alive until `ticket` is dropped
/// or released, which the transport does once the response is sent.
#[derive(Debug)]
pub struct RenderOutcome {
    pub request_id: String,
    /// Normalized identifier or upload stem; names batch archives.
    pub label: String,
    pub artifacts: Vec<Artifact>,
    pub ticket: CleanupTicket,
}

enum Validated {
    Identifier(String),
    Upload(PreparedUpload),
}

impl Validated {
    fn label(&self) -> &str {
        match self {
            Validated::Identifier(id) => id,
            Validated::Upload(upload) => upload.entry_id(),
        }
    }
}

struct Shared {
    cfg: Arc<AppConfig>,
    runner: Arc<dyn CommandRunner>,
    normalizer: Normalizer,
    scheduler: Arc<CleanupScheduler>,
}

#[derive(Clone)]
pub struct MeshPipeline {
    shared: Arc<Shared>,
    workers: Arc<Semaphore>,
}

impl MeshPipeline {
    pub fn new(cfg: Arc<AppConfig>, services: Services, scheduler: Arc<CleanupScheduler>) -> Self {
        let normalizer = Normalizer::new(services.converter, cfg.renderer.scratch_root());
        let workers = Arc::new(Semaphore::new(cfg.server.max_workers.max(1)));
        Self {
            shared: Arc::new(Shared {
                cfg,
                runner: services.runner,
                normalizer,
                scheduler,
            }),
            workers,
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.shared.cfg
    }

    pub fn scheduler(&self) -> &Arc<CleanupScheduler> {
        &self.shared.scheduler
    }

    /// Renderer slots not currently taken.
    pub fn idle_workers(&self) -> usize {
        self.workers.available_permits()
    }

    pub async fn render(
        &self,
        input: RenderInput,
        options: RenderOptions,
    ) -> Result<RenderOutcome, MeshError> {
        let request_id = Uuid::new_v4().to_string();
        let validated = match input {
            RenderInput::Identifier(raw) => Validated::Identifier(normalize_identifier(&raw)?),
            RenderInput::Upload { file_name, data } => {
                Validated::Upload(Normalizer::prepare(&file_name, data)?)
            }
        };
        let label = validated.label().to_string();

        let permit = Arc::clone(&self.workers)
            .acquire_owned()
            .await
            .map_err(|_| MeshError::Worker("render workers shut down".into()))?;

        let shared = Arc::clone(&self.shared);
        let rid = request_id.clone();
        let started = Instant::now();
        let result = tokio::task::spawn_blocking(move || {
            let _permit = permit;
            shared.render_blocking(&rid, validated, &options)
        })
        .await
        .map_err(|e| MeshError::Worker(format!("render worker aborted: {e}")))?;

        match result {
            Ok((artifacts, ticket)) => {
                info!(
                    request_id = %request_id,
                    label = %label,
                    artifacts = artifacts.len(),
                    duration_ms = started.elapsed().as_millis() as u64,
                    "render completed"
                );
                Ok(RenderOutcome {
                    request_id,
                    label,
                    artifacts,
                    ticket,
                })
            }
            Err(e) => {
                warn!(
                    request_id = %request_id,
                    label = %label,
                    error_code = e.kind(),
                    error = %e,
                    "render failed"
                );
                Err(e)
            }
        }
    }
}

impl Shared {
    /// Any error returned here has already handed the workspace to the
    /// scheduler through the ticket's drop.
    fn render_blocking(
        &self,
        request_id: &str,
        validated: Validated,
        options: &RenderOptions,
    ) -> Result<(Vec<Artifact>, CleanupTicket), MeshError> {
        let renderer_cfg = &self.cfg.renderer;
        let mut workspace = Workspace::create(
            &renderer_cfg.scratch_root(),
            &renderer_cfg.workspace_prefix,
            request_id,
        )?;
        let rendered = self.render_in(&mut workspace, validated, options);
        let ticket = CleanupTicket::new(workspace, Arc::clone(&self.scheduler));
        rendered.map(|artifacts| (artifacts, ticket))
    }

    fn render_in(
        &self,
        workspace: &mut Workspace,
        validated: Validated,
        options: &RenderOptions,
    ) -> Result<Vec<Artifact>, MeshError> {
        let input = match validated {
            Validated::Identifier(id) => InputSpec::Identifier(id),
            Validated::Upload(upload) => {
                let entry_id = upload.entry_id().to_string();
                let path = self.normalizer.materialize(upload, workspace)?;
                InputSpec::File { path, entry_id }
            }
        };
        renderer::invoke(
            self.runner.as_ref(),
            &self.cfg.renderer,
            &input,
            workspace,
            options,
        )
    }
}
