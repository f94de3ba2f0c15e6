use std::sync::Arc;

use crate::api::{Services, ServicesFactory};
use crate::config::AppConfig;
use crate::errors::ConfigError;
use crate::pipeline::MeshPipeline;
use crate::workspace::CleanupScheduler;

/// Process-wide state shared by every request: configuration, the cleanup
/// registry, and the pipeline built on top of them.
#[derive(Clone)]
pub struct AppContext {
    cfg: Arc<AppConfig>,
    scheduler: Arc<CleanupScheduler>,
    pipeline: MeshPipeline,
}

impl AppContext {
    pub fn new(cfg: AppConfig, services: Services) -> Self {
        let cfg = Arc::new(cfg);
        let scheduler = Arc::new(CleanupScheduler::new());
        let pipeline = MeshPipeline::new(Arc::clone(&cfg), services, Arc::clone(&scheduler));
        Self {
            cfg,
            scheduler,
            pipeline,
        }
    }

    pub fn from_factory(cfg: AppConfig, factory: &dyn ServicesFactory) -> Result<Self, ConfigError> {
        let services = factory.build_services(&cfg)?;
        Ok(Self::new(cfg, services))
    }

    pub fn cfg(&self) -> &AppConfig {
        &self.cfg
    }

    pub fn scheduler(&self) -> &Arc<CleanupScheduler> {
        &self.scheduler
    }

    pub fn pipeline(&self) -> &MeshPipeline {
        &self.pipeline
    }
}
