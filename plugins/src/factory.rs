use std::sync::Arc;

use anyhow::{Context, Result};

use molmesh_core::api::{AppConfig, CommandRunner, StructureConverter};
use molmesh_core::config;

use crate::converter::ExternalConverter;
use crate::process::SystemCommandRunner;

pub fn build_runner(_cfg: &AppConfig) -> Arc<dyn CommandRunner> {
    Arc::new(SystemCommandRunner::new())
}

pub fn build_converter(
    cfg: &AppConfig,
    runner: Arc<dyn CommandRunner>,
) -> Result<Arc<dyn StructureConverter>> {
    // Configs assembled in code never went through `config::load`.
    config::validate(cfg).context("cannot build structure converters")?;
    Ok(Arc::new(ExternalConverter::new(runner, cfg.converters.clone())))
}
