//! `ServicesFactory` backed by real external programs.
use molmesh_core::api::{AppConfig, ConfigError, Services, ServicesFactory};

use crate::factory;

pub struct PluginServicesFactory;

impl Default for PluginServicesFactory {
    fn default() -> Self {
        Self
    }
}

impl ServicesFactory for PluginServicesFactory {
    fn build_services(&self, cfg: &AppConfig) -> Result<Services, ConfigError> {
        let runner = factory::build_runner(cfg);
        let converter = factory::build_converter(cfg, runner.clone())
            .map_err(|e| ConfigError::Validation(format!("{e:#}")))?;
        Ok(Services { runner, converter })
    }
}
