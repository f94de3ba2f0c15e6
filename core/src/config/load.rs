use std::path::Path;

use crate::errors::ConfigError;
use crate::transfer::frame;

use super::types::{AppConfig, CommandTemplate, INPUT_PLACEHOLDER, OUTPUT_PLACEHOLDER};

pub const DEFAULT_CONFIG_FILE: &str = "molmesh.toml";

/// Explicit path → `./molmesh.toml` → defaults, then `MOLMESH_*` overrides, then validation.
pub fn load(path: Option<&Path>) -> Result<AppConfig, ConfigError> {
    let mut cfg = match path {
        Some(p) => {
            if !p.exists() {
                return Err(ConfigError::NotFound(p.display().to_string()));
            }
            read_file(p)?
        }
        None if Path::new(DEFAULT_CONFIG_FILE).exists() => read_file(Path::new(DEFAULT_CONFIG_FILE))?,
        None => AppConfig::default(),
    };

    apply_env_overrides(&mut cfg, |key| std::env::var(key).ok())?;
    validate(&cfg)?;
    Ok(cfg)
}

fn read_file(path: &Path) -> Result<AppConfig, ConfigError> {
    let s = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.display().to_string(),
        source,
    })?;
    toml::from_str::<AppConfig>(&s).map_err(ConfigError::Parse)
}

/// Applies `MOLMESH_*` variables; blank values are ignored.
pub fn apply_env_overrides<F>(cfg: &mut AppConfig, lookup: F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

    if let Some(v) = get("MOLMESH_HOST") {
        cfg.server.host = v;
    }
    if let Some(v) = get("MOLMESH_PORT") {
        cfg.server.port = v.trim().parse().map_err(|_| ConfigError::EnvInvalid {
            key: "MOLMESH_PORT".into(),
            value: v.clone(),
        })?;
    }
    if let Some(v) = get("MOLMESH_RENDERER") {
        cfg.renderer.program = v;
    }
    if let Some(v) = get("MOLMESH_SCRATCH_DIR") {
        cfg.renderer.scratch_dir = Some(v.into());
    }
    if let Some(v) = get("MOLMESH_CHUNK_SIZE") {
        cfg.transfer.chunk_size = v.trim().parse().map_err(|_| ConfigError::EnvInvalid {
            key: "MOLMESH_CHUNK_SIZE".into(),
            value: v.clone(),
        })?;
    }
    Ok(())
}

pub fn validate(cfg: &AppConfig) -> Result<(), ConfigError> {
    if cfg.server.max_workers == 0 {
        return Err(ConfigError::Validation(
            "server.max_workers must be at least 1".into(),
        ));
    }
    if cfg.renderer.program.trim().is_empty() {
        return Err(ConfigError::Validation("renderer.program is empty".into()));
    }
    if cfg.renderer.artifact_suffix.is_empty() {
        return Err(ConfigError::Validation(
            "renderer.artifact_suffix is empty".into(),
        ));
    }

    let transfer = &cfg.transfer;
    if transfer.chunk_size == 0 {
        return Err(ConfigError::Validation(
            "transfer.chunk_size must be at least 1".into(),
        ));
    }
    let largest_frame = frame::max_frame_len(transfer.chunk_size);
    if largest_frame > transfer.max_send_message_bytes {
        return Err(ConfigError::Validation(format!(
            "transfer.chunk_size {} does not fit max_send_message_bytes {} (largest frame {} bytes)",
            transfer.chunk_size, transfer.max_send_message_bytes, largest_frame
        )));
    }

    check_template("converters.legacy_to_canonical", &cfg.converters.legacy_to_canonical)?;
    check_template("converters.table_to_legacy", &cfg.converters.table_to_legacy)?;
    Ok(())
}

fn check_template(name: &str, template: &CommandTemplate) -> Result<(), ConfigError> {
    if template.program.trim().is_empty() {
        return Err(ConfigError::Validation(format!("{name}.program is empty")));
    }
    for placeholder in [INPUT_PLACEHOLDER, OUTPUT_PLACEHOLDER] {
        if !template.args.iter().any(|a| a.contains(placeholder)) {
            return Err(ConfigError::Validation(format!(
                "{name}.args must reference {placeholder}"
            )));
        }
    }
    Ok(())
}
