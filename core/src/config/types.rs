use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::options::RenderOptions;

pub const KIB: usize = 1024;
pub const MIB: usize = 1024 * KIB;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub renderer: RendererConfig,

    #[serde(default)]
    pub converters: ConvertersConfig,

    #[serde(default)]
    pub transfer: TransferConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Upper bound on concurrent renderer invocations.
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    46001
}

fn default_max_workers() -> usize {
    10
}

fn default_request_timeout_secs() -> u64 {
    600
}

fn default_max_upload_bytes() -> usize {
    64 * MIB
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            max_workers: default_max_workers(),
            request_timeout_secs: default_request_timeout_secs(),
            max_upload_bytes: default_max_upload_bytes(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RendererConfig {
    #[serde(default = "default_renderer_program")]
    pub program: String,

    /// Arguments placed between the program and the renderer's own arguments
    /// (e.g. a virtual display wrapper followed by the renderer binary).
    #[serde(default = "default_renderer_prefix_args")]
    pub prefix_args: Vec<String>,

    #[serde(default = "default_artifact_suffix")]
    pub artifact_suffix: String,

    #[serde(default = "default_workspace_prefix")]
    pub workspace_prefix: String,

    /// Root for per-request workspaces; the system temp dir when unset.
    #[serde(default)]
    pub scratch_dir: Option<PathBuf>,

    #[serde(default)]
    pub defaults: RenderOptions,
}

fn default_renderer_program() -> String {
    "xvfb-run".to_string()
}

fn default_renderer_prefix_args() -> Vec<String> {
    vec!["--auto-servernum".into(), "pdb-images".into()]
}

fn default_artifact_suffix() -> String {
    ".usdz".to_string()
}

fn default_workspace_prefix() -> String {
    "pdb_images_output_".to_string()
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            program: default_renderer_program(),
            prefix_args: default_renderer_prefix_args(),
            artifact_suffix: default_artifact_suffix(),
            workspace_prefix: default_workspace_prefix(),
            scratch_dir: None,
            defaults: RenderOptions::default(),
        }
    }
}

impl RendererConfig {
    pub fn scratch_root(&self) -> PathBuf {
        self.scratch_dir.clone().unwrap_or_else(std::env::temp_dir)
    }
}

/// An external command whose arguments may reference `{input}` and `{output}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandTemplate {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
}

pub const INPUT_PLACEHOLDER: &str = "{input}";
pub const OUTPUT_PLACEHOLDER: &str = "{output}";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConvertersConfig {
    #[serde(default = "default_legacy_to_canonical")]
    pub legacy_to_canonical: CommandTemplate,

    #[serde(default = "default_table_to_legacy")]
    pub table_to_legacy: CommandTemplate,
}

fn default_legacy_to_canonical() -> CommandTemplate {
    CommandTemplate {
        program: "gemmi".into(),
        args: vec!["convert".into(), INPUT_PLACEHOLDER.into(), OUTPUT_PLACEHOLDER.into()],
    }
}

fn default_table_to_legacy() -> CommandTemplate {
    CommandTemplate {
        program: "obabel".into(),
        args: vec![
            "-isdf".into(),
            INPUT_PLACEHOLDER.into(),
            "-opdb".into(),
            "-O".into(),
            OUTPUT_PLACEHOLDER.into(),
        ],
    }
}

impl Default for ConvertersConfig {
    fn default() -> Self {
        Self {
            legacy_to_canonical: default_legacy_to_canonical(),
            table_to_legacy: default_table_to_legacy(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferConfig {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    #[serde(default = "default_max_send_message_bytes")]
    pub max_send_message_bytes: usize,

    #[serde(default = "default_max_receive_message_bytes")]
    pub max_receive_message_bytes: usize,
}

fn default_chunk_size() -> usize {
    MIB
}

fn default_max_send_message_bytes() -> usize {
    256 * MIB
}

fn default_max_receive_message_bytes() -> usize {
    512 * MIB
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            max_send_message_bytes: default_max_send_message_bytes(),
            max_receive_message_bytes: default_max_receive_message_bytes(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}
