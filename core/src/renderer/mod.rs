//! Renderer invocation: argument construction, execution and result
//! classification.

mod identifier;

use std::path::{Path, PathBuf};
use std::time::Instant;

use tracing::{info, warn};

use crate::artifact::Artifact;
use crate::config::RendererConfig;
use crate::errors::{MeshError, NO_ARTIFACT_PRODUCED};
use crate::options::RenderOptions;
use crate::process::{CommandRunner, CommandSpec};
use crate::workspace::Workspace;

pub use identifier::{entry_id_from_file_name, normalize_identifier};

/// What the renderer should load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputSpec {
    /// An entry id the renderer resolves from its remote source.
    Identifier(String),
    /// A canonical-format file already inside the workspace; `entry_id` names the outputs.
    File { path: PathBuf, entry_id: String },
}

impl InputSpec {
    pub fn entry_id(&self) -> &str {
        match self {
            InputSpec::Identifier(id) => id,
            InputSpec::File { entry_id, .. } => entry_id,
        }
    }
}

/// `<program> <prefix…> [--input <path>] <id> <output-dir> --type <mode> [flags…]`
pub fn build_command(
    cfg: &RendererConfig,
    input: &InputSpec,
    output_dir: &Path,
    options: &RenderOptions,
) -> CommandSpec {
    let mut spec = CommandSpec::new(cfg.program.clone()).args(cfg.prefix_args.iter().cloned());

    if let InputSpec::File { path, .. } = input {
        spec = spec.arg("--input").arg(path.display().to_string());
    }

    spec.arg(input.entry_id())
        .arg(output_dir.display().to_string())
        .arg("--type")
        .arg(options.mode.as_arg())
        .args(options.flags())
}

/// Runs the renderer into `workspace` and returns the produced artifacts.
///
/// Any output on the diagnostic stream is a failure whatever the exit code; a
/// quiet run that leaves no artifact behind is a failure as well.
pub fn invoke(
    runner: &dyn CommandRunner,
    cfg: &RendererConfig,
    input: &InputSpec,
    workspace: &Workspace,
    options: &RenderOptions,
) -> Result<Vec<Artifact>, MeshError> {
    let spec = build_command(cfg, input, workspace.path(), options);
    info!(
        request_id = %workspace.request_id(),
        args = ?spec.argv(),
        "starting renderer"
    );

    let started = Instant::now();
    let output = runner.run(&spec)?;
    let duration_ms = started.elapsed().as_millis() as u64;

    if !output.stderr.is_empty() {
        let diagnostic = output.stderr_text();
        warn!(
            request_id = %workspace.request_id(),
            exit_code = output.exit_code,
            duration_ms,
            diagnostic = %diagnostic,
            "renderer reported diagnostics"
        );
        return Err(MeshError::RenderFailed(diagnostic));
    }

    let artifacts = workspace.list_artifacts(&cfg.artifact_suffix)?;
    if artifacts.is_empty() {
        warn!(
            request_id = %workspace.request_id(),
            exit_code = output.exit_code,
            "renderer finished without artifacts"
        );
        return Err(MeshError::RenderFailed(NO_ARTIFACT_PRODUCED.to_string()));
    }

    info!(
        request_id = %workspace.request_id(),
        exit_code = output.exit_code,
        duration_ms,
        artifacts = artifacts.len(),
        bytes = artifacts.iter().map(Artifact::len).sum::<usize>(),
        "renderer finished"
    );
    Ok(artifacts)
}
