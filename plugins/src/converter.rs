//! Structure format conversion through configurable external tools.

use std::path::Path;
use std::sync::Arc;

use molmesh_core::api::{CommandRunner, CommandSpec, CommandTemplate, ConvertersConfig, MeshError, StructureConverter};
use molmesh_core::config::{INPUT_PLACEHOLDER, OUTPUT_PLACEHOLDER};

/// Converters judge success by exit status: the usual tools print progress
/// ("1 molecule converted") on stderr even when they succeed.
pub struct ExternalConverter {
    runner: Arc<dyn CommandRunner>,
    config: ConvertersConfig,
}

impl ExternalConverter {
    pub fn new(runner: Arc<dyn CommandRunner>, config: ConvertersConfig) -> Self {
        Self { runner, config }
    }

    fn convert(
        &self,
        stage: &'static str,
        template: &CommandTemplate,
        input: &Path,
        output: &Path,
    ) -> Result<(), MeshError> {
        let spec = fill(template, input, output);
        tracing::info!(stage, args = ?spec.argv(), "running converter");

        let out = self.runner.run(&spec)?;
        if out.exit_code != 0 {
            let stderr = out.stderr_text();
            let message = if stderr.trim().is_empty() {
                format!("{} exited with code {}", spec.program, out.exit_code)
            } else {
                stderr.trim().to_string()
            };
            return Err(MeshError::Conversion { stage, message });
        }
        Ok(())
    }
}

fn fill(template: &CommandTemplate, input: &Path, output: &Path) -> CommandSpec {
    let input = input.display().to_string();
    let output = output.display().to_string();
    CommandSpec::new(template.program.clone()).args(
        template
            .args
            .iter()
            .map(|a| a.replace(INPUT_PLACEHOLDER, &input).replace(OUTPUT_PLACEHOLDER, &output)),
    )
}

impl StructureConverter for ExternalConverter {
    fn legacy_to_canonical(&self, input: &Path, output: &Path) -> Result<(), MeshError> {
        self.convert("legacy_to_canonical", &self.config.legacy_to_canonical, input, output)
    }

    fn table_to_legacy(&self, input: &Path, output: &Path) -> Result<(), MeshError> {
        self.convert("table_to_legacy", &self.config.table_to_legacy, input, output)
    }
}
