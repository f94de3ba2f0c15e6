use std::process::{Command, Stdio};
use std::time::Instant;

use molmesh_core::api::{normalize_exit, CapturedOutput, CommandRunner, CommandSpec, MeshError};

/// Runs commands as child processes of this server, waiting for completion.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemCommandRunner;

impl SystemCommandRunner {
    pub fn new() -> Self {
        Self
    }
}

impl CommandRunner for SystemCommandRunner {
    fn run(&self, spec: &CommandSpec) -> Result<CapturedOutput, MeshError> {
        let started = Instant::now();
        let output = Command::new(&spec.program)
            .args(&spec.args)
            .stdin(Stdio::null())
            .output()
            .map_err(|source| MeshError::Spawn {
                program: spec.program.clone(),
                source,
            })?;

        let exit_code = normalize_exit(output.status);
        tracing::debug!(
            program = %spec.program,
            exit_code,
            stdout_bytes = output.stdout.len(),
            stderr_bytes = output.stderr.len(),
            duration_ms = started.elapsed().as_millis() as u64,
            "process exited"
        );
        Ok(CapturedOutput {
            exit_code,
            stdout: output.stdout,
            stderr: output.stderr,
        })
    }
}
