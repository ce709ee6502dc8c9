//! Execution of RUN-type steps.

use crate::error::RunnerError;
use crate::step::Step;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::Command;

/// Env var carrying the root of the layer being built.
pub const ROOTFS_ENV: &str = "DIAGBOX_ROOTFS";

/// One command execution for a RUN-type step.
#[derive(Debug)]
pub struct RunInvocation<'a> {
    pub step: &'a Step,
    /// Fully expanded command line.
    pub command: String,
    /// Scratch root holding the parent layers; changes under it become the new layer.
    pub rootfs: &'a Path,
    /// `rootfs` joined with the image working directory.
    pub workdir: PathBuf,
    pub env: &'a BTreeMap<String, String>,
}

/// Runs RUN-type steps. Implementations must fail on a non-zero exit.
pub trait StepRunner: Send + Sync {
    fn name(&self) -> &str;

    fn run(&self, invocation: &RunInvocation<'_>) -> Result<(), RunnerError>;
}

/// Runs the command with `sh -c` in the working directory.
#[derive(Debug, Default, Clone, Copy)]
pub struct ShellRunner;

const STDERR_TAIL: usize = 2000;

impl StepRunner for ShellRunner {
    fn name(&self) -> &str {
        "shell"
    }

    fn run(&self, invocation: &RunInvocation<'_>) -> Result<(), RunnerError> {
        tracing::info!(step = invocation.step.name(), command = %invocation.command, "running step command");
        let out = Command::new("sh")
            .arg("-c")
            .arg(&invocation.command)
            .current_dir(&invocation.workdir)
            .envs(invocation.env)
            .env(ROOTFS_ENV, invocation.rootfs)
            .output()
            .map_err(|source| RunnerError::Spawn {
                command: invocation.command.clone(),
                source,
            })?;
        if !out.status.success() {
            let stderr = String::from_utf8_lossy(&out.stderr);
            let stderr = stderr.trim();
            let start = stderr
                .char_indices()
                .rev()
                .nth(STDERR_TAIL)
                .map(|(i, _)| i)
                .unwrap_or(0);
            return Err(RunnerError::Exit {
                command: invocation.command.clone(),
                status: out.status.to_string(),
                stderr: stderr[start..].to_string(),
            });
        }
        Ok(())
    }
}
