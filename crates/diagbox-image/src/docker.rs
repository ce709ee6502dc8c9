//! Docker CLI backend: renders the Dockerfile and hands it to `docker build`.

use crate::backend::{BuildBackend, BuildReport};
use crate::dockerfile::render_dockerfile;
use crate::error::{BuildError, StoreError};
use crate::manifest::Manifest;
use crate::recipe::Recipe;
use crate::store;
use diagbox_core::config::RunnerConfig;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Command;

pub struct DockerBackend {
    program: PathBuf,
    commands: RunnerConfig,
}

impl DockerBackend {
    /// Locate `docker` on PATH.
    pub fn locate(commands: RunnerConfig) -> Result<Self, BuildError> {
        let program = which::which("docker")
            .map_err(|_| BuildError::Backend("docker not found in PATH".to_string()))?;
        Ok(Self { program, commands })
    }

    pub fn with_program(program: impl Into<PathBuf>, commands: RunnerConfig) -> Self {
        Self {
            program: program.into(),
            commands,
        }
    }

    pub fn build_command(&self, dockerfile: &Path, context: &Path, tag: &str, iidfile: &Path) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.arg("build")
            .arg("-f")
            .arg(dockerfile)
            .arg("-t")
            .arg(tag)
            .arg("--iidfile")
            .arg(iidfile)
            .arg(context);
        cmd
    }

    /// Write the rendered Dockerfile into a fresh directory outside the build
    /// context, so `COPY . ./` never picks it up.
    fn stage_dockerfile(&self, recipe: &Recipe) -> Result<tempfile::TempDir, BuildError> {
        let staging = tempfile::Builder::new()
            .prefix("diagbox-docker.")
            .tempdir()
            .map_err(|e| StoreError::io(std::env::temp_dir(), e))?;
        let path = staging.path().join("Dockerfile");
        let mut file = std::fs::File::create(&path).map_err(|e| StoreError::io(&path, e))?;
        file.write_all(render_dockerfile(recipe, &self.commands).as_bytes())
            .map_err(|e| StoreError::io(&path, e))?;
        Ok(staging)
    }
}

impl BuildBackend for DockerBackend {
    fn name(&self) -> &str {
        "docker"
    }

    fn build(&self, recipe: &Recipe, context: &Path, tag: &str) -> Result<BuildReport, BuildError> {
        recipe.validate()?;
        store::validate_tag(tag)?;
        if !context.is_dir() {
            return Err(BuildError::Context(context.to_path_buf()));
        }
        // Catch a corrupt manifest before docker spends time on the base layers.
        Manifest::load(&context.join(&recipe.manifest))?;

        let staging = self.stage_dockerfile(recipe)?;
        let dockerfile = staging.path().join("Dockerfile");
        let iid = staging.path().join("iid");

        let mut cmd = self.build_command(&dockerfile, context, tag, &iid);
        tracing::info!(program = %self.program.display(), tag, "running docker build");
        let status = cmd
            .status()
            .map_err(|e| BuildError::Backend(format!("failed to run {}: {e}", self.program.display())))?;
        if !status.success() {
            return Err(BuildError::Backend(format!("docker build exited with {status}")));
        }

        let image_id = std::fs::read_to_string(&iid)
            .map(|s| s.trim().to_string())
            .map_err(|e| StoreError::io(&iid, e))?;
        if image_id.is_empty() {
            return Err(BuildError::Backend("docker build reported no image id".to_string()));
        }

        Ok(BuildReport {
            backend: self.name().to_string(),
            tag: tag.to_string(),
            image_id,
            image: None,
            steps: Vec::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("requirements.txt"), "fastapi\n").unwrap();
        dir
    }

    #[test]
    fn test_build_command_args() {
        let backend = DockerBackend::with_program("docker", RunnerConfig::default());
        let cmd = backend.build_command(
            Path::new("/tmp/diagbox-docker.x/Dockerfile"),
            Path::new("/ctx"),
            "diagbox:1.0",
            Path::new("/tmp/iid"),
        );
        let args: Vec<_> = cmd.get_args().map(|a| a.to_string_lossy().into_owned()).collect();
        assert_eq!(
            args,
            vec![
                "build",
                "-f",
                "/tmp/diagbox-docker.x/Dockerfile",
                "-t",
                "diagbox:1.0",
                "--iidfile",
                "/tmp/iid",
                "/ctx"
            ]
        );
    }

    #[test]
    fn test_corrupt_manifest_checked_before_docker() {
        let ctx = context();
        std::fs::write(ctx.path().join("requirements.txt"), "-r other.txt\n").unwrap();
        let backend = DockerBackend::with_program("/nonexistent/docker", RunnerConfig::default());
        let err = backend.build(&Recipe::default(), ctx.path(), "diagbox").unwrap_err();
        assert!(matches!(err, BuildError::Manifest(_)));
    }

    #[test]
    fn test_dockerfile_staged_outside_context() {
        let ctx = context();
        let backend = DockerBackend::with_program("docker", RunnerConfig::default());
        let staging = backend.stage_dockerfile(&Recipe::default()).unwrap();
        let dockerfile = staging.path().join("Dockerfile");

        assert!(!dockerfile.starts_with(ctx.path()));
        let text = std::fs::read_to_string(&dockerfile).unwrap();
        assert!(text.contains("COPY . ./"));
        assert_eq!(std::fs::read_dir(ctx.path()).unwrap().count(), 1);

        let again = backend.stage_dockerfile(&Recipe::default()).unwrap();
        assert_eq!(std::fs::read_to_string(again.path().join("Dockerfile")).unwrap(), text);
    }

    #[cfg(unix)]
    #[test]
    fn test_failed_docker_run_leaves_context_untouched() {
        let ctx = context();
        let backend = DockerBackend::with_program("false", RunnerConfig::default());
        let err = backend.build(&Recipe::default(), ctx.path(), "diagbox").unwrap_err();
        assert!(matches!(err, BuildError::Backend(_)));
        let names: Vec<_> = std::fs::read_dir(ctx.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["requirements.txt"]);
    }
}
