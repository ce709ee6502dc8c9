//! Build backends and the local layered build.

use crate::error::{BuildError, StoreError};
use crate::fsutil;
use crate::manifest::Manifest;
use crate::recipe::Recipe;
use crate::runner::{RunInvocation, ShellRunner, StepRunner};
use crate::step::{cache_key, Step};
use crate::store::{self, ImageConfig, ImageManifest, LayerStore, StagedLayer};
use chrono::Utc;
use diagbox_core::config::RunnerConfig;
use diagbox_core::fingerprint::{content_hash, tree_fingerprint};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

/// Result of one executed or cached step.
#[derive(Debug, Clone, Serialize)]
pub struct StepOutcome {
    /// 1-based position in the step sequence.
    pub index: usize,
    pub name: &'static str,
    pub instruction: String,
    pub key: String,
    pub cached: bool,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct BuildReport {
    pub backend: String,
    pub tag: String,
    pub image_id: String,
    /// Present for backends that write into the layer store.
    pub image: Option<ImageManifest>,
    pub steps: Vec<StepOutcome>,
}

impl BuildReport {
    pub fn cached_steps(&self) -> usize {
        self.steps.iter().filter(|s| s.cached).count()
    }
}

/// Produces an image from a recipe and a build context.
pub trait BuildBackend {
    fn name(&self) -> &str;

    fn build(&self, recipe: &Recipe, context: &Path, tag: &str) -> Result<BuildReport, BuildError>;
}

/// Builds content-addressed layers into a [`LayerStore`].
///
/// Steps run strictly in order. A step whose cache key already has a
/// committed layer is skipped; any failure aborts the build before the
/// image manifest is written.
pub struct LocalBackend {
    store: LayerStore,
    runner: Box<dyn StepRunner>,
    commands: RunnerConfig,
}

impl LocalBackend {
    pub fn new(store: LayerStore) -> Self {
        Self {
            store,
            runner: Box::new(ShellRunner),
            commands: RunnerConfig::default(),
        }
    }

    pub fn with_runner(mut self, runner: Box<dyn StepRunner>) -> Self {
        self.runner = runner;
        self
    }

    pub fn with_commands(mut self, commands: RunnerConfig) -> Self {
        self.commands = commands;
        self
    }

    pub fn store(&self) -> &LayerStore {
        &self.store
    }

    /// CopySource copies the whole context, so a store under it would copy
    /// its own staging directories.
    fn check_store_outside(&self, context: &Path) -> Result<(), BuildError> {
        let context_abs = fs::canonicalize(context).map_err(|e| StoreError::io(context, e))?;
        let root = self.store.root();
        let store_abs = fs::canonicalize(root).map_err(|e| StoreError::io(root, e))?;
        if store_abs.starts_with(&context_abs) {
            return Err(BuildError::StoreInContext {
                store: store_abs,
                context: context_abs,
            });
        }
        Ok(())
    }

    /// Command line a RUN-type step executes, if any.
    fn command_for(&self, step: &Step) -> Option<String> {
        match step {
            Step::SystemPackages { packages } if !packages.is_empty() => {
                Some(self.commands.system_install(packages))
            }
            Step::InstallManifest { manifest } => Some(self.commands.manifest_install(manifest)),
            _ => None,
        }
    }

    fn input_digest(&self, index: usize, step: &Step, context: &Path) -> Result<String, BuildError> {
        match step {
            Step::CopyManifest { manifest } => {
                let parsed = Manifest::load(&context.join(manifest))?;
                tracing::debug!(
                    index,
                    requirements = parsed.requirements.len(),
                    "manifest validated"
                );
                Ok(parsed.digest)
            }
            Step::CopySource => {
                tree_fingerprint(context).map_err(|e| BuildError::Fingerprint(format!("{e:#}")))
            }
            _ => Ok(self
                .command_for(step)
                .map(|cmd| content_hash(cmd.as_bytes()))
                .unwrap_or_default()),
        }
    }

    fn execute(
        &self,
        index: usize,
        step: &Step,
        recipe: &Recipe,
        context: &Path,
        parents: &[String],
        staged: &StagedLayer,
    ) -> Result<(), BuildError> {
        let rootfs = staged.rootfs();
        let workdir = rootfs.join(rootfs_relative(&recipe.workdir));
        let fail = |e: StoreError| BuildError::Step {
            index,
            step: step.name(),
            message: e.to_string(),
        };

        match step {
            Step::Base { .. } | Step::Expose { .. } | Step::Entrypoint { .. } => {}
            Step::Workdir { .. } => {
                fs::create_dir_all(&workdir).map_err(|e| fail(StoreError::io(&workdir, e)))?;
            }
            Step::SystemPackages { .. } | Step::InstallManifest { .. } => {
                if let Some(command) = self.command_for(step) {
                    self.run_in_scratch(index, step, command, recipe, parents, &rootfs)?;
                }
            }
            Step::CopyManifest { manifest } => {
                let from = context.join(manifest);
                let to = workdir.join(manifest);
                if let Some(parent) = to.parent() {
                    fs::create_dir_all(parent).map_err(|e| fail(StoreError::io(parent, e)))?;
                }
                fs::copy(&from, &to).map_err(|e| fail(StoreError::io(&from, e)))?;
            }
            Step::CopySource => {
                let files = fsutil::copy_tree(context, &workdir).map_err(fail)?;
                tracing::debug!(index, files, "source copied");
            }
            Step::Provision { dirs } => {
                for dir in dirs {
                    let path = rootfs.join(rootfs_relative(dir));
                    fs::create_dir_all(&path).map_err(|e| fail(StoreError::io(&path, e)))?;
                }
            }
        }
        Ok(())
    }

    /// Run a command on top of the parent layers and record what it changed.
    fn run_in_scratch(
        &self,
        index: usize,
        step: &Step,
        command: String,
        recipe: &Recipe,
        parents: &[String],
        layer_rootfs: &Path,
    ) -> Result<(), BuildError> {
        let fail = |e: StoreError| BuildError::Step {
            index,
            step: step.name(),
            message: e.to_string(),
        };
        let scratch = self.store.scratch().map_err(fail)?;
        self.store.materialize(parents, scratch.path()).map_err(fail)?;
        let workdir: PathBuf = scratch.path().join(rootfs_relative(&recipe.workdir));
        fs::create_dir_all(&workdir).map_err(|e| fail(StoreError::io(&workdir, e)))?;

        let before = fsutil::snapshot(scratch.path()).map_err(fail)?;
        let invocation = RunInvocation {
            step,
            command,
            rootfs: scratch.path(),
            workdir,
            env: &recipe.env,
        };
        self.runner
            .run(&invocation)
            .map_err(|source| BuildError::Run {
                index,
                step: step.name(),
                source,
            })?;
        let changed = fsutil::copy_changed(scratch.path(), &before, layer_rootfs).map_err(fail)?;
        tracing::debug!(index, changed, runner = self.runner.name(), "step command finished");
        Ok(())
    }
}

impl BuildBackend for LocalBackend {
    fn name(&self) -> &str {
        "local"
    }

    fn build(&self, recipe: &Recipe, context: &Path, tag: &str) -> Result<BuildReport, BuildError> {
        recipe.validate()?;
        store::validate_tag(tag)?;
        if !context.is_dir() {
            return Err(BuildError::Context(context.to_path_buf()));
        }
        self.check_store_outside(context)?;

        let steps = recipe.steps();
        let total = steps.len();
        let mut parent = String::new();
        let mut layers: Vec<String> = Vec::with_capacity(total);
        let mut outcomes = Vec::with_capacity(total);

        for (i, step) in steps.iter().enumerate() {
            let index = i + 1;
            let started = Instant::now();
            let instruction = step.instruction();
            let digest = self.input_digest(index, step, context)?;
            let key = cache_key(&parent, &instruction, &digest);

            let cached = self.store.has_layer(&key);
            if !cached {
                let staged = self.store.begin_layer(&key, step)?;
                self.execute(index, step, recipe, context, &layers, &staged)?;
                self.store.commit_layer(staged)?;
            }

            let outcome = StepOutcome {
                index,
                name: step.name(),
                instruction,
                key: key.clone(),
                cached,
                duration_ms: started.elapsed().as_millis() as u64,
            };
            tracing::info!(
                step = %format!("{index}/{total}"),
                name = outcome.name,
                cached,
                key = %&key[..12],
                "{}",
                outcome.instruction
            );
            outcomes.push(outcome);
            layers.push(key.clone());
            parent = key;
        }

        let config = ImageConfig {
            base: recipe.base.clone(),
            workdir: recipe.workdir.clone(),
            port: recipe.port,
            entrypoint: recipe.entrypoint.clone(),
            env: recipe.env.clone(),
        };
        let image = ImageManifest {
            id: ImageManifest::compute_id(&layers, &config),
            tag: tag.to_string(),
            recipe_digest: recipe.digest(),
            layers,
            config,
            created_at: Utc::now(),
        };
        self.store.write_image(&image)?;
        tracing::info!(tag, id = %image.id, "image written");

        Ok(BuildReport {
            backend: self.name().to_string(),
            tag: tag.to_string(),
            image_id: image.id.clone(),
            image: Some(image),
            steps: outcomes,
        })
    }
}

/// `/app` -> `app`, for joining under a rootfs.
fn rootfs_relative(path: &str) -> PathBuf {
    PathBuf::from(path.trim_start_matches('/'))
}
