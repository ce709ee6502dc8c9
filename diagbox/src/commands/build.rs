//! `diagbox build`: run a recipe through a build backend.

use crate::cli::BackendKind;
use crate::observability;
use anyhow::Result;
use diagbox_core::config::{RunnerConfig, StoreConfig};
use diagbox_image::{BuildBackend, BuildReport, DockerBackend, LayerStore, LocalBackend};
use std::path::Path;
use std::time::Instant;

fn backend_for(kind: BackendKind, store: Option<&str>) -> Result<Box<dyn BuildBackend>> {
    let commands = RunnerConfig::from_env();
    Ok(match kind {
        BackendKind::Local => {
            let root = StoreConfig::with_override(store).root;
            Box::new(LocalBackend::new(LayerStore::open(root)?).with_commands(commands))
        }
        BackendKind::Docker => Box::new(DockerBackend::locate(commands)?),
    })
}

/// Build and audit. The image is only recorded when every step succeeded.
pub(crate) fn run_build(
    backend: &dyn BuildBackend,
    recipe: Option<&Path>,
    context: &Path,
    tag: &str,
) -> Result<BuildReport> {
    let recipe = super::resolve_recipe(recipe, context)?;
    observability::audit_build_started(backend.name(), tag, context, &recipe.digest());
    tracing::info!(backend = backend.name(), tag, context = %context.display(), "Starting build");

    let start = Instant::now();
    match backend.build(&recipe, context, tag) {
        Ok(report) => {
            let elapsed = start.elapsed().as_millis() as u64;
            observability::audit_steps(&report);
            observability::audit_build_completed(&report, elapsed);
            Ok(report)
        }
        Err(e) => {
            observability::audit_build_failed(backend.name(), tag, e.step_index(), &e.to_string());
            Err(e.into())
        }
    }
}

pub fn cmd_build(
    recipe: Option<&Path>,
    context: &Path,
    tag: &str,
    store: Option<&str>,
    kind: BackendKind,
) -> Result<()> {
    let backend = backend_for(kind, store)?;
    let report = run_build(backend.as_ref(), recipe, context, tag)?;

    for step in &report.steps {
        let mark = if step.cached { "cached" } else { "built" };
        eprintln!(
            "  [{}/{}] {} ({}, {} ms)",
            step.index,
            report.steps.len(),
            step.instruction,
            mark,
            step.duration_ms
        );
    }
    if !report.steps.is_empty() {
        eprintln!(
            "✓ Built {} ({} of {} steps from cache)",
            report.tag,
            report.cached_steps(),
            report.steps.len()
        );
    }
    println!("{}", report.image_id);
    Ok(())
}
