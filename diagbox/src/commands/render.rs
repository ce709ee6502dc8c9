//! `diagbox render`: print the Dockerfile equivalent of a recipe.

use anyhow::{Context, Result};
use diagbox_core::config::RunnerConfig;
use diagbox_image::render_dockerfile;
use std::io::Write;
use std::path::Path;

pub fn cmd_render(recipe: Option<&Path>, output: Option<&Path>) -> Result<()> {
    let recipe = super::resolve_recipe(recipe, Path::new("."))?;
    recipe.validate()?;
    let dockerfile = render_dockerfile(&recipe, &RunnerConfig::from_env());
    match output {
        Some(path) => {
            std::fs::write(path, &dockerfile).with_context(|| format!("Writing {}", path.display()))?;
            eprintln!("✓ Wrote {}", path.display());
        }
        None => {
            std::io::stdout().lock().write_all(dockerfile.as_bytes())?;
        }
    }
    Ok(())
}
