//! Subcommand implementations.

pub mod build;
pub mod cache;
pub mod init;
pub mod inspect;
pub mod render;
pub mod serve;

use anyhow::{Context, Result};
use diagbox_image::recipe::DEFAULT_RECIPE_FILE;
use diagbox_image::Recipe;
use std::path::Path;

/// Load `explicit`, else `<dir>/diagbox.yaml` when it exists, else the built-in recipe.
pub(crate) fn resolve_recipe(explicit: Option<&Path>, dir: &Path) -> Result<Recipe> {
    if let Some(path) = explicit {
        return Recipe::load(path).with_context(|| format!("Loading recipe {}", path.display()));
    }
    let default = dir.join(DEFAULT_RECIPE_FILE);
    if default.is_file() {
        tracing::debug!(path = %default.display(), "using recipe from build context");
        return Recipe::load(&default).with_context(|| format!("Loading recipe {}", default.display()));
    }
    Ok(Recipe::default())
}

/// Human readable byte count.
pub(crate) fn format_size(bytes: u64) -> String {
    if bytes >= 1_073_741_824 {
        format!("{:.1} GB", bytes as f64 / 1_073_741_824.0)
    } else if bytes >= 1_048_576 {
        format!("{:.1} MB", bytes as f64 / 1_048_576.0)
    } else if bytes >= 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{} B", bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(512), "512 B");
        assert_eq!(format_size(2048), "2.0 KB");
        assert_eq!(format_size(5 * 1_048_576), "5.0 MB");
        assert_eq!(format_size(3 * 1_073_741_824), "3.0 GB");
    }

    #[test]
    fn test_resolve_recipe_prefers_context_file() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(resolve_recipe(None, dir.path()).unwrap(), Recipe::default());

        let mut custom = Recipe::default();
        custom.port = 9000;
        custom.entrypoint = vec![
            "uvicorn".into(),
            "app.main:app".into(),
            "--host".into(),
            "0.0.0.0".into(),
            "--port".into(),
            "9000".into(),
        ];
        custom.save(&dir.path().join(DEFAULT_RECIPE_FILE)).unwrap();
        assert_eq!(resolve_recipe(None, dir.path()).unwrap().port, 9000);
    }

    #[test]
    fn test_resolve_recipe_explicit_missing_fails() {
        let dir = tempfile::tempdir().unwrap();
        assert!(resolve_recipe(Some(&dir.path().join("nope.yaml")), dir.path()).is_err());
    }
}
