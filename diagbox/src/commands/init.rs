//! `diagbox init`: write the default recipe.

use anyhow::{bail, Context, Result};
use diagbox_image::Recipe;
use std::path::Path;

pub fn cmd_init(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        bail!("{} already exists (use --force to overwrite)", path.display());
    }
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).with_context(|| format!("Creating {}", parent.display()))?;
    }
    Recipe::default().save(path)?;
    eprintln!("✓ Wrote {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_writes_loadable_recipe() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/diagbox.yaml");
        cmd_init(&path, false).unwrap();
        assert_eq!(Recipe::load(&path).unwrap(), Recipe::default());
    }

    #[test]
    fn test_init_refuses_overwrite_without_force() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("diagbox.yaml");
        std::fs::write(&path, "port: 9000\n").unwrap();
        assert!(cmd_init(&path, false).is_err());
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "port: 9000\n");

        cmd_init(&path, true).unwrap();
        assert_eq!(Recipe::load(&path).unwrap(), Recipe::default());
    }
}
