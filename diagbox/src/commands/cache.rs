//! Layer store management: list, prune, clean.
//!
//! The store lives in `~/.cache/diagbox/` (or `$DIAGBOX_STORE_DIR`) with
//! `layers/`, `images/` and `tmp/` underneath.

use super::format_size;
use anyhow::Result;
use diagbox_core::config::StoreConfig;
use diagbox_image::LayerStore;
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// `diagbox cache list`
pub fn cmd_list(store: Option<&str>) -> Result<()> {
    let root = StoreConfig::with_override(store).root;
    if !root.exists() {
        eprintln!("No layer store at {}", root.display());
        return Ok(());
    }
    let store = LayerStore::open(root)?;
    let images = store.list_images()?;
    let layers = store.list_layers()?;

    println!("Images ({}):", images.len());
    for image in &images {
        println!(
            "  {}  {}  {} layers  {}",
            image.tag,
            short(&image.id),
            image.layers.len(),
            image.created_at.format("%Y-%m-%d %H:%M:%S")
        );
    }
    println!();
    println!("Layers ({}):", layers.len());
    for layer in &layers {
        println!(
            "  {}  {:<16} {:>10}  {}",
            short(&layer.key),
            layer.step,
            format_size(layer.size_bytes),
            layer.instruction
        );
    }
    println!();
    println!("Total: {} in {}", format_size(store.disk_usage()), store.root().display());
    Ok(())
}

fn short(id: &str) -> &str {
    let id = id.strip_prefix("sha256:").unwrap_or(id);
    &id[..id.len().min(12)]
}

/// `diagbox cache prune`
pub fn cmd_prune(store: Option<&str>, dry_run: bool) -> Result<()> {
    let store = LayerStore::open(StoreConfig::with_override(store).root)?;
    let removed = store.prune(dry_run)?;
    if removed.is_empty() {
        eprintln!("No unreferenced layers.");
        return Ok(());
    }
    let total: u64 = removed.iter().map(|l| l.size_bytes).sum();
    for layer in &removed {
        eprintln!("  • {} {} ({})", short(&layer.key), layer.step, format_size(layer.size_bytes));
    }
    if dry_run {
        eprintln!();
        eprintln!(
            "(Dry run, {} layer(s), {} would be freed. Remove --dry-run to delete.)",
            removed.len(),
            format_size(total)
        );
    } else {
        eprintln!("✓ Removed {} layer(s), freed {}", removed.len(), format_size(total));
    }
    Ok(())
}

/// `diagbox cache clean`
pub fn cmd_clean(store: Option<&str>, dry_run: bool, force: bool) -> Result<()> {
    let root = StoreConfig::with_override(store).root;
    let entries = store_entries(&root);
    if entries.is_empty() {
        eprintln!("Nothing cached at {}", root.display());
        return Ok(());
    }
    let total_size: u64 = entries.iter().map(|e| e.1).sum();

    eprintln!("🗂  Layer store {}:", root.display());
    eprintln!();
    for (path, size) in &entries {
        let name = path.file_name().unwrap_or_default().to_string_lossy();
        eprintln!("  • {} ({})", name, format_size(*size));
    }
    eprintln!();
    eprintln!("Total: {}", format_size(total_size));

    if dry_run {
        eprintln!();
        eprintln!("(Dry run, no files removed. Remove --dry-run to delete.)");
        return Ok(());
    }

    if !force {
        eprint!("\nRemove every layer and image? [y/N] ");
        let mut answer = String::new();
        std::io::stdin().read_line(&mut answer)?;
        if !matches!(answer.trim().to_lowercase().as_str(), "y" | "yes") {
            eprintln!("Cancelled.");
            return Ok(());
        }
    }

    let (removed, errors) = remove_entries(&entries);
    eprintln!();
    if errors == 0 {
        eprintln!("✓ Removed {} entries, freed {}", removed, format_size(total_size));
    } else {
        eprintln!("⚠ Removed {}/{} entries ({} errors)", removed, entries.len(), errors);
    }
    Ok(())
}

/// Top-level store entries with their sizes, sorted by name.
fn store_entries(root: &Path) -> Vec<(PathBuf, u64)> {
    let mut entries: Vec<(PathBuf, u64)> = match fs::read_dir(root) {
        Ok(rd) => rd
            .flatten()
            .map(|e| e.path())
            .map(|p| {
                let size = dir_size(&p);
                (p, size)
            })
            .collect(),
        Err(_) => Vec::new(),
    };
    entries.sort_by_key(|e| e.0.file_name().unwrap_or_default().to_os_string());
    entries
}

fn remove_entries(entries: &[(PathBuf, u64)]) -> (usize, usize) {
    let mut removed = 0;
    let mut errors = 0;
    for (path, _) in entries {
        let res = if path.is_dir() {
            fs::remove_dir_all(path)
        } else {
            fs::remove_file(path)
        };
        match res {
            Ok(()) => removed += 1,
            Err(e) => {
                let name = path.file_name().unwrap_or_default().to_string_lossy();
                eprintln!("  ✗ Failed to remove {}: {}", name, e);
                errors += 1;
            }
        }
    }
    (removed, errors)
}

/// Regular files only; symlinks inside layer rootfs trees are not followed.
fn dir_size(path: &Path) -> u64 {
    WalkDir::new(path)
        .follow_links(false)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter_map(|e| e.metadata().ok())
        .map(|m| m.len())
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_id() {
        assert_eq!(short("sha256:0123456789abcdef"), "0123456789ab");
        assert_eq!(short("abc"), "abc");
    }

    #[test]
    fn test_clean_dry_run_keeps_store() {
        let dir = tempfile::tempdir().unwrap();
        let store = LayerStore::open(dir.path()).unwrap();
        fs::write(store.root().join("images/x.json"), "{}").unwrap();

        let root = dir.path().to_string_lossy().into_owned();
        cmd_clean(Some(&root), true, false).unwrap();
        assert!(dir.path().join("images/x.json").is_file());

        cmd_clean(Some(&root), false, true).unwrap();
        assert!(store_entries(dir.path()).is_empty());
    }

    #[test]
    fn test_store_entries_sizes() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("layers/k/rootfs")).unwrap();
        fs::write(dir.path().join("layers/k/rootfs/f"), "1234").unwrap();
        fs::create_dir_all(dir.path().join("images")).unwrap();
        let entries = store_entries(dir.path());
        let names: Vec<_> = entries
            .iter()
            .map(|(p, s)| (p.file_name().unwrap().to_string_lossy().into_owned(), *s))
            .collect();
        assert_eq!(names, vec![("images".to_string(), 0), ("layers".to_string(), 4)]);
    }

    #[cfg(unix)]
    #[test]
    fn test_dir_size_does_not_follow_symlinks() {
        let outside = tempfile::tempdir().unwrap();
        fs::write(outside.path().join("big"), vec![0u8; 4096]).unwrap();

        let dir = tempfile::tempdir().unwrap();
        let rootfs = dir.path().join("layers/k/rootfs");
        fs::create_dir_all(&rootfs).unwrap();
        fs::write(rootfs.join("f"), "12").unwrap();
        std::os::unix::fs::symlink(outside.path(), rootfs.join("host")).unwrap();
        std::os::unix::fs::symlink(outside.path().join("big"), rootfs.join("big")).unwrap();

        assert_eq!(dir_size(dir.path()), 2);
    }

    #[test]
    fn test_prune_on_empty_store() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().to_string_lossy().into_owned();
        cmd_prune(Some(&root), false).unwrap();
    }
}
