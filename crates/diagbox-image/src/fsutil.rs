//! Tree copy and change detection used when assembling layers.

use crate::error::StoreError;
use diagbox_core::fingerprint::content_hash;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Copy every entry under `src` into `dest`, overwriting files that exist.
/// Directories (including empty ones) and symlinks are preserved.
pub(crate) fn copy_tree(src: &Path, dest: &Path) -> Result<u64, StoreError> {
    let mut copied = 0u64;
    fs::create_dir_all(dest).map_err(|e| StoreError::io(dest, e))?;
    for entry in WalkDir::new(src).follow_links(false).sort_by_file_name() {
        let entry = entry.map_err(|e| walk_error(src, e))?;
        let rel = match entry.path().strip_prefix(src) {
            Ok(r) if !r.as_os_str().is_empty() => r,
            _ => continue,
        };
        let target = dest.join(rel);
        copy_entry(entry.path(), &target, entry.file_type())?;
        if entry.file_type().is_file() {
            copied += 1;
        }
    }
    Ok(copied)
}

fn copy_entry(from: &Path, to: &Path, ft: fs::FileType) -> Result<(), StoreError> {
    if ft.is_dir() {
        if to.is_symlink() || to.is_file() {
            fs::remove_file(to).map_err(|e| StoreError::io(to, e))?;
        }
        return fs::create_dir_all(to).map_err(|e| StoreError::io(to, e));
    }
    if let Some(parent) = to.parent() {
        fs::create_dir_all(parent).map_err(|e| StoreError::io(parent, e))?;
    }
    if to.is_symlink() || to.is_file() {
        fs::remove_file(to).map_err(|e| StoreError::io(to, e))?;
    } else if to.is_dir() {
        fs::remove_dir_all(to).map_err(|e| StoreError::io(to, e))?;
    }
    if ft.is_symlink() {
        let link = fs::read_link(from).map_err(|e| StoreError::io(from, e))?;
        symlink(&link, to)
    } else {
        fs::copy(from, to)
            .map(|_| ())
            .map_err(|e| StoreError::io(to, e))
    }
}

#[cfg(unix)]
fn symlink(target: &Path, link: &Path) -> Result<(), StoreError> {
    std::os::unix::fs::symlink(target, link).map_err(|e| StoreError::io(link, e))
}

#[cfg(not(unix))]
fn symlink(target: &Path, link: &Path) -> Result<(), StoreError> {
    fs::copy(target, link)
        .map(|_| ())
        .map_err(|e| StoreError::io(link, e))
}

/// Content hash per relative path. Directories map to an empty string.
pub(crate) fn snapshot(root: &Path) -> Result<BTreeMap<PathBuf, String>, StoreError> {
    let mut out = BTreeMap::new();
    for entry in WalkDir::new(root).follow_links(false) {
        let entry = entry.map_err(|e| walk_error(root, e))?;
        let rel = match entry.path().strip_prefix(root) {
            Ok(r) if !r.as_os_str().is_empty() => r.to_path_buf(),
            _ => continue,
        };
        let ft = entry.file_type();
        let digest = if ft.is_dir() {
            String::new()
        } else if ft.is_symlink() {
            let target = fs::read_link(entry.path()).map_err(|e| StoreError::io(entry.path(), e))?;
            format!("link:{}", target.display())
        } else {
            let bytes = fs::read(entry.path()).map_err(|e| StoreError::io(entry.path(), e))?;
            content_hash(&bytes)
        };
        out.insert(rel, digest);
    }
    Ok(out)
}

/// Copy entries of `root` that are new or changed relative to `before`.
/// Deleted entries are not recorded.
pub(crate) fn copy_changed(
    root: &Path,
    before: &BTreeMap<PathBuf, String>,
    dest: &Path,
) -> Result<usize, StoreError> {
    let after = snapshot(root)?;
    let mut changed = 0;
    for (rel, digest) in &after {
        if before.get(rel) == Some(digest) {
            continue;
        }
        let from = root.join(rel);
        let meta = fs::symlink_metadata(&from).map_err(|e| StoreError::io(&from, e))?;
        copy_entry(&from, &dest.join(rel), meta.file_type())?;
        changed += 1;
    }
    Ok(changed)
}

/// Total size of regular files under `root`.
pub(crate) fn dir_size(root: &Path) -> u64 {
    WalkDir::new(root)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter_map(|e| e.metadata().ok())
        .map(|m| m.len())
        .sum()
}

fn walk_error(root: &Path, err: walkdir::Error) -> StoreError {
    let path = err.path().map(Path::to_path_buf).unwrap_or_else(|| root.to_path_buf());
    let source = err
        .into_io_error()
        .unwrap_or_else(|| std::io::Error::other("filesystem loop"));
    StoreError::io(path, source)
}
