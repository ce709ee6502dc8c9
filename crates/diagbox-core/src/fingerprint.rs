//! Content fingerprints for build inputs.
//!
//! A tree fingerprint is the SHA256 over every regular file's relative path
//! and bytes, in sorted path order. Symlinks are hashed by their target path.

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// SHA256 of a byte slice, hex-encoded.
pub fn content_hash(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Relative paths of all files and symlinks under `root`, sorted.
pub fn list_files(root: &Path) -> Result<Vec<PathBuf>> {
    let mut out = Vec::new();
    for entry in WalkDir::new(root).follow_links(false).sort_by_file_name() {
        let entry = entry.with_context(|| format!("Failed to walk {}", root.display()))?;
        let ft = entry.file_type();
        if ft.is_dir() {
            continue;
        }
        let rel = entry
            .path()
            .strip_prefix(root)
            .with_context(|| format!("Path outside root: {}", entry.path().display()))?;
        out.push(rel.to_path_buf());
    }
    out.sort();
    Ok(out)
}

/// Fingerprint a directory tree.
pub fn tree_fingerprint(root: &Path) -> Result<String> {
    let mut hasher = Sha256::new();
    for rel in list_files(root)? {
        let path = root.join(&rel);
        let meta = fs::symlink_metadata(&path)
            .with_context(|| format!("Failed to stat {}", path.display()))?;
        hasher.update(rel.to_string_lossy().as_bytes());
        hasher.update([0u8]);
        if meta.file_type().is_symlink() {
            let target = fs::read_link(&path)
                .with_context(|| format!("Failed to read link {}", path.display()))?;
            hasher.update(b"link:");
            hasher.update(target.to_string_lossy().as_bytes());
        } else {
            let content = fs::read(&path)
                .with_context(|| format!("Failed to read file for hashing: {}", path.display()))?;
            hasher.update(&content);
        }
        hasher.update([0u8]);
    }
    Ok(hex::encode(hasher.finalize()))
}
