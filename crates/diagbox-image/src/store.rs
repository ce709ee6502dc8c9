//! Content-addressed layer store.
//!
//! Layout under the store root:
//!
//! ```text
//! layers/<key>/layer.json   LayerMeta
//! layers/<key>/rootfs/      files the step added or changed
//! images/<tag>.json         ImageManifest (':' in the tag stored as '+')
//! tmp/                      staging dirs and in-flight writes
//! ```
//!
//! Layers are staged under `tmp/` and renamed into place on commit; image
//! manifests are written through a temp file and persisted atomically, so a
//! failed build never leaves a partial layer or image behind.

use crate::error::StoreError;
use crate::fsutil;
use crate::step::Step;
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tempfile::TempDir;

const LAYER_META_FILE: &str = "layer.json";
const ROOTFS_DIR: &str = "rootfs";

/// Metadata of a committed layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayerMeta {
    pub key: String,
    pub step: String,
    pub instruction: String,
    pub created_at: DateTime<Utc>,
    pub size_bytes: u64,
}

/// Runtime configuration recorded in the image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageConfig {
    pub base: String,
    pub workdir: String,
    pub port: u16,
    pub entrypoint: Vec<String>,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageManifest {
    pub id: String,
    pub tag: String,
    pub recipe_digest: String,
    /// Layer keys, base first.
    pub layers: Vec<String>,
    pub config: ImageConfig,
    pub created_at: DateTime<Utc>,
}

impl ImageManifest {
    /// Image id over the layer keys and the config. Independent of the tag
    /// and of `created_at`.
    pub fn compute_id(layers: &[String], config: &ImageConfig) -> String {
        let mut hasher = Sha256::new();
        for key in layers {
            hasher.update(key.as_bytes());
            hasher.update([0u8]);
        }
        hasher.update(serde_json::to_vec(config).unwrap_or_default());
        hex::encode(hasher.finalize())
    }
}

fn tag_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^[a-z0-9][a-z0-9._\-]*(:[A-Za-z0-9._\-]+)?$").expect("static regex")
    })
}

/// `name` or `name:version`, lowercase name.
pub fn validate_tag(tag: &str) -> Result<(), StoreError> {
    if tag.len() > 128 || !tag_re().is_match(tag) {
        return Err(StoreError::InvalidTag(tag.to_string()));
    }
    Ok(())
}

fn tag_file_name(tag: &str) -> String {
    format!("{}.json", tag.replace(':', "+"))
}

/// A layer being assembled. Dropping it without committing discards it.
pub struct StagedLayer {
    dir: TempDir,
    key: String,
    step: String,
    instruction: String,
}

impl StagedLayer {
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Directory that becomes the layer's `rootfs/`.
    pub fn rootfs(&self) -> PathBuf {
        self.dir.path().join(ROOTFS_DIR)
    }
}

#[derive(Debug, Clone)]
pub struct LayerStore {
    root: PathBuf,
}

impl LayerStore {
    /// Open (and create if needed) a store rooted at `root`.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        for sub in ["layers", "images", "tmp"] {
            let dir = root.join(sub);
            fs::create_dir_all(&dir).map_err(|e| StoreError::io(&dir, e))?;
        }
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn layers_dir(&self) -> PathBuf {
        self.root.join("layers")
    }

    fn images_dir(&self) -> PathBuf {
        self.root.join("images")
    }

    fn tmp_dir(&self) -> PathBuf {
        self.root.join("tmp")
    }

    pub fn layer_rootfs(&self, key: &str) -> PathBuf {
        self.layers_dir().join(key).join(ROOTFS_DIR)
    }

    pub fn has_layer(&self, key: &str) -> bool {
        self.layers_dir().join(key).join(LAYER_META_FILE).is_file()
    }

    /// Create a staging directory for the layer `key` produced by `step`.
    pub fn begin_layer(&self, key: &str, step: &Step) -> Result<StagedLayer, StoreError> {
        let tmp = self.tmp_dir();
        let dir = tempfile::Builder::new()
            .prefix("layer-")
            .tempdir_in(&tmp)
            .map_err(|e| StoreError::io(&tmp, e))?;
        let rootfs = dir.path().join(ROOTFS_DIR);
        fs::create_dir_all(&rootfs).map_err(|e| StoreError::io(&rootfs, e))?;
        Ok(StagedLayer {
            dir,
            key: key.to_string(),
            step: step.name().to_string(),
            instruction: step.instruction(),
        })
    }

    /// Throwaway directory under `tmp/`, removed on drop.
    pub fn scratch(&self) -> Result<TempDir, StoreError> {
        let tmp = self.tmp_dir();
        tempfile::Builder::new()
            .prefix("scratch-")
            .tempdir_in(&tmp)
            .map_err(|e| StoreError::io(&tmp, e))
    }

    /// Write the layer metadata and move the staged layer into place.
    pub fn commit_layer(&self, staged: StagedLayer) -> Result<LayerMeta, StoreError> {
        let meta = LayerMeta {
            key: staged.key.clone(),
            step: staged.step.clone(),
            instruction: staged.instruction.clone(),
            created_at: Utc::now(),
            size_bytes: fsutil::dir_size(&staged.rootfs()),
        };
        let meta_path = staged.dir.path().join(LAYER_META_FILE);
        let json = serde_json::to_vec_pretty(&meta).map_err(|source| StoreError::Json {
            path: meta_path.clone(),
            source,
        })?;
        fs::write(&meta_path, json).map_err(|e| StoreError::io(&meta_path, e))?;

        let dest = self.layers_dir().join(&staged.key);
        if self.has_layer(&staged.key) {
            // Same key means same content; keep the existing layer.
            return self.layer(&staged.key);
        }
        if dest.exists() {
            fs::remove_dir_all(&dest).map_err(|e| StoreError::io(&dest, e))?;
        }
        fs::rename(staged.dir.path(), &dest).map_err(|e| StoreError::io(&dest, e))?;
        tracing::debug!(key = %meta.key, step = %meta.step, size = meta.size_bytes, "layer committed");
        Ok(meta)
    }

    pub fn layer(&self, key: &str) -> Result<LayerMeta, StoreError> {
        let path = self.layers_dir().join(key).join(LAYER_META_FILE);
        if !path.is_file() {
            return Err(StoreError::LayerNotFound(key.to_string()));
        }
        read_json(&path)
    }

    /// All committed layers, oldest first.
    pub fn list_layers(&self) -> Result<Vec<LayerMeta>, StoreError> {
        let dir = self.layers_dir();
        let mut out = Vec::new();
        for entry in fs::read_dir(&dir).map_err(|e| StoreError::io(&dir, e))? {
            let entry = entry.map_err(|e| StoreError::io(&dir, e))?;
            let meta_path = entry.path().join(LAYER_META_FILE);
            if meta_path.is_file() {
                out.push(read_json::<LayerMeta>(&meta_path)?);
            }
        }
        out.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.key.cmp(&b.key)));
        Ok(out)
    }

    pub fn remove_layer(&self, key: &str) -> Result<(), StoreError> {
        let dir = self.layers_dir().join(key);
        if !dir.exists() {
            return Err(StoreError::LayerNotFound(key.to_string()));
        }
        fs::remove_dir_all(&dir).map_err(|e| StoreError::io(&dir, e))
    }

    /// Atomically write an image manifest under its tag.
    pub fn write_image(&self, image: &ImageManifest) -> Result<PathBuf, StoreError> {
        validate_tag(&image.tag)?;
        let dest = self.images_dir().join(tag_file_name(&image.tag));
        let json = serde_json::to_vec_pretty(image).map_err(|source| StoreError::Json {
            path: dest.clone(),
            source,
        })?;
        let tmp = self.tmp_dir();
        let mut file = tempfile::NamedTempFile::new_in(&tmp).map_err(|e| StoreError::io(&tmp, e))?;
        file.write_all(&json)
            .and_then(|_| file.as_file().sync_all())
            .map_err(|e| StoreError::io(file.path(), e))?;
        file.persist(&dest)
            .map_err(|e| StoreError::io(&dest, e.error))?;
        Ok(dest)
    }

    pub fn read_image(&self, tag: &str) -> Result<ImageManifest, StoreError> {
        validate_tag(tag)?;
        let path = self.images_dir().join(tag_file_name(tag));
        if !path.is_file() {
            return Err(StoreError::ImageNotFound(tag.to_string()));
        }
        read_json(&path)
    }

    pub fn list_images(&self) -> Result<Vec<ImageManifest>, StoreError> {
        let dir = self.images_dir();
        let mut out = Vec::new();
        for entry in fs::read_dir(&dir).map_err(|e| StoreError::io(&dir, e))? {
            let path = entry.map_err(|e| StoreError::io(&dir, e))?.path();
            if path.extension().and_then(|e| e.to_str()) == Some("json") {
                out.push(read_json::<ImageManifest>(&path)?);
            }
        }
        out.sort_by(|a, b| a.tag.cmp(&b.tag));
        Ok(out)
    }

    pub fn remove_image(&self, tag: &str) -> Result<(), StoreError> {
        validate_tag(tag)?;
        let path = self.images_dir().join(tag_file_name(tag));
        if !path.is_file() {
            return Err(StoreError::ImageNotFound(tag.to_string()));
        }
        fs::remove_file(&path).map_err(|e| StoreError::io(&path, e))
    }

    /// Layers no image references. With `dry_run` nothing is deleted.
    /// Leftover staging directories are always cleared when not dry-running.
    pub fn prune(&self, dry_run: bool) -> Result<Vec<LayerMeta>, StoreError> {
        let referenced: HashSet<String> = self
            .list_images()?
            .into_iter()
            .flat_map(|img| img.layers)
            .collect();
        let unreferenced: Vec<LayerMeta> = self
            .list_layers()?
            .into_iter()
            .filter(|l| !referenced.contains(&l.key))
            .collect();
        if dry_run {
            return Ok(unreferenced);
        }
        for layer in &unreferenced {
            self.remove_layer(&layer.key)?;
        }
        let tmp = self.tmp_dir();
        for entry in fs::read_dir(&tmp).map_err(|e| StoreError::io(&tmp, e))? {
            let path = entry.map_err(|e| StoreError::io(&tmp, e))?.path();
            let res = if path.is_dir() {
                fs::remove_dir_all(&path)
            } else {
                fs::remove_file(&path)
            };
            if let Err(e) = res {
                tracing::warn!(path = %path.display(), error = %e, "failed to remove staging entry");
            }
        }
        Ok(unreferenced)
    }

    /// Stack the rootfs of `layers` in order into `dest`.
    pub fn materialize(&self, layers: &[String], dest: &Path) -> Result<(), StoreError> {
        fs::create_dir_all(dest).map_err(|e| StoreError::io(dest, e))?;
        for key in layers {
            if !self.has_layer(key) {
                return Err(StoreError::LayerNotFound(key.clone()));
            }
            let rootfs = self.layer_rootfs(key);
            if rootfs.is_dir() {
                fsutil::copy_tree(&rootfs, dest)?;
            }
        }
        Ok(())
    }

    /// Flatten the image `tag` into `dest`.
    pub fn export(&self, tag: &str, dest: &Path) -> Result<ImageManifest, StoreError> {
        let image = self.read_image(tag)?;
        self.materialize(&image.layers, dest)?;
        Ok(image)
    }

    /// Bytes used by committed layers.
    pub fn disk_usage(&self) -> u64 {
        fsutil::dir_size(&self.layers_dir())
    }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, StoreError> {
    let bytes = fs::read(path).map_err(|e| StoreError::io(path, e))?;
    serde_json::from_slice(&bytes).map_err(|source| StoreError::Json {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> ImageConfig {
        ImageConfig {
            base: "python:3.11-slim".into(),
            workdir: "/app".into(),
            port: 8000,
            entrypoint: vec!["uvicorn".into(), "app.main:app".into()],
            env: BTreeMap::new(),
        }
    }

    fn commit(store: &LayerStore, key: &str, files: &[(&str, &str)]) -> LayerMeta {
        let staged = store.begin_layer(key, &Step::CopySource).unwrap();
        for (rel, content) in files {
            let path = staged.rootfs().join(rel);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, content).unwrap();
        }
        store.commit_layer(staged).unwrap()
    }

    fn image(tag: &str, layers: &[&str]) -> ImageManifest {
        let layers: Vec<String> = layers.iter().map(|s| s.to_string()).collect();
        ImageManifest {
            id: ImageManifest::compute_id(&layers, &config()),
            tag: tag.into(),
            recipe_digest: "r".into(),
            layers,
            config: config(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_commit_and_read_layer() {
        let dir = tempfile::tempdir().unwrap();
        let store = LayerStore::open(dir.path()).unwrap();
        assert!(!store.has_layer("k1"));

        let meta = commit(&store, "k1", &[("app/main.py", "print(1)")]);
        assert!(store.has_layer("k1"));
        assert_eq!(meta.size_bytes, 8);
        assert_eq!(store.layer("k1").unwrap().instruction, "COPY . ./");
        assert!(store.layer_rootfs("k1").join("app/main.py").is_file());
        assert_eq!(fs::read_dir(dir.path().join("tmp")).unwrap().count(), 0);
    }

    #[test]
    fn test_dropped_stage_leaves_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let store = LayerStore::open(dir.path()).unwrap();
        let staged = store.begin_layer("k1", &Step::CopySource).unwrap();
        fs::write(staged.rootfs().join("x"), "x").unwrap();
        drop(staged);
        assert!(!store.has_layer("k1"));
        assert!(store.list_layers().unwrap().is_empty());
        assert_eq!(fs::read_dir(dir.path().join("tmp")).unwrap().count(), 0);
    }

    #[test]
    fn test_image_roundtrip_and_tags() {
        let dir = tempfile::tempdir().unwrap();
        let store = LayerStore::open(dir.path()).unwrap();
        let img = image("diagbox:1.0", &["a", "b"]);
        let path = store.write_image(&img).unwrap();
        assert!(path.ends_with("images/diagbox+1.0.json"));
        assert_eq!(store.read_image("diagbox:1.0").unwrap(), img);
        assert!(matches!(
            store.read_image("other"),
            Err(StoreError::ImageNotFound(_))
        ));
        assert!(matches!(
            store.write_image(&image("Bad/Tag", &[])),
            Err(StoreError::InvalidTag(_))
        ));
        store.remove_image("diagbox:1.0").unwrap();
        assert!(store.list_images().unwrap().is_empty());
    }

    #[test]
    fn test_image_id_ignores_created_at_and_tag() {
        let a = image("a", &["k1", "k2"]);
        let b = image("b", &["k1", "k2"]);
        assert_eq!(a.id, b.id);
        assert_ne!(a.id, image("a", &["k2", "k1"]).id);
    }

    #[test]
    fn test_export_stacks_layers_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let store = LayerStore::open(dir.path().join("store")).unwrap();
        commit(&store, "k1", &[("app/a.txt", "old"), ("app/keep.txt", "k")]);
        commit(&store, "k2", &[("app/a.txt", "new")]);
        store.write_image(&image("img", &["k1", "k2"])).unwrap();

        let out = dir.path().join("out");
        store.export("img", &out).unwrap();
        assert_eq!(fs::read_to_string(out.join("app/a.txt")).unwrap(), "new");
        assert_eq!(fs::read_to_string(out.join("app/keep.txt")).unwrap(), "k");
    }

    #[test]
    fn test_prune_keeps_referenced_layers() {
        let dir = tempfile::tempdir().unwrap();
        let store = LayerStore::open(dir.path()).unwrap();
        commit(&store, "used", &[]);
        commit(&store, "orphan", &[("f", "1")]);
        store.write_image(&image("img", &["used"])).unwrap();

        let candidates = store.prune(true).unwrap();
        assert_eq!(candidates.len(), 1);
        assert!(store.has_layer("orphan"));

        let removed = store.prune(false).unwrap();
        assert_eq!(removed[0].key, "orphan");
        assert!(!store.has_layer("orphan"));
        assert!(store.has_layer("used"));
    }
}
