//! `diagbox inspect` and `diagbox export`.

use anyhow::{Context, Result};
use diagbox_core::config::StoreConfig;
use diagbox_image::entrypoint::{app_target, parse_bind};
use diagbox_image::{ImageManifest, LayerStore};
use serde_json::json;
use std::path::Path;

fn open_store(store: Option<&str>) -> Result<LayerStore> {
    Ok(LayerStore::open(StoreConfig::with_override(store).root)?)
}

/// Manifest plus what the entry point resolves to.
pub(crate) fn describe(store: &LayerStore, tag: &str) -> Result<serde_json::Value> {
    let image: ImageManifest = store.read_image(tag)?;
    let bind = parse_bind(&image.config.entrypoint)?;
    let app = app_target(&image.config.entrypoint).map(str::to_string);
    let layers: Vec<serde_json::Value> = image
        .layers
        .iter()
        .map(|key| match store.layer(key) {
            Ok(meta) => json!({
                "key": meta.key,
                "step": meta.step,
                "instruction": meta.instruction,
                "size_bytes": meta.size_bytes,
            }),
            Err(e) => json!({ "key": key, "error": e.to_string() }),
        })
        .collect();
    Ok(json!({
        "id": image.id,
        "tag": image.tag,
        "created_at": image.created_at,
        "recipe_digest": image.recipe_digest,
        "config": image.config,
        "bind": bind.to_string(),
        "reachable": bind.is_wildcard(),
        "app": app,
        "layers": layers,
    }))
}

pub fn cmd_inspect(tag: &str, store: Option<&str>) -> Result<()> {
    let store = open_store(store)?;
    let value = describe(&store, tag)?;
    println!("{}", serde_json::to_string_pretty(&value)?);
    Ok(())
}

pub fn cmd_export(tag: &str, dest: &Path, store: Option<&str>) -> Result<()> {
    let store = open_store(store)?;
    let image = store
        .export(tag, dest)
        .with_context(|| format!("Exporting {} to {}", tag, dest.display()))?;
    eprintln!(
        "✓ Exported {} ({} layers) to {}",
        image.tag,
        image.layers.len(),
        dest.display()
    );
    Ok(())
}
