//! Recipe: the declarative description of a runtime image.
//!
//! Stored as YAML (`diagbox.yaml` by default). Every field is optional and
//! falls back to the service's standard layout.

use crate::entrypoint::{self, BindSpec};
use crate::error::RecipeError;
use crate::step::{self, Step};
use diagbox_core::fingerprint::content_hash;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::{Component, Path};
use std::sync::OnceLock;

pub const DEFAULT_RECIPE_FILE: &str = "diagbox.yaml";

pub const DEFAULT_BASE: &str = "python:3.11-slim";
pub const DEFAULT_WORKDIR: &str = "/app";
pub const DEFAULT_SYSTEM_PACKAGES: &[&str] = &["libpq-dev", "gcc", "g++", "libgl1", "libglib2.0-0"];
pub const DEFAULT_MANIFEST: &str = "requirements.txt";
pub const DEFAULT_PROVISION_DIRS: &[&str] = &["/models", "/uploads"];
pub const DEFAULT_PORT: u16 = 8000;
pub const DEFAULT_ENTRYPOINT: &[&str] = &[
    "uvicorn",
    "app.main:app",
    "--host",
    "0.0.0.0",
    "--port",
    "8000",
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Recipe {
    /// Base image reference; must carry a tag other than `latest`, or a digest.
    pub base: String,
    pub workdir: String,
    pub system_packages: Vec<String>,
    /// Requirements manifest, relative to the build context.
    pub manifest: String,
    pub provision_dirs: Vec<String>,
    pub port: u16,
    pub entrypoint: Vec<String>,
    pub env: BTreeMap<String, String>,
}

impl Default for Recipe {
    fn default() -> Self {
        let owned = |items: &[&str]| items.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        Self {
            base: DEFAULT_BASE.to_string(),
            workdir: DEFAULT_WORKDIR.to_string(),
            system_packages: owned(DEFAULT_SYSTEM_PACKAGES),
            manifest: DEFAULT_MANIFEST.to_string(),
            provision_dirs: owned(DEFAULT_PROVISION_DIRS),
            port: DEFAULT_PORT,
            entrypoint: owned(DEFAULT_ENTRYPOINT),
            env: BTreeMap::new(),
        }
    }
}

fn package_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[a-z0-9][a-z0-9+.\-]*$").expect("static regex"))
}

impl Recipe {
    /// Read a recipe file and validate it.
    pub fn load(path: &Path) -> Result<Self, RecipeError> {
        let content = std::fs::read_to_string(path).map_err(|source| RecipeError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let recipe: Recipe =
            serde_yaml::from_str(&content).map_err(|source| RecipeError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        recipe.validate()?;
        Ok(recipe)
    }

    /// Validate, then write as YAML.
    pub fn save(&self, path: &Path) -> Result<(), RecipeError> {
        self.validate()?;
        let yaml = self.to_yaml()?;
        std::fs::write(path, yaml).map_err(|source| RecipeError::Write {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn to_yaml(&self) -> Result<String, RecipeError> {
        serde_yaml::to_string(self).map_err(RecipeError::Serialize)
    }

    pub fn validate(&self) -> Result<(), RecipeError> {
        if !is_pinned(&self.base) {
            return Err(RecipeError::UnpinnedBase(self.base.clone()));
        }
        check_absolute("workdir", &self.workdir)?;
        if let Some(bad) = self
            .system_packages
            .iter()
            .find(|p| !package_re().is_match(p))
        {
            return Err(RecipeError::InvalidPackage(bad.clone()));
        }
        if !is_context_relative(&self.manifest) {
            return Err(RecipeError::InvalidManifestPath(self.manifest.clone()));
        }

        if self.provision_dirs.is_empty() {
            return Err(RecipeError::NoProvisionDirs);
        }
        let mut seen = HashSet::new();
        for dir in &self.provision_dirs {
            check_absolute("provision_dirs", dir)?;
            if !seen.insert(dir.trim_end_matches('/')) {
                return Err(RecipeError::DuplicateDir(dir.clone()));
            }
        }

        if let Some(key) = self.env.keys().find(|k| !env_key_re().is_match(k)) {
            return Err(RecipeError::InvalidEnvKey(key.clone()));
        }

        if self.port == 0 {
            return Err(RecipeError::InvalidPort(self.port));
        }
        if self.entrypoint.is_empty() || self.entrypoint[0].trim().is_empty() {
            return Err(RecipeError::EmptyEntrypoint);
        }
        self.check_entrypoint()?;

        step::check_order(&self.steps())
    }

    /// The entry point must serve a `module:attribute` application and bind
    /// all interfaces on the declared port.
    pub fn check_entrypoint(&self) -> Result<BindSpec, RecipeError> {
        if entrypoint::app_target(&self.entrypoint).is_none() {
            return Err(RecipeError::MissingAppTarget);
        }
        let bind = entrypoint::parse_bind(&self.entrypoint)?;
        if !bind.is_wildcard() || bind.port != self.port {
            return Err(RecipeError::EntrypointBind {
                host: bind.host,
                port: bind.port,
                expected: self.port,
            });
        }
        Ok(bind)
    }

    /// The fixed step sequence.
    pub fn steps(&self) -> Vec<Step> {
        vec![
            Step::Base {
                image: self.base.clone(),
            },
            Step::Workdir {
                path: self.workdir.clone(),
            },
            Step::SystemPackages {
                packages: self.system_packages.clone(),
            },
            Step::CopyManifest {
                manifest: self.manifest.clone(),
            },
            Step::InstallManifest {
                manifest: self.manifest.clone(),
            },
            Step::CopySource,
            Step::Provision {
                dirs: self.provision_dirs.clone(),
            },
            Step::Expose { port: self.port },
            Step::Entrypoint {
                argv: self.entrypoint.clone(),
            },
        ]
    }

    /// Hash of the canonical JSON form.
    pub fn digest(&self) -> String {
        let json = serde_json::to_vec(self).unwrap_or_default();
        content_hash(&json)
    }
}

/// `name@sha256:...`, or a tag on the last path segment that is not `latest`.
fn is_pinned(base: &str) -> bool {
    let base = base.trim();
    if base.is_empty() || base.contains(|c: char| c.is_whitespace() || c.is_control()) {
        return false;
    }
    if let Some((name, digest)) = base.split_once('@') {
        return !name.is_empty() && digest.contains(':');
    }
    let last = base.rsplit('/').next().unwrap_or(base);
    match last.split_once(':') {
        Some((name, tag)) => !name.is_empty() && !tag.is_empty() && tag != "latest",
        None => false,
    }
}

fn env_key_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("static regex"))
}

/// Paths end up verbatim in Dockerfile lines and joined under a layer rootfs.
fn has_unsafe_chars(path: &str) -> bool {
    path.chars().any(|c| c.is_whitespace() || c.is_control())
}

fn check_absolute(field: &'static str, value: &str) -> Result<(), RecipeError> {
    if !value.starts_with('/') {
        return Err(RecipeError::NotAbsolute {
            field,
            value: value.to_string(),
        });
    }
    let clean = Path::new(value)
        .components()
        .all(|c| matches!(c, Component::RootDir | Component::Normal(_) | Component::CurDir));
    if !clean || has_unsafe_chars(value) {
        return Err(RecipeError::InvalidPath {
            field,
            value: value.to_string(),
        });
    }
    Ok(())
}

fn is_context_relative(path: &str) -> bool {
    let p = Path::new(path);
    !path.is_empty()
        && !has_unsafe_chars(path)
        && p.components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
        && p.components().any(|c| matches!(c, Component::Normal(_)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_recipe_is_valid() {
        let recipe = Recipe::default();
        recipe.validate().unwrap();
        let bind = recipe.check_entrypoint().unwrap();
        assert_eq!(bind.to_string(), "0.0.0.0:8000");
        assert_eq!(recipe.provision_dirs, vec!["/models", "/uploads"]);
    }

    #[test]
    fn test_steps_install_before_source() {
        let names: Vec<_> = Recipe::default().steps().iter().map(Step::name).collect();
        assert_eq!(
            names,
            vec![
                "base",
                "workdir",
                "system_packages",
                "copy_manifest",
                "install_manifest",
                "copy_source",
                "provision",
                "expose",
                "entrypoint"
            ]
        );
    }

    #[test]
    fn test_unpinned_base_rejected() {
        for base in ["python", "python:latest", "registry:5000/python", "python:"] {
            let recipe = Recipe {
                base: base.to_string(),
                ..Recipe::default()
            };
            assert!(
                matches!(recipe.validate(), Err(RecipeError::UnpinnedBase(_))),
                "{base} should be rejected"
            );
        }
        for base in ["python:3.11-slim", "registry:5000/python:3.11", "python@sha256:abc"] {
            assert!(is_pinned(base), "{base} should be pinned");
        }
    }

    #[test]
    fn test_field_invariants() {
        let bad_workdir = Recipe {
            workdir: "app".into(),
            ..Recipe::default()
        };
        assert!(matches!(
            bad_workdir.validate(),
            Err(RecipeError::NotAbsolute { field: "workdir", .. })
        ));

        let bad_pkg = Recipe {
            system_packages: vec!["gcc; rm -rf /".into()],
            ..Recipe::default()
        };
        assert!(matches!(bad_pkg.validate(), Err(RecipeError::InvalidPackage(_))));

        let escaping = Recipe {
            manifest: "../requirements.txt".into(),
            ..Recipe::default()
        };
        assert!(matches!(
            escaping.validate(),
            Err(RecipeError::InvalidManifestPath(_))
        ));

        let dup = Recipe {
            provision_dirs: vec!["/models".into(), "/models/".into()],
            ..Recipe::default()
        };
        assert!(matches!(dup.validate(), Err(RecipeError::DuplicateDir(_))));

        let none = Recipe {
            provision_dirs: vec![],
            ..Recipe::default()
        };
        assert!(matches!(none.validate(), Err(RecipeError::NoProvisionDirs)));

        let empty_cmd = Recipe {
            entrypoint: vec![],
            ..Recipe::default()
        };
        assert!(matches!(empty_cmd.validate(), Err(RecipeError::EmptyEntrypoint)));
    }

    #[test]
    fn test_entrypoint_must_match_port_and_wildcard() {
        let loopback = Recipe {
            entrypoint: vec!["uvicorn".into(), "app.main:app".into()],
            ..Recipe::default()
        };
        assert!(matches!(
            loopback.check_entrypoint(),
            Err(RecipeError::EntrypointBind { .. })
        ));

        let wrong_port = Recipe {
            port: 9000,
            ..Recipe::default()
        };
        assert!(matches!(
            wrong_port.validate(),
            Err(RecipeError::EntrypointBind { port: 8000, expected: 9000, .. })
        ));
    }

    #[test]
    fn test_paths_cannot_escape_rootfs() {
        let escaping_dir = Recipe {
            provision_dirs: vec!["/models".into(), "/../../../../ESCAPED".into()],
            ..Recipe::default()
        };
        assert!(matches!(
            escaping_dir.validate(),
            Err(RecipeError::InvalidPath { field: "provision_dirs", .. })
        ));

        let escaping_workdir = Recipe {
            workdir: "/app/../../host".into(),
            ..Recipe::default()
        };
        assert!(matches!(
            escaping_workdir.validate(),
            Err(RecipeError::InvalidPath { field: "workdir", .. })
        ));
    }

    #[test]
    fn test_line_breaks_and_bad_env_keys_rejected() {
        let injected = Recipe {
            workdir: "/app\nRUN touch /pwned".into(),
            ..Recipe::default()
        };
        assert!(matches!(injected.validate(), Err(RecipeError::InvalidPath { .. })));

        let spaced = Recipe {
            provision_dirs: vec!["/models".into(), "/up loads".into()],
            ..Recipe::default()
        };
        assert!(matches!(spaced.validate(), Err(RecipeError::InvalidPath { .. })));

        let manifest = Recipe {
            manifest: "requirements.txt\nRUN id".into(),
            ..Recipe::default()
        };
        assert!(matches!(
            manifest.validate(),
            Err(RecipeError::InvalidManifestPath(_))
        ));

        let mut env = BTreeMap::new();
        env.insert("BAD KEY\nRUN id".to_string(), "1".to_string());
        let bad_env = Recipe {
            env,
            ..Recipe::default()
        };
        assert!(matches!(bad_env.validate(), Err(RecipeError::InvalidEnvKey(_))));

        let mut env = BTreeMap::new();
        env.insert("PYTHONUNBUFFERED".to_string(), "line\nbreak".to_string());
        Recipe {
            env,
            ..Recipe::default()
        }
        .validate()
        .unwrap();
    }

    #[test]
    fn test_entrypoint_must_name_app() {
        let sleeper = Recipe {
            entrypoint: ["sleep", "--port", "8000", "--host", "0.0.0.0"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            ..Recipe::default()
        };
        assert!(matches!(sleeper.validate(), Err(RecipeError::MissingAppTarget)));
    }

    #[test]
    fn test_yaml_partial_and_unknown_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(DEFAULT_RECIPE_FILE);

        std::fs::write(&path, "system_packages: []\nenv:\n  PYTHONUNBUFFERED: \"1\"\n").unwrap();
        let recipe = Recipe::load(&path).unwrap();
        assert!(recipe.system_packages.is_empty());
        assert_eq!(recipe.base, DEFAULT_BASE);
        assert_eq!(recipe.env.get("PYTHONUNBUFFERED").map(String::as_str), Some("1"));

        std::fs::write(&path, "bogus: 1\n").unwrap();
        assert!(matches!(Recipe::load(&path), Err(RecipeError::Parse { .. })));
    }

    #[test]
    fn test_save_then_load_preserves_digest() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(DEFAULT_RECIPE_FILE);
        let recipe = Recipe::default();
        recipe.save(&path).unwrap();
        assert_eq!(Recipe::load(&path).unwrap().digest(), recipe.digest());

        let changed = Recipe {
            workdir: "/srv".into(),
            ..Recipe::default()
        };
        assert_ne!(changed.digest(), recipe.digest());
    }
}
