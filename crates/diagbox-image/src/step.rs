//! Build steps and chained cache keys.

use crate::error::RecipeError;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// 1-based position of `CopyManifest` in a recipe's step sequence. Manifest
/// failures are reported against this step.
pub const COPY_MANIFEST_STEP: usize = 4;

/// One step of the linear build sequence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Step {
    Base { image: String },
    Workdir { path: String },
    SystemPackages { packages: Vec<String> },
    CopyManifest { manifest: String },
    InstallManifest { manifest: String },
    CopySource,
    Provision { dirs: Vec<String> },
    Expose { port: u16 },
    Entrypoint { argv: Vec<String> },
}

impl Step {
    pub fn name(&self) -> &'static str {
        match self {
            Step::Base { .. } => "base",
            Step::Workdir { .. } => "workdir",
            Step::SystemPackages { .. } => "system_packages",
            Step::CopyManifest { .. } => "copy_manifest",
            Step::InstallManifest { .. } => "install_manifest",
            Step::CopySource => "copy_source",
            Step::Provision { .. } => "provision",
            Step::Expose { .. } => "expose",
            Step::Entrypoint { .. } => "entrypoint",
        }
    }

    /// Canonical instruction text. Part of the cache key, so it must only
    /// change when the step's meaning changes.
    pub fn instruction(&self) -> String {
        match self {
            Step::Base { image } => format!("FROM {image}"),
            Step::Workdir { path } => format!("WORKDIR {path}"),
            Step::SystemPackages { packages } => {
                format!("RUN install-system-packages {}", packages.join(" "))
            }
            Step::CopyManifest { manifest } => format!("COPY {manifest} ./{manifest}"),
            Step::InstallManifest { manifest } => format!("RUN install-manifest {manifest}"),
            Step::CopySource => "COPY . ./".to_string(),
            Step::Provision { dirs } => format!("RUN mkdir -p {}", dirs.join(" ")),
            Step::Expose { port } => format!("EXPOSE {port}"),
            Step::Entrypoint { argv } => {
                format!("CMD {}", serde_json::to_string(argv).unwrap_or_default())
            }
        }
    }

    /// Steps that execute a command through the [`crate::StepRunner`].
    pub fn is_run(&self) -> bool {
        matches!(self, Step::SystemPackages { .. } | Step::InstallManifest { .. })
    }
}

/// `sha256(parent ‖ 0 ‖ instruction ‖ 0 ‖ input_digest)`, hex-encoded.
pub fn cache_key(parent: &str, instruction: &str, input_digest: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(parent.as_bytes());
    hasher.update([0u8]);
    hasher.update(instruction.as_bytes());
    hasher.update([0u8]);
    hasher.update(input_digest.as_bytes());
    hex::encode(hasher.finalize())
}

/// Dependencies are installed before the source is copied: base first,
/// then manifest copy, manifest install, source copy.
pub fn check_order(steps: &[Step]) -> Result<(), RecipeError> {
    let pos = |name: &str| steps.iter().position(|s| s.name() == name);

    if !matches!(steps.first(), Some(Step::Base { .. })) {
        return Err(RecipeError::StepOrder {
            earlier: "base",
            later: steps.first().map(Step::name).unwrap_or("copy_source"),
        });
    }

    let chain = ["copy_manifest", "install_manifest", "copy_source"];
    for pair in chain.windows(2) {
        match (pos(pair[0]), pos(pair[1])) {
            (Some(a), Some(b)) if a < b => {}
            _ => {
                return Err(RecipeError::StepOrder {
                    earlier: pair[0],
                    later: pair[1],
                })
            }
        }
    }
    Ok(())
}
