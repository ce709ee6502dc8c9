//! Error types for recipe validation, manifest parsing, the layer store and builds.

use std::path::PathBuf;
use thiserror::Error;

/// Recipe loading and validation errors.
#[derive(Debug, Error)]
pub enum RecipeError {
    #[error("Failed to read recipe {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write recipe {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse recipe {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("Failed to serialize recipe: {0}")]
    Serialize(#[source] serde_yaml::Error),

    #[error("Base image '{0}' is not pinned (use an explicit tag other than 'latest', or a digest)")]
    UnpinnedBase(String),

    #[error("{field} must be an absolute path, got '{value}'")]
    NotAbsolute { field: &'static str, value: String },

    #[error("{field} '{value}' must be a plain absolute path without '..', whitespace or control characters")]
    InvalidPath { field: &'static str, value: String },

    #[error("Invalid environment variable name '{0}'")]
    InvalidEnvKey(String),

    #[error("Invalid system package name '{0}'")]
    InvalidPackage(String),

    #[error("Manifest path '{0}' must be a relative path inside the build context")]
    InvalidManifestPath(String),

    #[error("At least one directory must be provisioned")]
    NoProvisionDirs,

    #[error("Directory '{0}' is provisioned twice")]
    DuplicateDir(String),

    #[error("Port {0} is outside 1..=65535")]
    InvalidPort(u16),

    #[error("Entry point is empty")]
    EmptyEntrypoint,

    #[error("Entry point argument '{arg}' is invalid: {reason}")]
    InvalidEntrypoint { arg: String, reason: String },

    #[error("Entry point binds {host}:{port}, expected all interfaces on port {expected}")]
    EntrypointBind {
        host: String,
        port: u16,
        expected: u16,
    },

    #[error("Entry point does not name an application object (module:attribute)")]
    MissingAppTarget,

    #[error("Step '{later}' must come after '{earlier}'")]
    StepOrder {
        earlier: &'static str,
        later: &'static str,
    },
}

/// Requirements manifest errors. Any of these means the manifest is corrupt.
#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("Manifest not found: {0}")]
    Missing(PathBuf),

    #[error("Failed to read manifest {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Manifest {0} is not valid UTF-8")]
    NotUtf8(PathBuf),

    #[error("Manifest line {line}: {reason}: '{content}'")]
    InvalidLine {
        line: usize,
        content: String,
        reason: &'static str,
    },
}

/// Layer store errors.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Corrupt metadata at {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Image '{0}' not found")]
    ImageNotFound(String),

    #[error("Layer '{0}' not found")]
    LayerNotFound(String),

    #[error("Invalid image tag '{0}'")]
    InvalidTag(String),
}

impl StoreError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Failure of a RUN-type step command.
#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("Failed to spawn '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("'{command}' exited with {status}: {stderr}")]
    Exit {
        command: String,
        status: String,
        stderr: String,
    },
}

/// Build errors. Every variant aborts the build; no image is written.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error(transparent)]
    Recipe(#[from] RecipeError),

    #[error(transparent)]
    Manifest(#[from] ManifestError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Build context {0} is not a directory")]
    Context(PathBuf),

    #[error("Layer store {store} is inside the build context {context}")]
    StoreInContext { store: PathBuf, context: PathBuf },

    #[error("Failed to fingerprint build context: {0}")]
    Fingerprint(String),

    #[error("Step {index} ({step}) failed: {source}")]
    Run {
        index: usize,
        step: &'static str,
        #[source]
        source: RunnerError,
    },

    #[error("Step {index} ({step}) failed: {message}")]
    Step {
        index: usize,
        step: &'static str,
        message: String,
    },

    #[error("Backend error: {0}")]
    Backend(String),
}

impl BuildError {
    /// Index of the failing step, when the failure is tied to one.
    pub fn step_index(&self) -> Option<usize> {
        match self {
            Self::Run { index, .. } | Self::Step { index, .. } => Some(*index),
            Self::Manifest(_) => Some(crate::step::COPY_MANIFEST_STEP),
            _ => None,
        }
    }
}
