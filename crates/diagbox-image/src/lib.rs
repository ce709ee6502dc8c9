//! Runtime image builder.
//!
//! A [`Recipe`] describes the image: pinned base, working directory, system
//! packages, a requirements manifest installed before the source is copied,
//! provisioned directories, the declared port and the entry point. Builds go
//! through a [`BuildBackend`]: [`LocalBackend`] produces content-addressed
//! layers in a [`LayerStore`], [`DockerBackend`] hands the rendered Dockerfile
//! to the docker CLI.

pub mod backend;
pub mod docker;
pub mod dockerfile;
pub mod entrypoint;
pub mod error;
mod fsutil;
pub mod manifest;
pub mod recipe;
pub mod runner;
pub mod step;
pub mod store;

pub use backend::{BuildBackend, BuildReport, LocalBackend, StepOutcome};
pub use docker::DockerBackend;
pub use dockerfile::render_dockerfile;
pub use entrypoint::BindSpec;
pub use error::{BuildError, ManifestError, RecipeError, RunnerError, StoreError};
pub use manifest::{Manifest, Requirement};
pub use recipe::Recipe;
pub use runner::{RunInvocation, ShellRunner, StepRunner};
pub use step::{cache_key, Step};
pub use store::{ImageConfig, ImageManifest, LayerMeta, LayerStore};
