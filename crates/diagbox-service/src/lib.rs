//! HTTP service started by the image entry point (`diagbox serve`).
//!
//! Patient registry, medication catalog with interaction checks, OTC
//! recommendations, prescriptions, upload storage into the provisioned
//! uploads directory and model artifact listing. State is in memory.

pub mod catalog;
pub mod error;
pub mod handlers;
pub mod medication;
pub mod registry;
pub mod server;
pub mod validators;

pub use catalog::{Catalog, Interaction, Medication, Severity};
pub use error::{ServiceError, ServiceResult};
pub use server::{prepare_dirs, router, serve, AppState};
