//! diagbox unified configuration layer
//!
//! All environment reads go through this module; callers use the typed
//! structs instead of calling `std::env::var` directly.
//!
//! - `loader`: `env_or`, `env_optional`, `env_bool` helpers and `.env` loading
//! - `schema`: `ObservabilityConfig`, `StoreConfig`, `ServiceConfig`, `RunnerConfig`
//! - `env_keys`: key constants and their legacy aliases

pub mod env_keys;
pub mod loader;
pub mod schema;

pub use loader::{env_bool, env_optional, env_or, env_parse, load_dotenv, load_dotenv_from_dir};
pub use schema::{ObservabilityConfig, RunnerConfig, ServiceConfig, StoreConfig};
