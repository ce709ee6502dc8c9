//! Environment variable keys and aliases.
//!
//! Primary variables use the `DIAGBOX_*` prefix. Aliases keep the names the
//! service historically read (`LOG_LEVEL`, `PORT`, `DEBUG`) working.

/// Layer store location
pub mod store {
    pub const DIAGBOX_STORE_DIR: &str = "DIAGBOX_STORE_DIR";
    pub const STORE_DIR_ALIASES: &[&str] = &["DIAGBOX_CACHE_DIR"];
}

/// Logging and audit
pub mod observability {
    pub const DIAGBOX_QUIET: &str = "DIAGBOX_QUIET";

    pub const DIAGBOX_LOG_LEVEL: &str = "DIAGBOX_LOG_LEVEL";
    pub const LOG_LEVEL_ALIASES: &[&str] = &["LOG_LEVEL"];

    pub const DIAGBOX_LOG_JSON: &str = "DIAGBOX_LOG_JSON";

    pub const DIAGBOX_AUDIT_LOG: &str = "DIAGBOX_AUDIT_LOG";
}

/// HTTP service launched by the image entry point
pub mod service {
    pub const DIAGBOX_HOST: &str = "DIAGBOX_HOST";

    pub const DIAGBOX_PORT: &str = "DIAGBOX_PORT";
    pub const PORT_ALIASES: &[&str] = &["PORT"];

    pub const DIAGBOX_MODELS_DIR: &str = "DIAGBOX_MODELS_DIR";
    pub const DIAGBOX_UPLOADS_DIR: &str = "DIAGBOX_UPLOADS_DIR";
    pub const DIAGBOX_MAX_UPLOAD_MB: &str = "DIAGBOX_MAX_UPLOAD_MB";

    pub const DIAGBOX_DEBUG: &str = "DIAGBOX_DEBUG";
    pub const DEBUG_ALIASES: &[&str] = &["DEBUG"];
}

/// Commands used by the local backend for RUN-type steps
pub mod runner {
    pub const DIAGBOX_SYSTEM_INSTALL_CMD: &str = "DIAGBOX_SYSTEM_INSTALL_CMD";
    pub const DIAGBOX_MANIFEST_INSTALL_CMD: &str = "DIAGBOX_MANIFEST_INSTALL_CMD";
}
