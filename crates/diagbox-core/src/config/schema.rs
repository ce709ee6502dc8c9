//! Config structs grouped by concern, loaded from the environment.

use super::env_keys::{observability as obv_keys, runner as runner_keys, service as svc_keys, store as store_keys};
use super::loader::{env_bool, env_optional, env_or, env_parse, load_dotenv};
use std::path::PathBuf;

/// Logging: quiet, log level, JSON output, audit log path
#[derive(Debug, Clone)]
pub struct ObservabilityConfig {
    pub quiet: bool,
    pub log_level: String,
    pub log_json: bool,
    pub audit_log: Option<String>,
}

impl ObservabilityConfig {
    pub fn from_env() -> &'static Self {
        use std::sync::OnceLock;
        static CACHE: OnceLock<ObservabilityConfig> = OnceLock::new();
        CACHE.get_or_init(|| {
            load_dotenv();
            Self {
                quiet: env_bool(obv_keys::DIAGBOX_QUIET, &[], false),
                log_level: env_or(
                    obv_keys::DIAGBOX_LOG_LEVEL,
                    obv_keys::LOG_LEVEL_ALIASES,
                    || "diagbox=info".to_string(),
                ),
                log_json: env_bool(obv_keys::DIAGBOX_LOG_JSON, &[], false),
                audit_log: env_optional(obv_keys::DIAGBOX_AUDIT_LOG, &[]),
            }
        })
    }
}

/// Layer store location
#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub root: PathBuf,
}

impl StoreConfig {
    /// `$DIAGBOX_STORE_DIR`, else `<cache dir>/diagbox`, else `./.cache/diagbox`.
    pub fn from_env() -> Self {
        load_dotenv();
        let root = env_optional(store_keys::DIAGBOX_STORE_DIR, store_keys::STORE_DIR_ALIASES)
            .map(PathBuf::from)
            .or_else(|| dirs::cache_dir().map(|d| d.join("diagbox")))
            .unwrap_or_else(|| PathBuf::from(".").join(".cache").join("diagbox"));
        Self { root }
    }

    pub fn with_override(override_dir: Option<&str>) -> Self {
        match override_dir {
            Some(dir) => Self {
                root: PathBuf::from(dir),
            },
            None => Self::from_env(),
        }
    }
}

pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 8000;
pub const DEFAULT_MODELS_DIR: &str = "/models";
pub const DEFAULT_UPLOADS_DIR: &str = "/uploads";
pub const DEFAULT_MAX_UPLOAD_MB: u64 = 10;

/// HTTP service settings
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub host: String,
    pub port: u16,
    pub models_dir: PathBuf,
    pub uploads_dir: PathBuf,
    pub max_upload_bytes: u64,
    pub debug: bool,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            models_dir: PathBuf::from(DEFAULT_MODELS_DIR),
            uploads_dir: PathBuf::from(DEFAULT_UPLOADS_DIR),
            max_upload_bytes: DEFAULT_MAX_UPLOAD_MB * 1024 * 1024,
            debug: false,
        }
    }
}

impl ServiceConfig {
    pub fn from_env() -> Self {
        load_dotenv();
        let max_upload_mb = env_parse(svc_keys::DIAGBOX_MAX_UPLOAD_MB, &[], DEFAULT_MAX_UPLOAD_MB);
        Self {
            host: env_or(svc_keys::DIAGBOX_HOST, &[], || DEFAULT_HOST.to_string()),
            port: env_parse(svc_keys::DIAGBOX_PORT, svc_keys::PORT_ALIASES, DEFAULT_PORT),
            models_dir: PathBuf::from(env_or(svc_keys::DIAGBOX_MODELS_DIR, &[], || {
                DEFAULT_MODELS_DIR.to_string()
            })),
            uploads_dir: PathBuf::from(env_or(svc_keys::DIAGBOX_UPLOADS_DIR, &[], || {
                DEFAULT_UPLOADS_DIR.to_string()
            })),
            max_upload_bytes: max_upload_mb.saturating_mul(1024 * 1024),
            debug: env_bool(svc_keys::DIAGBOX_DEBUG, svc_keys::DEBUG_ALIASES, false),
        }
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

pub const DEFAULT_SYSTEM_INSTALL_CMD: &str =
    "apt-get update && apt-get install -y --no-install-recommends {packages} && rm -rf /var/lib/apt/lists/*";
pub const DEFAULT_MANIFEST_INSTALL_CMD: &str = "pip install --no-cache-dir -r {manifest}";

/// Command templates for RUN-type build steps.
///
/// `{packages}` expands to the space-separated package list, `{manifest}` to
/// the manifest path relative to the working directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunnerConfig {
    pub system_install_cmd: String,
    pub manifest_install_cmd: String,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            system_install_cmd: DEFAULT_SYSTEM_INSTALL_CMD.to_string(),
            manifest_install_cmd: DEFAULT_MANIFEST_INSTALL_CMD.to_string(),
        }
    }
}

impl RunnerConfig {
    pub fn from_env() -> Self {
        load_dotenv();
        Self {
            system_install_cmd: env_or(runner_keys::DIAGBOX_SYSTEM_INSTALL_CMD, &[], || {
                DEFAULT_SYSTEM_INSTALL_CMD.to_string()
            }),
            manifest_install_cmd: env_or(runner_keys::DIAGBOX_MANIFEST_INSTALL_CMD, &[], || {
                DEFAULT_MANIFEST_INSTALL_CMD.to_string()
            }),
        }
    }

    pub fn system_install(&self, packages: &[String]) -> String {
        self.system_install_cmd.replace("{packages}", &packages.join(" "))
    }

    pub fn manifest_install(&self, manifest: &str) -> String {
        self.manifest_install_cmd.replace("{manifest}", manifest)
    }
}
