//! `diagbox serve`: run the HTTP service in the foreground.

use anyhow::{Context, Result};
use diagbox_core::config::ServiceConfig;

pub(crate) fn service_config(host: Option<String>, port: Option<u16>) -> ServiceConfig {
    let mut config = ServiceConfig::from_env();
    if let Some(host) = host {
        config.host = host;
    }
    if let Some(port) = port {
        config.port = port;
    }
    config
}

pub fn cmd_serve(host: Option<String>, port: Option<u16>) -> Result<()> {
    let config = service_config(host, port);
    tracing::info!(addr = %config.bind_addr(), "Starting diagnostic service");
    let rt = tokio::runtime::Runtime::new().context("Failed to create tokio runtime")?;
    rt.block_on(diagbox_service::serve(config))?;
    Ok(())
}
