//! Entry point analysis: where the launched server binds and which
//! application object it serves.
//!
//! Understands the uvicorn/gunicorn style flags `--host`, `--port`,
//! `--bind`/`-b host:port`, both as separate arguments and `--flag=value`.

use crate::error::RecipeError;
use serde::Serialize;

/// uvicorn's defaults when no flag is given.
pub const DEFAULT_BIND_HOST: &str = "127.0.0.1";
pub const DEFAULT_BIND_PORT: u16 = 8000;

/// Options that consume the following argument.
const VALUE_OPTIONS: &[&str] = &[
    "--host",
    "--port",
    "--bind",
    "-b",
    "--workers",
    "-w",
    "--log-level",
    "--root-path",
    "--env-file",
    "--worker-class",
    "-k",
];

/// Address the entry point process binds to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BindSpec {
    pub host: String,
    pub port: u16,
}

impl BindSpec {
    /// True for the IPv4 or IPv6 wildcard address.
    pub fn is_wildcard(&self) -> bool {
        matches!(self.host.as_str(), "0.0.0.0" | "::" | "[::]")
    }
}

impl std::fmt::Display for BindSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Derive the bind address from an entry point argv.
pub fn parse_bind(argv: &[String]) -> Result<BindSpec, RecipeError> {
    let mut host = DEFAULT_BIND_HOST.to_string();
    let mut port = DEFAULT_BIND_PORT;

    let mut iter = argv.iter().skip(1);
    while let Some(arg) = iter.next() {
        let (flag, inline) = match arg.split_once('=') {
            Some((f, v)) if f.starts_with('-') => (f, Some(v.to_string())),
            _ => (arg.as_str(), None),
        };
        if !matches!(flag, "--host" | "--port" | "--bind" | "-b") {
            continue;
        }
        let value = match inline {
            Some(v) => v,
            None => iter.next().cloned().ok_or_else(|| RecipeError::InvalidEntrypoint {
                arg: flag.to_string(),
                reason: "missing value".to_string(),
            })?,
        };
        match flag {
            "--host" => host = value,
            "--port" => port = parse_port(&value)?,
            _ => {
                let (h, p) = split_host_port(&value)?;
                host = h;
                port = p;
            }
        }
    }

    Ok(BindSpec { host, port })
}

/// The `module:attribute` application target, if the entry point names one.
pub fn app_target(argv: &[String]) -> Option<&str> {
    let mut iter = argv.iter().skip(1);
    while let Some(arg) = iter.next() {
        if arg.starts_with('-') {
            if VALUE_OPTIONS.contains(&arg.as_str()) {
                iter.next();
            }
            continue;
        }
        if let Some((module, attr)) = arg.split_once(':') {
            let is_ident = |s: &str| {
                !s.is_empty()
                    && s.chars()
                        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.')
            };
            if is_ident(module) && is_ident(attr) {
                return Some(arg.as_str());
            }
        }
    }
    None
}

fn parse_port(value: &str) -> Result<u16, RecipeError> {
    match value.parse::<u16>() {
        Ok(p) if p > 0 => Ok(p),
        _ => Err(RecipeError::InvalidEntrypoint {
            arg: value.to_string(),
            reason: "port must be an integer in 1..=65535".to_string(),
        }),
    }
}

fn split_host_port(value: &str) -> Result<(String, u16), RecipeError> {
    let (host, port) = value
        .rsplit_once(':')
        .ok_or_else(|| RecipeError::InvalidEntrypoint {
            arg: value.to_string(),
            reason: "bind address must be host:port".to_string(),
        })?;
    Ok((host.to_string(), parse_port(port)?))
}
