//! Requirements manifest: the declarative list of language-level packages
//! installed before the application source is copied.

use crate::error::ManifestError;
use diagbox_core::fingerprint::content_hash;
use regex::Regex;
use serde::Serialize;
use std::path::Path;
use std::sync::OnceLock;

/// One requirement line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Requirement {
    pub name: String,
    pub extras: Vec<String>,
    /// Version specifiers such as `>=1.0`, in file order.
    pub specifiers: Vec<String>,
    /// Direct reference (`name @ url`).
    pub url: Option<String>,
    /// Environment marker after `;`.
    pub marker: Option<String>,
}

/// Parsed manifest plus the digest of its raw bytes.
#[derive(Debug, Clone, Serialize)]
pub struct Manifest {
    pub requirements: Vec<Requirement>,
    pub digest: String,
}

fn name_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^([A-Za-z0-9](?:[A-Za-z0-9._\-]*[A-Za-z0-9])?)\s*(?:\[([^\]]*)\])?")
            .expect("static regex")
    })
}

fn specifier_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(===|==|>=|<=|~=|!=|>|<)\s*[A-Za-z0-9.*+!_\-]+$").expect("static regex")
    })
}

fn extra_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9._\-]*$").expect("static regex"))
}

impl Manifest {
    /// Read and parse a manifest file. A missing, non-UTF-8 or malformed
    /// file is an error.
    pub fn load(path: &Path) -> Result<Self, ManifestError> {
        if !path.is_file() {
            return Err(ManifestError::Missing(path.to_path_buf()));
        }
        let bytes = std::fs::read(path).map_err(|source| ManifestError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let text =
            std::str::from_utf8(&bytes).map_err(|_| ManifestError::NotUtf8(path.to_path_buf()))?;
        let requirements = parse_lines(text)?;
        Ok(Self {
            requirements,
            digest: content_hash(&bytes),
        })
    }

    /// Parse manifest text.
    pub fn parse(text: &str) -> Result<Self, ManifestError> {
        Ok(Self {
            requirements: parse_lines(text)?,
            digest: content_hash(text.as_bytes()),
        })
    }

    pub fn package_names(&self) -> Vec<&str> {
        self.requirements.iter().map(|r| r.name.as_str()).collect()
    }
}

fn parse_lines(text: &str) -> Result<Vec<Requirement>, ManifestError> {
    let mut out = Vec::new();
    for (idx, raw) in text.lines().enumerate() {
        let line_no = idx + 1;
        let line = strip_comment(raw).trim();
        if line.is_empty() {
            continue;
        }
        let invalid = |reason: &'static str| ManifestError::InvalidLine {
            line: line_no,
            content: raw.trim().to_string(),
            reason,
        };
        if line.starts_with('-') {
            return Err(invalid("pip options are not supported"));
        }
        if line.ends_with('\\') {
            return Err(invalid("line continuations are not supported"));
        }
        out.push(parse_requirement(line).map_err(invalid)?);
    }
    Ok(out)
}

/// `#` starts a comment at line start or after whitespace.
fn strip_comment(line: &str) -> &str {
    if line.trim_start().starts_with('#') {
        return "";
    }
    let bytes = line.as_bytes();
    for (i, b) in bytes.iter().enumerate() {
        if *b == b'#' && i > 0 && bytes[i - 1].is_ascii_whitespace() {
            return &line[..i];
        }
    }
    line
}

fn parse_requirement(line: &str) -> Result<Requirement, &'static str> {
    let (body, marker) = match line.split_once(';') {
        Some((b, m)) => {
            let m = m.trim();
            if m.is_empty() {
                return Err("empty environment marker");
            }
            (b.trim(), Some(m.to_string()))
        }
        None => (line, None),
    };

    let caps = name_re().captures(body).ok_or("invalid package name")?;
    let whole = caps.get(0).map(|m| m.end()).unwrap_or(0);
    let name = caps[1].to_string();

    let extras = match caps.get(2) {
        Some(m) => {
            let extras: Vec<String> = m
                .as_str()
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
            if extras.iter().any(|e| !extra_re().is_match(e)) {
                return Err("invalid extras");
            }
            extras
        }
        None => Vec::new(),
    };

    let rest = body[whole..].trim();
    let mut specifiers = Vec::new();
    let mut url = None;
    if let Some(reference) = rest.strip_prefix('@') {
        let reference = reference.trim();
        if !reference.contains("://") {
            return Err("direct reference must be a URL");
        }
        url = Some(reference.to_string());
    } else if !rest.is_empty() {
        for spec in rest.split(',') {
            let spec = spec.trim();
            if !specifier_re().is_match(spec) {
                return Err("invalid version specifier");
            }
            specifiers.push(spec.replace(' ', ""));
        }
    }

    Ok(Requirement {
        name,
        extras,
        specifiers,
        url,
        marker,
    })
}
