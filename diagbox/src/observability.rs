//! Observability: tracing init and the build audit log.
//!
//! Uses config::ObservabilityConfig for DIAGBOX_QUIET, DIAGBOX_LOG_LEVEL,
//! DIAGBOX_LOG_JSON and DIAGBOX_AUDIT_LOG.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;

use chrono::Utc;
use diagbox_core::config::ObservabilityConfig;
use diagbox_image::BuildReport;
use serde_json::json;
use tracing_subscriber::{prelude::*, EnvFilter};

static AUDIT_PATH: Mutex<Option<String>> = Mutex::new(None);

/// Initialize tracing. Call at process startup.
/// When DIAGBOX_QUIET=1, only WARN and above are logged.
pub fn init_tracing() {
    let cfg = ObservabilityConfig::from_env();
    let level = if cfg.quiet {
        "diagbox=warn,diagbox_image=warn,diagbox_service=warn".to_string()
    } else {
        cfg.log_level.clone()
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&level));

    // Logs go to stderr; stdout carries command output.
    let _ = if cfg.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr)
                    .with_target(true)
                    .with_thread_ids(false),
            )
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(true)
                    .with_thread_ids(false),
            )
            .try_init()
    };
}

fn get_audit_path() -> Option<String> {
    {
        let guard = AUDIT_PATH.lock().ok()?;
        if let Some(ref p) = *guard {
            return Some(p.clone());
        }
    }
    let path = ObservabilityConfig::from_env().audit_log.clone()?;
    if path.is_empty() {
        return None;
    }
    if let Some(parent) = Path::new(&path).parent() {
        let _ = std::fs::create_dir_all(parent);
    }
    {
        let mut guard = AUDIT_PATH.lock().ok()?;
        *guard = Some(path.clone());
    }
    Some(path)
}

fn append_jsonl(path: &Path, record: &serde_json::Value) {
    if let Ok(mut f) = OpenOptions::new().create(true).append(true).open(path) {
        if let Ok(line) = serde_json::to_string(record) {
            let _ = writeln!(f, "{}", line);
        }
    }
}

fn now() -> String {
    Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

fn emit(record: serde_json::Value) {
    if let Some(path) = get_audit_path() {
        append_jsonl(Path::new(&path), &record);
    }
}

fn build_started_record(backend: &str, tag: &str, context: &Path, recipe_digest: &str) -> serde_json::Value {
    json!({
        "ts": now(),
        "event": "build_started",
        "backend": backend,
        "tag": tag,
        "context": context.display().to_string(),
        "recipe_digest": recipe_digest,
        "source": "rust"
    })
}

fn build_completed_record(report: &BuildReport, duration_ms: u64) -> serde_json::Value {
    json!({
        "ts": now(),
        "event": "build_completed",
        "backend": report.backend,
        "tag": report.tag,
        "image_id": report.image_id,
        "steps": report.steps.len(),
        "cached_steps": report.cached_steps(),
        "duration_ms": duration_ms,
        "source": "rust"
    })
}

/// Audit: build_started
pub fn audit_build_started(backend: &str, tag: &str, context: &Path, recipe_digest: &str) {
    emit(build_started_record(backend, tag, context, recipe_digest));
}

/// Audit: step_completed, one record per step of a finished build
pub fn audit_steps(report: &BuildReport) {
    for step in &report.steps {
        emit(json!({
            "ts": now(),
            "event": "step_completed",
            "tag": report.tag,
            "index": step.index,
            "step": step.name,
            "key": step.key,
            "cached": step.cached,
            "duration_ms": step.duration_ms,
            "source": "rust"
        }));
    }
}

/// Audit: build_completed
pub fn audit_build_completed(report: &BuildReport, duration_ms: u64) {
    emit(build_completed_record(report, duration_ms));
}

/// Audit: build_failed. `step` is the 1-based index of the failing step, when known.
pub fn audit_build_failed(backend: &str, tag: &str, step: Option<usize>, error: &str) {
    tracing::warn!(backend, tag, step = ?step, error, "Build failed");
    emit(json!({
        "ts": now(),
        "event": "build_failed",
        "backend": backend,
        "tag": tag,
        "step": step,
        "error": error,
        "source": "rust"
    }));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_jsonl_appends_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.jsonl");
        append_jsonl(&path, &build_started_record("local", "diagbox:1", Path::new("/ctx"), "abc"));
        append_jsonl(&path, &json!({"event": "build_failed"}));

        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["event"], "build_started");
        assert_eq!(first["tag"], "diagbox:1");
        assert_eq!(first["context"], "/ctx");
        assert!(first["ts"].as_str().unwrap().ends_with('Z'));
    }

    #[test]
    fn test_build_completed_counts_cached_steps() {
        let report = BuildReport {
            backend: "local".into(),
            tag: "diagbox".into(),
            image_id: "sha256:1".into(),
            image: None,
            steps: vec![
                diagbox_image::StepOutcome {
                    index: 1,
                    name: "base",
                    instruction: "FROM python:3.11-slim".into(),
                    key: "k1".into(),
                    cached: true,
                    duration_ms: 0,
                },
                diagbox_image::StepOutcome {
                    index: 2,
                    name: "workdir",
                    instruction: "WORKDIR /app".into(),
                    key: "k2".into(),
                    cached: false,
                    duration_ms: 3,
                },
            ],
        };
        let record = build_completed_record(&report, 12);
        assert_eq!(record["steps"], 2);
        assert_eq!(record["cached_steps"], 1);
        assert_eq!(record["duration_ms"], 12);
    }
}
