//! Input validation and normalization.

use crate::error::{ServiceError, ServiceResult};
use regex::Regex;
use std::sync::OnceLock;

pub const MAX_AGE: u32 = 120;

fn medication_name_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z0-9\s\-().]+$").expect("static regex"))
}

pub fn validate_medication_name(name: &str) -> ServiceResult<&str> {
    let name = name.trim();
    if name.is_empty() || !medication_name_re().is_match(name) {
        return Err(ServiceError::Validation(format!(
            "Invalid medication name '{name}'"
        )));
    }
    Ok(name)
}

pub fn validate_patient(name: &str, age: u32) -> ServiceResult<()> {
    if name.trim().is_empty() {
        return Err(ServiceError::Validation("Patient name must not be empty".into()));
    }
    if age > MAX_AGE {
        return Err(ServiceError::Validation(format!(
            "Patient age must be between 0 and {MAX_AGE}"
        )));
    }
    Ok(())
}

/// `"Runny Nose"` -> `runny_nose`.
pub fn normalize_symptom(symptom: &str) -> String {
    symptom
        .trim()
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("_")
        .chars()
        .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || *c == '_')
        .collect()
}

/// Reduce a client supplied file name to a safe single path component.
pub fn sanitize_filename(raw: &str) -> ServiceResult<String> {
    let base = raw.rsplit(['/', '\\']).next().unwrap_or("");
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = cleaned.trim_start_matches('.');
    if cleaned.is_empty() || cleaned.chars().all(|c| c == '_') {
        return Err(ServiceError::BadRequest(format!("Unusable file name '{raw}'")));
    }
    Ok(cleaned.chars().take(128).collect())
}
