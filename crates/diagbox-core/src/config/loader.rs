//! Environment variable loading.
//!
//! Keeps the fallback chains in one place so callers never repeat `or_else`
//! ladders over `std::env::var`.

use std::env;
use std::path::Path;

/// Load `.env` from the current directory into the process environment.
/// Variables that are already set are never overridden. Runs once.
pub fn load_dotenv() {
    use std::sync::Once;
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let dir = env::current_dir().unwrap_or_else(|_| std::path::PathBuf::from("."));
        load_dotenv_from_dir(&dir);
    });
}

/// Load `<dir>/.env` without overriding existing variables.
/// Returns the number of variables that were set.
pub fn load_dotenv_from_dir(dir: &Path) -> usize {
    let path = dir.join(".env");
    let Ok(content) = std::fs::read_to_string(&path) else {
        return 0;
    };
    let mut applied = 0;
    for (key, value) in parse_dotenv(&content) {
        if env::var(&key).is_err() {
            env::set_var(&key, value);
            applied += 1;
        }
    }
    if applied > 0 {
        tracing::debug!(path = %path.display(), applied, "Loaded .env");
    }
    applied
}

/// Parse `KEY=value` lines. Handles comments, inline `#` comments outside
/// quotes, and single/double quoted values.
pub(crate) fn parse_dotenv(content: &str) -> Vec<(String, String)> {
    let mut out = Vec::new();
    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let line = line.strip_prefix("export ").unwrap_or(line);
        let Some(eq_pos) = line.find('=') else {
            continue;
        };
        let key = line[..eq_pos].trim();
        let mut value = line[eq_pos + 1..].trim();
        if let Some(hash_pos) = value.find('#') {
            let before_hash = value[..hash_pos].trim_end();
            if !before_hash.contains('"') && !before_hash.contains('\'') {
                value = before_hash;
            }
        }
        if value.len() >= 2
            && ((value.starts_with('"') && value.ends_with('"'))
                || (value.starts_with('\'') && value.ends_with('\'')))
        {
            value = &value[1..value.len() - 1];
        }
        if !key.is_empty() {
            out.push((key.to_string(), value.to_string()));
        }
    }
    out
}

/// Read the primary variable or the first alias that is set; fall back to `default`.
pub fn env_or<F>(primary: &str, aliases: &[&str], default: F) -> String
where
    F: FnOnce() -> String,
{
    env::var(primary)
        .ok()
        .or_else(|| aliases.iter().find_map(|a| env::var(a).ok()))
        .filter(|s| !s.is_empty())
        .unwrap_or_else(default)
}

/// Read the primary variable or an alias. Blank values count as unset.
pub fn env_optional(primary: &str, aliases: &[&str]) -> Option<String> {
    env::var(primary)
        .ok()
        .or_else(|| aliases.iter().find_map(|a| env::var(a).ok()))
        .and_then(|s| {
            let s = s.trim().to_string();
            if s.is_empty() {
                None
            } else {
                Some(s)
            }
        })
}

/// Boolean variable: 0/false/no/off are false, anything else is true.
pub fn env_bool(primary: &str, aliases: &[&str], default: bool) -> bool {
    let v = env::var(primary)
        .ok()
        .or_else(|| aliases.iter().find_map(|a| env::var(a).ok()));
    match v.as_deref() {
        Some(s) => !matches!(
            s.trim().to_lowercase().as_str(),
            "0" | "false" | "no" | "off"
        ),
        None => default,
    }
}

/// Parse a variable with `FromStr`; unparsable values fall back to `default`
/// with a warning.
pub fn env_parse<T>(primary: &str, aliases: &[&str], default: T) -> T
where
    T: std::str::FromStr,
{
    match env_optional(primary, aliases) {
        Some(raw) => raw.parse::<T>().unwrap_or_else(|_| {
            tracing::warn!(key = primary, value = %raw, "Invalid value, using default");
            default
        }),
        None => default,
    }
}
