//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`PdashSettings::default()`]
//! 2. If `~/.pdash/settings.json` exists, deep-merge user values over defaults
//! 3. Apply `PDASH_*` environment variable overrides (highest priority)

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::error::SettingsError;

pub const ANONYMOUS_PREFIX: &str = "///Anonymous";
pub const DEFAULT_SAVE_THRESHOLD: u32 = 10;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PdashSettings {
    /// Directory holding `.dat` files.
    pub data_dir: PathBuf,
    /// Default log level (`RUST_LOG` still wins).
    pub log_level: String,
    /// Emit JSON log lines instead of plain text.
    pub log_json: bool,
    /// Modifications to a datafile before it is saved automatically.
    pub save_threshold: u32,
    /// Names under this prefix never produce added/removed events.
    pub anonymous_prefix: String,
}

impl Default for PdashSettings {
    fn default() -> Self {
        Self {
            data_dir: pdash_home().join("data"),
            log_level: "info".to_string(),
            log_json: false,
            save_threshold: DEFAULT_SAVE_THRESHOLD,
            anonymous_prefix: ANONYMOUS_PREFIX.to_string(),
        }
    }
}

fn pdash_home() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/tmp"))
        .join(".pdash")
}

/// `~/.pdash/settings.json`.
pub fn settings_path() -> PathBuf {
    pdash_home().join("settings.json")
}

pub fn load_settings() -> Result<PdashSettings, SettingsError> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// A missing file yields defaults; invalid JSON is an error.
pub fn load_settings_from_path(path: &Path) -> Result<PdashSettings, SettingsError> {
    let defaults = serde_json::to_value(PdashSettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    let mut settings: PdashSettings = serde_json::from_value(merged)?;
    apply_env_overrides(&mut settings);
    validate(&settings)?;
    Ok(settings)
}

fn validate(settings: &PdashSettings) -> Result<(), SettingsError> {
    if settings.save_threshold == 0 {
        return Err(SettingsError::InvalidValue(
            "saveThreshold must be at least 1".to_string(),
        ));
    }
    if settings.anonymous_prefix.is_empty() {
        return Err(SettingsError::InvalidValue(
            "anonymousPrefix must not be empty".to_string(),
        ));
    }
    Ok(())
}

/// Recursive deep merge of two JSON values.
///
/// Objects merge per key, everything else is replaced by `source`, and null
/// values in `source` are skipped.
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_val) in source_map {
                if source_val.is_null() {
                    continue;
                }
                let merged = match target_map.remove(&key) {
                    Some(target_val) => deep_merge(target_val, source_val),
                    None => source_val,
                };
                target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Invalid values are logged and ignored.
pub fn apply_env_overrides(settings: &mut PdashSettings) {
    if let Some(v) = read_env_string("PDASH_DATA_DIR") {
        settings.data_dir = PathBuf::from(v);
    }
    if let Some(v) = read_env_string("PDASH_LOG_LEVEL") {
        settings.log_level = v;
    }
    if let Some(v) = read_env_bool("PDASH_LOG_JSON") {
        settings.log_json = v;
    }
    if let Some(v) = read_env_u32("PDASH_SAVE_THRESHOLD", 1, 10_000) {
        settings.save_threshold = v;
    }
}

/// Accepts (case-insensitive): `true`/`1`/`yes`/`on` or `false`/`0`/`no`/`off`.
pub fn parse_bool(val: &str) -> Option<bool> {
    match val.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

pub fn parse_u32_range(val: &str, min: u32, max: u32) -> Option<u32> {
    let n: u32 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

fn read_env_string(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

fn read_env_bool(name: &str) -> Option<bool> {
    let val = std::env::var(name).ok()?;
    let result = parse_bool(&val);
    if result.is_none() {
        tracing::warn!(key = name, value = %val, "invalid boolean env var, ignoring");
    }
    result
}

fn read_env_u32(name: &str, min: u32, max: u32) -> Option<u32> {
    let val = std::env::var(name).ok()?;
    let result = parse_u32_range(&val, min, max);
    if result.is_none() {
        tracing::warn!(key = name, value = %val, "invalid u32 env var, ignoring");
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn defaults() {
        let s = PdashSettings::default();
        assert_eq!(s.log_level, "info");
        assert!(!s.log_json);
        assert_eq!(s.save_threshold, 10);
        assert_eq!(s.anonymous_prefix, "///Anonymous");
        assert!(s.data_dir.ends_with(".pdash/data"));
    }

    #[test]
    fn missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let s = load_settings_from_path(&dir.path().join("nope.json")).unwrap();
        assert_eq!(s.save_threshold, PdashSettings::default().save_threshold);
    }

    #[test]
    fn file_values_merge_over_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"saveThreshold": 3, "logLevel": null}"#).unwrap();

        let s = load_settings_from_path(&path).unwrap();
        assert_eq!(s.save_threshold, 3);
        assert_eq!(s.log_level, "info");
    }

    #[test]
    fn invalid_json_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(matches!(
            load_settings_from_path(&path),
            Err(SettingsError::Json(_))
        ));
    }

    #[test]
    fn zero_threshold_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"saveThreshold": 0}"#).unwrap();
        assert!(matches!(
            load_settings_from_path(&path),
            Err(SettingsError::InvalidValue(_))
        ));
    }

    #[test]
    fn deep_merge_nested_objects() {
        let merged = deep_merge(
            json!({"a": {"x": 1, "y": 2}, "b": [1, 2]}),
            json!({"a": {"y": 3}, "b": [9], "c": null}),
        );
        assert_eq!(merged, json!({"a": {"x": 1, "y": 3}, "b": [9]}));
    }

    #[test]
    fn bool_parsing() {
        assert_eq!(parse_bool("YES"), Some(true));
        assert_eq!(parse_bool("off"), Some(false));
        assert_eq!(parse_bool("maybe"), None);
    }

    #[test]
    fn u32_range_parsing() {
        assert_eq!(parse_u32_range("5", 1, 10), Some(5));
        assert_eq!(parse_u32_range("0", 1, 10), None);
        assert_eq!(parse_u32_range("abc", 1, 10), None);
    }
}
