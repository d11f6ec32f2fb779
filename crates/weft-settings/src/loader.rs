//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`WeftSettings::default()`]
//! 2. If `~/.weft/settings.json` exists, deep-merge user values over defaults
//! 3. Apply environment variable overrides (highest priority)

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::debug;

use crate::errors::{Result, SettingsError};
use crate::types::WeftSettings;

/// Resolve the home directory, falling back to `/tmp`.
pub fn home_dir() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/tmp"))
}

/// Resolve the path to the settings file (`~/.weft/settings.json`).
pub fn settings_path() -> PathBuf {
    home_dir().join(".weft").join("settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<WeftSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// A missing file yields defaults. Invalid JSON is an error.
pub fn load_settings_from_path(path: &Path) -> Result<WeftSettings> {
    let invalid = |source| SettingsError::Invalid {
        path: path.to_path_buf(),
        source,
    };

    let mut settings = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path).map_err(|source| SettingsError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let user: Value = serde_json::from_str(&content).map_err(invalid)?;
        let defaults = serde_json::to_value(WeftSettings::default()).map_err(invalid)?;
        serde_json::from_value(deep_merge(defaults, user)).map_err(invalid)?
    } else {
        debug!(?path, "settings file not found, using defaults");
        WeftSettings::default()
    };

    apply_env_overrides(&mut settings);
    Ok(settings)
}

/// Recursive deep merge of two JSON values.
///
/// - Objects are merged recursively (source overrides target per-key)
/// - Arrays and primitives are replaced entirely by source
/// - Null values in source are skipped (preserving target)
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
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Apply `WEFT_*` environment variable overrides. Invalid values are ignored
/// with a warning.
pub fn apply_env_overrides(settings: &mut WeftSettings) {
    apply_overrides_from(settings, |name| std::env::var(name).ok());
}

/// Override application against an arbitrary variable source.
pub fn apply_overrides_from<F>(settings: &mut WeftSettings, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let read = |name: &str| lookup(name).filter(|v| !v.is_empty());

    if let Some(v) = read("WEFT_MAX_TRANSITIONS") {
        match parse_u32_range(&v, 1, 10_000) {
            Some(n) => settings.engine.max_transitions = n,
            None => warn_invalid("WEFT_MAX_TRANSITIONS", &v),
        }
    }
    if let Some(v) = read("WEFT_MAX_ITERATIONS_PER_STEP") {
        match parse_u32_range(&v, 1, 1_000) {
            Some(n) => settings.engine.max_iterations_per_step = n,
            None => warn_invalid("WEFT_MAX_ITERATIONS_PER_STEP", &v),
        }
    }
    if let Some(v) = read("WEFT_PLANNING") {
        match parse_bool(&v) {
            Some(b) => settings.engine.planning_enabled = b,
            None => warn_invalid("WEFT_PLANNING", &v),
        }
    }
    if let Some(v) = read("WEFT_DATA_DIR") {
        settings.storage.data_dir = v;
    }
    if let Some(v) = read("WEFT_LOG_LEVEL") {
        settings.logging.level = v;
    }
    if let Some(v) = read("WEFT_LOG_JSON") {
        match parse_bool(&v) {
            Some(b) => settings.logging.json = b,
            None => warn_invalid("WEFT_LOG_JSON", &v),
        }
    }
}

fn warn_invalid(key: &str, value: &str) {
    tracing::warn!(key, value, "invalid env var, ignoring");
}

// ── Pure parsing functions ──────────────────────────────────────────────────

/// Accepts (case-insensitive): `true`/`1`/`yes`/`on` or `false`/`0`/`no`/`off`.
pub fn parse_bool(val: &str) -> Option<bool> {
    match val.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

pub fn parse_u32_range(val: &str, min: u32, max: u32) -> Option<u32> {
    let n: u32 = val.trim().parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn merge_nested_override() {
        let target = serde_json::json!({"engine": {"maxTransitions": 40, "planningEnabled": true}});
        let source = serde_json::json!({"engine": {"maxTransitions": 8}});
        let merged = deep_merge(target, source);
        assert_eq!(merged["engine"]["maxTransitions"], 8);
        assert_eq!(merged["engine"]["planningEnabled"], true);
    }

    #[test]
    fn merge_array_replace() {
        let target = serde_json::json!({"items": [1, 2, 3]});
        let source = serde_json::json!({"items": [4]});
        assert_eq!(deep_merge(target, source)["items"], serde_json::json!([4]));
    }

    #[test]
    fn merge_null_preserves_target() {
        let target = serde_json::json!({"a": 1});
        let source = serde_json::json!({"a": null});
        assert_eq!(deep_merge(target, source)["a"], 1);
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let settings = load_settings_from_path(&dir.path().join("nope.json")).unwrap();
        assert_eq!(settings.tool_loop, WeftSettings::default().tool_loop);
    }

    #[test]
    fn file_values_merge_over_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(
            &path,
            r#"{"toolLoop": {"readOnlyTools": ["peek"]}, "caches": {"planCapacity": 5}}"#,
        )
        .unwrap();

        let settings = load_settings_from_path(&path).unwrap();
        assert_eq!(settings.tool_loop.read_only_tools, vec!["peek".to_string()]);
        assert_eq!(settings.tool_loop.read_only_streak_limit, 3);
        assert_eq!(settings.caches.plan_capacity, 5);
        assert_eq!(settings.caches.prefix_capacity, 10);
    }

    #[test]
    fn invalid_json_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(matches!(
            load_settings_from_path(&path),
            Err(SettingsError::Invalid { .. })
        ));
    }

    #[test]
    fn env_overrides_apply_and_ignore_garbage() {
        let vars: HashMap<&str, &str> = [
            ("WEFT_MAX_TRANSITIONS", "5"),
            ("WEFT_PLANNING", "off"),
            ("WEFT_LOG_JSON", "maybe"),
            ("WEFT_DATA_DIR", "/srv/weft"),
        ]
        .into_iter()
        .collect();

        let mut settings = WeftSettings::default();
        apply_overrides_from(&mut settings, |k| vars.get(k).map(|v| v.to_string()));

        assert_eq!(settings.engine.max_transitions, 5);
        assert!(!settings.engine.planning_enabled);
        assert!(!settings.logging.json);
        assert_eq!(settings.storage.data_dir, "/srv/weft");
    }

    #[test]
    fn out_of_range_transition_bound_ignored() {
        let mut settings = WeftSettings::default();
        apply_overrides_from(&mut settings, |k| (k == "WEFT_MAX_TRANSITIONS").then(|| "0".to_string()));
        assert_eq!(settings.engine.max_transitions, 40);
    }

    #[test]
    fn parse_bool_variants() {
        for v in ["true", "1", "YES", "On"] {
            assert_eq!(parse_bool(v), Some(true), "{v}");
        }
        for v in ["false", "0", "no", "OFF"] {
            assert_eq!(parse_bool(v), Some(false), "{v}");
        }
        assert_eq!(parse_bool("2"), None);
    }

    #[test]
    fn parse_u32_range_bounds() {
        assert_eq!(parse_u32_range("10", 1, 10), Some(10));
        assert_eq!(parse_u32_range("11", 1, 10), None);
        assert_eq!(parse_u32_range("x", 1, 10), None);
    }
}
