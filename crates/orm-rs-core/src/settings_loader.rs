//! Settings loading from configuration files.
//!
//! This module loads [`Settings`] from TOML or JSON and applies environment
//! variable overrides.
//!
//! ## Loading Order
//!
//! 1. Start with default settings.
//! 2. Load from a TOML or JSON file (overriding defaults).
//! 3. Apply environment variable overrides (highest priority).
//!
//! ## Environment Variable Mapping
//!
//! | Env Var | Setting |
//! |---|---|
//! | `ORM_DEBUG` | `debug` |
//! | `ORM_LOG_LEVEL` | `log_level` |
//! | `ORM_DATABASE_ENGINE` | `database.engine` |
//! | `ORM_DATABASE_NAME` | `database.name` |
//! | `ORM_BULK_INSERT_LIMIT` | `bulk_insert_limit` |
//!
//! ## Examples
//!
//! ```rust,no_run
//! use orm_rs_core::settings_loader;
//!
//! let settings = settings_loader::from_toml_file("config/orm.toml").unwrap();
//! let settings = settings_loader::from_toml_file_with_env("config/orm.toml").unwrap();
//! ```

use std::path::Path;

use crate::error::OrmError;
use crate::settings::Settings;

/// Loads settings from a TOML string.
///
/// Keys missing from the TOML keep their default values.
///
/// # Errors
///
/// Returns an error if the TOML is malformed or cannot be deserialized.
pub fn from_toml_str(toml_str: &str) -> Result<Settings, OrmError> {
    let toml_value: toml::Value = toml::from_str(toml_str)
        .map_err(|e| OrmError::ConfigurationError(format!("Failed to parse TOML: {e}")))?;

    merge_into_defaults(toml_to_json(toml_value), "TOML")
}

/// Loads settings from a TOML file.
///
/// # Errors
///
/// Returns an error if the file cannot be read or the TOML is malformed.
pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Settings, OrmError> {
    let content = std::fs::read_to_string(path.as_ref()).map_err(|e| {
        OrmError::ConfigurationError(format!(
            "Failed to read TOML file '{}': {e}",
            path.as_ref().display()
        ))
    })?;
    from_toml_str(&content)
}

/// Loads settings from a TOML file and then applies environment variable overrides.
///
/// # Errors
///
/// Returns an error if the file cannot be read or the TOML is malformed.
pub fn from_toml_file_with_env(path: impl AsRef<Path>) -> Result<Settings, OrmError> {
    let mut settings = from_toml_file(path)?;
    apply_env_overrides(&mut settings);
    Ok(settings)
}

/// Loads settings from a JSON string.
///
/// # Errors
///
/// Returns an error if the JSON is malformed or cannot be deserialized.
pub fn from_json_str(json_str: &str) -> Result<Settings, OrmError> {
    let json_value: serde_json::Value = serde_json::from_str(json_str)
        .map_err(|e| OrmError::ConfigurationError(format!("Failed to parse JSON: {e}")))?;

    merge_into_defaults(json_value, "JSON")
}

/// Loads settings from a JSON file.
///
/// # Errors
///
/// Returns an error if the file cannot be read or the JSON is malformed.
pub fn from_json_file(path: impl AsRef<Path>) -> Result<Settings, OrmError> {
    let content = std::fs::read_to_string(path.as_ref()).map_err(|e| {
        OrmError::ConfigurationError(format!(
            "Failed to read JSON file '{}': {e}",
            path.as_ref().display()
        ))
    })?;
    from_json_str(&content)
}

/// Loads settings from just environment variables (starting from defaults).
pub fn from_env() -> Settings {
    let mut settings = Settings::default();
    apply_env_overrides(&mut settings);
    settings
}

/// Applies environment variable overrides to a settings struct.
///
/// Unparseable numeric values are ignored and the previous value is kept.
pub fn apply_env_overrides(settings: &mut Settings) {
    apply_overrides(settings, |key| std::env::var(key).ok());
}

fn apply_overrides(settings: &mut Settings, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(val) = lookup("ORM_DEBUG") {
        settings.debug = matches!(val.to_lowercase().as_str(), "true" | "1" | "yes");
    }

    if let Some(val) = lookup("ORM_LOG_LEVEL") {
        settings.log_level = val;
    }

    if let Some(val) = lookup("ORM_DATABASE_ENGINE") {
        settings.database.engine = val;
    }

    if let Some(val) = lookup("ORM_DATABASE_NAME") {
        settings.database.name = val;
    }

    if let Some(val) = lookup("ORM_BULK_INSERT_LIMIT") {
        if let Ok(limit) = val.parse::<usize>() {
            settings.bulk_insert_limit = limit;
        }
    }
}

// ============================================================
// Helpers
// ============================================================

fn merge_into_defaults(value: serde_json::Value, format: &str) -> Result<Settings, OrmError> {
    let default_json = serde_json::to_value(Settings::default()).map_err(|e| {
        OrmError::ConfigurationError(format!("Failed to serialize default settings: {e}"))
    })?;

    let merged = merge_json(default_json, value);
    let settings: Settings = serde_json::from_value(merged).map_err(|e| {
        OrmError::ConfigurationError(format!("Failed to deserialize settings from {format}: {e}"))
    })?;

    if settings.bulk_insert_limit == 0 {
        return Err(OrmError::ConfigurationError(
            "bulk_insert_limit must be greater than zero".to_string(),
        ));
    }
    Ok(settings)
}

/// Converts a TOML value to a `serde_json::Value`.
pub fn toml_to_json(value: toml::Value) -> serde_json::Value {
    match value {
        toml::Value::String(s) => serde_json::Value::String(s),
        toml::Value::Integer(i) => serde_json::json!(i),
        toml::Value::Float(f) => serde_json::json!(f),
        toml::Value::Boolean(b) => serde_json::Value::Bool(b),
        toml::Value::Datetime(dt) => serde_json::Value::String(dt.to_string()),
        toml::Value::Array(arr) => {
            serde_json::Value::Array(arr.into_iter().map(toml_to_json).collect())
        }
        toml::Value::Table(table) => {
            let map: serde_json::Map<String, serde_json::Value> = table
                .into_iter()
                .map(|(k, v)| (k, toml_to_json(v)))
                .collect();
            serde_json::Value::Object(map)
        }
    }
}

/// Deep-merges two JSON values. The `override_val` takes precedence.
fn merge_json(base: serde_json::Value, override_val: serde_json::Value) -> serde_json::Value {
    match (base, override_val) {
        (serde_json::Value::Object(mut base_map), serde_json::Value::Object(override_map)) => {
            for (key, override_v) in override_map {
                let merged = if let Some(base_v) = base_map.remove(&key) {
                    merge_json(base_v, override_v)
                } else {
                    override_v
                };
                base_map.insert(key, merged);
            }
            serde_json::Value::Object(base_map)
        }
        (_, override_val) => override_val,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::text::NamingScheme;
    use std::collections::HashMap;

    // ── TOML loading ────────────────────────────────────────────────

    #[test]
    fn test_from_toml_str_basic() {
        let toml = r#"
            debug = true
            log_level = "debug"
            bulk_insert_limit = 50
        "#;

        let settings = from_toml_str(toml).unwrap();
        assert!(settings.debug);
        assert_eq!(settings.log_level, "debug");
        assert_eq!(settings.bulk_insert_limit, 50);
        // Defaults preserved
        assert!(settings.use_auto_increment);
        assert_eq!(settings.escaping.boolean_true, "1");
    }

    #[test]
    fn test_from_toml_str_nested_tables() {
        let toml = r#"
            [database]
            engine = "sqlite"
            name = "app.db"

            [escaping]
            identifier_quote = "`"

            [naming]
            table = "studly_caps"
        "#;

        let settings = from_toml_str(toml).unwrap();
        assert_eq!(settings.database.name, "app.db");
        assert_eq!(settings.escaping.identifier_quote, "`");
        // Sibling keys keep their defaults
        assert_eq!(settings.escaping.boolean_false, "0");
        assert_eq!(settings.naming.table, NamingScheme::StudlyCaps);
        assert_eq!(settings.naming.column, NamingScheme::SnakeLower);
    }

    #[test]
    fn test_from_toml_str_empty() {
        let settings = from_toml_str("").unwrap();
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn test_from_toml_str_invalid() {
        let result = from_toml_str("[[invalid toml content");
        assert!(matches!(result, Err(OrmError::ConfigurationError(_))));
    }

    #[test]
    fn test_from_toml_str_zero_bulk_limit() {
        let result = from_toml_str("bulk_insert_limit = 0");
        assert!(matches!(result, Err(OrmError::ConfigurationError(_))));
    }

    #[test]
    fn test_from_toml_str_unknown_scheme() {
        let result = from_toml_str("[naming]\ncolumn = \"kebab\"");
        assert!(result.is_err());
    }

    // ── JSON loading ────────────────────────────────────────────────

    #[test]
    fn test_from_json_str_basic() {
        let json = r#"{
            "log_level": "warn",
            "use_auto_increment": false
        }"#;

        let settings = from_json_str(json).unwrap();
        assert_eq!(settings.log_level, "warn");
        assert!(!settings.use_auto_increment);
        assert_eq!(settings.bulk_insert_limit, 20);
    }

    #[test]
    fn test_from_json_str_empty_object() {
        let settings = from_json_str("{}").unwrap();
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn test_from_json_str_invalid() {
        assert!(from_json_str("{not json").is_err());
    }

    #[test]
    fn test_from_toml_file_missing() {
        let result = from_toml_file("/nonexistent/orm.toml");
        assert!(matches!(result, Err(OrmError::ConfigurationError(_))));
    }

    // ── Environment overrides ───────────────────────────────────────

    #[test]
    fn test_apply_overrides() {
        let env: HashMap<&str, &str> = [
            ("ORM_DEBUG", "yes"),
            ("ORM_LOG_LEVEL", "trace"),
            ("ORM_DATABASE_NAME", "/tmp/test.db"),
            ("ORM_BULK_INSERT_LIMIT", "5"),
        ]
        .into_iter()
        .collect();

        let mut settings = Settings::default();
        apply_overrides(&mut settings, |key| env.get(key).map(|v| (*v).to_string()));
        assert!(settings.debug);
        assert_eq!(settings.log_level, "trace");
        assert_eq!(settings.database.name, "/tmp/test.db");
        assert_eq!(settings.bulk_insert_limit, 5);
    }

    #[test]
    fn test_apply_overrides_ignores_bad_numbers() {
        let mut settings = Settings::default();
        apply_overrides(&mut settings, |key| {
            (key == "ORM_BULK_INSERT_LIMIT").then(|| "many".to_string())
        });
        assert_eq!(settings.bulk_insert_limit, 20);
    }

    // ── Helpers ─────────────────────────────────────────────────────

    #[test]
    fn test_merge_json_deep() {
        let base = serde_json::json!({"a": {"b": 1, "c": 2}, "d": 3});
        let over = serde_json::json!({"a": {"b": 10}});
        let merged = merge_json(base, over);
        assert_eq!(merged, serde_json::json!({"a": {"b": 10, "c": 2}, "d": 3}));
    }

    #[test]
    fn test_toml_to_json_array() {
        let value: toml::Value = toml::from_str("list = [1, 2]").unwrap();
        assert_eq!(toml_to_json(value), serde_json::json!({"list": [1, 2]}));
    }
}
