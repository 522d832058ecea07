//! Settings for orm-rs.
//!
//! [`Settings`] holds everything an entity manager needs to know about its
//! environment: logging, the database to talk to, how literals and identifiers
//! are escaped, how class and attribute names become table and column names,
//! and bulk insert defaults. There is deliberately no process-wide instance;
//! every manager receives its own copy.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::utils::text::NamingScheme;

/// Database connection configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseSettings {
    /// The database engine (e.g. `sqlite`).
    pub engine: String,
    /// The database name (or file path for `SQLite`).
    pub name: String,
    /// Additional engine-specific options.
    pub options: HashMap<String, String>,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            engine: "sqlite".to_string(),
            name: ":memory:".to_string(),
            options: HashMap::new(),
        }
    }
}

/// How scalar literals and identifiers are rendered into SQL text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscapingSettings {
    /// Quote character(s) wrapped around identifiers. Empty disables quoting.
    pub identifier_quote: String,
    /// Literal written for `true`.
    pub boolean_true: String,
    /// Literal written for `false`.
    pub boolean_false: String,
}

impl Default for EscapingSettings {
    fn default() -> Self {
        Self {
            identifier_quote: "\"".to_string(),
            boolean_true: "1".to_string(),
            boolean_false: "0".to_string(),
        }
    }
}

/// Naming schemes used to derive table and column names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct NamingSettings {
    /// Scheme applied to class names to get table names.
    pub table: NamingScheme,
    /// Scheme applied to attribute names to get column names.
    pub column: NamingScheme,
}

/// The complete set of orm-rs settings.
///
/// # Examples
///
/// ```
/// use orm_rs_core::settings::Settings;
///
/// let settings = Settings::default();
/// assert_eq!(settings.bulk_insert_limit, 20);
/// assert_eq!(settings.escaping.identifier_quote, "\"");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    // ── Logging ──────────────────────────────────────────────────────

    /// Whether debug mode is enabled (pretty log output).
    pub debug: bool,
    /// The tracing filter directive (e.g. "info", "orm_rs_db=debug").
    pub log_level: String,

    // ── Database ─────────────────────────────────────────────────────

    /// The database this manager talks to.
    pub database: DatabaseSettings,

    // ── Query construction ───────────────────────────────────────────

    /// Literal and identifier escaping.
    pub escaping: EscapingSettings,
    /// Class/attribute to table/column naming.
    pub naming: NamingSettings,

    // ── Bulk inserts ─────────────────────────────────────────────────

    /// Number of queued entities that triggers a flush.
    pub bulk_insert_limit: usize,
    /// Whether inserted entities receive their auto-increment key.
    pub use_auto_increment: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            debug: false,
            log_level: "info".to_string(),
            database: DatabaseSettings::default(),
            escaping: EscapingSettings::default(),
            naming: NamingSettings::default(),
            bulk_insert_limit: 20,
            use_auto_increment: true,
        }
    }
}
