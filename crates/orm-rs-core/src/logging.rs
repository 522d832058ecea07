//! Logging integration for orm-rs.
//!
//! Provides helpers for configuring [`tracing`]-based logging from
//! [`Settings`](crate::settings::Settings) and for creating per-query spans.

use crate::settings::Settings;

/// Sets up the global tracing subscriber based on the given settings.
///
/// The log level is read from `settings.log_level` (e.g. "debug", "info", "warn",
/// "error", or a full directive such as `orm_rs_db=debug`). In debug mode a
/// pretty, human-readable format is used; otherwise a structured JSON format.
///
/// Calling this more than once is harmless; only the first subscriber wins.
pub fn setup_logging(settings: &Settings) {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_new(&settings.log_level).unwrap_or_else(|_| EnvFilter::new("info"));

    if settings.debug {
        fmt::Subscriber::builder()
            .with_env_filter(filter)
            .with_target(true)
            .with_file(true)
            .with_line_number(true)
            .pretty()
            .try_init()
            .ok();
    } else {
        fmt::Subscriber::builder()
            .with_env_filter(filter)
            .with_target(true)
            .json()
            .try_init()
            .ok();
    }
}

/// Creates a tracing span for one unit of database work.
///
/// `kind` names the operation (`fetch`, `flush`, `sync`, ...) and `class`
/// the entity class it works on, so every statement logged while the span is
/// entered can be traced back to it.
///
/// # Examples
///
/// ```
/// use orm_rs_core::logging::query_span;
///
/// let span = query_span("fetch", "Article");
/// let _guard = span.enter();
/// tracing::debug!(sql = "SELECT 1", "executing");
/// ```
pub fn query_span(kind: &str, class: &str) -> tracing::Span {
    tracing::info_span!("orm", kind = kind, class = class)
}
