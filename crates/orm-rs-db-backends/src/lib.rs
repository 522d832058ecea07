//! # orm-rs-db-backends
//!
//! Database connections for orm-rs. Every backend implements
//! [`Connection`](orm_rs_db::executor::Connection) and can be handed to an
//! [`EntityManager`](orm_rs_db::manager::EntityManager).
//!
//! Supported backends:
//! - `SQLite` (feature `sqlite`, enabled by default)

#[cfg(feature = "sqlite")]
pub mod sqlite;

use orm_rs_core::settings::DatabaseSettings;
use orm_rs_core::{OrmError, OrmResult};
use orm_rs_db::executor::Connection;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteBackend;

/// Opens a connection for `settings.engine`.
///
/// # Errors
///
/// Returns [`OrmError::NoConnection`] for engines that are not compiled in.
pub fn connect(settings: &DatabaseSettings) -> OrmResult<Box<dyn Connection>> {
    match settings.engine.as_str() {
        #[cfg(feature = "sqlite")]
        "sqlite" => Ok(Box::new(SqliteBackend::from_settings(settings)?)),
        other => Err(OrmError::NoConnection(format!(
            "No backend available for engine {other}"
        ))),
    }
}
