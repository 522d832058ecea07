//! # orm-rs
//!
//! Entity query construction, relation resolution and an identity map for
//! relational databases.
//!
//! This is the meta-crate that re-exports the sub-crates for convenient
//! access. You can depend on `orm-rs` to get everything, or depend on the
//! individual crates for finer-grained control.
//!
//! ```no_run
//! use std::rc::Rc;
//!
//! use orm_rs::db::{EntityManager, EntityRegistry};
//! use orm_rs::db_backends::SqliteBackend;
//!
//! # fn main() -> orm_rs::core::OrmResult<()> {
//! let settings = orm_rs::core::settings_loader::from_env();
//! orm_rs::core::logging::setup_logging(&settings);
//!
//! let registry = EntityRegistry::from_file("entities.toml")?;
//! let connection = SqliteBackend::from_settings(&settings.database)?;
//! let em = EntityManager::new(Rc::new(registry), Box::new(connection), settings);
//!
//! let mut recent = em.fetch("Article")?;
//! recent.where_(("views", ">", 100))?.limit(10);
//! for article in recent.all(0)? {
//!     println!("{}", article.borrow().get("title"));
//! }
//! # Ok(())
//! # }
//! ```

/// Settings, errors, logging and naming schemes.
pub use orm_rs_core as core;

/// The ORM engine: entities, fetchers, relations and the identity map.
#[cfg(feature = "db")]
pub use orm_rs_db as db;

/// Database connections.
#[cfg(feature = "sqlite")]
pub use orm_rs_db_backends as db_backends;

/// Third-party crates re-exported for convenience.
pub use serde;
pub use serde_json;
pub use tracing;
pub use tracing_subscriber;
