//! # orm-rs-core
//!
//! Core types, settings, and error types for orm-rs.
//! This crate knows nothing about entities or SQL and provides the foundation
//! for all other crates.
//!
//! ## Modules
//!
//! - [`error`] - Error types and result aliases
//! - [`utils`] - Naming schemes and other text helpers
//! - [`settings`] - Settings shared by an entity manager
//! - [`settings_loader`] - Loading settings from TOML, JSON and the environment
//! - [`logging`] - Tracing-based logging integration

pub mod error;
pub mod logging;
pub mod settings;
pub mod settings_loader;
pub mod utils;

// Re-export the most commonly used types at the crate root.
pub use error::{ErrorKind, OrmError, OrmResult};
pub use settings::Settings;
pub use utils::text::NamingScheme;
