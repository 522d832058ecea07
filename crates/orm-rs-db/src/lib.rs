//! # orm-rs-db
//!
//! The ORM engine of orm-rs: entity types and instances, the expression
//! builder, entity fetchers, relations, the identity map and bulk inserts.
//!
//! ## Architecture
//!
//! Everything goes through an [`EntityManager`](manager::EntityManager). It
//! owns a [`Connection`](executor::Connection) and an identity map that
//! guarantees one live instance per row. Queries are built as SQL text by a
//! [`QueryBuilder`](query::QueryBuilder); values are inlined as escaped
//! literals by an [`Escaper`](escape::Escaper) rather than bound as
//! parameters. An [`EntityFetcher`](query::EntityFetcher) wraps a builder
//! whose column references are translated from class attributes, and turns
//! result rows into entities.
//!
//! ## Module Overview
//!
//! - [`value`] - The backend-agnostic [`Value`](value::Value) enum
//! - [`escape`] - Literal and identifier escaping
//! - [`entity`] - Entity types, entities and dirty tracking
//! - [`registry`] - Registered entity types and normalized relations
//! - [`relation`] - Relation declarations and the six relation kinds
//! - [`query`] - Expression builder, fetchers and bulk inserts
//! - [`identity_map`] - One instance per class and primary key
//! - [`dbal`] - Inserts, updates and deletes
//! - [`manager`] - The entity manager

#![allow(clippy::result_large_err)]
#![allow(clippy::format_push_string)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::return_self_not_must_use)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_const_for_fn)]
#![allow(clippy::option_if_let_else)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_panics_doc)]

pub mod dbal;
pub mod entity;
pub mod escape;
pub mod executor;
pub mod identity_map;
pub mod manager;
pub mod query;
pub mod registry;
pub mod relation;
pub mod row;
pub mod value;

#[cfg(test)]
pub(crate) mod testing;

// Re-export the most commonly used types at the crate root.
pub use dbal::{AnsiDbal, Dbal};
pub use entity::{Entity, EntityData, EntityRef, EntityType, ForeignKey, Related};
pub use escape::{AnsiEscaper, Escaper};
pub use executor::{ColumnDescription, Connection};
pub use identity_map::{IdentityKey, IdentityMap};
pub use manager::EntityManager;
pub use query::{
    BulkInsert, ColumnTranslator, Criterion, Direction, EntityFetcher, Filter, JoinType,
    QueryBuilder,
};
pub use registry::EntityRegistry;
pub use relation::{Fetched, Relation, RelationDeclaration, RelationKind};
pub use row::Row;
pub use value::Value;
