//! Query construction and execution.
//!
//! - [`builder`]: the expression builder producing SQL text
//! - [`alias`]: class aliases and attribute → column translation
//! - [`fetcher`]: entity queries with filters and relation joins
//! - [`bulk`]: buffered multi-row inserts

pub mod alias;
pub mod builder;
pub mod bulk;
pub mod fetcher;

pub use alias::{ClassAliasMap, EntityTranslator, ROOT_ALIAS};
pub use builder::{BoolOp, ColumnTranslator, Criterion, Direction, JoinType, QueryBuilder, RawTranslator};
pub use bulk::BulkInsert;
pub use fetcher::{EntityFetcher, Filter};
