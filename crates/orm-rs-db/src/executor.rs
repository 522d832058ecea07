//! The connection seam.
//!
//! [`Connection`] is the minimal synchronous interface the engine needs from
//! a database driver: run a query and return rows, run a statement and return
//! the affected row count, and report the last generated key. It lives in this
//! crate so that backends in `orm-rs-db-backends` can implement it without a
//! dependency cycle.
//!
//! Statements are complete SQL strings: every value has been escaped by an
//! [`Escaper`](crate::escape::Escaper) before it gets here.

use orm_rs_core::{OrmError, OrmResult};
use serde::{Deserialize, Serialize};

use crate::row::Row;
use crate::value::Value;

/// One column of a table, as reported by [`Connection::describe`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDescription {
    pub name: String,
    pub type_name: String,
    pub nullable: bool,
    /// The default expression, as SQL text.
    pub default: Option<String>,
    pub primary_key: bool,
}

/// A synchronous database connection.
pub trait Connection {
    /// The database product, e.g. `"sqlite"`.
    fn vendor(&self) -> &str;

    /// Runs a query and returns all result rows.
    ///
    /// # Errors
    ///
    /// Returns [`OrmError::DatabaseError`] when the database rejects the query.
    fn query(&self, sql: &str) -> OrmResult<Vec<Row>>;

    /// Runs a statement that returns no rows and reports the affected row count.
    ///
    /// # Errors
    ///
    /// Returns [`OrmError::DatabaseError`] when the database rejects the statement.
    fn execute(&self, sql: &str) -> OrmResult<u64>;

    /// The key generated for the last inserted row. For multi-row inserts
    /// this is the key of the last row of the statement.
    ///
    /// # Errors
    ///
    /// Returns [`OrmError::DatabaseError`] when the key is not available.
    fn last_insert_id(&self) -> OrmResult<Value>;

    /// Describes the columns of `table`.
    ///
    /// The default implementation reads `information_schema.columns`;
    /// backends without an information schema override it.
    ///
    /// # Errors
    ///
    /// Returns [`OrmError::InvalidName`] for an unknown table.
    fn describe(&self, table: &str) -> OrmResult<Vec<ColumnDescription>> {
        let table_literal = format!("'{}'", table.replace('\'', "''"));
        let rows = self.query(&format!(
            "SELECT column_name, data_type, is_nullable, column_default \
             FROM information_schema.columns WHERE table_name = {table_literal} \
             ORDER BY ordinal_position"
        ))?;
        if rows.is_empty() {
            return Err(OrmError::InvalidName(format!("Table {table} does not exist")));
        }
        rows.iter()
            .map(|row| {
                Ok(ColumnDescription {
                    name: row.get("column_name")?,
                    type_name: row.get("data_type")?,
                    nullable: row.get::<String>("is_nullable")?.eq_ignore_ascii_case("yes"),
                    default: row.get("column_default")?,
                    primary_key: false,
                })
            })
            .collect()
    }
}
