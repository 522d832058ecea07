//! SQLite connection using `rusqlite`.
//!
//! Statements arrive as complete SQL text, so nothing is bound; result
//! values are converted by their storage class. In-memory databases are
//! opened with the path `:memory:`, which makes this backend convenient for
//! tests.

use std::path::{Path, PathBuf};

use orm_rs_core::settings::DatabaseSettings;
use orm_rs_core::{OrmError, OrmResult};
use orm_rs_db::executor::{ColumnDescription, Connection};
use orm_rs_db::row::Row;
use orm_rs_db::value::Value;
use rusqlite::types::ValueRef;

fn driver_error(e: rusqlite::Error) -> OrmError {
    OrmError::DatabaseError(e.to_string())
}

/// A connection to one SQLite database.
pub struct SqliteBackend {
    path: PathBuf,
    conn: rusqlite::Connection,
}

impl std::fmt::Debug for SqliteBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteBackend")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl SqliteBackend {
    /// Opens the database at `path`; `:memory:` opens an in-memory database.
    /// Foreign keys are enforced, and file databases use WAL journaling.
    ///
    /// # Errors
    ///
    /// Returns [`OrmError::OperationalError`] when the database can not be
    /// opened.
    pub fn open(path: impl Into<PathBuf>) -> OrmResult<Self> {
        let path = path.into();
        let in_memory = path.to_str() == Some(":memory:");
        let conn = if in_memory {
            rusqlite::Connection::open_in_memory()
        } else {
            rusqlite::Connection::open(&path)
        }
        .map_err(|e| OrmError::OperationalError(format!("SQLite open failed: {e}")))?;

        let pragmas = if in_memory {
            "PRAGMA foreign_keys=ON;"
        } else {
            "PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;"
        };
        conn.execute_batch(pragmas)
            .map_err(|e| OrmError::OperationalError(format!("Failed to set pragmas: {e}")))?;

        tracing::debug!(path = %path.display(), "sqlite database opened");
        Ok(Self { path, conn })
    }

    /// Opens an in-memory database.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be created.
    pub fn memory() -> OrmResult<Self> {
        Self::open(":memory:")
    }

    /// Opens the database named by `settings`.
    ///
    /// # Errors
    ///
    /// Returns [`OrmError::NoConnection`] when the engine is not `sqlite`.
    pub fn from_settings(settings: &DatabaseSettings) -> OrmResult<Self> {
        if settings.engine != "sqlite" {
            return Err(OrmError::NoConnection(format!(
                "SqliteBackend can not open a {} database",
                settings.engine
            )));
        }
        Self::open(&settings.name)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Runs several statements separated by semicolons, e.g. a schema.
    ///
    /// # Errors
    ///
    /// Returns [`OrmError::DatabaseError`] when a statement fails.
    pub fn execute_batch(&self, sql: &str) -> OrmResult<()> {
        self.conn.execute_batch(sql).map_err(driver_error)
    }

    fn convert_value(value: ValueRef<'_>) -> Value {
        match value {
            ValueRef::Null => Value::Null,
            ValueRef::Integer(v) => Value::Int(v),
            ValueRef::Real(v) => Value::Float(v),
            ValueRef::Text(b) => Value::String(String::from_utf8_lossy(b).into_owned()),
            ValueRef::Blob(b) => Value::Bytes(b.to_vec()),
        }
    }
}

impl Connection for SqliteBackend {
    fn vendor(&self) -> &str {
        "sqlite"
    }

    fn query(&self, sql: &str) -> OrmResult<Vec<Row>> {
        let mut stmt = self.conn.prepare(sql).map_err(driver_error)?;
        let column_names: Vec<String> = stmt
            .column_names()
            .into_iter()
            .map(String::from)
            .collect();

        let mut raw_rows = stmt.raw_query();
        let mut rows = Vec::new();
        while let Some(row) = raw_rows.next().map_err(driver_error)? {
            let values = (0..column_names.len())
                .map(|i| row.get_ref(i).map(Self::convert_value))
                .collect::<Result<Vec<_>, _>>()
                .map_err(driver_error)?;
            rows.push(Row::new(column_names.clone(), values));
        }
        Ok(rows)
    }

    fn execute(&self, sql: &str) -> OrmResult<u64> {
        let count = self.conn.execute(sql, []).map_err(driver_error)?;
        Ok(count as u64)
    }

    fn last_insert_id(&self) -> OrmResult<Value> {
        Ok(Value::Int(self.conn.last_insert_rowid()))
    }

    fn describe(&self, table: &str) -> OrmResult<Vec<ColumnDescription>> {
        let quoted = format!("'{}'", table.replace('\'', "''"));
        let rows = self.query(&format!("PRAGMA table_info({quoted})"))?;
        if rows.is_empty() {
            return Err(OrmError::InvalidName(format!("Table {table} does not exist")));
        }
        rows.iter()
            .map(|row| {
                Ok(ColumnDescription {
                    name: row.get("name")?,
                    type_name: row.get("type")?,
                    nullable: row.get::<i64>("notnull")? == 0,
                    default: row.get("dflt_value")?,
                    primary_key: row.get::<i64>("pk")? > 0,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend() -> SqliteBackend {
        let backend = SqliteBackend::memory().unwrap();
        backend
            .execute_batch(
                "CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT NOT NULL, \
                 age INTEGER DEFAULT 18, avatar BLOB, score REAL)",
            )
            .unwrap();
        backend
    }

    #[test]
    fn test_memory_open() {
        let backend = SqliteBackend::memory().unwrap();
        assert_eq!(backend.vendor(), "sqlite");
        assert_eq!(backend.path(), Path::new(":memory:"));
    }

    #[test]
    fn test_from_settings() {
        assert!(SqliteBackend::from_settings(&DatabaseSettings::default()).is_ok());
        let other = DatabaseSettings {
            engine: "postgres".to_string(),
            ..DatabaseSettings::default()
        };
        assert!(matches!(
            SqliteBackend::from_settings(&other),
            Err(OrmError::NoConnection(_))
        ));
    }

    #[test]
    fn test_insert_and_query() {
        let backend = backend();
        let count = backend
            .execute("INSERT INTO users (name, avatar, score) VALUES ('Alice', X'00FF', 1.5), ('Bob', NULL, NULL)")
            .unwrap();
        assert_eq!(count, 2);
        assert_eq!(backend.last_insert_id().unwrap(), Value::Int(2));

        let rows = backend
            .query("SELECT id, name, age, avatar, score FROM users ORDER BY id")
            .unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].get::<String>("name").unwrap(), "Alice");
        assert_eq!(rows[0].get::<i64>("age").unwrap(), 18);
        assert_eq!(rows[0].get_value("avatar"), Some(&Value::Bytes(vec![0, 255])));
        assert_eq!(rows[0].get_value("score"), Some(&Value::Float(1.5)));
        assert_eq!(rows[1].get_value("avatar"), Some(&Value::Null));
    }

    #[test]
    fn test_errors() {
        let backend = backend();
        assert!(matches!(
            backend.query("SELECT * FROM missing"),
            Err(OrmError::DatabaseError(_))
        ));
        assert!(matches!(
            backend.execute("INSERT INTO users (age) VALUES (3)"),
            Err(OrmError::DatabaseError(_))
        ));
    }

    #[test]
    fn test_describe() {
        let backend = backend();
        let columns = backend.describe("users").unwrap();
        assert_eq!(columns.len(), 5);
        assert_eq!(columns[0].name, "id");
        assert!(columns[0].primary_key);
        assert!(!columns[1].nullable);
        assert_eq!(columns[2].default.as_deref(), Some("18"));
        assert!(matches!(
            backend.describe("missing"),
            Err(OrmError::InvalidName(_))
        ));
    }
}
