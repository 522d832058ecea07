//! Writing entities.
//!
//! The [`Dbal`] trait covers the statements the engine does not build with
//! a [`QueryBuilder`](crate::query::QueryBuilder): inserts (single and
//! multi-row), updates of dirty columns and deletes, plus table metadata.
//! [`AnsiDbal`] emits plain ANSI SQL and works with any [`Connection`] that
//! reports the last generated key.
//!
//! After an insert the entities are synchronized with the database: with an
//! auto-incremented key the generated ids are derived from
//! [`Connection::last_insert_id`] and the row count, then all inserted rows
//! are read back in one query so defaults set by the database end up in the
//! entities' baselines.

use std::collections::HashMap;
use std::rc::Rc;

use orm_rs_core::{OrmError, OrmResult};

use crate::entity::{EntityData, EntityRef, EntityType};
use crate::escape::Escaper;
use crate::executor::{ColumnDescription, Connection};
use crate::identity_map::IdentityKey;
use crate::value::Value;

/// Compiles a multi-row `INSERT`.
///
/// Columns are the union of all rows' columns in order of appearance; rows
/// without a column insert `NULL`.
///
/// ```
/// use orm_rs_db::dbal::compile_insert;
/// use orm_rs_db::entity::EntityData;
/// use orm_rs_db::escape::AnsiEscaper;
/// use orm_rs_db::value::Value;
///
/// let rows: Vec<EntityData> = vec![
///     [("id".to_string(), Value::Int(1)), ("name".to_string(), Value::from("a"))].into_iter().collect(),
///     [("id".to_string(), Value::Int(2))].into_iter().collect(),
/// ];
/// let sql = compile_insert(&AnsiEscaper::default(), "tag", &rows).unwrap();
/// assert_eq!(sql, r#"INSERT INTO "tag" ("id", "name") VALUES (1, 'a'), (2, NULL)"#);
/// ```
///
/// # Errors
///
/// Returns [`OrmError::InvalidArgument`] for an empty row set or several
/// rows without values, and escaping errors for values that have no literal
/// form. A single row without values becomes `DEFAULT VALUES`.
pub fn compile_insert(escaper: &dyn Escaper, table: &str, rows: &[EntityData]) -> OrmResult<String> {
    if rows.is_empty() {
        return Err(OrmError::InvalidArgument(format!(
            "Nothing to insert into {table}"
        )));
    }

    let mut columns: Vec<&str> = Vec::new();
    for column in rows.iter().flat_map(|row| row.keys()) {
        if !columns.contains(&column.as_str()) {
            columns.push(column);
        }
    }

    if columns.is_empty() {
        if rows.len() > 1 {
            return Err(OrmError::InvalidArgument(format!(
                "Rows without values can only be inserted into {table} one at a time"
            )));
        }
        return Ok(format!(
            "INSERT INTO {} DEFAULT VALUES",
            escaper.escape_identifier(table)
        ));
    }

    let column_list = columns
        .iter()
        .map(|c| escaper.escape_identifier(c))
        .collect::<Vec<_>>()
        .join(", ");

    let mut value_rows = Vec::with_capacity(rows.len());
    for row in rows {
        let values = columns
            .iter()
            .map(|c| escaper.escape_value(row.get(*c).unwrap_or(&Value::Null)))
            .collect::<OrmResult<Vec<_>>>()?;
        value_rows.push(format!("({})", values.join(", ")));
    }

    Ok(format!(
        "INSERT INTO {} ({column_list}) VALUES {}",
        escaper.escape_identifier(table),
        value_rows.join(", ")
    ))
}

/// Matches any of `keys`: `"a" = 1 OR "a" = 2` for one column,
/// `("a" = 1 AND "b" = 2) OR (...)` for more.
///
/// # Errors
///
/// Returns escaping errors.
pub fn key_condition(escaper: &dyn Escaper, keys: &[EntityData]) -> OrmResult<String> {
    let mut alternatives = Vec::with_capacity(keys.len());
    for key in keys {
        let parts = key
            .iter()
            .map(|(column, value)| {
                let column = escaper.escape_identifier(column);
                if value.is_null() {
                    Ok(format!("{column} IS NULL"))
                } else {
                    Ok(format!("{column} = {}", escaper.escape_value(value)?))
                }
            })
            .collect::<OrmResult<Vec<_>>>()?;
        alternatives.push(if parts.len() == 1 {
            parts.join("")
        } else {
            format!("({})", parts.join(" AND "))
        });
    }
    Ok(alternatives.join(" OR "))
}

/// Compiles a `DELETE` of every row matching one of `keys`.
///
/// # Errors
///
/// Returns [`OrmError::InvalidArgument`] when `keys` is empty.
pub fn compile_delete(escaper: &dyn Escaper, table: &str, keys: &[EntityData]) -> OrmResult<String> {
    if keys.is_empty() {
        return Err(OrmError::InvalidArgument(format!(
            "Refusing to delete from {table} without a condition"
        )));
    }
    Ok(format!(
        "DELETE FROM {} WHERE {}",
        escaper.escape_identifier(table),
        key_condition(escaper, keys)?
    ))
}

/// Compiles an `UPDATE` of `values` on the row identified by `key`.
///
/// # Errors
///
/// Returns escaping errors.
pub fn compile_update(
    escaper: &dyn Escaper,
    table: &str,
    values: &EntityData,
    key: &EntityData,
) -> OrmResult<String> {
    let assignments = values
        .iter()
        .map(|(column, value)| {
            Ok(format!(
                "{} = {}",
                escaper.escape_identifier(column),
                escaper.escape_value(value)?
            ))
        })
        .collect::<OrmResult<Vec<_>>>()?;
    Ok(format!(
        "UPDATE {} SET {} WHERE {}",
        escaper.escape_identifier(table),
        assignments.join(", "),
        key_condition(escaper, std::slice::from_ref(key))?
    ))
}

/// The database abstraction layer used for writes and metadata.
pub trait Dbal {
    /// Inserts one entity and synchronizes its key.
    ///
    /// # Errors
    ///
    /// Propagates driver errors.
    fn insert(&self, connection: &dyn Connection, entity: &EntityRef, use_auto_increment: bool) -> OrmResult<()> {
        self.bulk_insert(connection, std::slice::from_ref(entity), use_auto_increment)
    }

    /// Writes the dirty columns of a persisted entity.
    ///
    /// # Errors
    ///
    /// Returns [`OrmError::IncompletePrimaryKey`] without a key.
    fn update(&self, connection: &dyn Connection, entity: &EntityRef) -> OrmResult<()>;

    /// Deletes the row of an entity.
    ///
    /// # Errors
    ///
    /// Returns [`OrmError::IncompletePrimaryKey`] without a key.
    fn delete(&self, connection: &dyn Connection, entity: &EntityRef) -> OrmResult<()>;

    /// Inserts entities of one class with a single statement and
    /// synchronizes them.
    ///
    /// # Errors
    ///
    /// Returns [`OrmError::InvalidArgument`] for mixed classes and propagates
    /// driver errors.
    fn bulk_insert(
        &self,
        connection: &dyn Connection,
        entities: &[EntityRef],
        use_auto_increment: bool,
    ) -> OrmResult<()>;

    /// Describes the columns of `table`.
    ///
    /// # Errors
    ///
    /// Propagates driver errors.
    fn describe(&self, connection: &dyn Connection, table: &str) -> OrmResult<Vec<ColumnDescription>> {
        connection.describe(table)
    }
}

fn run(connection: &dyn Connection, sql: &str) -> OrmResult<u64> {
    tracing::debug!(sql = %sql, vendor = connection.vendor(), "executing statement");
    connection.execute(sql)
}

/// A [`Dbal`] emitting ANSI SQL.
#[derive(Clone)]
pub struct AnsiDbal {
    escaper: Rc<dyn Escaper>,
}

impl std::fmt::Debug for AnsiDbal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnsiDbal").finish_non_exhaustive()
    }
}

impl AnsiDbal {
    pub fn new(escaper: Rc<dyn Escaper>) -> Self {
        Self { escaper }
    }

    /// The primary key as column → value, preferring the persisted value so
    /// that a changed key still finds its row.
    fn stored_key(entity: &EntityRef) -> OrmResult<EntityData> {
        let entity = entity.borrow();
        let entity_type = Rc::clone(entity.entity_type());
        let mut key = EntityData::new();
        for attribute in entity_type.primary_key_attributes() {
            let column = entity_type.column_name(attribute);
            let value = entity
                .original_data()
                .and_then(|o| o.get(&column))
                .cloned()
                .unwrap_or_else(|| entity.get_column(&column));
            if value.is_null() {
                return Err(OrmError::IncompletePrimaryKey(format!(
                    "Missing primary key {attribute} for {}",
                    entity.class()
                )));
            }
            key.insert(column, value);
        }
        Ok(key)
    }

    /// Reads the rows of `entities` back and stores them as their baseline.
    /// Entities whose row is not found keep their live data as baseline.
    fn sync_inserted(
        &self,
        connection: &dyn Connection,
        entity_type: &EntityType,
        entities: &[EntityRef],
    ) -> OrmResult<()> {
        let pk_columns = entity_type.primary_key_columns();
        let keys: Vec<EntityData> = entities
            .iter()
            .map(|e| {
                let e = e.borrow();
                pk_columns
                    .iter()
                    .map(|c| (c.clone(), e.get_column(c)))
                    .collect()
            })
            .collect();

        let condition = if let [column] = pk_columns.as_slice() {
            let values = keys
                .iter()
                .filter_map(|k| k.get(column))
                .map(|v| self.escaper.escape_value(v))
                .collect::<OrmResult<Vec<_>>>()?;
            format!(
                "{} IN ({})",
                self.escaper.escape_identifier(column),
                values.join(", ")
            )
        } else {
            key_condition(self.escaper.as_ref(), &keys)?
        };
        let sql = format!(
            "SELECT * FROM {} WHERE {condition}",
            self.escaper.escape_identifier(&entity_type.table_name())
        );
        tracing::debug!(sql = %sql, vendor = connection.vendor(), "executing query");
        let rows = connection.query(&sql)?;

        let mut by_key: HashMap<IdentityKey, EntityData> = HashMap::new();
        for row in rows {
            let data = row.into_map();
            let key = IdentityKey::from_values(
                pk_columns.iter().map(|c| data.get(c).unwrap_or(&Value::Null)),
            );
            by_key.insert(key, data);
        }

        for (entity, key) in entities.iter().zip(&keys) {
            let key = IdentityKey::from_values(key.values());
            let mut entity = entity.borrow_mut();
            let data = by_key
                .remove(&key)
                .unwrap_or_else(|| entity.data().clone());
            entity.set_persisted(data);
        }
        Ok(())
    }
}

impl Dbal for AnsiDbal {
    fn update(&self, connection: &dyn Connection, entity: &EntityRef) -> OrmResult<()> {
        let key = Self::stored_key(entity)?;
        let (table, values) = {
            let e = entity.borrow();
            let values: EntityData = e
                .dirty_columns()
                .into_iter()
                .map(|c| {
                    let value = e.get_column(&c);
                    (c, value)
                })
                .collect();
            (e.entity_type().table_name(), values)
        };
        if values.is_empty() {
            return Ok(());
        }
        let sql = compile_update(self.escaper.as_ref(), &table, &values, &key)?;
        run(connection, &sql)?;

        let mut entity = entity.borrow_mut();
        let data = entity.data().clone();
        entity.set_persisted(data);
        Ok(())
    }

    fn delete(&self, connection: &dyn Connection, entity: &EntityRef) -> OrmResult<()> {
        let key = Self::stored_key(entity)?;
        let table = entity.borrow().entity_type().table_name();
        let sql = compile_delete(self.escaper.as_ref(), &table, &[key])?;
        run(connection, &sql)?;
        entity.borrow_mut().mark_deleted();
        Ok(())
    }

    fn bulk_insert(
        &self,
        connection: &dyn Connection,
        entities: &[EntityRef],
        use_auto_increment: bool,
    ) -> OrmResult<()> {
        let Some(first) = entities.first() else {
            return Ok(());
        };
        let entity_type = Rc::clone(first.borrow().entity_type());
        if let Some(other) = entities
            .iter()
            .find(|e| e.borrow().class() != entity_type.name())
        {
            return Err(OrmError::InvalidArgument(format!(
                "Bulk insert of {} received an entity of {}",
                entity_type.name(),
                other.borrow().class()
            )));
        }

        let pk_columns = entity_type.primary_key_columns();
        let generated_key = match pk_columns.as_slice() {
            [column] if use_auto_increment && entity_type.is_auto_increment() => entities
                .iter()
                .all(|e| !e.borrow().has_primary_key())
                .then(|| column.clone()),
            _ => None,
        };

        let rows: Vec<EntityData> = entities
            .iter()
            .map(|e| {
                let mut data = e.borrow().data().clone();
                if let Some(column) = &generated_key {
                    data.shift_remove(column);
                }
                data
            })
            .collect();
        let table = entity_type.table_name();
        if rows.iter().all(EntityData::is_empty) {
            for row in &rows {
                let sql = compile_insert(self.escaper.as_ref(), &table, std::slice::from_ref(row))?;
                run(connection, &sql)?;
            }
        } else {
            run(connection, &compile_insert(self.escaper.as_ref(), &table, &rows)?)?;
        }

        if let Some(column) = &generated_key {
            let last = connection.last_insert_id()?;
            let last = last.as_int().ok_or_else(|| {
                OrmError::InvalidType(format!("Generated key {last} is not an integer"))
            })?;
            let count = i64::try_from(entities.len())
                .map_err(|e| OrmError::InvalidArgument(format!("Too many rows: {e}")))?;
            for (entity, id) in entities.iter().zip(last - count + 1..) {
                let attribute = entity_type
                    .primary_key_attributes()
                    .first()
                    .cloned()
                    .unwrap_or_else(|| column.clone());
                entity.borrow_mut().set_raw(&attribute, id)?;
            }
        }

        let (complete, incomplete): (Vec<EntityRef>, Vec<EntityRef>) = entities
            .iter()
            .cloned()
            .partition(|e| e.borrow().has_primary_key());
        for entity in incomplete {
            let mut entity = entity.borrow_mut();
            let data = entity.data().clone();
            entity.set_persisted(data);
        }
        if !complete.is_empty() {
            self.sync_inserted(connection, &entity_type, &complete)?;
        }
        Ok(())
    }
}
