//! Entity queries.
//!
//! An [`EntityFetcher`] is a [`QueryBuilder`] over the table of one entity
//! class that translates attribute references (see [`alias`](super::alias)),
//! joins relations by name and maps result rows to entities through the
//! manager's identity map.
//!
//! Nothing is executed until [`one`](EntityFetcher::one),
//! [`all`](EntityFetcher::all) or [`count`](EntityFetcher::count) is called.
//! The first execution is memoized: later calls read from the same result
//! and changes to the query no longer have an effect.

use std::collections::VecDeque;
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::rc::Rc;

use orm_rs_core::OrmResult;

use super::alias::{EntityTranslator, ROOT_ALIAS};
use super::builder::{JoinType, QueryBuilder};
use crate::entity::{EntityRef, EntityType};
use crate::manager::EntityManager;
use crate::row::Row;

/// Modifies a fetcher before its query is built for the first time.
///
/// Closures of the form `Fn(&mut EntityFetcher<'_>) -> OrmResult<()>`
/// are filters.
pub trait Filter {
    /// Applies the filter.
    ///
    /// # Errors
    ///
    /// Errors abort building the query.
    fn apply(&self, fetcher: &mut EntityFetcher<'_>) -> OrmResult<()>;
}

impl<F> Filter for F
where
    F: Fn(&mut EntityFetcher<'_>) -> OrmResult<()>,
{
    fn apply(&self, fetcher: &mut EntityFetcher<'_>) -> OrmResult<()> {
        self(fetcher)
    }
}

/// A lazily executed query for entities of one class.
pub struct EntityFetcher<'m> {
    manager: &'m EntityManager,
    entity_type: Rc<EntityType>,
    query: QueryBuilder<EntityTranslator>,
    filters: Vec<Rc<dyn Filter>>,
    use_registered_filters: bool,
    filters_applied: bool,
    executed_sql: Option<String>,
    total: Option<u64>,
    rows: Option<VecDeque<Row>>,
}

impl fmt::Debug for EntityFetcher<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityFetcher")
            .field("class", &self.entity_type.name())
            .field("query", &self.query)
            .field("executed", &self.executed_sql.is_some())
            .finish_non_exhaustive()
    }
}

impl<'m> EntityFetcher<'m> {
    pub(crate) fn new(manager: &'m EntityManager, entity_type: Rc<EntityType>) -> Self {
        let escaper = Rc::clone(manager.shared_escaper());
        let translator = EntityTranslator::new(
            Rc::clone(manager.registry()),
            Rc::clone(&escaper),
            entity_type.name(),
        );
        let table = escaper.escape_identifier(&entity_type.table_name());
        let alias = escaper.escape_identifier(ROOT_ALIAS);
        let all_columns = escaper.escape_identifier(&format!("{ROOT_ALIAS}.*"));
        let mut query = QueryBuilder::with_translator(table, Some(alias), escaper, translator);
        query.columns([all_columns]).modifier("DISTINCT");

        Self {
            manager,
            entity_type,
            query,
            filters: Vec::new(),
            use_registered_filters: true,
            filters_applied: false,
            executed_sql: None,
            total: None,
            rows: None,
        }
    }

    /// The manager this fetcher executes on.
    pub const fn manager(&self) -> &'m EntityManager {
        self.manager
    }

    /// The entity type being fetched.
    pub const fn entity_type(&self) -> &Rc<EntityType> {
        &self.entity_type
    }

    // ── Filters ──────────────────────────────────────────────────────

    /// Adds a filter for this fetcher only.
    pub fn filter(&mut self, filter: impl Filter + 'static) -> &mut Self {
        self.filters.push(Rc::new(filter));
        self
    }

    /// Skips the global and per-class filters registered on the manager.
    pub fn without_filters(&mut self) -> &mut Self {
        self.use_registered_filters = false;
        self
    }

    fn apply_filters(&mut self) -> OrmResult<()> {
        if self.filters_applied {
            return Ok(());
        }

        let mut filters = if self.use_registered_filters {
            self.manager.filters_for(self.entity_type.name())
        } else {
            Vec::new()
        };
        filters.extend(self.filters.iter().cloned());
        let unfiltered = self.query.clone();
        for filter in &filters {
            if let Err(e) = filter.apply(self) {
                self.query = unfiltered;
                return Err(e);
            }
        }
        self.filters_applied = true;
        Ok(())
    }

    // ── Relations ────────────────────────────────────────────────────

    /// Joins a relation path such as `"articles.categories"`. Every segment
    /// is joined under the path up to it, with `.` replaced by `_`, so the
    /// first segment's alias is the relation name.
    ///
    /// # Errors
    ///
    /// Returns [`OrmError::UndefinedRelation`](orm_rs_core::OrmError::UndefinedRelation)
    /// for unknown segments and
    /// [`OrmError::InvalidRelation`](orm_rs_core::OrmError::InvalidRelation)
    /// for morphed relations.
    pub fn join_related(&mut self, path: &str) -> OrmResult<&mut Self> {
        self.join_related_with(JoinType::Inner, path)
    }

    /// Like [`join_related`](Self::join_related) with `LEFT JOIN`s.
    ///
    /// # Errors
    ///
    /// See [`join_related`](Self::join_related).
    pub fn left_join_related(&mut self, path: &str) -> OrmResult<&mut Self> {
        self.join_related_with(JoinType::Left, path)
    }

    fn join_related_with(&mut self, join_type: JoinType, path: &str) -> OrmResult<&mut Self> {
        let mut class = self.entity_type.name().to_string();
        let mut from_alias = ROOT_ALIAS.to_string();
        let mut alias = String::new();
        for segment in path.split('.') {
            let relation = self.manager.registry().relation(&class, segment)?;
            if !alias.is_empty() {
                alias.push('_');
            }
            alias.push_str(segment);
            relation.add_join(self, join_type, &from_alias, &alias)?;
            class = relation.related_class().unwrap_or_default().to_string();
            from_alias.clone_from(&alias);
        }
        Ok(self)
    }

    // ── Execution ────────────────────────────────────────────────────

    /// Builds the statement, applying filters the first time. Once the
    /// fetcher has executed, the executed statement is returned.
    ///
    /// # Errors
    ///
    /// Propagates errors of the filters. A failed filter leaves the query
    /// as it was, and every filter runs again on the next call.
    pub fn get_query(&mut self) -> OrmResult<String> {
        if let Some(sql) = &self.executed_sql {
            return Ok(sql.clone());
        }
        self.apply_filters()?;
        Ok(self.query.get_query())
    }

    fn freeze(&mut self) -> OrmResult<String> {
        let sql = self.get_query()?;
        self.executed_sql = Some(sql.clone());
        Ok(sql)
    }

    /// Returns the next entity, executing the query on first use.
    ///
    /// Rows are mapped through the identity map: a row for an entity that is
    /// already known is merged into that instance, keeping local changes.
    ///
    /// # Errors
    ///
    /// Propagates driver errors and errors from mapping a row.
    pub fn one(&mut self) -> OrmResult<Option<EntityRef>> {
        if self.rows.is_none() {
            let _span =
                orm_rs_core::logging::query_span("fetch", self.entity_type.name()).entered();
            let sql = self.freeze()?;
            let rows = self.manager.query_rows(&sql)?;
            self.total.get_or_insert(rows.len() as u64);
            self.rows = Some(rows.into());
        }
        let Some(row) = self.rows.as_mut().and_then(VecDeque::pop_front) else {
            return Ok(None);
        };
        self.manager
            .map_row(&self.entity_type, row.into_map())
            .map(Some)
    }

    /// Returns up to `limit` entities; `0` means all.
    ///
    /// # Errors
    ///
    /// See [`one`](Self::one).
    pub fn all(&mut self, limit: usize) -> OrmResult<Vec<EntityRef>> {
        let mut entities = Vec::new();
        while limit == 0 || entities.len() < limit {
            match self.one()? {
                Some(entity) => entities.push(entity),
                None => break,
            }
        }
        Ok(entities)
    }

    /// Counts the rows the query returns. After execution this is the
    /// number of rows fetched; otherwise a `COUNT(*)` is run once and the
    /// query is fixed from then on.
    ///
    /// # Errors
    ///
    /// Propagates driver errors.
    pub fn count(&mut self) -> OrmResult<u64> {
        if let Some(total) = self.total {
            return Ok(total);
        }
        let sql = format!("SELECT COUNT(*) AS count FROM ({}) AS q", self.freeze()?);
        let rows = self.manager.query_rows(&sql)?;
        let total = match rows.first() {
            Some(row) => row.get::<u64>("count")?,
            None => 0,
        };
        self.total = Some(total);
        Ok(total)
    }
}

impl<'m> Deref for EntityFetcher<'m> {
    type Target = QueryBuilder<EntityTranslator>;

    fn deref(&self) -> &Self::Target {
        &self.query
    }
}

impl<'m> DerefMut for EntityFetcher<'m> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.query
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;
    use crate::query::builder::Direction;
    use crate::testing::{manager_with, RecordingConnection};
    use crate::value::Value;
    use orm_rs_core::OrmError;

    #[test]
    fn test_default_query() {
        let em = manager_with(RecordingConnection::new());
        let mut fetcher = em.fetch("Article").unwrap();
        assert_eq!(
            fetcher.get_query().unwrap(),
            "SELECT DISTINCT \"t0\".* FROM \"article\" AS \"t0\""
        );
    }

    #[test]
    fn test_query_is_stable() {
        let em = manager_with(RecordingConnection::new());
        let mut fetcher = em.fetch("Article").unwrap();
        fetcher.where_(("userId", 3)).unwrap();
        fetcher.order_by("createdAt", Direction::Desc, &[]).unwrap();
        let first = fetcher.get_query().unwrap();
        assert_eq!(first, fetcher.get_query().unwrap());
        assert_eq!(
            first,
            "SELECT DISTINCT \"t0\".* FROM \"article\" AS \"t0\" \
             WHERE \"t0\".\"user_id\" = 3 ORDER BY \"t0\".\"created_at\" DESC"
        );
    }

    #[test]
    fn test_executes_once() {
        let connection = RecordingConnection::new();
        connection.script(
            "SELECT",
            vec![
                vec![("id", Value::Int(1)), ("title", "a".into())],
                vec![("id", Value::Int(2)), ("title", "b".into())],
            ],
        );
        let em = manager_with(connection.clone());
        let mut fetcher = em.fetch("Article").unwrap();

        let first = fetcher.one().unwrap().unwrap();
        assert_eq!(first.borrow().get("id"), Value::Int(1));
        fetcher.where_(("id", 99)).unwrap();
        let rest = fetcher.all(0).unwrap();
        assert_eq!(rest.len(), 1);
        assert!(fetcher.one().unwrap().is_none());
        assert_eq!(connection.query_count(), 1);
    }

    #[test]
    fn test_count_after_execution_uses_fetched_rows() {
        let connection = RecordingConnection::new();
        connection.script(
            "SELECT",
            vec![vec![("id", Value::Int(1))], vec![("id", Value::Int(2))]],
        );
        let em = manager_with(connection.clone());
        let mut fetcher = em.fetch("Article").unwrap();

        fetcher.one().unwrap();
        fetcher.where_(("id", 99)).unwrap();
        assert_eq!(fetcher.count().unwrap(), 2);
        assert_eq!(fetcher.count().unwrap(), 2);
        assert_eq!(connection.statements().len(), 1);
        assert!(!fetcher.get_query().unwrap().contains("99"));
    }

    #[test]
    fn test_count_fixes_the_query() {
        let connection = RecordingConnection::new();
        connection.script("SELECT COUNT(*)", vec![vec![("count", Value::Int(1))]]);
        let em = manager_with(connection.clone());
        let mut fetcher = em.fetch("Article").unwrap();

        assert_eq!(fetcher.count().unwrap(), 1);
        fetcher.where_(("id", 99)).unwrap();
        assert_eq!(fetcher.count().unwrap(), 1);
        fetcher.one().unwrap();
        let statements = connection.statements();
        assert_eq!(statements.len(), 2);
        assert_eq!(
            statements[1],
            "SELECT DISTINCT \"t0\".* FROM \"article\" AS \"t0\""
        );
    }

    #[test]
    fn test_all_with_limit() {
        let connection = RecordingConnection::new();
        connection.script(
            "SELECT",
            (1..=3).map(|id| vec![("id", Value::Int(id))]).collect(),
        );
        let em = manager_with(connection);
        let mut fetcher = em.fetch("Article").unwrap();
        assert_eq!(fetcher.all(2).unwrap().len(), 2);
        assert_eq!(fetcher.all(0).unwrap().len(), 1);
    }

    #[test]
    fn test_rows_merge_into_known_instances() {
        let connection = RecordingConnection::new();
        connection.script(
            "SELECT",
            vec![vec![
                ("id", Value::Int(1)),
                ("title", "remote".into()),
                ("views", Value::Int(10)),
            ]],
        );
        let em = manager_with(connection);
        let known = em
            .create("Article", [("id", Value::Int(1)), ("title", "local".into())])
            .unwrap();
        let known = em.map(known).unwrap();

        let fetched = em.fetch("Article").unwrap().one().unwrap().unwrap();
        assert!(Rc::ptr_eq(&known, &fetched));
        let entity = fetched.borrow();
        assert_eq!(entity.get("title"), Value::from("local"));
        assert_eq!(entity.get("views"), Value::Int(10));
        assert!(entity.is_attribute_dirty("title"));
    }

    #[test]
    fn test_count() {
        let connection = RecordingConnection::new();
        connection.script("SELECT COUNT(*)", vec![vec![("count", Value::Int(42))]]);
        let em = manager_with(connection.clone());
        let mut fetcher = em.fetch("Article").unwrap();
        fetcher.where_(("userId", 1)).unwrap();
        assert_eq!(fetcher.count().unwrap(), 42);
        assert_eq!(
            connection.statements(),
            vec![
                "SELECT COUNT(*) AS count FROM (SELECT DISTINCT \"t0\".* FROM \"article\" AS \"t0\" \
                 WHERE \"t0\".\"user_id\" = 1) AS q"
            ]
        );
    }

    #[test]
    fn test_filters_apply_once() {
        let em = manager_with(RecordingConnection::new());
        let calls = Rc::new(Cell::new(0));
        let counter = Rc::clone(&calls);
        em.register_class_filter("Article", move |f: &mut EntityFetcher<'_>| {
            counter.set(counter.get() + 1);
            f.where_(("deletedAt", Value::Null))?;
            Ok(())
        });
        em.register_global_filter(|f: &mut EntityFetcher<'_>| {
            f.limit(50);
            Ok(())
        });

        let mut fetcher = em.fetch("Article").unwrap();
        fetcher.filter(|f: &mut EntityFetcher<'_>| {
            f.where_(("userId", 2))?;
            Ok(())
        });
        let sql = fetcher.get_query().unwrap();
        assert_eq!(sql, fetcher.get_query().unwrap());
        assert_eq!(calls.get(), 1);
        assert_eq!(
            sql,
            "SELECT DISTINCT \"t0\".* FROM \"article\" AS \"t0\" \
             WHERE \"t0\".\"deleted_at\" IS NULL AND \"t0\".\"user_id\" = 2 LIMIT 50"
        );

        let mut other = em.fetch("User").unwrap();
        assert!(other.get_query().unwrap().ends_with("LIMIT 50"));
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn test_without_filters() {
        let em = manager_with(RecordingConnection::new());
        em.register_global_filter(|f: &mut EntityFetcher<'_>| {
            f.limit(1);
            Ok(())
        });
        let mut fetcher = em.fetch("Article").unwrap();
        fetcher.without_filters();
        assert!(!fetcher.get_query().unwrap().contains("LIMIT"));
    }

    #[test]
    fn test_filter_errors_abort() {
        let em = manager_with(RecordingConnection::new());
        let mut fetcher = em.fetch("Article").unwrap();
        fetcher.filter(|f: &mut EntityFetcher<'_>| {
            f.where_("Ghost::id = 1")?;
            Ok(())
        });
        assert!(matches!(fetcher.get_query(), Err(OrmError::NotJoined(_))));
    }

    #[test]
    fn test_failed_filter_is_not_skipped_later() {
        let connection = RecordingConnection::new();
        let em = manager_with(connection.clone());
        em.register_class_filter("Article", |f: &mut EntityFetcher<'_>| {
            f.where_(("deleted", 0))?;
            f.where_("Ghost::id = 1")?;
            Ok(())
        });
        let mut fetcher = em.fetch("Article").unwrap();

        assert!(matches!(fetcher.get_query(), Err(OrmError::NotJoined(_))));
        assert!(matches!(fetcher.get_query(), Err(OrmError::NotJoined(_))));
        assert!(matches!(fetcher.one(), Err(OrmError::NotJoined(_))));
        assert!(connection.statements().is_empty());

        fetcher.without_filters();
        assert_eq!(
            fetcher.get_query().unwrap(),
            "SELECT DISTINCT \"t0\".* FROM \"article\" AS \"t0\""
        );
    }

    #[test]
    fn test_explicit_join_of_class() {
        let em = manager_with(RecordingConnection::new());
        let mut fetcher = em.fetch("Article").unwrap();
        fetcher
            .join("User", "User::id = Article::userId", None, &[])
            .unwrap();
        fetcher.where_(("User::name", "ann")).unwrap();
        assert_eq!(
            fetcher.get_query().unwrap(),
            "SELECT DISTINCT \"t0\".* FROM \"article\" AS \"t0\" \
             JOIN \"user\" AS \"t1\" ON \"t1\".\"id\" = \"t0\".\"user_id\" \
             WHERE \"t1\".\"name\" = 'ann'"
        );
    }

    #[test]
    fn test_nested_join_path() {
        let em = manager_with(RecordingConnection::new());
        let mut fetcher = em.fetch("Comment").unwrap();
        let err = fetcher.join_related("parent.user").unwrap_err();
        assert!(matches!(err, OrmError::InvalidRelation(_)));

        let mut fetcher = em.fetch("Profile").unwrap();
        fetcher.join_related("user.articles").unwrap();
        assert_eq!(
            fetcher.get_query().unwrap(),
            "SELECT DISTINCT \"t0\".* FROM \"profile\" AS \"t0\" \
             JOIN \"user\" AS \"user\" ON \"t0\".\"user_id\" = \"user\".\"id\" \
             JOIN \"article\" AS \"user_articles\" ON \"user\".\"id\" = \"user_articles\".\"user_id\""
        );
    }

    #[test]
    fn test_unknown_relation() {
        let em = manager_with(RecordingConnection::new());
        let mut fetcher = em.fetch("Article").unwrap();
        assert!(matches!(
            fetcher.join_related("tags"),
            Err(OrmError::UndefinedRelation(_))
        ));
    }
}
