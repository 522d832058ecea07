//! The entity manager.
//!
//! An [`EntityManager`] owns one database connection, the identity map and
//! the registered fetch filters, and is the entry point for everything the
//! ORM does: building fetchers, loading entities by key, following
//! relations and writing entities back.
//!
//! The manager is single-threaded. Entities are shared as
//! [`EntityRef`](crate::entity::EntityRef) handles, and every fetch of the
//! same row through the same manager returns the same handle.
//!
//! ```no_run
//! use std::rc::Rc;
//!
//! use orm_rs_core::Settings;
//! use orm_rs_db::entity::EntityType;
//! use orm_rs_db::executor::Connection;
//! use orm_rs_db::manager::EntityManager;
//! use orm_rs_db::registry::EntityRegistry;
//!
//! # fn demo(connection: Box<dyn Connection>) -> orm_rs_core::OrmResult<()> {
//! let mut registry = EntityRegistry::new();
//! registry.register(EntityType::new("User"));
//! let em = EntityManager::new(Rc::new(registry), connection, Settings::default());
//!
//! let ann = em.fetch_by_key("User", 1)?;
//! let mut fetcher = em.fetch("User")?;
//! fetcher.where_(("id", 1))?;
//! let same = fetcher.one()?;
//! # Ok(())
//! # }
//! ```

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use orm_rs_core::{OrmError, OrmResult, Settings};

use crate::dbal::{AnsiDbal, Dbal};
use crate::entity::{Entity, EntityData, EntityRef, EntityType, ForeignKey, Related};
use crate::escape::{AnsiEscaper, Escaper};
use crate::executor::{ColumnDescription, Connection};
use crate::identity_map::{IdentityKey, IdentityMap};
use crate::query::builder::QueryBuilder;
use crate::query::bulk::BulkInsert;
use crate::query::fetcher::{EntityFetcher, Filter};
use crate::registry::EntityRegistry;
use crate::relation::{Fetched, RelationKind};
use crate::row::Row;
use crate::value::Value;

pub struct EntityManager {
    registry: Rc<EntityRegistry>,
    connection: Box<dyn Connection>,
    dbal: Box<dyn Dbal>,
    escaper: Rc<dyn Escaper>,
    settings: Settings,
    identity_map: RefCell<IdentityMap>,
    global_filters: RefCell<Vec<Rc<dyn Filter>>>,
    class_filters: RefCell<HashMap<String, Vec<Rc<dyn Filter>>>>,
}

impl fmt::Debug for EntityManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityManager")
            .field("vendor", &self.connection.vendor())
            .field("classes", &self.registry.classes().collect::<Vec<_>>())
            .field("mapped", &self.identity_map.borrow().len())
            .finish_non_exhaustive()
    }
}

impl EntityManager {
    /// Creates a manager. Escaping follows `settings.escaping`; naming is
    /// taken from the registry.
    pub fn new(
        registry: Rc<EntityRegistry>,
        connection: Box<dyn Connection>,
        settings: Settings,
    ) -> Self {
        let escaper: Rc<dyn Escaper> = Rc::new(AnsiEscaper::new(settings.escaping.clone()));
        tracing::debug!(vendor = connection.vendor(), "entity manager created");
        Self {
            registry,
            connection,
            dbal: Box::new(AnsiDbal::new(Rc::clone(&escaper))),
            escaper,
            settings,
            identity_map: RefCell::new(IdentityMap::new()),
            global_filters: RefCell::new(Vec::new()),
            class_filters: RefCell::new(HashMap::new()),
        }
    }

    /// Replaces the database abstraction layer used for writes.
    #[must_use]
    pub fn with_dbal(mut self, dbal: Box<dyn Dbal>) -> Self {
        self.dbal = dbal;
        self
    }

    pub fn registry(&self) -> &Rc<EntityRegistry> {
        &self.registry
    }

    pub fn escaper(&self) -> &dyn Escaper {
        self.escaper.as_ref()
    }

    pub(crate) fn shared_escaper(&self) -> &Rc<dyn Escaper> {
        &self.escaper
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn connection(&self) -> &dyn Connection {
        self.connection.as_ref()
    }

    /// The entity type of `class`.
    ///
    /// # Errors
    ///
    /// Returns [`OrmError::InvalidName`] when the class is not registered.
    pub fn entity_type(&self, class: &str) -> OrmResult<Rc<EntityType>> {
        self.registry.entity_type(class)
    }

    // ── Filters ──────────────────────────────────────────────────────

    /// Registers a filter applied to every fetcher.
    pub fn register_global_filter(&self, filter: impl Filter + 'static) {
        self.global_filters.borrow_mut().push(Rc::new(filter));
    }

    /// Registers a filter applied to fetchers of `class`.
    pub fn register_class_filter(&self, class: &str, filter: impl Filter + 'static) {
        self.class_filters
            .borrow_mut()
            .entry(class.to_string())
            .or_default()
            .push(Rc::new(filter));
    }

    /// Global filters first, then those of `class`.
    pub(crate) fn filters_for(&self, class: &str) -> Vec<Rc<dyn Filter>> {
        let mut filters = self.global_filters.borrow().clone();
        if let Some(own) = self.class_filters.borrow().get(class) {
            filters.extend(own.iter().cloned());
        }
        filters
    }

    // ── Fetching ─────────────────────────────────────────────────────

    /// Creates a fetcher for `class`.
    ///
    /// # Errors
    ///
    /// Returns [`OrmError::InvalidName`] when the class is not registered.
    pub fn fetch(&self, class: &str) -> OrmResult<EntityFetcher<'_>> {
        let entity_type = self.entity_type(class)?;
        Ok(EntityFetcher::new(self, entity_type))
    }

    /// Loads an entity by primary key. A [`Value::List`] is a composite key
    /// in primary key order.
    ///
    /// # Errors
    ///
    /// Returns [`OrmError::InvalidArgument`] when the number of values does
    /// not match the primary key.
    pub fn fetch_by_key(&self, class: &str, key: impl Into<Value>) -> OrmResult<Option<EntityRef>> {
        let entity_type = self.entity_type(class)?;
        let key = key.into();
        let values = key.as_slice();
        let attributes = entity_type.primary_key_attributes();
        if values.len() != attributes.len() {
            return Err(OrmError::InvalidArgument(format!(
                "{class} has a primary key of {} attributes, got {} values",
                attributes.len(),
                values.len()
            )));
        }
        let key: ForeignKey = attributes.iter().cloned().zip(values.iter().cloned()).collect();
        self.fetch_by_primary_key(class, &key)
    }

    /// Loads an entity by its primary key attributes, from the identity map
    /// when possible.
    ///
    /// # Errors
    ///
    /// Returns [`OrmError::IncompletePrimaryKey`] when `key` misses a
    /// primary key attribute.
    pub fn fetch_by_primary_key(
        &self,
        class: &str,
        key: &ForeignKey,
    ) -> OrmResult<Option<EntityRef>> {
        let entity_type = self.entity_type(class)?;
        let ordered = Self::ordered_key(&entity_type, key)?;
        let identity = IdentityKey::from_values(ordered.values());
        if let Some(entity) = self.identity_map.borrow().get(class, &identity) {
            return Ok(Some(entity));
        }
        let mut fetcher = EntityFetcher::new(self, entity_type);
        for (attribute, value) in ordered {
            fetcher.where_((attribute.as_str(), "=", value))?;
        }
        fetcher.one()
    }

    /// Whether an instance with primary key `key` is in the identity map.
    pub fn is_mapped(&self, class: &str, key: &ForeignKey) -> bool {
        let Ok(entity_type) = self.entity_type(class) else {
            return false;
        };
        Self::ordered_key(&entity_type, key).is_ok_and(|ordered| {
            self.identity_map
                .borrow()
                .contains(class, &IdentityKey::from_values(ordered.values()))
        })
    }

    fn ordered_key(entity_type: &EntityType, key: &ForeignKey) -> OrmResult<ForeignKey> {
        entity_type
            .primary_key_attributes()
            .iter()
            .map(|attribute| match key.get(attribute) {
                Some(value) if !value.is_null() => Ok((attribute.clone(), value.clone())),
                _ => Err(OrmError::IncompletePrimaryKey(format!(
                    "Missing primary key {attribute} for {}",
                    entity_type.name()
                ))),
            })
            .collect()
    }

    /// A plain query builder on `table` using this manager's escaping.
    pub fn query(&self, table: &str) -> QueryBuilder {
        QueryBuilder::new(table, Rc::clone(&self.escaper))
    }

    pub(crate) fn query_rows(&self, sql: &str) -> OrmResult<Vec<Row>> {
        tracing::debug!(sql = %sql, vendor = self.connection.vendor(), "executing query");
        self.connection.query(sql)
    }

    pub(crate) fn execute(&self, sql: &str) -> OrmResult<u64> {
        tracing::debug!(sql = %sql, vendor = self.connection.vendor(), "executing statement");
        self.connection.execute(sql)
    }

    /// Turns a fetched row into an entity. A row of a known entity is merged
    /// into that instance; columns changed locally keep their local value.
    pub(crate) fn map_row(&self, entity_type: &Rc<EntityType>, data: EntityData) -> OrmResult<EntityRef> {
        let entity = Entity::from_row(Rc::clone(entity_type), data);
        let Ok(key) = IdentityKey::of(&entity) else {
            return Ok(entity.into_ref());
        };
        let known = self.identity_map.borrow().get(entity_type.name(), &key);
        if let Some(known) = known {
            known.borrow_mut().merge(entity.data().clone(), true);
            return Ok(known);
        }
        self.identity_map.borrow_mut().map(entity.into_ref())
    }

    // ── Entity lifecycle ─────────────────────────────────────────────

    /// Creates a new, unsaved entity of `class` and assigns `data` through
    /// the attribute setters.
    ///
    /// # Errors
    ///
    /// Returns [`OrmError::InvalidName`] for an unknown class and
    /// propagates setter errors.
    pub fn create<I, K>(&self, class: &str, data: I) -> OrmResult<EntityRef>
    where
        I: IntoIterator<Item = (K, Value)>,
        K: AsRef<str>,
    {
        let mut entity = Entity::new(self.entity_type(class)?, EntityData::new());
        for (attribute, value) in data {
            entity.set(attribute.as_ref(), value)?;
        }
        Ok(entity.into_ref())
    }

    /// Registers `entity` in the identity map and returns the instance that
    /// represents its row, which is an earlier instance if one is known.
    ///
    /// # Errors
    ///
    /// Returns [`OrmError::IncompletePrimaryKey`] without a complete key.
    pub fn map(&self, entity: EntityRef) -> OrmResult<EntityRef> {
        self.identity_map.borrow_mut().map(entity)
    }

    /// Forgets every mapped instance.
    pub fn clear(&self) {
        self.identity_map.borrow_mut().clear();
    }

    /// Reloads the row of `entity`. With `overwrite` the live data is
    /// replaced by the stored row except for local changes; without it only
    /// the baseline is refreshed. When another instance of the same row is
    /// mapped, that instance is refreshed as well. Returns `false` when the
    /// row is gone.
    ///
    /// # Errors
    ///
    /// Returns [`OrmError::IncompletePrimaryKey`] without a key.
    pub fn sync(&self, entity: &EntityRef, overwrite: bool) -> OrmResult<bool> {
        let (entity_type, key) = {
            let e = entity.borrow();
            (Rc::clone(e.entity_type()), e.primary_key()?)
        };
        let _span = orm_rs_core::logging::query_span("sync", entity_type.name()).entered();
        let mut fetcher = EntityFetcher::new(self, Rc::clone(&entity_type));
        fetcher.without_filters();
        for (attribute, value) in key {
            fetcher.where_((attribute.as_str(), "=", value))?;
        }
        let sql = fetcher.get_query()?;
        let Some(row) = self.query_rows(&sql)?.into_iter().next() else {
            return Ok(false);
        };
        let fetched = row.into_map();
        let mapped = self.map(Rc::clone(entity))?;
        if !Rc::ptr_eq(&mapped, entity) {
            mapped.borrow_mut().merge(fetched.clone(), overwrite);
        }
        entity.borrow_mut().merge(fetched, overwrite);
        Ok(true)
    }

    /// Inserts a new entity or writes the changes of a persisted one, and
    /// returns the mapped instance.
    ///
    /// # Errors
    ///
    /// Propagates driver errors.
    pub fn save(&self, entity: &EntityRef) -> OrmResult<EntityRef> {
        let (class, exists) = {
            let e = entity.borrow();
            (e.class().to_string(), e.exists())
        };
        let _span = orm_rs_core::logging::query_span("save", &class).entered();
        if exists {
            self.dbal.update(self.connection(), entity)?;
        } else {
            self.dbal
                .insert(self.connection(), entity, self.settings.use_auto_increment)?;
        }
        if entity.borrow().has_primary_key() {
            self.map(Rc::clone(entity))
        } else {
            Ok(Rc::clone(entity))
        }
    }

    /// Deletes the row of `entity` and forgets the instance.
    ///
    /// # Errors
    ///
    /// Returns [`OrmError::IncompletePrimaryKey`] without a key.
    pub fn delete(&self, entity: &EntityRef) -> OrmResult<()> {
        let (class, key) = {
            let e = entity.borrow();
            (e.class().to_string(), IdentityKey::of(&e)?)
        };
        let _span = orm_rs_core::logging::query_span("delete", &class).entered();
        self.dbal.delete(self.connection(), entity)?;
        self.identity_map.borrow_mut().remove(&class, &key);
        Ok(())
    }

    /// Starts a bulk insert of `class`.
    ///
    /// # Errors
    ///
    /// Returns [`OrmError::InvalidName`] for an unknown class.
    pub fn bulk_insert(&self, class: &str) -> OrmResult<BulkInsert<'_>> {
        Ok(BulkInsert::new(self, self.entity_type(class)?))
    }

    pub(crate) fn insert_batch(&self, entities: &[EntityRef], use_auto_increment: bool) -> OrmResult<()> {
        self.dbal
            .bulk_insert(self.connection(), entities, use_auto_increment)
    }

    /// Describes the columns of `table`.
    ///
    /// # Errors
    ///
    /// Propagates driver errors.
    pub fn describe(&self, table: &str) -> OrmResult<Vec<ColumnDescription>> {
        self.dbal.describe(self.connection(), table)
    }

    // ── Relations ────────────────────────────────────────────────────

    /// Fetches the entities related to `entity` through `relation`: the
    /// entity itself for one cardinality, a fetcher for many.
    ///
    /// # Errors
    ///
    /// Returns [`OrmError::UndefinedRelation`] for an unknown relation.
    pub fn fetch_related(&self, entity: &EntityRef, relation: &str) -> OrmResult<Fetched<'_>> {
        let class = entity.borrow().class().to_string();
        self.registry.relation(&class, relation)?.fetch(entity, self)
    }

    /// Loads the entities related through `relation`, reusing what an
    /// earlier call cached on `entity`.
    ///
    /// # Errors
    ///
    /// Returns [`OrmError::UndefinedRelation`] for an unknown relation.
    pub fn fetch_all_related(&self, entity: &EntityRef, relation: &str) -> OrmResult<Related> {
        let cached = entity.borrow().loaded_related(relation).cloned();
        if let Some(related) = cached {
            return Ok(related);
        }
        let class = entity.borrow().class().to_string();
        self.registry.relation(&class, relation)?.fetch_all(entity, self)
    }

    /// Points `entity`'s foreign key at `related`, or clears it.
    ///
    /// # Errors
    ///
    /// Returns [`OrmError::InvalidRelation`] for relations that do not own
    /// a foreign key.
    pub fn set_related(
        &self,
        entity: &EntityRef,
        relation: &str,
        related: Option<&EntityRef>,
    ) -> OrmResult<()> {
        let class = entity.borrow().class().to_string();
        self.registry
            .relation(&class, relation)?
            .set_related(entity, related)
    }

    /// Associates `related` with `entity` through a many-to-many relation.
    ///
    /// # Errors
    ///
    /// Returns [`OrmError::InvalidRelation`] for other relations.
    pub fn add_related(&self, entity: &EntityRef, relation: &str, related: &[EntityRef]) -> OrmResult<()> {
        let class = entity.borrow().class().to_string();
        self.registry
            .relation(&class, relation)?
            .add_related(entity, related, self)
    }

    /// Removes the association of `related` with `entity`.
    ///
    /// # Errors
    ///
    /// Returns [`OrmError::InvalidRelation`] for other relations.
    pub fn delete_related(
        &self,
        entity: &EntityRef,
        relation: &str,
        related: &[EntityRef],
    ) -> OrmResult<()> {
        let class = entity.borrow().class().to_string();
        self.registry
            .relation(&class, relation)?
            .delete_related(entity, related, self)
    }

    /// Arranges `entities` into trees along the parent/children relation
    /// `relation` of `class` and returns the roots.
    ///
    /// # Errors
    ///
    /// Returns [`OrmError::InvalidRelation`] when `relation` is not a
    /// parent/children relation.
    pub fn build_tree(
        &self,
        class: &str,
        relation: &str,
        entities: &[EntityRef],
    ) -> OrmResult<Vec<EntityRef>> {
        let relation = self.registry.relation(class, relation)?;
        match relation.kind() {
            RelationKind::ParentChildren(r) => {
                r.build_tree(relation.name(), &self.registry, entities)
            }
            _ => Err(OrmError::InvalidRelation(format!(
                "{class}::{} is not a parent/children relation",
                relation.name()
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{manager_with, RecordingConnection};

    fn key(id: i64) -> ForeignKey {
        [("id".to_string(), Value::Int(id))].into_iter().collect()
    }

    // ── Identity map ────────────────────────────────────────────────

    #[test]
    fn test_same_row_same_instance() {
        let connection = RecordingConnection::new();
        connection.script(
            "SELECT",
            vec![vec![("id", Value::Int(1)), ("title", "a".into())]],
        );
        let em = manager_with(connection.clone());
        let first = em.fetch_by_key("Article", 1).unwrap().unwrap();
        let second = em.fetch("Article").unwrap().one().unwrap().unwrap();
        assert!(Rc::ptr_eq(&first, &second));

        let third = em.fetch_by_key("Article", 1).unwrap().unwrap();
        assert!(Rc::ptr_eq(&first, &third));
        assert_eq!(connection.query_count(), 2);
    }

    #[test]
    fn test_fetch_by_key_query() {
        let connection = RecordingConnection::new();
        let em = manager_with(connection.clone());
        assert!(em.fetch_by_key("Article", 5).unwrap().is_none());
        assert_eq!(
            connection.statements(),
            vec!["SELECT DISTINCT \"t0\".* FROM \"article\" AS \"t0\" WHERE \"t0\".\"id\" = 5"]
        );
    }

    #[test]
    fn test_fetch_by_key_arity() {
        let em = manager_with(RecordingConnection::new());
        assert!(matches!(
            em.fetch_by_key("Article", vec![1, 2]),
            Err(OrmError::InvalidArgument(_))
        ));
        assert!(matches!(
            em.fetch_by_primary_key("Article", &ForeignKey::new()),
            Err(OrmError::IncompletePrimaryKey(_))
        ));
        assert!(matches!(
            em.fetch_by_key("Ghost", 1),
            Err(OrmError::InvalidName(_))
        ));
    }

    #[test]
    fn test_rows_without_key_are_not_mapped() {
        let connection = RecordingConnection::new();
        connection.script("SELECT", vec![vec![("title", "a".into())]]);
        let em = manager_with(connection);
        let entity = em.fetch("Article").unwrap().one().unwrap().unwrap();
        assert!(entity.borrow().exists());
        assert!(!em.is_mapped("Article", &key(1)));
    }

    #[test]
    fn test_clear() {
        let em = manager_with(RecordingConnection::new());
        let entity = em.create("Article", [("id", Value::Int(1))]).unwrap();
        em.map(entity).unwrap();
        assert!(em.is_mapped("Article", &key(1)));
        em.clear();
        assert!(!em.is_mapped("Article", &key(1)));
    }

    // ── Lifecycle ───────────────────────────────────────────────────

    #[test]
    fn test_save_inserts_then_updates() {
        let connection = RecordingConnection::new();
        let em = manager_with(connection.clone());
        let article = em
            .create("Article", [("title", Value::from("draft"))])
            .unwrap();
        let saved = em.save(&article).unwrap();
        assert!(Rc::ptr_eq(&article, &saved));
        assert_eq!(article.borrow().get("id"), Value::Int(1));
        assert!(em.is_mapped("Article", &key(1)));

        article.borrow_mut().set("title", "final").unwrap();
        em.save(&article).unwrap();
        assert_eq!(
            connection.statements(),
            vec![
                "INSERT INTO \"article\" (\"title\") VALUES ('draft')",
                "SELECT * FROM \"article\" WHERE \"id\" IN (1)",
                "UPDATE \"article\" SET \"title\" = 'final' WHERE \"id\" = 1",
            ]
        );
    }

    #[test]
    fn test_delete_forgets_instance() {
        let connection = RecordingConnection::new();
        connection.script("SELECT", vec![vec![("id", Value::Int(4))]]);
        let em = manager_with(connection.clone());
        let article = em.fetch_by_key("Article", 4).unwrap().unwrap();
        em.delete(&article).unwrap();
        assert!(!em.is_mapped("Article", &key(4)));
        assert!(!article.borrow().exists());
        assert_eq!(
            connection.statements().last().map(String::as_str),
            Some("DELETE FROM \"article\" WHERE \"id\" = 4")
        );
    }

    #[test]
    fn test_sync() {
        let connection = RecordingConnection::new();
        connection.script(
            "SELECT",
            vec![vec![("id", Value::Int(2)), ("title", "stored".into())]],
        );
        let em = manager_with(connection);

        let local = em
            .create("Article", [("id", Value::Int(2)), ("title", "local".into())])
            .unwrap();
        assert!(em.sync(&local, false).unwrap());
        {
            let entity = local.borrow();
            assert_eq!(entity.get("title"), Value::from("local"));
            assert!(entity.is_attribute_dirty("title"));
        }
        local.borrow_mut().reset_attribute("title");
        assert!(em.sync(&local, true).unwrap());
        assert_eq!(local.borrow().get("title"), Value::from("stored"));
        assert!(em.is_mapped("Article", &key(2)));

        let missing = em.create("User", [("id", Value::Int(9))]).unwrap();
        let em_empty = manager_with(RecordingConnection::new());
        assert!(!em_empty.sync(&missing, true).unwrap());
    }

    #[test]
    fn test_sync_refreshes_the_mapped_instance() {
        let connection = RecordingConnection::new();
        connection.script(
            "SELECT",
            vec![vec![("id", Value::Int(2)), ("title", "stored".into())]],
        );
        let em = manager_with(connection);
        let mapped = em
            .map(em.create("Article", [("id", Value::Int(2))]).unwrap())
            .unwrap();
        let copy = em
            .create("Article", [("id", Value::Int(2)), ("title", "copy".into())])
            .unwrap();

        assert!(em.sync(&copy, true).unwrap());
        assert!(!Rc::ptr_eq(&mapped, &copy));
        let entity = mapped.borrow();
        assert_eq!(
            entity.original_data().and_then(|o| o.get("title")),
            Some(&Value::from("stored"))
        );
        assert_eq!(entity.get("title"), Value::from("stored"));
        assert!(!entity.is_dirty());
        assert_eq!(copy.borrow().get("title"), Value::from("copy"));
    }

    // ── Relations ───────────────────────────────────────────────────

    #[test]
    fn test_fetch_all_related_uses_cache() {
        let connection = RecordingConnection::new();
        connection.script(
            "SELECT",
            vec![vec![("id", Value::Int(3)), ("userId", Value::Int(1))]],
        );
        let em = manager_with(connection.clone());
        let user = em.create("User", [("id", Value::Int(1))]).unwrap();

        let Related::Many(articles) = em.fetch_all_related(&user, "articles").unwrap() else {
            panic!("expected many");
        };
        assert_eq!(articles.len(), 1);
        em.fetch_all_related(&user, "articles").unwrap();
        assert_eq!(connection.query_count(), 1);
    }

    #[test]
    fn test_set_related_through_manager() {
        let em = manager_with(RecordingConnection::new());
        let user = em.create("User", [("id", Value::Int(8))]).unwrap();
        let article = em.create("Article", Vec::<(&str, Value)>::new()).unwrap();
        em.set_related(&article, "user", Some(&user)).unwrap();
        assert_eq!(article.borrow().get("userId"), Value::Int(8));
        assert!(matches!(
            em.set_related(&user, "articles", Some(&article)),
            Err(OrmError::InvalidRelation(_))
        ));
    }

    #[test]
    fn test_build_tree_requires_parent_children() {
        let em = manager_with(RecordingConnection::new());
        assert!(matches!(
            em.build_tree("Article", "comments", &[]),
            Err(OrmError::InvalidRelation(_))
        ));
        assert!(em.build_tree("Category", "children", &[]).unwrap().is_empty());
    }
}
