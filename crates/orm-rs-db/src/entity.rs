//! Entity types and entity instances.
//!
//! An [`EntityType`] is the static description of a class of entities: its
//! table, the attribute → column mapping, the primary key, whether the key is
//! generated by the database and the relations it declares. An [`Entity`] is
//! one row of that class, holding its live data next to the baseline last
//! read from (or written to) the database.
//!
//! Entities are shared as [`EntityRef`] handles so the identity map, fetch
//! results and related-object caches all point at the same instance.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;
use orm_rs_core::settings::NamingSettings;
use orm_rs_core::{OrmError, OrmResult};
use serde::Deserialize;

use crate::relation::RelationDeclaration;
use crate::value::Value;

/// A shared, single-threaded handle to an entity.
pub type EntityRef = Rc<RefCell<Entity>>;

/// Column name → value.
pub type EntityData = IndexMap<String, Value>;

/// Attribute name → value of a (primary or foreign) key.
pub type ForeignKey = IndexMap<String, Value>;

/// Computes the value of an attribute from the entity.
pub type Getter = Rc<dyn Fn(&Entity) -> Value>;

/// Stores a value for an attribute, usually after transforming it.
pub type Setter = Rc<dyn Fn(&mut Entity, Value) -> OrmResult<()>>;

fn default_primary_key() -> Vec<String> {
    vec!["id".to_string()]
}

const fn default_true() -> bool {
    true
}

/// The static description of an entity class.
///
/// # Examples
///
/// ```
/// use orm_rs_db::entity::EntityType;
/// use orm_rs_db::relation::RelationDeclaration;
///
/// let article = EntityType::new("Article")
///     .column_alias("body", "content")
///     .relation("user", RelationDeclaration::owner("User", [("userId", "id")]));
///
/// assert_eq!(article.table_name(), "article");
/// assert_eq!(article.column_name("userId"), "user_id");
/// assert_eq!(article.column_name("body"), "content");
/// ```
#[derive(Clone, Deserialize)]
pub struct EntityType {
    #[serde(skip)]
    name: String,
    #[serde(default)]
    table: Option<String>,
    #[serde(default)]
    columns: HashMap<String, String>,
    #[serde(default = "default_primary_key")]
    primary_key: Vec<String>,
    #[serde(default = "default_true")]
    auto_increment: bool,
    #[serde(default)]
    relations: IndexMap<String, RelationDeclaration>,
    #[serde(default)]
    excluded: HashSet<String>,
    #[serde(skip)]
    getters: HashMap<String, Getter>,
    #[serde(skip)]
    setters: HashMap<String, Setter>,
    #[serde(skip)]
    naming: NamingSettings,
}

impl fmt::Debug for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut getters: Vec<&String> = self.getters.keys().collect();
        getters.sort();
        let mut setters: Vec<&String> = self.setters.keys().collect();
        setters.sort();
        f.debug_struct("EntityType")
            .field("name", &self.name)
            .field("table", &self.table_name())
            .field("columns", &self.columns)
            .field("primary_key", &self.primary_key)
            .field("auto_increment", &self.auto_increment)
            .field("relations", &self.relations.keys().collect::<Vec<_>>())
            .field("getters", &getters)
            .field("setters", &setters)
            .finish_non_exhaustive()
    }
}

impl EntityType {
    /// Creates an entity type for the class `name` with default settings:
    /// table and columns named by the naming scheme, primary key `id`,
    /// auto-incremented.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            table: None,
            columns: HashMap::new(),
            primary_key: default_primary_key(),
            auto_increment: true,
            relations: IndexMap::new(),
            excluded: HashSet::new(),
            getters: HashMap::new(),
            setters: HashMap::new(),
            naming: NamingSettings::default(),
        }
    }

    // ── Builder ──────────────────────────────────────────────────────

    /// Sets an explicit table name.
    pub fn table(mut self, table: impl Into<String>) -> Self {
        self.table = Some(table.into());
        self
    }

    /// Maps an attribute to a column that does not follow the naming scheme.
    pub fn column_alias(mut self, attribute: impl Into<String>, column: impl Into<String>) -> Self {
        self.columns.insert(attribute.into(), column.into());
        self
    }

    /// Sets the primary key attributes.
    pub fn primary_key<I, S>(mut self, attributes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.primary_key = attributes.into_iter().map(Into::into).collect();
        self
    }

    /// Sets whether the primary key is generated by the database.
    pub fn auto_increment(mut self, auto_increment: bool) -> Self {
        self.auto_increment = auto_increment;
        self
    }

    /// Declares a relation.
    pub fn relation(mut self, name: impl Into<String>, declaration: RelationDeclaration) -> Self {
        self.relations.insert(name.into(), declaration);
        self
    }

    /// Registers a computed getter for `attribute`.
    pub fn getter<F>(mut self, attribute: impl Into<String>, getter: F) -> Self
    where
        F: Fn(&Entity) -> Value + 'static,
    {
        self.getters.insert(attribute.into(), Rc::new(getter));
        self
    }

    /// Registers a setter for `attribute`.
    pub fn setter<F>(mut self, attribute: impl Into<String>, setter: F) -> Self
    where
        F: Fn(&mut Entity, Value) -> OrmResult<()> + 'static,
    {
        self.setters.insert(attribute.into(), Rc::new(setter));
        self
    }

    /// Excludes an attribute from [`Entity::to_array`].
    pub fn excluded_attribute(mut self, attribute: impl Into<String>) -> Self {
        self.excluded.insert(attribute.into());
        self
    }

    pub(crate) fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    pub(crate) fn set_naming(&mut self, naming: NamingSettings) {
        self.naming = naming;
    }

    // ── Accessors ────────────────────────────────────────────────────

    /// The class name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The table name.
    pub fn table_name(&self) -> String {
        self.table
            .clone()
            .unwrap_or_else(|| self.naming.table.apply(&self.name))
    }

    /// The column that stores `attribute`.
    pub fn column_name(&self, attribute: &str) -> String {
        self.columns
            .get(attribute)
            .cloned()
            .unwrap_or_else(|| self.naming.column.apply(attribute))
    }

    /// The primary key attributes.
    pub fn primary_key_attributes(&self) -> &[String] {
        &self.primary_key
    }

    /// The primary key columns.
    pub fn primary_key_columns(&self) -> Vec<String> {
        self.primary_key.iter().map(|a| self.column_name(a)).collect()
    }

    /// Whether the primary key is generated by the database.
    pub const fn is_auto_increment(&self) -> bool {
        self.auto_increment
    }

    /// The declared relations, in declaration order.
    pub fn relation_declarations(&self) -> &IndexMap<String, RelationDeclaration> {
        &self.relations
    }

    /// Returns the declaration of relation `name`.
    pub fn relation_declaration(&self, name: &str) -> Option<&RelationDeclaration> {
        self.relations.get(name)
    }

    fn computed_getter(&self, attribute: &str) -> Option<&Getter> {
        self.getters.get(attribute)
    }

    fn computed_setter(&self, attribute: &str) -> Option<&Setter> {
        self.setters.get(attribute)
    }
}

/// Objects loaded through a relation and cached on the owner.
#[derive(Debug, Clone)]
pub enum Related {
    /// A relation with one cardinality.
    One(Option<EntityRef>),
    /// A relation with many cardinality.
    Many(Vec<EntityRef>),
}

/// One row of an [`EntityType`].
#[derive(Debug, Clone)]
pub struct Entity {
    entity_type: Rc<EntityType>,
    data: EntityData,
    original: Option<EntityData>,
    related: HashMap<String, Related>,
}

impl Entity {
    /// Creates an entity that has not been persisted yet.
    pub fn new(entity_type: Rc<EntityType>, data: EntityData) -> Self {
        Self {
            entity_type,
            data,
            original: None,
            related: HashMap::new(),
        }
    }

    /// Creates an entity from data read from the database.
    pub fn from_row(entity_type: Rc<EntityType>, data: EntityData) -> Self {
        Self {
            entity_type,
            original: Some(data.clone()),
            data,
            related: HashMap::new(),
        }
    }

    /// Wraps the entity into a shared handle.
    pub fn into_ref(self) -> EntityRef {
        Rc::new(RefCell::new(self))
    }

    /// The entity type.
    pub fn entity_type(&self) -> &Rc<EntityType> {
        &self.entity_type
    }

    /// The class name.
    pub fn class(&self) -> &str {
        self.entity_type.name()
    }

    // ── Attributes ───────────────────────────────────────────────────

    /// Returns the value of `attribute`, going through a registered getter.
    /// Unknown attributes read as [`Value::Null`].
    pub fn get(&self, attribute: &str) -> Value {
        if let Some(getter) = self.entity_type.computed_getter(attribute) {
            return getter(self);
        }
        self.raw(attribute)
    }

    /// Returns the stored value of `attribute`, bypassing getters.
    pub fn raw(&self, attribute: &str) -> Value {
        self.get_column(&self.entity_type.column_name(attribute))
    }

    /// Returns the stored value of `column`.
    pub fn get_column(&self, column: &str) -> Value {
        self.data.get(column).cloned().unwrap_or(Value::Null)
    }

    /// Sets `attribute`, going through a registered setter.
    pub fn set(&mut self, attribute: &str, value: impl Into<Value>) -> OrmResult<()> {
        let value = value.into();
        let entity_type = Rc::clone(&self.entity_type);
        if let Some(setter) = entity_type.computed_setter(attribute) {
            return setter(self, value);
        }
        self.set_raw(attribute, value)
    }

    /// Stores `value` for `attribute`, bypassing setters.
    pub fn set_raw(&mut self, attribute: &str, value: impl Into<Value>) -> OrmResult<()> {
        let value = value.into();
        if value.is_list() {
            return Err(OrmError::InvalidType(format!(
                "{}::{attribute} can not hold a list",
                self.class()
            )));
        }
        let column = self.entity_type.column_name(attribute);
        self.data.insert(column, value);
        Ok(())
    }

    /// The live data, keyed by column.
    pub const fn data(&self) -> &EntityData {
        &self.data
    }

    /// The baseline data, if the entity was read from or written to the database.
    pub const fn original_data(&self) -> Option<&EntityData> {
        self.original.as_ref()
    }

    /// The live data keyed by column, without excluded attributes.
    pub fn to_array(&self) -> EntityData {
        let excluded: HashSet<String> = self
            .entity_type
            .excluded
            .iter()
            .map(|a| self.entity_type.column_name(a))
            .collect();
        self.data
            .iter()
            .filter(|(column, _)| !excluded.contains(*column))
            .map(|(column, value)| (column.clone(), value.clone()))
            .collect()
    }

    // ── Dirty tracking ───────────────────────────────────────────────

    fn column_is_dirty(&self, column: &str) -> bool {
        let live = self.data.get(column).unwrap_or(&Value::Null);
        let original = self
            .original
            .as_ref()
            .and_then(|o| o.get(column))
            .unwrap_or(&Value::Null);
        live != original
    }

    /// Whether any attribute differs from the baseline.
    pub fn is_dirty(&self) -> bool {
        let original_columns = self.original.iter().flat_map(|o| o.keys());
        self.data
            .keys()
            .chain(original_columns)
            .any(|column| self.column_is_dirty(column))
    }

    /// Whether `attribute` differs from the baseline.
    pub fn is_attribute_dirty(&self, attribute: &str) -> bool {
        self.column_is_dirty(&self.entity_type.column_name(attribute))
    }

    /// The columns whose value differs from the baseline, in data order.
    pub fn dirty_columns(&self) -> Vec<String> {
        let mut columns: Vec<String> = self
            .data
            .keys()
            .filter(|c| self.column_is_dirty(c))
            .cloned()
            .collect();
        if let Some(original) = &self.original {
            columns.extend(
                original
                    .keys()
                    .filter(|c| !self.data.contains_key(*c) && self.column_is_dirty(c))
                    .cloned(),
            );
        }
        columns
    }

    /// Restores the live data from the baseline.
    pub fn reset(&mut self) {
        self.data = self.original.clone().unwrap_or_default();
    }

    /// Restores one attribute from the baseline.
    pub fn reset_attribute(&mut self, attribute: &str) {
        let column = self.entity_type.column_name(attribute);
        match self.original.as_ref().and_then(|o| o.get(&column)) {
            Some(value) => {
                self.data.insert(column, value.clone());
            }
            None => {
                self.data.shift_remove(&column);
            }
        }
    }

    /// Merges data read from the database into the baseline.
    ///
    /// Columns missing from the live data are filled in. When
    /// `refresh_unmodified` is set, live values that were not changed locally
    /// are replaced as well; local edits are always kept.
    pub fn merge(&mut self, fetched: EntityData, refresh_unmodified: bool) {
        for (column, value) in fetched {
            let missing = !self.data.contains_key(&column);
            if missing || (refresh_unmodified && !self.column_is_dirty(&column)) {
                self.data.insert(column.clone(), value.clone());
            }
            self.original
                .get_or_insert_with(IndexMap::new)
                .insert(column, value);
        }
    }

    /// Replaces both live data and baseline with what the database stored.
    pub fn set_persisted(&mut self, data: EntityData) {
        for (column, value) in &data {
            self.data.insert(column.clone(), value.clone());
        }
        self.original = Some(self.data.clone());
    }

    /// Forgets the baseline, e.g. after the row was deleted.
    pub fn mark_deleted(&mut self) {
        self.original = None;
    }

    /// Whether the entity was read from or written to the database.
    pub const fn exists(&self) -> bool {
        self.original.is_some()
    }

    // ── Keys ─────────────────────────────────────────────────────────

    /// Returns the primary key as attribute → value.
    ///
    /// # Errors
    ///
    /// Returns [`OrmError::IncompletePrimaryKey`] naming the first attribute
    /// that is null.
    pub fn primary_key(&self) -> OrmResult<ForeignKey> {
        let mut key = ForeignKey::new();
        for attribute in self.entity_type.primary_key_attributes() {
            let value = self.raw(attribute);
            if value.is_null() {
                return Err(OrmError::IncompletePrimaryKey(format!(
                    "Missing primary key {attribute} for {}",
                    self.class()
                )));
            }
            key.insert(attribute.clone(), value);
        }
        Ok(key)
    }

    /// Whether every primary key attribute is set.
    pub fn has_primary_key(&self) -> bool {
        self.entity_type
            .primary_key_attributes()
            .iter()
            .all(|a| !self.raw(a).is_null())
    }

    // ── Related objects ──────────────────────────────────────────────

    /// Caches objects loaded through relation `name`.
    pub fn set_loaded_related(&mut self, name: impl Into<String>, related: Related) {
        self.related.insert(name.into(), related);
    }

    /// Returns the cached objects of relation `name`.
    pub fn loaded_related(&self, name: &str) -> Option<&Related> {
        self.related.get(name)
    }

    /// Drops the cached objects of relation `name`.
    pub fn forget_related(&mut self, name: &str) {
        self.related.remove(name);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use orm_rs_core::NamingScheme;

    fn article_type() -> Rc<EntityType> {
        Rc::new(
            EntityType::new("Article")
                .column_alias("body", "content")
                .getter("shout", |e: &Entity| match e.get("title") {
                    Value::String(s) => Value::String(s.to_uppercase()),
                    other => other,
                })
                .setter("title", |e: &mut Entity, v: Value| {
                    let trimmed = v.as_str().map(|s| Value::from(s.trim())).unwrap_or(v);
                    e.set_raw("title", trimmed)
                })
                .excluded_attribute("secret"),
        )
    }

    fn persisted(pairs: &[(&str, Value)]) -> Entity {
        let data = pairs.iter().map(|(k, v)| ((*k).to_string(), v.clone())).collect();
        Entity::from_row(article_type(), data)
    }

    // ── EntityType ──────────────────────────────────────────────────

    #[test]
    fn test_entity_type_defaults() {
        let ty = EntityType::new("ArticleCategory");
        assert_eq!(ty.table_name(), "article_category");
        assert_eq!(ty.primary_key_attributes(), ["id".to_string()]);
        assert!(ty.is_auto_increment());
        assert_eq!(ty.column_name("articleId"), "article_id");
    }

    #[test]
    fn test_entity_type_overrides() {
        let mut ty = EntityType::new("Article")
            .table("posts")
            .primary_key(["tenant", "slug"])
            .auto_increment(false);
        ty.set_naming(NamingSettings {
            table: NamingScheme::StudlyCaps,
            column: NamingScheme::CamelCase,
        });
        assert_eq!(ty.table_name(), "posts");
        assert_eq!(ty.primary_key_columns(), vec!["tenant", "slug"]);
        assert_eq!(ty.column_name("created_at"), "createdAt");
        assert!(!ty.is_auto_increment());
    }

    #[test]
    fn test_entity_type_deserialize() {
        let json = r#"{"table": "posts", "primary_key": ["uuid"], "auto_increment": false,
                       "columns": {"body": "content"}}"#;
        let ty: EntityType = serde_json::from_str(json).unwrap();
        assert_eq!(ty.table_name(), "posts");
        assert_eq!(ty.primary_key_attributes(), ["uuid".to_string()]);
        assert_eq!(ty.column_name("body"), "content");
    }

    // ── Accessors ───────────────────────────────────────────────────

    #[test]
    fn test_get_set_uses_column_names() {
        let mut e = Entity::new(article_type(), EntityData::new());
        e.set("userId", 3).unwrap();
        e.set("body", "text").unwrap();
        assert_eq!(e.get_column("user_id"), Value::Int(3));
        assert_eq!(e.get_column("content"), Value::from("text"));
        assert_eq!(e.get("body"), Value::from("text"));
        assert_eq!(e.get("unknown"), Value::Null);
    }

    #[test]
    fn test_getter_and_setter() {
        let mut e = Entity::new(article_type(), EntityData::new());
        e.set("title", "  hello ").unwrap();
        assert_eq!(e.get("title"), Value::from("hello"));
        assert_eq!(e.get("shout"), Value::from("HELLO"));
    }

    #[test]
    fn test_set_rejects_lists() {
        let mut e = Entity::new(article_type(), EntityData::new());
        assert!(matches!(
            e.set("tags", vec![1, 2]),
            Err(OrmError::InvalidType(_))
        ));
    }

    #[test]
    fn test_to_array_skips_excluded() {
        let e = persisted(&[("id", 1.into()), ("secret", "x".into())]);
        let array = e.to_array();
        assert!(array.contains_key("id"));
        assert!(!array.contains_key("secret"));
    }

    // ── Dirty tracking ──────────────────────────────────────────────

    #[test]
    fn test_dirty_tracking_agrees() {
        let mut e = persisted(&[("id", 1.into()), ("title", "a".into())]);
        assert!(!e.is_dirty());
        assert!(!e.is_attribute_dirty("title"));

        e.set("title", "b").unwrap();
        assert!(e.is_dirty());
        assert!(e.is_attribute_dirty("title"));
        assert!(!e.is_attribute_dirty("id"));
        assert_eq!(e.dirty_columns(), vec!["title"]);

        e.set("title", "a").unwrap();
        assert!(!e.is_dirty());
    }

    #[test]
    fn test_new_entity_is_dirty_when_it_has_data() {
        let mut e = Entity::new(article_type(), EntityData::new());
        assert!(!e.is_dirty());
        e.set("title", "x").unwrap();
        assert!(e.is_dirty());
        assert!(!e.exists());
    }

    #[test]
    fn test_reset() {
        let mut e = persisted(&[("id", 1.into()), ("title", "a".into())]);
        e.set("title", "b").unwrap();
        e.set("rating", 5).unwrap();
        e.reset_attribute("rating");
        assert_eq!(e.get_column("rating"), Value::Null);
        assert!(e.is_dirty());
        e.reset();
        assert!(!e.is_dirty());
        assert_eq!(e.get("title"), Value::from("a"));
    }

    #[test]
    fn test_merge_keeps_local_edits() {
        let mut e = persisted(&[("id", 1.into()), ("title", "a".into()), ("rating", 1.into())]);
        e.set("title", "local").unwrap();

        let fetched: EntityData = [
            ("id".to_string(), Value::Int(1)),
            ("title".to_string(), Value::from("remote")),
            ("rating".to_string(), Value::Int(2)),
            ("views".to_string(), Value::Int(9)),
        ]
        .into_iter()
        .collect();
        e.merge(fetched, true);

        assert_eq!(e.get("title"), Value::from("local"));
        assert_eq!(e.get("rating"), Value::Int(2));
        assert_eq!(e.get("views"), Value::Int(9));
        assert_eq!(
            e.original_data().unwrap().get("title"),
            Some(&Value::from("remote"))
        );
        assert!(e.is_attribute_dirty("title"));
        assert!(!e.is_attribute_dirty("rating"));
    }

    #[test]
    fn test_merge_without_refresh_updates_baseline_only() {
        let mut e = persisted(&[("id", 1.into()), ("rating", 1.into())]);
        let fetched: EntityData = [("rating".to_string(), Value::Int(2))].into_iter().collect();
        e.merge(fetched, false);
        assert_eq!(e.get("rating"), Value::Int(1));
        assert!(e.is_attribute_dirty("rating"));
    }

    // ── Keys ────────────────────────────────────────────────────────

    #[test]
    fn test_primary_key() {
        let e = persisted(&[("id", 5.into())]);
        assert_eq!(e.primary_key().unwrap().get("id"), Some(&Value::Int(5)));
        assert!(e.has_primary_key());
    }

    #[test]
    fn test_primary_key_names_first_missing_component() {
        let ty = Rc::new(EntityType::new("Tag").primary_key(["tenant", "slug"]));
        let mut e = Entity::new(ty, EntityData::new());
        let err = e.primary_key().unwrap_err();
        assert!(err.to_string().contains("tenant"), "{err}");
        e.set("tenant", 1).unwrap();
        let err = e.primary_key().unwrap_err();
        assert!(err.to_string().contains("slug"), "{err}");
    }

    #[test]
    fn test_related_cache() {
        let mut e = persisted(&[("id", 1.into())]);
        assert!(e.loaded_related("user").is_none());
        e.set_loaded_related("user", Related::One(None));
        assert!(matches!(e.loaded_related("user"), Some(Related::One(None))));
        e.forget_related("user");
        assert!(e.loaded_related("user").is_none());
    }
}
