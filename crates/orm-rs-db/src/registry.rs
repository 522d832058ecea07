//! The entity registry and its relation cache.
//!
//! Every [`EntityType`] used by a manager is registered here under its class
//! name. Relations are normalized from their declarations the first time they
//! are requested and cached per `(class, relation)` for the registry's
//! lifetime.

use std::cell::RefCell;
use std::collections::HashMap;
use std::path::Path;
use std::rc::Rc;

use indexmap::IndexMap;
use orm_rs_core::settings::NamingSettings;
use orm_rs_core::{OrmError, OrmResult};

use crate::entity::EntityType;
use crate::relation::Relation;

#[derive(Debug, Default)]
pub struct EntityRegistry {
    naming: NamingSettings,
    types: IndexMap<String, Rc<EntityType>>,
    relations: RefCell<HashMap<(String, String), Rc<Relation>>>,
}

impl EntityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry that names tables and columns with `naming`.
    pub fn with_naming(naming: NamingSettings) -> Self {
        Self {
            naming,
            ..Self::default()
        }
    }

    /// Registers an entity type under its class name, replacing an earlier
    /// registration.
    pub fn register(&mut self, mut entity_type: EntityType) -> &mut Self {
        entity_type.set_naming(self.naming);
        let name = entity_type.name().to_string();
        self.relations
            .borrow_mut()
            .retain(|(class, _), _| *class != name);
        self.types.insert(name, Rc::new(entity_type));
        self
    }

    /// Returns the entity type of `class`.
    ///
    /// # Errors
    ///
    /// Returns [`OrmError::InvalidName`] when the class is not registered.
    pub fn entity_type(&self, class: &str) -> OrmResult<Rc<EntityType>> {
        self.types
            .get(class)
            .cloned()
            .ok_or_else(|| OrmError::InvalidName(format!("Class {class} is not registered")))
    }

    pub fn has_class(&self, class: &str) -> bool {
        self.types.contains_key(class)
    }

    /// The registered class names, in registration order.
    pub fn classes(&self) -> impl Iterator<Item = &str> {
        self.types.keys().map(String::as_str)
    }

    /// Returns the relation `name` of `class`, normalizing its declaration
    /// on first use.
    ///
    /// # Errors
    ///
    /// Returns [`OrmError::InvalidName`] for an unknown class,
    /// [`OrmError::UndefinedRelation`] for an unknown relation and
    /// [`OrmError::InvalidConfiguration`] for a malformed declaration.
    pub fn relation(&self, class: &str, name: &str) -> OrmResult<Rc<Relation>> {
        let cache_key = (class.to_string(), name.to_string());
        if let Some(relation) = self.relations.borrow().get(&cache_key) {
            return Ok(Rc::clone(relation));
        }

        let entity_type = self.entity_type(class)?;
        let declaration = entity_type.relation_declaration(name).ok_or_else(|| {
            OrmError::UndefinedRelation(format!("Relation {name} is not defined in {class}"))
        })?;
        let relation = Rc::new(declaration.normalize(class, name)?);
        tracing::trace!(class = %class, relation = %name, "relation normalized");
        self.relations
            .borrow_mut()
            .insert(cache_key, Rc::clone(&relation));
        Ok(relation)
    }

    /// Builds a registry from a TOML document with one table per class.
    ///
    /// ```
    /// use orm_rs_db::registry::EntityRegistry;
    ///
    /// let registry = EntityRegistry::from_toml_str(r#"
    ///     [User]
    ///     [Article]
    ///     table = "articles"
    ///     relations.user = ["User", { userId = "id" }, "articles"]
    /// "#).unwrap();
    ///
    /// assert_eq!(registry.entity_type("Article").unwrap().table_name(), "articles");
    /// assert!(registry.relation("Article", "user").is_ok());
    /// ```
    ///
    /// # Errors
    ///
    /// Returns [`OrmError::ConfigurationError`] when the document is malformed.
    pub fn from_toml_str(source: &str) -> OrmResult<Self> {
        let types: IndexMap<String, EntityType> = toml::from_str(source)
            .map_err(|e| OrmError::ConfigurationError(format!("Invalid entity schema: {e}")))?;
        Ok(Self::from_types(NamingSettings::default(), types))
    }

    /// Builds a registry from a JSON object with one entry per class.
    ///
    /// # Errors
    ///
    /// Returns [`OrmError::ConfigurationError`] when the document is malformed.
    pub fn from_json_str(source: &str) -> OrmResult<Self> {
        let types: IndexMap<String, EntityType> = serde_json::from_str(source)
            .map_err(|e| OrmError::ConfigurationError(format!("Invalid entity schema: {e}")))?;
        Ok(Self::from_types(NamingSettings::default(), types))
    }

    /// Reads a schema file; `.json` files are parsed as JSON, anything else
    /// as TOML.
    ///
    /// # Errors
    ///
    /// Returns [`OrmError::IoError`] when the file can not be read and
    /// [`OrmError::ConfigurationError`] when it is malformed.
    pub fn from_file(path: impl AsRef<Path>) -> OrmResult<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path)?;
        if path.extension().is_some_and(|ext| ext == "json") {
            Self::from_json_str(&source)
        } else {
            Self::from_toml_str(&source)
        }
    }

    fn from_types(naming: NamingSettings, types: IndexMap<String, EntityType>) -> Self {
        let mut registry = Self::with_naming(naming);
        for (name, mut entity_type) in types {
            entity_type.set_name(name);
            registry.register(entity_type);
        }
        registry
    }

    /// Applies `naming` to every registered type.
    pub fn set_naming(&mut self, naming: NamingSettings) {
        self.naming = naming;
        for entity_type in self.types.values_mut() {
            let mut updated = (**entity_type).clone();
            updated.set_naming(naming);
            *entity_type = Rc::new(updated);
        }
    }
}
