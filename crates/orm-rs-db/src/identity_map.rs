//! One live instance per class and primary key.
//!
//! The map is owned by an [`EntityManager`](crate::manager::EntityManager);
//! independent managers never share instances.

use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use orm_rs_core::OrmResult;
use sha2::{Digest, Sha256};

use crate::entity::{Entity, EntityRef};
use crate::value::Value;

/// A checksum of a primary key tuple.
///
/// Every component is hashed as its kind, its length and its text, so
/// `Int(1)`, `Float(1.0)` and `"1"` name different entities.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct IdentityKey(String);

impl IdentityKey {
    /// Computes the key of a value tuple.
    pub fn from_values<'a>(values: impl IntoIterator<Item = &'a Value>) -> Self {
        let mut hasher = Sha256::new();
        for value in values {
            let text = value.to_string();
            hasher.update(value.kind().to_string().as_bytes());
            hasher.update([0_u8]);
            hasher.update((text.len() as u64).to_le_bytes());
            hasher.update(text.as_bytes());
        }
        let digest = hasher.finalize();
        Self(digest.iter().map(|b| format!("{b:02x}")).collect())
    }

    /// Computes the key of an entity's primary key.
    ///
    /// # Errors
    ///
    /// Returns [`OrmError::IncompletePrimaryKey`](orm_rs_core::OrmError::IncompletePrimaryKey)
    /// when a component is missing.
    pub fn of(entity: &Entity) -> OrmResult<Self> {
        let key = entity.primary_key()?;
        Ok(Self::from_values(key.values()))
    }

    /// The hex digest.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for IdentityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "IdentityKey({})", &self.0[..12])
    }
}

#[derive(Debug, Default)]
pub struct IdentityMap {
    entries: HashMap<(String, IdentityKey), EntityRef>,
}

impl IdentityMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `entity` unless an instance with the same class and key is
    /// already known, and returns the registered instance.
    ///
    /// # Errors
    ///
    /// Returns [`OrmError::IncompletePrimaryKey`](orm_rs_core::OrmError::IncompletePrimaryKey)
    /// when the entity has no complete key.
    pub fn map(&mut self, entity: EntityRef) -> OrmResult<EntityRef> {
        let (class, key) = {
            let e = entity.borrow();
            (e.class().to_string(), IdentityKey::of(&e)?)
        };
        if let Some(existing) = self.entries.get(&(class.clone(), key.clone())) {
            tracing::trace!(class = %class, key = ?key, "identity map hit");
            return Ok(Rc::clone(existing));
        }
        self.entries.insert((class, key), Rc::clone(&entity));
        Ok(entity)
    }

    pub fn get(&self, class: &str, key: &IdentityKey) -> Option<EntityRef> {
        let found = self.entries.get(&(class.to_string(), key.clone())).cloned();
        if found.is_some() {
            tracing::trace!(class = %class, key = ?key, "identity map hit");
        }
        found
    }

    pub fn contains(&self, class: &str, key: &IdentityKey) -> bool {
        self.entries.contains_key(&(class.to_string(), key.clone()))
    }

    /// Forgets the instance registered for `class` and `key`.
    pub fn remove(&mut self, class: &str, key: &IdentityKey) -> Option<EntityRef> {
        self.entries.remove(&(class.to_string(), key.clone()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{EntityData, EntityType};
    use orm_rs_core::OrmError;

    fn article(id: Value, title: &str) -> EntityRef {
        let ty = Rc::new(EntityType::new("Article"));
        let data: EntityData = [
            ("id".to_string(), id),
            ("title".to_string(), Value::from(title)),
        ]
        .into_iter()
        .collect();
        Entity::from_row(ty, data).into_ref()
    }

    #[test]
    fn test_map_returns_first_instance() {
        let mut map = IdentityMap::new();
        let first = article(Value::Int(1), "a");
        let second = article(Value::Int(1), "b");

        let mapped_first = map.map(Rc::clone(&first)).unwrap();
        let mapped_second = map.map(second).unwrap();
        assert!(Rc::ptr_eq(&mapped_first, &first));
        assert!(Rc::ptr_eq(&mapped_second, &first));
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn test_keys_distinguish_value_kind() {
        let int = IdentityKey::from_values(&[Value::Int(1)]);
        assert_ne!(int, IdentityKey::from_values(&[Value::Float(1.0)]));
        assert_ne!(int, IdentityKey::from_values(&[Value::from("1")]));
        assert_eq!(int, IdentityKey::from_values(&[Value::Int(1)]));
    }

    #[test]
    fn test_keys_of_composite_tuples() {
        assert_ne!(
            IdentityKey::from_values(&[Value::from("a\u{1f}b"), Value::from("c")]),
            IdentityKey::from_values(&[Value::from("a"), Value::from("b\u{1f}c")])
        );
        assert_ne!(
            IdentityKey::from_values(&[Value::Int(1), Value::Int(23)]),
            IdentityKey::from_values(&[Value::Int(12), Value::Int(3)])
        );
    }

    #[test]
    fn test_classes_are_separate() {
        let mut map = IdentityMap::new();
        map.map(article(Value::Int(1), "a")).unwrap();
        let data: EntityData = [("id".to_string(), Value::Int(1))].into_iter().collect();
        let user = Entity::from_row(Rc::new(EntityType::new("User")), data).into_ref();
        let mapped = map.map(Rc::clone(&user)).unwrap();
        assert!(Rc::ptr_eq(&mapped, &user));
        assert_eq!(map.len(), 2);
    }

    #[test]
    fn test_map_requires_key() {
        let mut map = IdentityMap::new();
        let err = map.map(article(Value::Null, "a")).unwrap_err();
        assert!(matches!(err, OrmError::IncompletePrimaryKey(_)));
        assert!(map.is_empty());
    }

    #[test]
    fn test_get_and_remove() {
        let mut map = IdentityMap::new();
        let entity = map.map(article(Value::Int(4), "a")).unwrap();
        let key = IdentityKey::from_values(&[Value::Int(4)]);
        assert!(map.contains("Article", &key));
        assert!(Rc::ptr_eq(&map.get("Article", &key).unwrap(), &entity));
        assert!(map.remove("Article", &key).is_some());
        assert!(map.get("Article", &key).is_none());
        assert_eq!(key.as_str().len(), 64);
    }
}
