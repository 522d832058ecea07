//! Self-referencing one-to-many relations and tree building.

use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use orm_rs_core::{OrmError, OrmResult};

use super::one_to_many::OneToMany;
use crate::entity::{EntityRef, Related};
use crate::identity_map::IdentityKey;
use crate::registry::EntityRegistry;

/// A [`OneToMany`] whose related class is the owner class itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParentChildren(pub OneToMany);

impl ParentChildren {
    /// Arranges a flat list of entities into trees.
    ///
    /// Every entity gets its children from `entities` cached under `name`
    /// (leaves get an empty list) and children get their parent cached under
    /// the opponent relation. Entities without a parent in `entities` are
    /// returned as roots, in input order; this includes entities whose parent
    /// exists but was not passed in.
    ///
    /// # Errors
    ///
    /// Returns [`OrmError::InvalidType`] when an entity is not of the related
    /// class and [`OrmError::InvalidConfiguration`] when the opponent holds no
    /// reference.
    pub fn build_tree(
        &self,
        name: &str,
        registry: &EntityRegistry,
        entities: &[EntityRef],
    ) -> OrmResult<Vec<EntityRef>> {
        let OneToMany { class, opponent } = &self.0;
        // parent attribute -> child attribute
        let (reference, _) = self.0.reference(class, registry)?;

        let mut own_keys = Vec::with_capacity(entities.len());
        let mut parent_keys = Vec::with_capacity(entities.len());
        for entity in entities {
            let entity = entity.borrow();
            if entity.class() != class {
                return Err(OrmError::InvalidType(format!(
                    "build_tree expects entities of {class}, got {}",
                    entity.class()
                )));
            }
            let own: Vec<_> = reference.own_attributes().map(|a| entity.get(a)).collect();
            let parent: Vec<_> = reference.foreign_attributes().map(|a| entity.get(a)).collect();
            own_keys.push(IdentityKey::from_values(&own));
            parent_keys.push(if parent.iter().any(|v| v.is_null()) {
                None
            } else {
                Some(IdentityKey::from_values(&parent))
            });
        }

        let present: HashSet<&IdentityKey> = own_keys.iter().collect();
        let by_key: HashMap<&IdentityKey, &EntityRef> = own_keys.iter().zip(entities).collect();
        let mut children: HashMap<&IdentityKey, Vec<EntityRef>> = HashMap::new();
        let mut roots = Vec::new();

        for (entity, parent_key) in entities.iter().zip(&parent_keys) {
            match parent_key {
                Some(key) if present.contains(key) => {
                    children.entry(key).or_default().push(Rc::clone(entity));
                    if let Some(parent) = by_key.get(key) {
                        entity
                            .borrow_mut()
                            .set_loaded_related(opponent.clone(), Related::One(Some(Rc::clone(parent))));
                    }
                }
                _ => roots.push(Rc::clone(entity)),
            }
        }

        for (entity, key) in entities.iter().zip(&own_keys) {
            let kids = children.remove(key).unwrap_or_default();
            entity.borrow_mut().set_loaded_related(name, Related::Many(kids));
        }

        Ok(roots)
    }
}
