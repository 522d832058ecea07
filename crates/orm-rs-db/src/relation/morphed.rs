//! Polymorphic owner relations.
//!
//! The owner stores a discriminator next to the foreign key. The
//! discriminator selects the related class, either through an explicit map
//! (`"a" → Article`) or by storing the class name itself. The foreign key
//! attributes may differ per discriminator value.

use indexmap::IndexMap;
use orm_rs_core::{OrmError, OrmResult};

use super::{copy_key, fetch_by_reference, Reference};
use crate::entity::EntityRef;
use crate::manager::EntityManager;
use crate::value::Value;

/// The foreign key layout of a morphed relation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MorphReference {
    /// The same attributes for every related class.
    Shared(Reference),
    /// Attributes per discriminator value.
    PerType(IndexMap<String, Reference>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Morphed {
    /// The discriminator attribute.
    pub morph_column: String,
    /// Discriminator value → class. Empty means the class name is stored.
    pub map: IndexMap<String, String>,
    pub reference: MorphReference,
}

impl Morphed {
    /// The discriminator value stored for `class`.
    ///
    /// # Errors
    ///
    /// Returns [`OrmError::InvalidType`] when `class` is not mapped.
    pub fn tag_for(&self, class: &str) -> OrmResult<String> {
        if self.map.is_empty() {
            return Ok(class.to_string());
        }
        self.map
            .iter()
            .find(|(_, mapped)| *mapped == class)
            .map(|(tag, _)| tag.clone())
            .ok_or_else(|| {
                OrmError::InvalidType(format!(
                    "{class} is not a valid type for {}",
                    self.morph_column
                ))
            })
    }

    /// The class selected by the discriminator value `tag`.
    ///
    /// # Errors
    ///
    /// Returns [`OrmError::InvalidType`] for an unmapped value.
    pub fn class_for(&self, tag: &str) -> OrmResult<String> {
        if self.map.is_empty() {
            return Ok(tag.to_string());
        }
        self.map.get(tag).cloned().ok_or_else(|| {
            OrmError::InvalidType(format!(
                "Unknown type '{tag}' in {}",
                self.morph_column
            ))
        })
    }

    /// The foreign key layout used for the discriminator value `tag`.
    ///
    /// # Errors
    ///
    /// Returns [`OrmError::InvalidConfiguration`] when no layout is declared
    /// for `tag`.
    pub fn reference_for(&self, tag: &str) -> OrmResult<&Reference> {
        match &self.reference {
            MorphReference::Shared(reference) => Ok(reference),
            MorphReference::PerType(per_type) => per_type.get(tag).ok_or_else(|| {
                OrmError::InvalidConfiguration(format!(
                    "No reference defined for type '{tag}' in {}",
                    self.morph_column
                ))
            }),
        }
    }

    fn all_own_attributes(&self) -> Vec<&str> {
        let mut attributes: Vec<&str> = Vec::new();
        let references: Vec<&Reference> = match &self.reference {
            MorphReference::Shared(reference) => vec![reference],
            MorphReference::PerType(per_type) => per_type.values().collect(),
        };
        for attribute in references.into_iter().flat_map(Reference::own_attributes) {
            if !attributes.contains(&attribute) {
                attributes.push(attribute);
            }
        }
        attributes
    }

    /// A missing discriminator or an incomplete key means there is no
    /// related entity.
    pub(crate) fn fetch(&self, owner: &EntityRef, em: &EntityManager) -> OrmResult<Option<EntityRef>> {
        let (tag, key) = {
            let owner = owner.borrow();
            let tag = match owner.get(&self.morph_column) {
                Value::Null => return Ok(None),
                Value::String(tag) => tag,
                other => other.to_string(),
            };
            let Some(key) = self.reference_for(&tag)?.try_foreign_key(&owner) else {
                return Ok(None);
            };
            (tag, key)
        };
        let class = self.class_for(&tag)?;
        fetch_by_reference(em, &class, &key)
    }

    pub(crate) fn set_related(&self, owner: &EntityRef, related: Option<&EntityRef>) -> OrmResult<()> {
        let Some(related) = related else {
            let mut owner = owner.borrow_mut();
            owner.set(&self.morph_column, Value::Null)?;
            for attribute in self.all_own_attributes() {
                owner.set(attribute, Value::Null)?;
            }
            return Ok(());
        };

        let class = related.borrow().class().to_string();
        let tag = self.tag_for(&class)?;
        let reference = self.reference_for(&tag)?;

        let previous = owner.borrow().get(&self.morph_column);
        if let Some(previous) = previous.as_str().filter(|p| *p != tag) {
            if let Ok(old) = self.reference_for(previous) {
                let mut owner = owner.borrow_mut();
                for attribute in old.own_attributes() {
                    if !reference.own_attributes().any(|a| a == attribute) {
                        owner.set(attribute, Value::Null)?;
                    }
                }
            }
        }

        owner.borrow_mut().set(&self.morph_column, Value::String(tag))?;
        copy_key(reference, owner, related)
    }
}
