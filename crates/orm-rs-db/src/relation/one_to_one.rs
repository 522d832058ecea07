//! The inverse side of an owner relation with one cardinality.

use orm_rs_core::OrmResult;

use super::one_to_many::OneToMany;
use crate::entity::EntityRef;
use crate::manager::EntityManager;

/// A [`OneToMany`] that yields at most one entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OneToOne(pub OneToMany);

impl OneToOne {
    pub(crate) fn fetch(
        &self,
        owner_class: &str,
        owner: &EntityRef,
        em: &EntityManager,
    ) -> OrmResult<Option<EntityRef>> {
        self.0.fetch(owner_class, owner, em)?.one()
    }
}
