//! The inverse side of an owner relation.

use orm_rs_core::{OrmError, OrmResult};

use super::{join_condition, where_key, Reference, RelationKind};
use crate::entity::EntityRef;
use crate::manager::EntityManager;
use crate::query::builder::JoinType;
use crate::query::fetcher::EntityFetcher;
use crate::registry::EntityRegistry;
use crate::value::Value;

/// Many entities of `class` reference the owner through their relation
/// `opponent`, which has to be an owner or morphed relation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OneToMany {
    pub class: String,
    pub opponent: String,
}

/// The discriminator condition of a morphed opponent: attribute and value.
pub type MorphCondition = Option<(String, String)>;

impl OneToMany {
    /// The opponent's reference seen from the owner (own attribute →
    /// attribute of `class`), plus the discriminator condition when the
    /// opponent is morphed.
    ///
    /// # Errors
    ///
    /// Returns [`OrmError::InvalidConfiguration`] when the opponent does not
    /// hold a reference.
    pub fn reference(
        &self,
        owner_class: &str,
        registry: &EntityRegistry,
    ) -> OrmResult<(Reference, MorphCondition)> {
        let opponent = registry.relation(&self.class, &self.opponent)?;
        match opponent.kind() {
            RelationKind::Owner(owner) => Ok((owner.reference.invert(), None)),
            RelationKind::Morphed(morphed) => {
                let tag = morphed.tag_for(owner_class)?;
                let reference = morphed.reference_for(&tag)?;
                Ok((reference.invert(), Some((morphed.morph_column.clone(), tag))))
            }
            _ => Err(OrmError::InvalidConfiguration(format!(
                "Reference is not defined in opponent {}::{}",
                self.class, self.opponent
            ))),
        }
    }

    pub(crate) fn fetch<'m>(
        &self,
        owner_class: &str,
        owner: &EntityRef,
        em: &'m EntityManager,
    ) -> OrmResult<EntityFetcher<'m>> {
        let (reference, morph) = self.reference(owner_class, em.registry())?;
        let key = reference.foreign_key(&owner.borrow())?;

        let mut fetcher = em.fetch(&self.class)?;
        where_key(&mut fetcher, "", &key)?;
        if let Some((column, tag)) = morph {
            fetcher.where_((column.as_str(), "=", Value::String(tag)))?;
        }
        Ok(fetcher)
    }

    pub(crate) fn add_join(
        &self,
        owner_class: &str,
        fetcher: &mut EntityFetcher<'_>,
        join_type: JoinType,
        from_alias: &str,
        alias: &str,
    ) -> OrmResult<()> {
        let (reference, morph) = self.reference(owner_class, fetcher.manager().registry())?;
        let mut expression = join_condition(&reference, from_alias, alias);
        let mut args = Vec::new();
        if let Some((column, tag)) = morph {
            expression.push_str(&format!(" AND {alias}.{column} = ?"));
            args.push(Value::String(tag));
        }
        fetcher.join_with(join_type, &self.class, &expression, Some(alias), &args)?;
        Ok(())
    }
}
