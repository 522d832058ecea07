//! Relations between entity types.
//!
//! A [`Relation`] is the normalized form of a [`RelationDeclaration`]. Each
//! variant knows how to fetch the related entities of an owner, how to add
//! the join for eager loading to an [`EntityFetcher`] and how to update the
//! foreign key when the related entity changes.
//!
//! Relations are created lazily by the
//! [`EntityRegistry`](crate::registry::EntityRegistry), once per class and
//! relation name.

pub mod declaration;
pub mod many_to_many;
pub mod morphed;
pub mod one_to_many;
pub mod one_to_one;
pub mod owner;
pub mod parent_children;

use indexmap::IndexMap;
use orm_rs_core::{OrmError, OrmResult};

use crate::entity::{Entity, EntityRef, ForeignKey, Related};
use crate::manager::EntityManager;
use crate::query::builder::JoinType;
use crate::query::fetcher::EntityFetcher;
use crate::value::Value;

pub use declaration::{Cardinality, RelationDeclaration, RelationOptions};
pub use many_to_many::ManyToMany;
pub use morphed::{MorphReference, Morphed};
pub use one_to_many::OneToMany;
pub use one_to_one::OneToOne;
pub use owner::Owner;
pub use parent_children::ParentChildren;

/// An ordered mapping of own attributes to attributes (or columns) on the
/// other side of a relation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference(IndexMap<String, String>);

impl Reference {
    /// Creates a reference from own attribute → foreign attribute pairs.
    pub fn new(pairs: IndexMap<String, String>) -> Self {
        Self(pairs)
    }

    /// Iterates the `(own, foreign)` pairs in declaration order.
    pub fn pairs(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(own, foreign)| (own.as_str(), foreign.as_str()))
    }

    /// The own attributes.
    pub fn own_attributes(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// The foreign attributes.
    pub fn foreign_attributes(&self) -> impl Iterator<Item = &str> {
        self.0.values().map(String::as_str)
    }

    /// The same reference seen from the other side.
    #[must_use]
    pub fn invert(&self) -> Self {
        Self(
            self.0
                .iter()
                .map(|(own, foreign)| (foreign.clone(), own.clone()))
                .collect(),
        )
    }

    /// Reads the key this reference points at from `entity`, keyed by the
    /// foreign attribute.
    ///
    /// # Errors
    ///
    /// Returns [`OrmError::IncompletePrimaryKey`] naming the first own
    /// attribute that is null.
    pub fn foreign_key(&self, entity: &Entity) -> OrmResult<ForeignKey> {
        let mut key = ForeignKey::new();
        for (own, foreign) in self.pairs() {
            let value = entity.get(own);
            if value.is_null() {
                return Err(OrmError::IncompletePrimaryKey(format!(
                    "Key incomplete: {own} of {} is empty",
                    entity.class()
                )));
            }
            key.insert(foreign.to_string(), value);
        }
        Ok(key)
    }

    /// Like [`foreign_key`](Self::foreign_key), `None` when incomplete.
    pub fn try_foreign_key(&self, entity: &Entity) -> Option<ForeignKey> {
        self.foreign_key(entity).ok()
    }
}

/// The variant-specific part of a relation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelationKind {
    Owner(Owner),
    OneToMany(OneToMany),
    OneToOne(OneToOne),
    ManyToMany(ManyToMany),
    Morphed(Morphed),
    ParentChildren(ParentChildren),
}

/// The result of [`Relation::fetch`].
#[derive(Debug)]
pub enum Fetched<'m> {
    /// Relations with one cardinality resolve immediately.
    One(Option<EntityRef>),
    /// Relations with many cardinality return a fetcher that can be refined
    /// before it runs.
    Many(EntityFetcher<'m>),
}

impl<'m> Fetched<'m> {
    /// Materializes the result.
    ///
    /// # Errors
    ///
    /// Returns an error when the fetcher fails to execute.
    pub fn into_related(self) -> OrmResult<Related> {
        match self {
            Self::One(entity) => Ok(Related::One(entity)),
            Self::Many(mut fetcher) => fetcher.all(0).map(Related::Many),
        }
    }
}

/// A relation `name` declared on the class `owner`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relation {
    pub(crate) name: String,
    pub(crate) owner: String,
    pub(crate) kind: RelationKind,
}

impl Relation {
    /// The relation name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The class that declares the relation.
    pub fn owner_class(&self) -> &str {
        &self.owner
    }

    pub const fn kind(&self) -> &RelationKind {
        &self.kind
    }

    /// The related class; `None` for morphed relations, whose class depends
    /// on the owner.
    pub fn related_class(&self) -> Option<&str> {
        match &self.kind {
            RelationKind::Owner(r) => Some(&r.class),
            RelationKind::OneToMany(r) => Some(&r.class),
            RelationKind::OneToOne(r) => Some(&r.0.class),
            RelationKind::ManyToMany(r) => Some(&r.class),
            RelationKind::ParentChildren(r) => Some(&r.0.class),
            RelationKind::Morphed(_) => None,
        }
    }

    /// The name of the relation on the other side, when declared.
    pub fn opponent(&self) -> Option<&str> {
        match &self.kind {
            RelationKind::Owner(r) => r.opponent.as_deref(),
            RelationKind::OneToMany(r) => Some(&r.opponent),
            RelationKind::OneToOne(r) => Some(&r.0.opponent),
            RelationKind::ManyToMany(r) => Some(&r.opponent),
            RelationKind::ParentChildren(r) => Some(&r.0.opponent),
            RelationKind::Morphed(_) => None,
        }
    }

    pub const fn cardinality(&self) -> Cardinality {
        match &self.kind {
            RelationKind::Owner(_) | RelationKind::OneToOne(_) | RelationKind::Morphed(_) => {
                Cardinality::One
            }
            RelationKind::OneToMany(_)
            | RelationKind::ManyToMany(_)
            | RelationKind::ParentChildren(_) => Cardinality::Many,
        }
    }

    /// Whether the owner's row stores the foreign key.
    pub const fn is_owning(&self) -> bool {
        matches!(self.kind, RelationKind::Owner(_) | RelationKind::Morphed(_))
    }

    /// Fetches the entities related to `owner`.
    ///
    /// # Errors
    ///
    /// Returns [`OrmError::IncompletePrimaryKey`] when a many relation is
    /// fetched for an owner without a key, and propagates query errors.
    pub fn fetch<'m>(&self, owner: &EntityRef, em: &'m EntityManager) -> OrmResult<Fetched<'m>> {
        let _span = orm_rs_core::logging::query_span("relation", &self.owner).entered();
        match &self.kind {
            RelationKind::Owner(r) => r.fetch(owner, em).map(Fetched::One),
            RelationKind::Morphed(r) => r.fetch(owner, em).map(Fetched::One),
            RelationKind::OneToOne(r) => r.fetch(&self.owner, owner, em).map(Fetched::One),
            RelationKind::OneToMany(r) => r.fetch(&self.owner, owner, em).map(Fetched::Many),
            RelationKind::ParentChildren(r) => {
                r.0.fetch(&self.owner, owner, em).map(Fetched::Many)
            }
            RelationKind::ManyToMany(r) => r.fetch(owner, em).map(Fetched::Many),
        }
    }

    /// Fetches and materializes the related entities and caches them on
    /// the owner.
    ///
    /// # Errors
    ///
    /// See [`fetch`](Self::fetch).
    pub fn fetch_all(&self, owner: &EntityRef, em: &EntityManager) -> OrmResult<Related> {
        let related = match &self.kind {
            RelationKind::ManyToMany(r) => Related::Many(r.fetch_all(owner, em)?),
            _ => self.fetch(owner, em)?.into_related()?,
        };
        owner
            .borrow_mut()
            .set_loaded_related(self.name.clone(), related.clone());
        Ok(related)
    }

    /// Joins the related class into `fetcher` under `alias`, starting from
    /// the already joined `from_alias`.
    ///
    /// # Errors
    ///
    /// Returns [`OrmError::InvalidRelation`] for morphed relations.
    pub fn add_join(
        &self,
        fetcher: &mut EntityFetcher<'_>,
        join_type: JoinType,
        from_alias: &str,
        alias: &str,
    ) -> OrmResult<()> {
        match &self.kind {
            RelationKind::Owner(r) => r.add_join(fetcher, join_type, from_alias, alias),
            RelationKind::OneToMany(r) => {
                r.add_join(&self.owner, fetcher, join_type, from_alias, alias)
            }
            RelationKind::OneToOne(r) => {
                r.0.add_join(&self.owner, fetcher, join_type, from_alias, alias)
            }
            RelationKind::ParentChildren(r) => {
                r.0.add_join(&self.owner, fetcher, join_type, from_alias, alias)
            }
            RelationKind::ManyToMany(r) => r.add_join(fetcher, join_type, from_alias, alias),
            RelationKind::Morphed(_) => Err(OrmError::InvalidRelation(format!(
                "Morphed relation {}::{} can not be joined",
                self.owner, self.name
            ))),
        }
    }

    /// Points the owner's foreign key at `related`, or clears it.
    ///
    /// Attributes are copied one at a time; on error the owner may be
    /// partially updated.
    ///
    /// # Errors
    ///
    /// Returns [`OrmError::InvalidRelation`] for relations that do not own the
    /// foreign key, [`OrmError::InvalidType`] for a related entity of the
    /// wrong class and [`OrmError::IncompletePrimaryKey`] when the related
    /// key is incomplete.
    pub fn set_related(&self, owner: &EntityRef, related: Option<&EntityRef>) -> OrmResult<()> {
        match &self.kind {
            RelationKind::Owner(r) => r.set_related(owner, related)?,
            RelationKind::Morphed(r) => r.set_related(owner, related)?,
            _ => {
                return Err(OrmError::InvalidRelation(format!(
                    "{}::{} does not own the foreign key; set it on the opponent instead",
                    self.owner, self.name
                )))
            }
        }
        owner
            .borrow_mut()
            .set_loaded_related(self.name.clone(), Related::One(related.cloned()));
        Ok(())
    }

    /// Adds rows to the association table of a many-to-many relation.
    ///
    /// # Errors
    ///
    /// Returns [`OrmError::InvalidRelation`] for other relations.
    pub fn add_related(
        &self,
        owner: &EntityRef,
        related: &[EntityRef],
        em: &EntityManager,
    ) -> OrmResult<()> {
        match &self.kind {
            RelationKind::ManyToMany(r) => {
                r.add_related(owner, related, em)?;
                owner.borrow_mut().forget_related(&self.name);
                Ok(())
            }
            _ => Err(self.association_only("add_related")),
        }
    }

    /// Removes rows from the association table of a many-to-many relation.
    ///
    /// # Errors
    ///
    /// Returns [`OrmError::InvalidRelation`] for other relations.
    pub fn delete_related(
        &self,
        owner: &EntityRef,
        related: &[EntityRef],
        em: &EntityManager,
    ) -> OrmResult<()> {
        match &self.kind {
            RelationKind::ManyToMany(r) => {
                r.delete_related(owner, related, em)?;
                owner.borrow_mut().forget_related(&self.name);
                Ok(())
            }
            _ => Err(self.association_only("delete_related")),
        }
    }

    fn association_only(&self, operation: &str) -> OrmError {
        OrmError::InvalidRelation(format!(
            "{operation} is only supported by many-to-many relations, not {}::{}",
            self.owner, self.name
        ))
    }
}

/// Looks up the entity of `class` identified by `key` (foreign attribute →
/// value): through the identity map when `key` is the primary key, with a
/// query otherwise.
pub(crate) fn fetch_by_reference(
    em: &EntityManager,
    class: &str,
    key: &ForeignKey,
) -> OrmResult<Option<EntityRef>> {
    let entity_type = em.entity_type(class)?;
    let pk = entity_type.primary_key_attributes();
    if pk.len() == key.len() && pk.iter().all(|a| key.contains_key(a)) {
        return em.fetch_by_primary_key(class, key);
    }
    let mut fetcher = em.fetch(class)?;
    where_key(&mut fetcher, "", key)?;
    fetcher.one()
}

/// Adds `attribute = value` for every key component. With a non-empty
/// `alias`, attributes are qualified by it.
pub(crate) fn where_key(
    fetcher: &mut EntityFetcher<'_>,
    alias: &str,
    key: &ForeignKey,
) -> OrmResult<()> {
    for (attribute, value) in key {
        let column = if alias.is_empty() {
            attribute.clone()
        } else {
            format!("{alias}.{attribute}")
        };
        fetcher.where_((column.as_str(), "=", value.clone()))?;
    }
    Ok(())
}

/// `from.own = to.foreign AND ...` for the pairs of `reference`.
pub(crate) fn join_condition(reference: &Reference, from_alias: &str, alias: &str) -> String {
    reference
        .pairs()
        .map(|(own, foreign)| format!("{from_alias}.{own} = {alias}.{foreign}"))
        .collect::<Vec<_>>()
        .join(" AND ")
}

/// Copies the foreign attributes of `related` into the own attributes of
/// `owner`, one at a time.
pub(crate) fn copy_key(
    reference: &Reference,
    owner: &EntityRef,
    related: &EntityRef,
) -> OrmResult<()> {
    let values: Vec<(String, String, Value)> = {
        let related = related.borrow();
        reference
            .pairs()
            .map(|(own, foreign)| (own.to_string(), foreign.to_string(), related.get(foreign)))
            .collect()
    };
    let related_class = related.borrow().class().to_string();
    for (own, foreign, value) in values {
        if value.is_null() {
            return Err(OrmError::IncompletePrimaryKey(format!(
                "Key incomplete for save: {foreign} of {related_class} is empty"
            )));
        }
        owner.borrow_mut().set(&own, value)?;
    }
    Ok(())
}
