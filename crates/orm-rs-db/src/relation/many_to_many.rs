//! Relations through an association table.

use orm_rs_core::{OrmError, OrmResult};

use super::{Reference, RelationKind};
use crate::dbal::{compile_delete, compile_insert};
use crate::entity::{EntityData, EntityRef, ForeignKey};
use crate::manager::EntityManager;
use crate::query::builder::{Criterion, JoinType};
use crate::query::fetcher::EntityFetcher;
use crate::value::Value;

/// Entities of `class` are related through rows of `table`. `reference`
/// maps own attributes to columns of `table`; the opponent, declared on
/// `class`, does the same for the other side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManyToMany {
    pub class: String,
    pub reference: Reference,
    pub opponent: String,
    pub table: String,
}

impl ManyToMany {
    /// The reference of the opponent relation (attribute of `class` →
    /// association column).
    ///
    /// # Errors
    ///
    /// Returns [`OrmError::InvalidConfiguration`] when the opponent is not a
    /// many-to-many relation over the same table.
    pub fn opponent_reference(&self, em: &EntityManager) -> OrmResult<Reference> {
        let opponent = em.registry().relation(&self.class, &self.opponent)?;
        match opponent.kind() {
            RelationKind::ManyToMany(other) if other.table == self.table => {
                Ok(other.reference.clone())
            }
            _ => Err(OrmError::InvalidConfiguration(format!(
                "Opponent {}::{} has to be a many-to-many relation through {}",
                self.class, self.opponent, self.table
            ))),
        }
    }

    fn association_column(&self, em: &EntityManager, column: &str) -> String {
        em.escaper()
            .escape_identifier(&format!("{}.{column}", self.table))
    }

    /// `table.column = alias.attribute AND ...` for the pairs of `reference`.
    fn association_condition(&self, em: &EntityManager, reference: &Reference, alias: &str) -> String {
        reference
            .pairs()
            .map(|(attribute, column)| {
                format!("{} = {alias}.{attribute}", self.association_column(em, column))
            })
            .collect::<Vec<_>>()
            .join(" AND ")
    }

    pub(crate) fn fetch<'m>(
        &self,
        owner: &EntityRef,
        em: &'m EntityManager,
    ) -> OrmResult<EntityFetcher<'m>> {
        let key = self.reference.foreign_key(&owner.borrow())?;
        let opponent = self.opponent_reference(em)?;

        let mut fetcher = em.fetch(&self.class)?;
        let table = em.escaper().escape_identifier(&self.table);
        let expression = self.association_condition(em, &opponent, "t0");
        fetcher.join_with(JoinType::Inner, &table, &expression, None, &[])?;
        for (column, value) in key {
            let column = self.association_column(em, &column);
            fetcher.where_(Criterion::compare(column, "=", value))?;
        }
        Ok(fetcher)
    }

    /// Reads only the related keys from the association table and resolves
    /// them through the identity map. Entities that are not mapped yet are
    /// fetched in one query when the related primary key is a single
    /// attribute.
    pub(crate) fn fetch_all(&self, owner: &EntityRef, em: &EntityManager) -> OrmResult<Vec<EntityRef>> {
        let key = self.reference.foreign_key(&owner.borrow())?;
        let opponent = self.opponent_reference(em)?;

        let escaper = em.escaper();
        let mut query = em.query(&escaper.escape_identifier(&self.table));
        query.columns(opponent.foreign_attributes().map(|c| escaper.escape_identifier(c)));
        for (column, value) in key {
            query.where_(Criterion::compare(escaper.escape_identifier(&column), "=", value))?;
        }
        let rows = em.query_rows(&query.get_query())?;

        let keys: Vec<ForeignKey> = rows
            .iter()
            .map(|row| {
                opponent
                    .pairs()
                    .map(|(attribute, column)| {
                        let value = row.get_value(column).cloned().unwrap_or(Value::Null);
                        (attribute.to_string(), value)
                    })
                    .collect()
            })
            .collect();

        let related_type = em.entity_type(&self.class)?;
        if let [pk] = related_type.primary_key_attributes() {
            let missing: Vec<Value> = keys
                .iter()
                .filter(|key| !em.is_mapped(&self.class, key))
                .filter_map(|key| key.get(pk).cloned())
                .collect();
            if !missing.is_empty() {
                let mut fetcher = em.fetch(&self.class)?;
                fetcher.where_in(pk, missing)?;
                fetcher.all(0)?;
            }
        }

        let mut related = Vec::with_capacity(keys.len());
        for key in &keys {
            if let Some(entity) = em.fetch_by_primary_key(&self.class, key)? {
                related.push(entity);
            }
        }
        Ok(related)
    }

    pub(crate) fn add_join(
        &self,
        fetcher: &mut EntityFetcher<'_>,
        join_type: JoinType,
        from_alias: &str,
        alias: &str,
    ) -> OrmResult<()> {
        let em = fetcher.manager();
        let opponent = self.opponent_reference(em)?;
        let table = em.escaper().escape_identifier(&self.table);
        let own = self.association_condition(em, &self.reference, from_alias);
        let related = self.association_condition(em, &opponent, alias);

        fetcher.join_with(join_type, &table, &own, None, &[])?;
        fetcher.join_with(join_type, &self.class, &related, Some(alias), &[])?;
        Ok(())
    }

    /// One association row per related entity: own key plus related key.
    fn association_rows(
        &self,
        owner: &EntityRef,
        related: &[EntityRef],
        em: &EntityManager,
    ) -> OrmResult<Vec<EntityData>> {
        let key = self.reference.foreign_key(&owner.borrow())?;
        let opponent = self.opponent_reference(em)?;

        related
            .iter()
            .map(|entity| {
                let entity = entity.borrow();
                if entity.class() != self.class {
                    return Err(OrmError::InvalidType(format!(
                        "Related entity has to be an instance of {}, got {}",
                        self.class,
                        entity.class()
                    )));
                }
                let mut row = key.clone();
                row.extend(opponent.foreign_key(&entity)?);
                Ok(row)
            })
            .collect()
    }

    pub(crate) fn add_related(
        &self,
        owner: &EntityRef,
        related: &[EntityRef],
        em: &EntityManager,
    ) -> OrmResult<()> {
        let rows = self.association_rows(owner, related, em)?;
        if rows.is_empty() {
            return Ok(());
        }
        let sql = compile_insert(em.escaper(), &self.table, &rows)?;
        em.execute(&sql)?;
        Ok(())
    }

    pub(crate) fn delete_related(
        &self,
        owner: &EntityRef,
        related: &[EntityRef],
        em: &EntityManager,
    ) -> OrmResult<()> {
        let rows = self.association_rows(owner, related, em)?;
        if rows.is_empty() {
            return Ok(());
        }
        let sql = compile_delete(em.escaper(), &self.table, &rows)?;
        em.execute(&sql)?;
        Ok(())
    }
}
