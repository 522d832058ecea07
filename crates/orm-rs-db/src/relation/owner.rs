//! The owning side of a foreign key.

use orm_rs_core::{OrmError, OrmResult};

use super::{copy_key, fetch_by_reference, join_condition, Reference};
use crate::entity::EntityRef;
use crate::manager::EntityManager;
use crate::query::builder::JoinType;
use crate::query::fetcher::EntityFetcher;
use crate::value::Value;

/// The owner stores the key of one entity of `class`: `reference` maps own
/// attributes to attributes of the related class, usually its primary key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Owner {
    pub class: String,
    pub reference: Reference,
    pub opponent: Option<String>,
}

impl Owner {
    /// An incomplete foreign key means there is no related entity.
    pub(crate) fn fetch(&self, owner: &EntityRef, em: &EntityManager) -> OrmResult<Option<EntityRef>> {
        let Some(key) = self.reference.try_foreign_key(&owner.borrow()) else {
            return Ok(None);
        };
        fetch_by_reference(em, &self.class, &key)
    }

    pub(crate) fn add_join(
        &self,
        fetcher: &mut EntityFetcher<'_>,
        join_type: JoinType,
        from_alias: &str,
        alias: &str,
    ) -> OrmResult<()> {
        let expression = join_condition(&self.reference, from_alias, alias);
        fetcher.join_with(join_type, &self.class, &expression, Some(alias), &[])?;
        Ok(())
    }

    pub(crate) fn set_related(&self, owner: &EntityRef, related: Option<&EntityRef>) -> OrmResult<()> {
        let Some(related) = related else {
            let mut owner = owner.borrow_mut();
            for own in self.reference.own_attributes() {
                owner.set(own, Value::Null)?;
            }
            return Ok(());
        };

        let class = related.borrow().class().to_string();
        if class != self.class {
            return Err(OrmError::InvalidType(format!(
                "Related entity has to be an instance of {}, got {class}",
                self.class
            )));
        }
        copy_key(&self.reference, owner, related)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{Entity, EntityData};
    use crate::relation::RelationKind;
    use crate::testing::{blog_registry, manager_with, RecordingConnection};

    fn user_relation() -> Owner {
        let relation = blog_registry().relation("Article", "user").unwrap();
        match relation.kind() {
            RelationKind::Owner(owner) => owner.clone(),
            other => panic!("expected owner, got {other:?}"),
        }
    }

    fn make(em: &EntityManager, class: &str, pairs: &[(&str, Value)]) -> EntityRef {
        let data: EntityData = pairs.iter().map(|(k, v)| ((*k).to_string(), v.clone())).collect();
        Entity::from_row(em.entity_type(class).unwrap(), data).into_ref()
    }

    #[test]
    fn test_fetch_without_key_is_none() {
        let connection = RecordingConnection::new();
        let em = manager_with(connection.clone());
        let article = make(&em, "Article", &[("id", 1.into())]);
        assert!(user_relation().fetch(&article, &em).unwrap().is_none());
        assert_eq!(connection.query_count(), 0);
    }

    #[test]
    fn test_fetch_uses_identity_map() {
        let connection = RecordingConnection::new();
        let em = manager_with(connection.clone());
        let user = em.map(make(&em, "User", &[("id", 7.into())])).unwrap();
        let article = make(&em, "Article", &[("id", 1.into()), ("user_id", 7.into())]);

        let fetched = user_relation().fetch(&article, &em).unwrap().unwrap();
        assert!(std::rc::Rc::ptr_eq(&fetched, &user));
        assert_eq!(connection.query_count(), 0);
    }

    #[test]
    fn test_fetch_queries_by_primary_key() {
        let connection = RecordingConnection::new();
        connection.script("SELECT", vec![vec![("id", Value::Int(7)), ("name", "ann".into())]]);
        let em = manager_with(connection.clone());
        let article = make(&em, "Article", &[("id", 1.into()), ("user_id", 7.into())]);

        let user = user_relation().fetch(&article, &em).unwrap().unwrap();
        assert_eq!(user.borrow().get("name"), Value::from("ann"));
        assert_eq!(
            connection.statements(),
            vec!["SELECT DISTINCT \"t0\".* FROM \"user\" AS \"t0\" WHERE \"t0\".\"id\" = 7"]
        );
    }

    #[test]
    fn test_set_related_copies_and_clears() {
        let em = manager_with(RecordingConnection::new());
        let article = make(&em, "Article", &[("id", 1.into())]);
        let user = make(&em, "User", &[("id", 7.into())]);
        let relation = user_relation();

        relation.set_related(&article, Some(&user)).unwrap();
        assert_eq!(article.borrow().get("userId"), Value::Int(7));
        assert!(article.borrow().is_attribute_dirty("userId"));

        relation.set_related(&article, None).unwrap();
        assert_eq!(article.borrow().get("userId"), Value::Null);
    }

    #[test]
    fn test_set_related_checks_class_and_key() {
        let em = manager_with(RecordingConnection::new());
        let article = make(&em, "Article", &[("id", 1.into())]);
        let other = make(&em, "Article", &[("id", 2.into())]);
        let err = user_relation().set_related(&article, Some(&other)).unwrap_err();
        assert!(matches!(err, OrmError::InvalidType(_)));

        let unsaved = Entity::new(em.entity_type("User").unwrap(), EntityData::new()).into_ref();
        let err = user_relation().set_related(&article, Some(&unsaved)).unwrap_err();
        assert!(matches!(err, OrmError::IncompletePrimaryKey(_)));
    }

    #[test]
    fn test_join() {
        let em = manager_with(RecordingConnection::new());
        let mut fetcher = em.fetch("Article").unwrap();
        fetcher.join_related("user").unwrap();
        assert_eq!(
            fetcher.get_query().unwrap(),
            "SELECT DISTINCT \"t0\".* FROM \"article\" AS \"t0\" \
             JOIN \"user\" AS \"user\" ON \"t0\".\"user_id\" = \"user\".\"id\""
        );
    }
}
