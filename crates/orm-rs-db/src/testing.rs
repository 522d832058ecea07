//! Shared fixtures for unit tests: a scripted connection and a small blog
//! schema covering every relation kind.

use std::cell::RefCell;
use std::rc::Rc;

use orm_rs_core::{OrmResult, Settings};

use crate::entity::EntityType;
use crate::executor::Connection;
use crate::manager::EntityManager;
use crate::registry::EntityRegistry;
use crate::relation::RelationDeclaration;
use crate::row::Row;
use crate::value::Value;

#[derive(Debug, Default)]
struct State {
    statements: Vec<String>,
    scripts: Vec<(String, Vec<Row>)>,
    queries: usize,
    last_id: i64,
}

/// Records every statement and answers queries from scripted rows.
///
/// Clones share their state, so a test can keep one handle while the
/// manager owns another.
#[derive(Debug, Clone, Default)]
pub struct RecordingConnection {
    state: Rc<RefCell<State>>,
}

impl RecordingConnection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answers queries starting with `prefix` with `rows`. The first matching
    /// script wins; unscripted queries return no rows.
    pub fn script(&self, prefix: &str, rows: Vec<Vec<(&str, Value)>>) {
        let rows = rows.into_iter().map(Row::from_pairs).collect();
        self.state
            .borrow_mut()
            .scripts
            .push((prefix.to_string(), rows));
    }

    /// Every query and statement, in execution order.
    pub fn statements(&self) -> Vec<String> {
        self.state.borrow().statements.clone()
    }

    pub fn query_count(&self) -> usize {
        self.state.borrow().queries
    }
}

impl Connection for RecordingConnection {
    fn vendor(&self) -> &str {
        "recording"
    }

    fn query(&self, sql: &str) -> OrmResult<Vec<Row>> {
        let mut state = self.state.borrow_mut();
        state.statements.push(sql.to_string());
        state.queries += 1;
        Ok(state
            .scripts
            .iter()
            .find(|(prefix, _)| sql.starts_with(prefix.as_str()))
            .map(|(_, rows)| rows.clone())
            .unwrap_or_default())
    }

    fn execute(&self, sql: &str) -> OrmResult<u64> {
        let mut state = self.state.borrow_mut();
        state.statements.push(sql.to_string());
        if sql.starts_with("INSERT") {
            let rows = sql.matches("), (").count() + 1;
            state.last_id += i64::try_from(rows).unwrap_or(0);
            return Ok(rows as u64);
        }
        Ok(1)
    }

    fn last_insert_id(&self) -> OrmResult<Value> {
        Ok(Value::Int(self.state.borrow().last_id))
    }
}

/// Users write articles, articles have categories and comments, categories
/// form a tree and comments belong to either an article or a category.
pub fn blog_registry() -> Rc<EntityRegistry> {
    let mut registry = EntityRegistry::new();
    registry
        .register(
            EntityType::new("User")
                .relation("articles", RelationDeclaration::one_to_many("Article", "user"))
                .relation("profile", RelationDeclaration::one_to_one("Profile", "user")),
        )
        .register(
            EntityType::new("Profile").relation(
                "user",
                RelationDeclaration::owner("User", [("userId", "id")]).with_opponent("profile"),
            ),
        )
        .register(
            EntityType::new("Article")
                .column_alias("body", "content")
                .relation(
                    "user",
                    RelationDeclaration::owner("User", [("userId", "id")])
                        .with_opponent("articles"),
                )
                .relation(
                    "categories",
                    RelationDeclaration::many_to_many(
                        "Category",
                        [("id", "article_id")],
                        "articles",
                        "article_category",
                    ),
                )
                .relation(
                    "comments",
                    RelationDeclaration::one_to_many("Comment", "parent"),
                ),
        )
        .register(
            EntityType::new("Category")
                .relation(
                    "articles",
                    RelationDeclaration::many_to_many(
                        "Article",
                        [("id", "category_id")],
                        "categories",
                        "article_category",
                    ),
                )
                .relation(
                    "parent",
                    RelationDeclaration::owner("Category", [("parentId", "id")])
                        .with_opponent("children"),
                )
                .relation(
                    "children",
                    RelationDeclaration::one_to_many("Category", "parent"),
                ),
        )
        .register(EntityType::new("Comment").relation(
            "parent",
            RelationDeclaration::morphed(
                "parentType",
                [("article", "Article"), ("category", "Category")],
                [("parentId", "id")],
            ),
        ));
    Rc::new(registry)
}

pub fn manager_with(connection: RecordingConnection) -> EntityManager {
    manager_with_registry(blog_registry(), connection)
}

pub fn manager_with_registry(
    registry: Rc<EntityRegistry>,
    connection: RecordingConnection,
) -> EntityManager {
    EntityManager::new(registry, Box::new(connection), Settings::default())
}
