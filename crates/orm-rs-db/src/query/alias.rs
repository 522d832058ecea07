//! Class aliases and attribute translation for entity queries.
//!
//! An entity query selects from the root class under alias `t0`; every
//! joined class gets an alias of its own. Expressions refer to columns as
//!
//! - `Class::attribute`: the attribute of a joined class,
//! - `alias.attribute`: the attribute of the class joined under `alias`,
//! - `attribute`: an attribute of the root class.
//!
//! [`EntityTranslator`] rewrites these references to escaped
//! `"alias"."column"` pairs. Quoted strings are left alone, and so are
//! bare words without lowercase letters, which are taken for SQL keywords
//! and functions.

use std::collections::HashMap;
use std::rc::Rc;
use std::sync::OnceLock;

use indexmap::IndexMap;
use orm_rs_core::{OrmError, OrmResult};
use regex::Regex;

use super::builder::ColumnTranslator;
use crate::escape::Escaper;
use crate::registry::EntityRegistry;

/// The alias of the root class.
pub const ROOT_ALIAS: &str = "t0";

/// A two-way class ↔ alias mapping for one query.
#[derive(Debug, Clone)]
pub struct ClassAliasMap {
    by_alias: IndexMap<String, String>,
    by_class: HashMap<String, String>,
}

impl ClassAliasMap {
    /// Creates a map with `root` registered as `t0`.
    pub fn new(root: &str) -> Self {
        let mut map = Self {
            by_alias: IndexMap::new(),
            by_class: HashMap::new(),
        };
        map.register(root, ROOT_ALIAS);
        map
    }

    /// Registers `class` under `alias`. A class keeps the first alias it was
    /// registered with for `Class::` references.
    pub fn register(&mut self, class: &str, alias: &str) {
        self.by_alias.insert(alias.to_string(), class.to_string());
        self.by_class
            .entry(class.to_string())
            .or_insert_with(|| alias.to_string());
    }

    pub fn class_of(&self, alias: &str) -> Option<&str> {
        self.by_alias.get(alias).map(String::as_str)
    }

    pub fn alias_of(&self, class: &str) -> Option<&str> {
        self.by_class.get(class).map(String::as_str)
    }

    /// The next free `t<N>` alias.
    pub fn next_alias(&self) -> String {
        (self.by_alias.len()..)
            .map(|n| format!("t{n}"))
            .find(|alias| !self.by_alias.contains_key(alias))
            .unwrap_or_else(|| format!("t{}", self.by_alias.len()))
    }

    /// The registered aliases, in registration order.
    pub fn aliases(&self) -> impl Iterator<Item = (&str, &str)> {
        self.by_alias.iter().map(|(a, c)| (a.as_str(), c.as_str()))
    }
}

fn column_reference() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(
            r"(?:([A-Za-z_][A-Za-z0-9_]*)::|([A-Za-z_][A-Za-z0-9_]*)\.)?([A-Za-z_][A-Za-z0-9_]*)",
        )
        .unwrap()
    })
}

fn starts_reference(c: char) -> bool {
    c.is_whitespace()
        || matches!(
            c,
            '(' | ',' | '=' | '<' | '>' | '!' | '+' | '-' | '*' | '/' | '%'
        )
}

fn ends_reference(c: char) -> bool {
    c.is_whitespace()
        || matches!(
            c,
            ')' | ',' | '=' | '<' | '>' | '!' | '+' | '-' | '*' | '/' | '%'
        )
}

/// Splits `expression` into `(text, quoted)` segments.
fn segments(expression: &str) -> Vec<(&str, bool)> {
    let mut parts = Vec::new();
    let mut start = 0;
    let mut quote: Option<char> = None;
    for (i, c) in expression.char_indices() {
        match quote {
            None if c == '\'' || c == '"' => {
                if start < i {
                    parts.push((&expression[start..i], false));
                }
                start = i;
                quote = Some(c);
            }
            Some(q) if c == q => {
                let end = i + c.len_utf8();
                parts.push((&expression[start..end], true));
                start = end;
                quote = None;
            }
            _ => {}
        }
    }
    if start < expression.len() {
        parts.push((&expression[start..], quote.is_some()));
    }
    parts
}

/// Translates attribute references of an entity query into columns.
#[derive(Clone)]
pub struct EntityTranslator {
    registry: Rc<EntityRegistry>,
    escaper: Rc<dyn Escaper>,
    aliases: ClassAliasMap,
}

impl std::fmt::Debug for EntityTranslator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntityTranslator")
            .field("aliases", &self.aliases)
            .finish_non_exhaustive()
    }
}

impl EntityTranslator {
    pub fn new(registry: Rc<EntityRegistry>, escaper: Rc<dyn Escaper>, root: &str) -> Self {
        Self {
            registry,
            escaper,
            aliases: ClassAliasMap::new(root),
        }
    }

    pub const fn aliases(&self) -> &ClassAliasMap {
        &self.aliases
    }

    /// The column of `attribute` on `class`; the attribute itself when the
    /// class is unknown.
    fn column(&self, class: &str, attribute: &str) -> String {
        self.registry
            .entity_type(class)
            .map_or_else(|_| attribute.to_string(), |ty| ty.column_name(attribute))
    }

    fn translate_reference(
        &self,
        class: Option<&str>,
        alias: Option<&str>,
        attribute: &str,
        raw: &str,
    ) -> OrmResult<String> {
        if let Some(class) = class {
            let alias = self
                .aliases
                .alias_of(class)
                .ok_or_else(|| OrmError::NotJoined(format!("Class {class} not joined")))?;
            let column = self.column(class, attribute);
            return Ok(self.escaper.escape_identifier(&format!("{alias}.{column}")));
        }
        if let Some(alias) = alias {
            return Ok(match self.aliases.class_of(alias) {
                Some(class) => {
                    let column = self.column(class, attribute);
                    self.escaper.escape_identifier(&format!("{alias}.{column}"))
                }
                None => raw.to_string(),
            });
        }
        if !attribute.chars().any(char::is_lowercase) {
            return Ok(raw.to_string());
        }
        let root = self.aliases.class_of(ROOT_ALIAS).unwrap_or_default();
        let column = self.column(root, attribute);
        Ok(self
            .escaper
            .escape_identifier(&format!("{ROOT_ALIAS}.{column}")))
    }

    fn translate_segment(&self, text: &str, sql: &mut String) -> OrmResult<()> {
        let mut last = 0;
        for captures in column_reference().captures_iter(text) {
            let Some(whole) = captures.get(0) else {
                continue;
            };
            let before = text[..whole.start()].chars().next_back();
            let after = text[whole.end()..].chars().next();
            let free_start = before.map_or(true, starts_reference);
            let free_end = after.map_or(true, ends_reference);
            if !free_start || !free_end {
                continue;
            }
            sql.push_str(&text[last..whole.start()]);
            let translated = self.translate_reference(
                captures.get(1).map(|m| m.as_str()),
                captures.get(2).map(|m| m.as_str()),
                &captures[3],
                whole.as_str(),
            )?;
            sql.push_str(&translated);
            last = whole.end();
        }
        sql.push_str(&text[last..]);
        Ok(())
    }
}

impl ColumnTranslator for EntityTranslator {
    fn translate(&self, expression: &str) -> OrmResult<String> {
        let mut sql = String::with_capacity(expression.len());
        for (text, quoted) in segments(expression) {
            if quoted {
                sql.push_str(text);
            } else {
                self.translate_segment(text, &mut sql)?;
            }
        }
        Ok(sql)
    }

    fn join_target(
        &mut self,
        target: &str,
        alias: Option<&str>,
    ) -> OrmResult<(String, Option<String>)> {
        let Ok(entity_type) = self.registry.entity_type(target) else {
            return Ok((target.to_string(), alias.map(str::to_string)));
        };
        let alias = alias.map_or_else(|| self.aliases.next_alias(), str::to_string);
        self.aliases.register(target, &alias);
        Ok((
            self.escaper.escape_identifier(&entity_type.table_name()),
            Some(self.escaper.escape_identifier(&alias)),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::escape::AnsiEscaper;
    use crate::testing::blog_registry;

    fn translator() -> EntityTranslator {
        EntityTranslator::new(blog_registry(), Rc::new(AnsiEscaper::default()), "Article")
    }

    // ── ClassAliasMap ───────────────────────────────────────────────

    #[test]
    fn test_alias_map() {
        let mut map = ClassAliasMap::new("Article");
        assert_eq!(map.alias_of("Article"), Some("t0"));
        assert_eq!(map.next_alias(), "t1");
        map.register("User", "t1");
        map.register("User", "author");
        assert_eq!(map.alias_of("User"), Some("t1"));
        assert_eq!(map.class_of("author"), Some("User"));
        map.register("Category", "t3");
        assert_eq!(map.next_alias(), "t4");
        map.register("Comment", "t4");
        assert_eq!(map.next_alias(), "t5");
    }

    #[test]
    fn test_next_alias_skips_used() {
        let mut map = ClassAliasMap::new("Article");
        map.register("User", "t2");
        assert_eq!(map.next_alias(), "t3");
        map.register("Category", "categories");
        assert_eq!(map.next_alias(), "t3");
    }

    // ── Translation ─────────────────────────────────────────────────

    #[test]
    fn test_bare_attributes_use_root() {
        let t = translator();
        assert_eq!(t.translate("userId = 3").unwrap(), "\"t0\".\"user_id\" = 3");
        assert_eq!(
            t.translate("body LIKE ? AND id > 2").unwrap(),
            "\"t0\".\"content\" LIKE ? AND \"t0\".\"id\" > 2"
        );
    }

    #[test]
    fn test_keywords_and_functions_stay() {
        let t = translator();
        assert_eq!(
            t.translate("COUNT(id) > 0 AND title IS NOT NULL").unwrap(),
            "COUNT(\"t0\".\"id\") > 0 AND \"t0\".\"title\" IS NOT NULL"
        );
        assert_eq!(t.translate("lower(title)").unwrap(), "lower(\"t0\".\"title\")");
    }

    #[test]
    fn test_quoted_text_is_untouched() {
        let t = translator();
        assert_eq!(
            t.translate("title = 'userId and body'").unwrap(),
            "\"t0\".\"title\" = 'userId and body'"
        );
        assert_eq!(t.translate("\"raw\".\"col\" = 1").unwrap(), "\"raw\".\"col\" = 1");
    }

    #[test]
    fn test_class_references() {
        let mut t = translator();
        assert!(matches!(
            t.translate("User::name = 'x'"),
            Err(OrmError::NotJoined(_))
        ));
        let (table, alias) = t.join_target("User", None).unwrap();
        assert_eq!(table, "\"user\"");
        assert_eq!(alias.as_deref(), Some("\"t1\""));
        assert_eq!(
            t.translate("User::createdAt > Article::createdAt").unwrap(),
            "\"t1\".\"created_at\" > \"t0\".\"created_at\""
        );
    }

    #[test]
    fn test_alias_references() {
        let mut t = translator();
        t.join_target("User", Some("author")).unwrap();
        assert_eq!(
            t.translate("author.userName = t0.title").unwrap(),
            "\"author\".\"user_name\" = \"t0\".\"title\""
        );
        assert_eq!(t.translate("other.col = 1").unwrap(), "other.col = 1");
    }

    #[test]
    fn test_unknown_join_target_is_raw() {
        let mut t = translator();
        let (table, alias) = t.join_target("audit_log", Some("l")).unwrap();
        assert_eq!(table, "audit_log");
        assert_eq!(alias.as_deref(), Some("l"));
        assert_eq!(t.aliases().class_of("l"), None);
    }

    #[test]
    fn test_segments() {
        assert_eq!(
            segments("a = 'x''y' AND \"b\""),
            vec![
                ("a = ", false),
                ("'x'", true),
                ("'y'", true),
                (" AND ", false),
                ("\"b\"", true),
            ]
        );
    }
}
