//! The expression builder.
//!
//! [`QueryBuilder`] composes a `SELECT` statement clause by clause. Conditions
//! are collected per scope: the root `WHERE`, nested parentheses and the `ON`
//! clause of scope-style joins. Each condition remembers the boolean operator
//! that links it to its predecessor, so `where_(a)?.or_where(b)?` renders
//! `a OR b` and closing a parenthesis merges `(a OR b)` into the enclosing
//! scope.
//!
//! Arguments are never bound. Every `?` placeholder is replaced by the
//! escaped argument; when the number of placeholders does not match the
//! number of arguments the expression is taken as raw SQL and left untouched.
//!
//! Column references pass through a [`ColumnTranslator`]. The plain builder
//! uses [`RawTranslator`], the entity fetcher plugs in a translator that maps
//! attributes and class names to quoted columns and aliases.
//!
//! ```
//! use std::rc::Rc;
//! use orm_rs_db::escape::AnsiEscaper;
//! use orm_rs_db::query::QueryBuilder;
//!
//! let mut query = QueryBuilder::new("users", Rc::new(AnsiEscaper::default()));
//! query.where_(("name", "John Doe")).unwrap();
//! assert_eq!(query.get_query(), "SELECT * FROM users WHERE name = 'John Doe'");
//! ```

use std::fmt;
use std::rc::Rc;

use orm_rs_core::{OrmError, OrmResult};

use crate::escape::Escaper;
use crate::value::Value;

/// The kind of a join.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum JoinType {
    #[default]
    Inner,
    Left,
    Right,
    Full,
}

impl JoinType {
    const fn keyword(self) -> &'static str {
        match self {
            Self::Inner => "JOIN",
            Self::Left => "LEFT JOIN",
            Self::Right => "RIGHT JOIN",
            Self::Full => "FULL JOIN",
        }
    }
}

/// The operator linking a condition to the one before it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoolOp {
    And,
    Or,
}

impl fmt::Display for BoolOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::And => "AND",
            Self::Or => "OR",
        })
    }
}

/// Sort direction for `ORDER BY`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    #[default]
    Asc,
    Desc,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        })
    }
}

/// A single predicate passed to `where_` and friends.
///
/// - `"published = 1"`: raw SQL
/// - `("name", "John")`: `name = 'John'`, or `IN` when the value is a list
/// - `("age", ">", 18)`: explicit operator
/// - [`Criterion::raw`]: raw SQL with `?` placeholders
#[derive(Debug, Clone, PartialEq)]
pub enum Criterion {
    /// A raw expression and its placeholder arguments.
    Raw { expression: String, args: Vec<Value> },
    /// A comparison of a column against a value.
    Compare {
        column: String,
        operator: Option<String>,
        value: Value,
    },
}

impl Criterion {
    /// A raw expression with `?` placeholders.
    pub fn raw<I, V>(expression: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Self::Raw {
            expression: expression.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// A comparison with an explicit operator.
    pub fn compare(column: impl Into<String>, operator: &str, value: impl Into<Value>) -> Self {
        Self::Compare {
            column: column.into(),
            operator: Some(operator.to_string()),
            value: value.into(),
        }
    }
}

impl From<&str> for Criterion {
    fn from(expression: &str) -> Self {
        Self::Raw {
            expression: expression.to_string(),
            args: Vec::new(),
        }
    }
}

impl From<String> for Criterion {
    fn from(expression: String) -> Self {
        Self::Raw {
            expression,
            args: Vec::new(),
        }
    }
}

impl<V: Into<Value>> From<(&str, V)> for Criterion {
    fn from((column, value): (&str, V)) -> Self {
        Self::Compare {
            column: column.to_string(),
            operator: None,
            value: value.into(),
        }
    }
}

impl<V: Into<Value>> From<(&str, &str, V)> for Criterion {
    fn from((column, operator, value): (&str, &str, V)) -> Self {
        Self::compare(column, operator, value)
    }
}

/// Maps column references in an expression to SQL.
pub trait ColumnTranslator {
    /// Translates every column reference in `expression`.
    fn translate(&self, expression: &str) -> OrmResult<String>;

    /// Resolves the target of a join into the rendered table and alias.
    ///
    /// Implementations may register the alias so that it can be referenced
    /// in the join's own `ON` clause.
    fn join_target(&mut self, target: &str, alias: Option<&str>)
        -> OrmResult<(String, Option<String>)>;
}

/// Leaves expressions untouched.
#[derive(Debug, Clone, Copy, Default)]
pub struct RawTranslator;

impl ColumnTranslator for RawTranslator {
    fn translate(&self, expression: &str) -> OrmResult<String> {
        Ok(expression.to_string())
    }

    fn join_target(
        &mut self,
        target: &str,
        alias: Option<&str>,
    ) -> OrmResult<(String, Option<String>)> {
        Ok((target.to_string(), alias.map(str::to_string)))
    }
}

#[derive(Debug, Clone)]
struct Condition {
    op: Option<BoolOp>,
    sql: String,
}

#[derive(Debug, Clone)]
enum ScopeKind {
    Parenthesis(BoolOp),
    Join {
        join_type: JoinType,
        table: String,
        alias: Option<String>,
    },
}

#[derive(Debug, Clone)]
struct Scope {
    kind: ScopeKind,
    conditions: Vec<Condition>,
}

fn render_conditions(conditions: &[Condition]) -> String {
    let mut sql = String::new();
    for condition in conditions {
        if let Some(op) = condition.op {
            sql.push_str(&format!(" {op} "));
        }
        sql.push_str(&condition.sql);
    }
    sql
}

fn render_join(join_type: JoinType, table: &str, alias: Option<&str>, on: &str) -> String {
    let mut sql = format!("{} {table}", join_type.keyword());
    if let Some(alias) = alias {
        sql.push_str(&format!(" AS {alias}"));
    }
    if !on.is_empty() {
        sql.push_str(&format!(" ON {on}"));
    }
    sql
}

/// Positions of `?` placeholders outside quoted strings.
fn placeholder_positions(expression: &str) -> Vec<usize> {
    let mut positions = Vec::new();
    let mut quote: Option<char> = None;
    for (i, c) in expression.char_indices() {
        match (quote, c) {
            (None, '\'' | '"') => quote = Some(c),
            (Some(q), c) if c == q => quote = None,
            (None, '?') => positions.push(i),
            _ => {}
        }
    }
    positions
}

/// A composable `SELECT` statement.
#[derive(Clone)]
pub struct QueryBuilder<T = RawTranslator> {
    table: String,
    alias: Option<String>,
    columns: Vec<String>,
    modifiers: Vec<String>,
    joins: Vec<String>,
    groups: Vec<String>,
    orders: Vec<String>,
    limit: Option<u64>,
    offset: Option<u64>,
    conditions: Vec<Condition>,
    scopes: Vec<Scope>,
    escaper: Rc<dyn Escaper>,
    translator: T,
}

impl<T: fmt::Debug> fmt::Debug for QueryBuilder<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryBuilder")
            .field("table", &self.table)
            .field("alias", &self.alias)
            .field("open_scopes", &self.scopes.len())
            .field("translator", &self.translator)
            .finish_non_exhaustive()
    }
}

impl QueryBuilder<RawTranslator> {
    /// Creates a builder for `table` that uses column references verbatim.
    pub fn new(table: impl Into<String>, escaper: Rc<dyn Escaper>) -> Self {
        Self::with_translator(table, None, escaper, RawTranslator)
    }
}

impl<T: ColumnTranslator> QueryBuilder<T> {
    /// Creates a builder with a custom column translator.
    pub fn with_translator(
        table: impl Into<String>,
        alias: Option<String>,
        escaper: Rc<dyn Escaper>,
        translator: T,
    ) -> Self {
        Self {
            table: table.into(),
            alias,
            columns: Vec::new(),
            modifiers: Vec::new(),
            joins: Vec::new(),
            groups: Vec::new(),
            orders: Vec::new(),
            limit: None,
            offset: None,
            conditions: Vec::new(),
            scopes: Vec::new(),
            escaper,
            translator,
        }
    }

    /// The column translator.
    pub const fn translator(&self) -> &T {
        &self.translator
    }

    /// The column translator, mutably.
    pub fn translator_mut(&mut self) -> &mut T {
        &mut self.translator
    }

    /// The escaper used for arguments.
    pub fn escaper(&self) -> &Rc<dyn Escaper> {
        &self.escaper
    }

    // ── Rendering helpers ────────────────────────────────────────────

    fn escape_arg(&self, value: &Value) -> OrmResult<String> {
        match value {
            Value::List(values) => {
                let parts = values
                    .iter()
                    .map(|v| self.escaper.escape_value(v))
                    .collect::<OrmResult<Vec<_>>>()?;
                Ok(format!("({})", parts.join(",")))
            }
            scalar => self.escaper.escape_value(scalar),
        }
    }

    /// Replaces `?` placeholders in `expression` by the escaped `args`.
    ///
    /// The expression is returned unchanged when the placeholder count does
    /// not match the argument count.
    pub fn substitute(&self, expression: &str, args: &[Value]) -> OrmResult<String> {
        let positions = placeholder_positions(expression);
        if args.is_empty() || positions.len() != args.len() {
            return Ok(expression.to_string());
        }
        let mut sql = String::with_capacity(expression.len());
        let mut last = 0;
        for (position, arg) in positions.into_iter().zip(args) {
            sql.push_str(&expression[last..position]);
            sql.push_str(&self.escape_arg(arg)?);
            last = position + 1;
        }
        sql.push_str(&expression[last..]);
        Ok(sql)
    }

    fn translate(&self, expression: &str, args: &[Value]) -> OrmResult<String> {
        let translated = self.translator.translate(expression)?;
        self.substitute(&translated, args)
    }

    fn render_criterion(&self, criterion: Criterion) -> OrmResult<String> {
        match criterion {
            Criterion::Raw { expression, args } => self.translate(&expression, &args),
            Criterion::Compare {
                column,
                operator,
                value,
            } => {
                let operator = match operator {
                    Some(op) => op.trim().to_uppercase(),
                    None if value.is_list() => "IN".to_string(),
                    None => "=".to_string(),
                };
                let column = self.translator.translate(&column)?;

                match operator.as_str() {
                    "IN" | "NOT IN" => {
                        let values = value.as_slice();
                        if values.is_empty() {
                            return Ok(if operator == "IN" { "1 = 0" } else { "1 = 1" }.to_string());
                        }
                        let list = Value::List(values.to_vec());
                        Ok(format!("{column} {operator} {}", self.escape_arg(&list)?))
                    }
                    "=" if value.is_null() => Ok(format!("{column} IS NULL")),
                    "!=" | "<>" if value.is_null() => Ok(format!("{column} IS NOT NULL")),
                    _ => Ok(format!(
                        "{column} {operator} {}",
                        self.escaper.escape_value(&value)?
                    )),
                }
            }
        }
    }

    fn current_conditions(&mut self) -> &mut Vec<Condition> {
        match self.scopes.last_mut() {
            Some(scope) => &mut scope.conditions,
            None => &mut self.conditions,
        }
    }

    fn push_condition(&mut self, op: BoolOp, sql: String) {
        let conditions = self.current_conditions();
        let op = if conditions.is_empty() { None } else { Some(op) };
        conditions.push(Condition { op, sql });
    }

    fn add_criterion(&mut self, op: BoolOp, criterion: Criterion) -> OrmResult<&mut Self> {
        let sql = self.render_criterion(criterion)?;
        self.push_condition(op, sql);
        Ok(self)
    }

    // ── WHERE ────────────────────────────────────────────────────────

    /// Adds a condition linked with `AND`.
    pub fn where_(&mut self, criterion: impl Into<Criterion>) -> OrmResult<&mut Self> {
        self.add_criterion(BoolOp::And, criterion.into())
    }

    /// Adds a condition linked with `AND`.
    pub fn and_where(&mut self, criterion: impl Into<Criterion>) -> OrmResult<&mut Self> {
        self.add_criterion(BoolOp::And, criterion.into())
    }

    /// Adds a condition linked with `OR`.
    pub fn or_where(&mut self, criterion: impl Into<Criterion>) -> OrmResult<&mut Self> {
        self.add_criterion(BoolOp::Or, criterion.into())
    }

    /// `column IN (values)`; an empty list never matches.
    pub fn where_in(&mut self, column: &str, values: impl Into<Value>) -> OrmResult<&mut Self> {
        self.add_criterion(BoolOp::And, Criterion::compare(column, "IN", values))
    }

    /// `column NOT IN (values)`; an empty list always matches.
    pub fn where_not_in(&mut self, column: &str, values: impl Into<Value>) -> OrmResult<&mut Self> {
        self.add_criterion(BoolOp::And, Criterion::compare(column, "NOT IN", values))
    }

    /// Same as [`where_in`](Self::where_in).
    pub fn and_where_in(&mut self, column: &str, values: impl Into<Value>) -> OrmResult<&mut Self> {
        self.where_in(column, values)
    }

    /// Same as [`where_not_in`](Self::where_not_in).
    pub fn and_where_not_in(
        &mut self,
        column: &str,
        values: impl Into<Value>,
    ) -> OrmResult<&mut Self> {
        self.where_not_in(column, values)
    }

    /// `OR column IN (values)`.
    pub fn or_where_in(&mut self, column: &str, values: impl Into<Value>) -> OrmResult<&mut Self> {
        self.add_criterion(BoolOp::Or, Criterion::compare(column, "IN", values))
    }

    /// `OR column NOT IN (values)`.
    pub fn or_where_not_in(
        &mut self,
        column: &str,
        values: impl Into<Value>,
    ) -> OrmResult<&mut Self> {
        self.add_criterion(BoolOp::Or, Criterion::compare(column, "NOT IN", values))
    }

    // ── Scopes ───────────────────────────────────────────────────────

    /// Opens a parenthesis linked with `AND`.
    pub fn parenthesis(&mut self) -> &mut Self {
        self.and_parenthesis()
    }

    /// Opens a parenthesis linked with `AND`.
    pub fn and_parenthesis(&mut self) -> &mut Self {
        self.scopes.push(Scope {
            kind: ScopeKind::Parenthesis(BoolOp::And),
            conditions: Vec::new(),
        });
        self
    }

    /// Opens a parenthesis linked with `OR`.
    pub fn or_parenthesis(&mut self) -> &mut Self {
        self.scopes.push(Scope {
            kind: ScopeKind::Parenthesis(BoolOp::Or),
            conditions: Vec::new(),
        });
        self
    }

    /// Opens a join whose `ON` clause is built from the following conditions.
    pub fn join_scope(
        &mut self,
        join_type: JoinType,
        target: &str,
        alias: Option<&str>,
    ) -> OrmResult<&mut Self> {
        let (table, alias) = self.translator.join_target(target, alias)?;
        self.scopes.push(Scope {
            kind: ScopeKind::Join {
                join_type,
                table,
                alias,
            },
            conditions: Vec::new(),
        });
        Ok(self)
    }

    /// Closes the innermost open scope.
    ///
    /// A parenthesis merges `(conditions)` into the enclosing scope (nothing
    /// when it is empty); a join scope adds the join.
    ///
    /// # Errors
    ///
    /// Returns [`OrmError::InvalidArgument`] when no scope is open.
    pub fn close(&mut self) -> OrmResult<&mut Self> {
        let scope = self
            .scopes
            .pop()
            .ok_or_else(|| OrmError::InvalidArgument("No open parenthesis or join to close".to_string()))?;
        let rendered = render_conditions(&scope.conditions);
        match scope.kind {
            ScopeKind::Parenthesis(op) => {
                if !rendered.is_empty() {
                    self.push_condition(op, format!("({rendered})"));
                }
            }
            ScopeKind::Join {
                join_type,
                table,
                alias,
            } => {
                self.joins
                    .push(render_join(join_type, &table, alias.as_deref(), &rendered));
            }
        }
        Ok(self)
    }

    /// The number of scopes that are still open.
    pub fn open_scopes(&self) -> usize {
        self.scopes.len()
    }

    // ── JOIN ─────────────────────────────────────────────────────────

    /// Adds a join of any type. An empty `expression` renders no `ON` clause.
    pub fn join_with(
        &mut self,
        join_type: JoinType,
        target: &str,
        expression: &str,
        alias: Option<&str>,
        args: &[Value],
    ) -> OrmResult<&mut Self> {
        let (table, alias) = self.translator.join_target(target, alias)?;
        let on = if expression.is_empty() {
            String::new()
        } else {
            self.translate(expression, args)?
        };
        self.joins
            .push(render_join(join_type, &table, alias.as_deref(), &on));
        Ok(self)
    }

    /// `JOIN target [AS alias] ON expression`.
    pub fn join(
        &mut self,
        target: &str,
        expression: &str,
        alias: Option<&str>,
        args: &[Value],
    ) -> OrmResult<&mut Self> {
        self.join_with(JoinType::Inner, target, expression, alias, args)
    }

    /// `LEFT JOIN target [AS alias] ON expression`.
    pub fn left_join(
        &mut self,
        target: &str,
        expression: &str,
        alias: Option<&str>,
        args: &[Value],
    ) -> OrmResult<&mut Self> {
        self.join_with(JoinType::Left, target, expression, alias, args)
    }

    /// `RIGHT JOIN target [AS alias] ON expression`.
    pub fn right_join(
        &mut self,
        target: &str,
        expression: &str,
        alias: Option<&str>,
        args: &[Value],
    ) -> OrmResult<&mut Self> {
        self.join_with(JoinType::Right, target, expression, alias, args)
    }

    /// `FULL JOIN target [AS alias] ON expression`.
    pub fn full_join(
        &mut self,
        target: &str,
        expression: &str,
        alias: Option<&str>,
        args: &[Value],
    ) -> OrmResult<&mut Self> {
        self.join_with(JoinType::Full, target, expression, alias, args)
    }

    // ── Columns, grouping, ordering, paging ──────────────────────────

    /// Replaces the selected columns. The columns are used verbatim.
    pub fn columns<I, S>(&mut self, columns: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.columns = columns.into_iter().map(Into::into).collect();
        self
    }

    /// Adds a selected column or expression, optionally aliased.
    pub fn column(
        &mut self,
        expression: &str,
        args: &[Value],
        alias: Option<&str>,
    ) -> OrmResult<&mut Self> {
        let mut column = self.translate(expression, args)?;
        if let Some(alias) = alias {
            column.push_str(&format!(" AS {alias}"));
        }
        self.columns.push(column);
        Ok(self)
    }

    /// Adds a select modifier such as `DISTINCT`.
    pub fn modifier(&mut self, modifier: impl Into<String>) -> &mut Self {
        self.modifiers.push(modifier.into());
        self
    }

    /// Adds a `GROUP BY` expression.
    pub fn group_by(&mut self, expression: &str, args: &[Value]) -> OrmResult<&mut Self> {
        let group = self.translate(expression, args)?;
        self.groups.push(group);
        Ok(self)
    }

    /// Adds an `ORDER BY` expression.
    pub fn order_by(
        &mut self,
        expression: &str,
        direction: Direction,
        args: &[Value],
    ) -> OrmResult<&mut Self> {
        let order = self.translate(expression, args)?;
        self.orders.push(format!("{order} {direction}"));
        Ok(self)
    }

    /// Limits the number of rows.
    pub fn limit(&mut self, limit: u64) -> &mut Self {
        self.limit = Some(limit);
        self
    }

    /// Skips rows. Only rendered together with a limit.
    pub fn offset(&mut self, offset: u64) -> &mut Self {
        self.offset = Some(offset);
        self
    }

    /// The rendered `WHERE` conditions, without the keyword.
    pub fn where_conditions(&self) -> String {
        render_conditions(&self.conditions)
    }

    /// Assembles the statement.
    ///
    /// Scopes that are still open are not rendered.
    pub fn get_query(&self) -> String {
        if !self.scopes.is_empty() {
            tracing::warn!(
                open_scopes = self.scopes.len(),
                table = %self.table,
                "rendering query with unclosed scopes; their conditions are dropped"
            );
        }

        let mut sql = String::from("SELECT ");
        for modifier in &self.modifiers {
            sql.push_str(modifier);
            sql.push(' ');
        }
        if self.columns.is_empty() {
            sql.push('*');
        } else {
            sql.push_str(&self.columns.join(", "));
        }

        sql.push_str(" FROM ");
        sql.push_str(&self.table);
        if let Some(alias) = &self.alias {
            sql.push_str(" AS ");
            sql.push_str(alias);
        }

        for join in &self.joins {
            sql.push(' ');
            sql.push_str(join);
        }

        if !self.conditions.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&render_conditions(&self.conditions));
        }

        if !self.groups.is_empty() {
            sql.push_str(" GROUP BY ");
            sql.push_str(&self.groups.join(", "));
        }

        if !self.orders.is_empty() {
            sql.push_str(" ORDER BY ");
            sql.push_str(&self.orders.join(", "));
        }

        if let Some(limit) = self.limit {
            sql.push_str(&format!(" LIMIT {limit}"));
            if let Some(offset) = self.offset {
                sql.push_str(&format!(" OFFSET {offset}"));
            }
        }

        sql
    }
}
