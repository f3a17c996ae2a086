//! Statement builder
//!
//! Statements carry the restrictions spliced in by the authorization
//! pipeline. A restriction is written against its entity's base table and
//! applied to every relation in the statement backed by that table, aliases
//! included.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use rowgate_common::{Row, Value};
use tracing::debug;

use crate::expr::{and_, BindParam, BoolOp, Expr, ToExpr};
use crate::schema::{Entity, Relation, Table};

/// A filter scoped to an entity
#[derive(Debug, Clone, PartialEq)]
pub struct Restriction {
    pub scope: Arc<Entity>,
    pub predicate: Expr,
}

impl Restriction {
    #[must_use]
    pub fn new(scope: Arc<Entity>, predicate: Expr) -> Self {
        Self { scope, predicate }
    }

    /// Unrestricted access to the entity
    #[must_use]
    pub fn allow(scope: Arc<Entity>) -> Self {
        Self::new(scope, Expr::True)
    }

    /// No access to the entity
    #[must_use]
    pub fn deny(scope: Arc<Entity>) -> Self {
        Self::new(scope, Expr::False)
    }

    #[must_use]
    pub fn is_tautology(&self) -> bool {
        self.predicate.is_tautology()
    }
}

/// A FROM-clause item
#[derive(Debug, Clone, PartialEq)]
pub enum Selectable {
    Table(Arc<Table>),
    Join(Box<Join>),
    Alias(Box<Alias>),
    /// A named subquery in the FROM list
    Derived { name: String, query: Box<Select> },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Join {
    pub left: Selectable,
    pub right: Selectable,
    pub on: Option<Expr>,
    pub outer: bool,
}

/// An aliased FROM item
#[derive(Debug, Clone, PartialEq)]
pub struct Alias {
    name: String,
    element: Selectable,
}

impl Alias {
    pub fn new(name: impl Into<String>, element: impl Into<Selectable>) -> Self {
        Self {
            name: name.into(),
            element: element.into(),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn element(&self) -> &Selectable {
        &self.element
    }

    #[must_use]
    pub fn relation(&self) -> Relation {
        Relation::Alias(self.name.clone())
    }

    /// Column expression qualified by the alias
    #[must_use]
    pub fn c(&self, column: &str) -> Expr {
        Expr::Column(self.relation().column(column))
    }
}

impl Selectable {
    fn collect_bind_keys(&self, out: &mut HashSet<String>) {
        match self {
            Selectable::Join(join) => {
                join.left.collect_bind_keys(out);
                join.right.collect_bind_keys(out);
                if let Some(on) = &join.on {
                    out.extend(on.bind_keys().into_iter().map(str::to_string));
                }
            }
            Selectable::Alias(alias) => alias.element.collect_bind_keys(out),
            Selectable::Table(_) | Selectable::Derived { .. } => {}
        }
    }

    /// Relations exposed by this item, with the table backing each
    #[must_use]
    pub fn relations(&self) -> Vec<(Relation, Arc<Table>)> {
        match self {
            Selectable::Table(table) => vec![(table.relation(), table.clone())],
            Selectable::Join(join) => {
                let mut out = join.left.relations();
                out.extend(join.right.relations());
                out
            }
            Selectable::Alias(alias) => alias
                .element
                .relations()
                .into_iter()
                .next()
                .map(|(_, table)| (alias.relation(), table))
                .into_iter()
                .collect(),
            Selectable::Derived { .. } => Vec::new(),
        }
    }
}

impl From<Arc<Table>> for Selectable {
    fn from(table: Arc<Table>) -> Self {
        Selectable::Table(table)
    }
}

impl From<&Arc<Table>> for Selectable {
    fn from(table: &Arc<Table>) -> Self {
        Selectable::Table(table.clone())
    }
}

impl From<Alias> for Selectable {
    fn from(alias: Alias) -> Self {
        Selectable::Alias(Box::new(alias))
    }
}

impl From<&Alias> for Selectable {
    fn from(alias: &Alias) -> Self {
        Selectable::Alias(Box::new(alias.clone()))
    }
}

impl From<Join> for Selectable {
    fn from(join: Join) -> Self {
        Selectable::Join(Box::new(join))
    }
}

fn keys_of<'a>(exprs: impl IntoIterator<Item = &'a Expr>) -> HashSet<String> {
    exprs
        .into_iter()
        .flat_map(Expr::bind_keys)
        .map(str::to_string)
        .collect()
}

/// Predicates of every restriction, requalified onto each matching relation
///
/// Generated parameters are renumbered past the keys in `taken`.
fn restriction_predicates(
    restrictions: &[Restriction],
    relations: &[(Relation, Arc<Table>)],
    taken: &mut HashSet<String>,
) -> Vec<Expr> {
    let mut out = Vec::new();
    for restriction in restrictions {
        let base = restriction.scope.table().relation();
        let mut applied = false;
        for (relation, table) in relations {
            if table == restriction.scope.table() {
                out.push(
                    restriction
                        .predicate
                        .requalify(&base, relation)
                        .with_unique_binds(taken),
                );
                applied = true;
            }
        }
        if !applied {
            debug!(
                entity = restriction.scope.name(),
                "Restriction does not match any relation in the statement"
            );
        }
    }
    out
}

fn conjunction(mut clauses: Vec<Expr>) -> Option<Expr> {
    match clauses.len() {
        0 => None,
        1 => clauses.pop(),
        _ => Some(and_(clauses)),
    }
}

/// Add a clause to an optional WHERE, keeping one flat conjunction
fn conjoin(existing: Option<Expr>, clause: Expr) -> Expr {
    match existing {
        None => clause,
        Some(Expr::Clauses {
            operator: BoolOp::And,
            mut clauses,
        }) => {
            clauses.push(clause);
            Expr::Clauses {
                operator: BoolOp::And,
                clauses,
            }
        }
        Some(other) => and_([other, clause]),
    }
}

fn bind_row(row: Row) -> Vec<(String, Expr)> {
    row.into_iter()
        .map(|(column, value)| {
            let param = Expr::Bind(BindParam::new(column.clone(), Some(value)));
            (column, param)
        })
        .collect()
}

/// Start a SELECT over a FROM item
pub fn select(from: impl Into<Selectable>) -> Select {
    Select::new().select_from(from)
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Select {
    columns: Vec<Expr>,
    froms: Vec<Selectable>,
    where_clause: Option<Expr>,
    restrictions: Vec<Restriction>,
}

impl Select {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn column(mut self, expr: Expr) -> Self {
        self.columns.push(expr);
        self
    }

    /// Add another FROM item
    #[must_use]
    pub fn select_from(mut self, from: impl Into<Selectable>) -> Self {
        self.froms.push(from.into());
        self
    }

    /// Join onto the last FROM item
    #[must_use]
    pub fn join(self, right: impl Into<Selectable>, on: Expr) -> Self {
        self.add_join(right.into(), Some(on), false)
    }

    #[must_use]
    pub fn outer_join(self, right: impl Into<Selectable>, on: Expr) -> Self {
        self.add_join(right.into(), Some(on), true)
    }

    fn add_join(mut self, right: Selectable, on: Option<Expr>, outer: bool) -> Self {
        let on = on.map(|on| on.with_unique_binds(&mut self.bind_keys()));
        match self.froms.pop() {
            Some(left) => self.froms.push(Selectable::Join(Box::new(Join {
                left,
                right,
                on,
                outer,
            }))),
            None => self.froms.push(right),
        }
        self
    }

    #[must_use]
    pub fn filter(mut self, clause: Expr) -> Self {
        let clause = clause.with_unique_binds(&mut self.bind_keys());
        self.where_clause = Some(conjoin(self.where_clause.take(), clause));
        self
    }

    /// Keys of every bound parameter in columns, join conditions and WHERE
    #[must_use]
    pub fn bind_keys(&self) -> HashSet<String> {
        let mut keys = keys_of(self.columns.iter().chain(&self.where_clause));
        for from in &self.froms {
            from.collect_bind_keys(&mut keys);
        }
        keys
    }

    #[must_use]
    pub fn columns(&self) -> &[Expr] {
        &self.columns
    }

    #[must_use]
    pub fn froms(&self) -> &[Selectable] {
        &self.froms
    }

    #[must_use]
    pub fn where_clause(&self) -> Option<&Expr> {
        self.where_clause.as_ref()
    }

    #[must_use]
    pub fn restrictions(&self) -> &[Restriction] {
        &self.restrictions
    }

    pub fn restrict(&mut self, restriction: Restriction) {
        self.restrictions.push(restriction);
    }

    #[must_use]
    pub fn relations(&self) -> Vec<(Relation, Arc<Table>)> {
        self.froms.iter().flat_map(Selectable::relations).collect()
    }

    /// WHERE clause with every restriction applied
    #[must_use]
    pub fn effective_where(&self) -> Option<Expr> {
        let mut taken = self.bind_keys();
        let mut clauses: Vec<Expr> = self.where_clause.iter().cloned().collect();
        clauses.extend(restriction_predicates(
            &self.restrictions,
            &self.relations(),
            &mut taken,
        ));
        conjunction(clauses)
    }
}

/// Values clause of an INSERT
#[derive(Debug, Clone, PartialEq)]
pub enum InsertValues {
    Empty,
    /// One row as column/value pairs
    Single(Vec<(String, Expr)>),
    /// One row positionally, in table column order
    Tuple(Vec<Expr>),
    /// Several rows
    Multi(Vec<Vec<(String, Expr)>>),
    FromSelect { columns: Vec<String>, query: Box<Select> },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Insert {
    table: Arc<Table>,
    values: InsertValues,
    restrictions: Vec<Restriction>,
}

impl Insert {
    #[must_use]
    pub fn new(table: Arc<Table>) -> Self {
        Self {
            table,
            values: InsertValues::Empty,
            restrictions: Vec::new(),
        }
    }

    /// Set one column of a single-row insert
    #[must_use]
    pub fn value(mut self, column: &str, value: impl ToExpr) -> Self {
        let expr = value.to_expr(column);
        if !matches!(self.values, InsertValues::Single(_)) {
            self.values = InsertValues::Single(Vec::new());
        }
        if let InsertValues::Single(pairs) = &mut self.values {
            pairs.push((column.to_string(), expr));
        }
        self
    }

    /// Single-row insert from a mapping
    #[must_use]
    pub fn values(mut self, row: Row) -> Self {
        self.values = InsertValues::Single(bind_row(row));
        self
    }

    /// Single-row insert in table column order
    #[must_use]
    pub fn tuple(mut self, values: Vec<Value>) -> Self {
        let exprs = values
            .into_iter()
            .enumerate()
            .map(|(i, value)| {
                let key = self
                    .table
                    .columns()
                    .get(i)
                    .cloned()
                    .unwrap_or_else(|| format!("param_{}", i + 1));
                Expr::Bind(BindParam::new(key, Some(value)))
            })
            .collect();
        self.values = InsertValues::Tuple(exprs);
        self
    }

    #[must_use]
    pub fn rows(mut self, rows: Vec<Row>) -> Self {
        self.values = InsertValues::Multi(rows.into_iter().map(bind_row).collect());
        self
    }

    #[must_use]
    pub fn from_select(mut self, columns: &[&str], query: Select) -> Self {
        self.values = InsertValues::FromSelect {
            columns: columns.iter().map(|c| (*c).to_string()).collect(),
            query: Box::new(query),
        };
        self
    }

    #[must_use]
    pub fn table(&self) -> &Arc<Table> {
        &self.table
    }

    #[must_use]
    pub fn insert_values(&self) -> &InsertValues {
        &self.values
    }

    /// The embedded query of an INSERT ... SELECT
    pub fn source_query_mut(&mut self) -> Option<&mut Select> {
        match &mut self.values {
            InsertValues::FromSelect { query, .. } => Some(query.as_mut()),
            _ => None,
        }
    }

    #[must_use]
    pub fn restrictions(&self) -> &[Restriction] {
        &self.restrictions
    }

    pub fn restrict(&mut self, restriction: Restriction) {
        self.restrictions.push(restriction);
    }

    /// Predicate every inserted row has to satisfy
    #[must_use]
    pub fn check_predicate(&self) -> Option<Expr> {
        let relations = [(self.table.relation(), self.table.clone())];
        conjunction(restriction_predicates(
            &self.restrictions,
            &relations,
            &mut HashSet::new(),
        ))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Update {
    table: Arc<Table>,
    values: Vec<(String, Expr)>,
    where_clause: Option<Expr>,
    restrictions: Vec<Restriction>,
}

impl Update {
    #[must_use]
    pub fn new(table: Arc<Table>) -> Self {
        Self {
            table,
            values: Vec::new(),
            where_clause: None,
            restrictions: Vec::new(),
        }
    }

    #[must_use]
    pub fn set(mut self, column: &str, value: impl ToExpr) -> Self {
        let expr = value.to_expr(column).with_unique_binds(&mut self.bind_keys());
        self.values.push((column.to_string(), expr));
        self
    }

    #[must_use]
    pub fn filter(mut self, clause: Expr) -> Self {
        let clause = clause.with_unique_binds(&mut self.bind_keys());
        self.where_clause = Some(conjoin(self.where_clause.take(), clause));
        self
    }

    /// Keys of every bound parameter in assigned values and WHERE
    #[must_use]
    pub fn bind_keys(&self) -> HashSet<String> {
        keys_of(
            self.values
                .iter()
                .map(|(_, expr)| expr)
                .chain(&self.where_clause),
        )
    }

    #[must_use]
    pub fn table(&self) -> &Arc<Table> {
        &self.table
    }

    #[must_use]
    pub fn values(&self) -> &[(String, Expr)] {
        &self.values
    }

    #[must_use]
    pub fn where_clause(&self) -> Option<&Expr> {
        self.where_clause.as_ref()
    }

    #[must_use]
    pub fn restrictions(&self) -> &[Restriction] {
        &self.restrictions
    }

    pub fn restrict(&mut self, restriction: Restriction) {
        self.restrictions.push(restriction);
    }

    #[must_use]
    pub fn effective_where(&self) -> Option<Expr> {
        let relations = [(self.table.relation(), self.table.clone())];
        let mut taken = self.bind_keys();
        let mut clauses: Vec<Expr> = self.where_clause.iter().cloned().collect();
        clauses.extend(restriction_predicates(&self.restrictions, &relations, &mut taken));
        conjunction(clauses)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Delete {
    table: Arc<Table>,
    where_clause: Option<Expr>,
    restrictions: Vec<Restriction>,
}

impl Delete {
    #[must_use]
    pub fn new(table: Arc<Table>) -> Self {
        Self {
            table,
            where_clause: None,
            restrictions: Vec::new(),
        }
    }

    #[must_use]
    pub fn filter(mut self, clause: Expr) -> Self {
        let clause = clause.with_unique_binds(&mut keys_of(&self.where_clause));
        self.where_clause = Some(conjoin(self.where_clause.take(), clause));
        self
    }

    #[must_use]
    pub fn table(&self) -> &Arc<Table> {
        &self.table
    }

    #[must_use]
    pub fn where_clause(&self) -> Option<&Expr> {
        self.where_clause.as_ref()
    }

    #[must_use]
    pub fn restrictions(&self) -> &[Restriction] {
        &self.restrictions
    }

    pub fn restrict(&mut self, restriction: Restriction) {
        self.restrictions.push(restriction);
    }

    #[must_use]
    pub fn effective_where(&self) -> Option<Expr> {
        let relations = [(self.table.relation(), self.table.clone())];
        let mut taken = keys_of(&self.where_clause);
        let mut clauses: Vec<Expr> = self.where_clause.iter().cloned().collect();
        clauses.extend(restriction_predicates(&self.restrictions, &relations, &mut taken));
        conjunction(clauses)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatementKind {
    Select,
    Insert,
    Update,
    Delete,
}

impl fmt::Display for StatementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            StatementKind::Select => "select",
            StatementKind::Insert => "insert",
            StatementKind::Update => "update",
            StatementKind::Delete => "delete",
        })
    }
}

/// Any executable statement
#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    Select(Select),
    Insert(Insert),
    Update(Update),
    Delete(Delete),
}

impl Statement {
    #[must_use]
    pub fn kind(&self) -> StatementKind {
        match self {
            Statement::Select(_) => StatementKind::Select,
            Statement::Insert(_) => StatementKind::Insert,
            Statement::Update(_) => StatementKind::Update,
            Statement::Delete(_) => StatementKind::Delete,
        }
    }

    pub fn restrict(&mut self, restriction: Restriction) {
        match self {
            Statement::Select(s) => s.restrict(restriction),
            Statement::Insert(s) => s.restrict(restriction),
            Statement::Update(s) => s.restrict(restriction),
            Statement::Delete(s) => s.restrict(restriction),
        }
    }

    #[must_use]
    pub fn restrictions(&self) -> &[Restriction] {
        match self {
            Statement::Select(s) => s.restrictions(),
            Statement::Insert(s) => s.restrictions(),
            Statement::Update(s) => s.restrictions(),
            Statement::Delete(s) => s.restrictions(),
        }
    }
}

impl From<Select> for Statement {
    fn from(s: Select) -> Self {
        Statement::Select(s)
    }
}

impl From<Insert> for Statement {
    fn from(s: Insert) -> Self {
        Statement::Insert(s)
    }
}

impl From<Update> for Statement {
    fn from(s: Update) -> Self {
        Statement::Update(s)
    }
}

impl From<Delete> for Statement {
    fn from(s: Delete) -> Self {
        Statement::Delete(s)
    }
}
