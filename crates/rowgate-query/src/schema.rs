//! Tables, relations and the entity registry

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::expr::Expr;
use crate::statement::Alias;

/// A mapped database table
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Table {
    name: String,
    columns: Vec<String>,
    primary_key: Vec<String>,
}

impl Table {
    pub fn new(name: impl Into<String>, columns: &[&str]) -> Self {
        Self {
            name: name.into(),
            columns: columns.iter().map(|c| (*c).to_string()).collect(),
            primary_key: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_primary_key(mut self, columns: &[&str]) -> Self {
        self.primary_key = columns.iter().map(|c| (*c).to_string()).collect();
        self
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    #[must_use]
    pub fn primary_key(&self) -> &[String] {
        &self.primary_key
    }

    #[must_use]
    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c == name)
    }

    /// The relation this table is addressed by when not aliased
    #[must_use]
    pub fn relation(&self) -> Relation {
        Relation::Table(self.name.clone())
    }

    /// Column expression qualified by this table
    #[must_use]
    pub fn c(&self, column: &str) -> Expr {
        Expr::Column(self.relation().column(column))
    }
}

/// Anything a column can be qualified by
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Relation {
    Table(String),
    Alias(String),
}

impl Relation {
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Relation::Table(name) | Relation::Alias(name) => name,
        }
    }

    #[must_use]
    pub fn is_alias(&self) -> bool {
        matches!(self, Relation::Alias(_))
    }

    #[must_use]
    pub fn column(&self, name: &str) -> ColumnRef {
        ColumnRef {
            relation: self.clone(),
            name: name.to_string(),
        }
    }
}

impl fmt::Display for Relation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A column qualified by its relation
///
/// Two references are the same column exactly when relation and name match.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ColumnRef {
    pub relation: Relation,
    pub name: String,
}

impl fmt::Display for ColumnRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.relation, self.name)
    }
}

/// A mapped entity type
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Entity {
    name: String,
    table: Arc<Table>,
}

impl Entity {
    pub fn new(name: impl Into<String>, table: Arc<Table>) -> Self {
        Self {
            name: name.into(),
            table,
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn table(&self) -> &Arc<Table> {
        &self.table
    }

    /// Column expression on the entity's own table
    #[must_use]
    pub fn c(&self, column: &str) -> Expr {
        self.table.c(column)
    }

    /// Alias the entity's table
    #[must_use]
    pub fn alias(&self, name: &str) -> Alias {
        Alias::new(name, self.table.clone())
    }
}

/// Maps tables to the entities declared on them
#[derive(Debug, Clone, Default)]
pub struct EntityRegistry {
    by_table: HashMap<String, Arc<Entity>>,
}

impl EntityRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an entity, replacing any entity previously mapped to the same table
    pub fn register(&mut self, entity: Entity) -> Arc<Entity> {
        let entity = Arc::new(entity);
        self.by_table
            .insert(entity.table().name().to_string(), entity.clone());
        entity
    }

    /// Entity mapped to a table, if any
    #[must_use]
    pub fn entity_for_table(&self, table: &Table) -> Option<Arc<Entity>> {
        self.by_table
            .get(table.name())
            .filter(|entity| entity.table().as_ref() == table)
            .cloned()
    }

    #[must_use]
    pub fn entity(&self, name: &str) -> Option<Arc<Entity>> {
        self.by_table.values().find(|e| e.name() == name).cloned()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.by_table.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_table.is_empty()
    }
}
