//! Entity resolution over FROM items

use std::sync::Arc;

use tracing::debug;

use crate::schema::{ColumnRef, Entity, EntityRegistry, Relation};
use crate::statement::Selectable;

/// An entity together with the relation it is addressed through
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ReferencedEntity {
    pub entity: Arc<Entity>,
    /// The table itself, or an alias of it
    pub selectable: Relation,
}

impl ReferencedEntity {
    #[must_use]
    pub fn new(entity: Arc<Entity>, selectable: Relation) -> Self {
        Self { entity, selectable }
    }

    /// The entity addressed through its own table
    #[must_use]
    pub fn base(entity: Arc<Entity>) -> Self {
        let selectable = entity.table().relation();
        Self { entity, selectable }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        self.entity.name()
    }

    #[must_use]
    pub fn column(&self, name: &str) -> ColumnRef {
        self.selectable.column(name)
    }
}

/// Finds the mapped entities behind FROM items
pub struct EntityResolver<'r> {
    registry: &'r EntityRegistry,
}

impl<'r> EntityResolver<'r> {
    #[must_use]
    pub fn new(registry: &'r EntityRegistry) -> Self {
        Self { registry }
    }

    /// Entities referenced by a FROM item, left to right
    ///
    /// Tables without a mapped entity and unrecognized shapes contribute
    /// nothing. An alias reports the entity of the first item it wraps,
    /// addressed through the alias.
    #[must_use]
    pub fn resolve(&self, selectable: &Selectable) -> Vec<ReferencedEntity> {
        let mut out = Vec::new();
        self.resolve_into(selectable, &mut out);
        out
    }

    fn resolve_into(&self, selectable: &Selectable, out: &mut Vec<ReferencedEntity>) {
        match selectable {
            Selectable::Table(table) => match self.registry.entity_for_table(table) {
                Some(entity) => out.push(ReferencedEntity::new(entity, table.relation())),
                None => debug!(table = table.name(), "Table is not mapped to an entity"),
            },
            Selectable::Join(join) => {
                self.resolve_into(&join.left, out);
                self.resolve_into(&join.right, out);
            }
            Selectable::Alias(alias) => match self.resolve(alias.element()).into_iter().next() {
                Some(inner) => out.push(ReferencedEntity::new(inner.entity, alias.relation())),
                None => debug!(alias = alias.name(), "Alias does not wrap a mapped entity"),
            },
            Selectable::Derived { name, .. } => {
                debug!(selectable = %name, "Unrecognized selectable; no entity resolved");
            }
        }
    }
}
