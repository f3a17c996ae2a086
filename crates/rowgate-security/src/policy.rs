//! Row policies and a handler that enforces them

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use futures::future;
use futures::stream::{self, StreamExt};
use parking_lot::RwLock;
use rowgate_common::{Error, Result, Row, Session};
use rowgate_query::{and_, or_, Condition, Entity, Expr, ReferencedEntity, Restriction, StatementKind};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::handler::{AuthorizationHandler, FilterStream};

/// Policy command types
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PolicyCommand {
    #[default]
    All,
    Select,
    Insert,
    Update,
    Delete,
}

impl PolicyCommand {
    /// Check if this command applies to a given statement kind
    #[must_use]
    pub fn applies_to(self, kind: StatementKind) -> bool {
        match self {
            PolicyCommand::All => true,
            PolicyCommand::Select => kind == StatementKind::Select,
            PolicyCommand::Insert => kind == StatementKind::Insert,
            PolicyCommand::Update => kind == StatementKind::Update,
            PolicyCommand::Delete => kind == StatementKind::Delete,
        }
    }
}

/// Builds a policy predicate for a session
///
/// The predicate is written against the entity's own table. `None` means
/// the policy grants this session nothing.
pub type PredicateBuilder = Arc<dyn Fn(&Session, &Entity) -> Option<Expr> + Send + Sync>;

/// Row policy definition
#[derive(Clone)]
pub struct RowPolicy {
    pub name: String,
    /// Name of the entity the policy guards
    pub entity: String,
    pub command: PolicyCommand,
    /// Permissive policies are OR-ed, restrictive ones AND-ed
    pub permissive: bool,
    using: PredicateBuilder,
}

impl RowPolicy {
    pub fn new<F>(name: &str, entity: &str, command: PolicyCommand, using: F) -> Self
    where
        F: Fn(&Session, &Entity) -> Option<Expr> + Send + Sync + 'static,
    {
        Self {
            name: name.to_string(),
            entity: entity.to_string(),
            command,
            permissive: true,
            using: Arc::new(using),
        }
    }

    /// Make policy restrictive
    #[must_use]
    pub fn restrictive(mut self) -> Self {
        self.permissive = false;
        self
    }

    #[must_use]
    pub fn predicate(&self, session: &Session, entity: &Entity) -> Option<Expr> {
        (self.using)(session, entity)
    }
}

impl fmt::Debug for RowPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RowPolicy")
            .field("name", &self.name)
            .field("entity", &self.entity)
            .field("command", &self.command)
            .field("permissive", &self.permissive)
            .finish_non_exhaustive()
    }
}

/// Policy store keyed by entity name
#[derive(Default)]
pub struct PolicyStore {
    policies: RwLock<HashMap<String, Vec<RowPolicy>>>,
}

impl PolicyStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new policy
    pub fn create_policy(&self, policy: RowPolicy) -> Result<()> {
        let mut policies = self.policies.write();
        let entity_policies = policies.entry(policy.entity.clone()).or_default();

        if entity_policies.iter().any(|p| p.name == policy.name) {
            return Err(Error::Policy(format!("Policy '{}' already exists", policy.name)));
        }

        entity_policies.push(policy);
        Ok(())
    }

    /// Drop a policy
    pub fn drop_policy(&self, entity: &str, name: &str) -> Result<()> {
        let mut policies = self.policies.write();
        let Some(entity_policies) = policies.get_mut(entity) else {
            return Err(Error::Policy(format!("No policies found for {entity}")));
        };

        let original_len = entity_policies.len();
        entity_policies.retain(|p| p.name != name);
        if entity_policies.len() == original_len {
            return Err(Error::Policy(format!("Policy '{name}' not found")));
        }
        Ok(())
    }

    #[must_use]
    pub fn get_policies(&self, entity: &str) -> Vec<RowPolicy> {
        self.policies.read().get(entity).cloned().unwrap_or_default()
    }

    /// Policies for an entity that apply to a statement kind
    #[must_use]
    pub fn get_applicable_policies(&self, entity: &str, kind: StatementKind) -> Vec<RowPolicy> {
        self.get_policies(entity)
            .into_iter()
            .filter(|p| p.command.applies_to(kind))
            .collect()
    }
}

/// Authorization handler backed by a [`PolicyStore`]
///
/// An entity without an applicable permissive grant is denied outright.
pub struct PolicyHandler {
    store: Arc<PolicyStore>,
}

impl PolicyHandler {
    #[must_use]
    pub fn new(store: Arc<PolicyStore>) -> Self {
        Self { store }
    }

    #[must_use]
    pub fn store(&self) -> &Arc<PolicyStore> {
        &self.store
    }

    /// Combined restriction for one entity
    #[must_use]
    pub fn restriction(&self, session: &Session, entity: &Arc<Entity>, kind: StatementKind) -> Restriction {
        let policies = self.store.get_applicable_policies(entity.name(), kind);
        let (permissive, restrictive): (Vec<_>, Vec<_>) =
            policies.into_iter().partition(|p| p.permissive);

        let mut grants: Vec<Expr> = permissive
            .iter()
            .filter_map(|p| p.predicate(session, entity))
            .collect();
        if grants.is_empty() {
            debug!(entity = entity.name(), command = %kind, "No permissive policy grants access");
            return Restriction::deny(entity.clone());
        }

        // an unconditional grant absorbs the rest
        if grants.iter().any(Expr::is_tautology) {
            grants = vec![Expr::True];
        }

        let mut clauses = vec![if grants.len() == 1 {
            grants.remove(0)
        } else {
            or_(grants)
        }];
        for policy in &restrictive {
            match policy.predicate(session, entity) {
                Some(predicate) if predicate.is_tautology() => {}
                Some(predicate) => clauses.push(predicate),
                None => {
                    debug!(entity = entity.name(), policy = %policy.name, "Restrictive policy denies access");
                    return Restriction::deny(entity.clone());
                }
            }
        }

        let predicate = if clauses.len() == 1 {
            clauses.remove(0)
        } else {
            and_(clauses)
        };
        Restriction::new(entity.clone(), predicate)
    }

    /// One restriction per distinct entity, built as the stream is pulled
    fn restrictions<'a>(
        &'a self,
        session: &'a Session,
        entities: &'a [ReferencedEntity],
        kind: StatementKind,
    ) -> FilterStream<'a> {
        let mut seen: Vec<String> = Vec::new();
        stream::iter(entities)
            .filter(move |referenced| {
                let first = !seen.iter().any(|name| name == referenced.name());
                if first {
                    seen.push(referenced.name().to_string());
                }
                future::ready(first)
            })
            .map(move |referenced| Ok(self.restriction(session, &referenced.entity, kind)))
            .boxed()
    }
}

impl AuthorizationHandler for PolicyHandler {
    fn before_select<'a>(
        &'a self,
        session: &'a Session,
        entities: &'a [ReferencedEntity],
        _condition: Option<&'a Condition>,
    ) -> FilterStream<'a> {
        self.restrictions(session, entities, StatementKind::Select)
    }

    fn before_insert<'a>(
        &'a self,
        session: &'a Session,
        entity: &'a ReferencedEntity,
        _values: &'a [Row],
    ) -> FilterStream<'a> {
        self.restrictions(session, std::slice::from_ref(entity), StatementKind::Insert)
    }

    fn before_update<'a>(
        &'a self,
        session: &'a Session,
        entities: &'a [ReferencedEntity],
        _condition: Option<&'a Condition>,
        _changes: &'a Row,
    ) -> FilterStream<'a> {
        self.restrictions(session, entities, StatementKind::Update)
    }

    fn before_delete<'a>(
        &'a self,
        session: &'a Session,
        entities: &'a [ReferencedEntity],
        _condition: Option<&'a Condition>,
    ) -> FilterStream<'a> {
        self.restrictions(session, entities, StatementKind::Delete)
    }
}
