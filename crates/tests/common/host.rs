//! In-memory host runtime
//!
//! Tables are plain row vectors. Sessions track objects, flush them and
//! drive the lifecycle listeners the way an ORM session would.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use rowgate::{ExecuteState, FlushDecision, HostEvents, LifecycleListener, TxnHandle};
use rowgate_common::{Error, Parameters, Result, Row, Session, Value};
use rowgate_query::{
    select, Entity, EntityRegistry, Expr, FlushContext, InsertValues, InstanceState,
    ObjectStatus, Select, Selectable, Statement, Table,
};
use serde_json::json;

use super::eval::{Evaluator, Scope};

type Tables = HashMap<String, Vec<Row>>;

pub struct MemoryHost {
    registry: Arc<EntityRegistry>,
    listeners: Vec<Arc<dyn LifecycleListener>>,
    tables: Mutex<Tables>,
    bind_registry: bool,
}

impl HostEvents for MemoryHost {
    fn listen(&mut self, listener: Arc<dyn LifecycleListener>) {
        self.listeners.push(listener);
    }
}

impl MemoryHost {
    pub fn new(registry: Arc<EntityRegistry>) -> Self {
        Self {
            registry,
            listeners: Vec::new(),
            tables: Mutex::new(Tables::new()),
            bind_registry: true,
        }
    }

    /// Stop binding the entity registry to executed statements
    pub fn without_registry(mut self) -> Self {
        self.bind_registry = false;
        self
    }

    pub fn seed(&mut self, table: &str, rows: Vec<Row>) {
        self.tables.lock().entry(table.to_string()).or_default().extend(rows);
    }

    pub fn rows(&self, table: &str) -> Vec<Row> {
        self.tables.lock().get(table).cloned().unwrap_or_default()
    }

    pub fn session(&self, session: Session) -> MemorySession<'_> {
        MemorySession {
            host: self,
            session,
            txn: None,
            snapshot: None,
            touched: Vec::new(),
            tracked: Vec::new(),
        }
    }

    /// Execute a statement as written, bypassing every listener
    pub fn run(&self, statement: &Statement, parameters: &Parameters) -> Result<Vec<Row>> {
        let mut tables = self.tables.lock();
        let eval = Evaluator::new(parameters);
        match statement {
            Statement::Select(query) => Ok(run_select(&tables, &eval, query)
                .into_iter()
                .map(|(row, _)| row)
                .collect()),
            Statement::Insert(insert) => {
                let table = insert.table();
                let rows = match insert.insert_values() {
                    InsertValues::Empty => match parameters {
                        Parameters::None => Vec::new(),
                        Parameters::Keyed(row) => vec![row.clone()],
                        Parameters::Positional(rows) => rows.clone(),
                    },
                    InsertValues::Single(pairs) => vec![evaluate_pairs(&eval, pairs)],
                    InsertValues::Tuple(values) => vec![table
                        .columns()
                        .iter()
                        .cloned()
                        .zip(values.iter().map(|v| eval.value(v, &Scope::new())))
                        .collect()],
                    InsertValues::Multi(rows) => rows.iter().map(|pairs| evaluate_pairs(&eval, pairs)).collect(),
                    InsertValues::FromSelect { columns, query } => run_select(&tables, &eval, query)
                        .into_iter()
                        .map(|(_, values)| columns.iter().cloned().zip(values).collect())
                        .collect(),
                };

                if let Some(check) = insert.check_predicate() {
                    for row in &rows {
                        let scope = Scope::from([(table.relation(), row.clone())]);
                        if !eval.truthy(&check, &scope) {
                            return Err(Error::Policy(format!("row violates insert restriction on {}", table.name())));
                        }
                    }
                }
                tables.entry(table.name().to_string()).or_default().extend(rows.clone());
                Ok(rows)
            }
            Statement::Update(update) => {
                let table = update.table();
                let predicate = update.effective_where();
                let mut affected = Vec::new();
                for row in tables.entry(table.name().to_string()).or_default() {
                    let scope = Scope::from([(table.relation(), row.clone())]);
                    if predicate.as_ref().map_or(true, |p| eval.truthy(p, &scope)) {
                        for (column, value) in update.values() {
                            row.insert(column.clone(), eval.value(value, &scope));
                        }
                        affected.push(row.clone());
                    }
                }
                Ok(affected)
            }
            Statement::Delete(delete) => {
                let table = delete.table();
                let predicate = delete.effective_where();
                let rows = tables.entry(table.name().to_string()).or_default();
                let (removed, kept): (Vec<Row>, Vec<Row>) = std::mem::take(rows).into_iter().partition(|row| {
                    let scope = Scope::from([(table.relation(), row.clone())]);
                    predicate.as_ref().map_or(true, |p| eval.truthy(p, &scope))
                });
                *rows = kept;
                Ok(removed)
            }
        }
    }
}

fn evaluate_pairs(eval: &Evaluator<'_>, pairs: &[(String, Expr)]) -> Row {
    pairs
        .iter()
        .map(|(column, value)| (column.clone(), eval.value(value, &Scope::new())))
        .collect()
}

fn join_conditions(from: &Selectable, out: &mut Vec<Expr>) {
    if let Selectable::Join(join) = from {
        join_conditions(&join.left, out);
        join_conditions(&join.right, out);
        out.extend(join.on.clone());
    }
}

/// Matching rows, each as the first relation's row plus projected values
fn run_select(tables: &Tables, eval: &Evaluator<'_>, query: &Select) -> Vec<(Row, Vec<Value>)> {
    let relations = query.relations();
    let Some((first, first_table)) = relations.first().cloned() else {
        return Vec::new();
    };

    let mut scopes = vec![Scope::new()];
    for (relation, table) in &relations {
        let rows = tables.get(table.name()).cloned().unwrap_or_default();
        let mut next = Vec::with_capacity(scopes.len() * rows.len());
        for scope in &scopes {
            for row in &rows {
                let mut scope = scope.clone();
                scope.insert(relation.clone(), row.clone());
                next.push(scope);
            }
        }
        scopes = next;
    }

    let mut predicates = Vec::new();
    for from in query.froms() {
        join_conditions(from, &mut predicates);
    }
    predicates.extend(query.effective_where());

    scopes
        .into_iter()
        .filter(|scope| predicates.iter().all(|p| eval.truthy(p, scope)))
        .map(|scope| {
            let row = scope.get(&first).cloned().unwrap_or_default();
            let values = if query.columns().is_empty() {
                first_table
                    .columns()
                    .iter()
                    .map(|c| row.get(c).cloned().unwrap_or(Value::Null))
                    .collect()
            } else {
                query.columns().iter().map(|c| eval.value(c, &scope)).collect()
            };
            (row, values)
        })
        .collect()
}

/// Index of an object tracked by a [`MemorySession`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObjectId(usize);

/// A unit of work against a [`MemoryHost`]
///
/// A transaction begins with the first statement or flush. Dropping the
/// session with a transaction open rolls it back. Rollback restores only
/// the tables this session wrote to.
pub struct MemorySession<'h> {
    host: &'h MemoryHost,
    session: Session,
    txn: Option<TxnHandle>,
    snapshot: Option<Tables>,
    touched: Vec<String>,
    tracked: Vec<InstanceState>,
}

impl MemorySession<'_> {
    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn txn(&self) -> Option<&TxnHandle> {
        self.txn.as_ref()
    }

    pub fn in_transaction(&self) -> bool {
        self.txn.is_some()
    }

    fn touch(&mut self, table: &str) {
        if !self.touched.iter().any(|t| t == table) {
            self.touched.push(table.to_string());
        }
    }

    fn begin(&mut self) -> &TxnHandle {
        if self.txn.is_none() {
            self.snapshot = Some(self.host.tables.lock().clone());
        }
        self.txn.get_or_insert_with(TxnHandle::begin)
    }

    /// Execute a statement through every listener
    ///
    /// Listeners hear about the execution afterwards only when it succeeded.
    pub fn execute(&mut self, statement: impl Into<Statement>, parameters: Parameters) -> Result<Vec<Row>> {
        let host = self.host;
        let mut state = ExecuteState::new(statement).with_parameters(parameters);
        if host.bind_registry {
            state = state.with_registry(host.registry.clone());
        }
        let session = self.session.clone();
        let txn = self.begin();
        for listener in &host.listeners {
            listener.on_execute(&session, txn, &mut state)?;
        }
        match &state.statement {
            Statement::Select(_) => {}
            Statement::Insert(insert) => self.touch(insert.table().name()),
            Statement::Update(update) => self.touch(update.table().name()),
            Statement::Delete(delete) => self.touch(delete.table().name()),
        }
        let rows = host.run(&state.statement, &state.parameters)?;

        let txn = self.begin();
        for listener in &host.listeners {
            listener.after_execute(&session, txn, &mut state)?;
        }
        Ok(rows)
    }

    /// Load one object by primary key through the hooks
    pub fn load(&mut self, entity: &Arc<Entity>, id: i64) -> Result<Option<ObjectId>> {
        let query = select(entity.table()).filter(entity.c("id").equals(id));
        let rows = self.execute(query, Parameters::None)?;
        Ok(rows.into_iter().next().map(|row| {
            self.tracked.push(InstanceState::persistent(entity.clone(), row));
            ObjectId(self.tracked.len() - 1)
        }))
    }

    pub fn add(&mut self, entity: &Arc<Entity>, values: Row) -> ObjectId {
        self.tracked.push(InstanceState::pending(entity.clone(), values));
        ObjectId(self.tracked.len() - 1)
    }

    pub fn set(&mut self, id: ObjectId, column: &str, value: impl Into<Value>) {
        self.tracked[id.0].set(column, value);
    }

    pub fn delete(&mut self, id: ObjectId) {
        self.tracked[id.0].status = ObjectStatus::Deleted;
    }

    pub fn object(&self, id: ObjectId) -> &InstanceState {
        &self.tracked[id.0]
    }

    /// Write every dirty object
    pub fn flush(&mut self) -> Result<FlushDecision> {
        let dirty: Vec<usize> = self
            .tracked
            .iter()
            .enumerate()
            .filter(|(_, s)| matches!(s.status, ObjectStatus::Pending | ObjectStatus::Deleted) || s.is_modified())
            .map(|(i, _)| i)
            .collect();
        if dirty.is_empty() {
            return Ok(FlushDecision::Proceed);
        }

        let host = self.host;
        let session = self.session.clone();
        let mut flush = FlushContext::new(dirty.iter().map(|&i| self.tracked[i].clone()).collect());

        let txn = self.begin();
        let mut decision = FlushDecision::Proceed;
        for listener in &host.listeners {
            decision = listener.before_flush(&session, txn, &flush)?;
            if decision.is_rollback() {
                break;
            }
        }
        if decision.is_rollback() {
            self.rollback();
            return Ok(decision);
        }

        for state in &flush.states {
            self.touch(state.entity.table().name());
        }
        {
            let mut tables = host.tables.lock();
            for state in &mut flush.states {
                let table = state.entity.table().clone();
                let rows = tables.entry(table.name().to_string()).or_default();
                match state.status {
                    ObjectStatus::Pending => {
                        assign_key(&table, rows, &mut state.values);
                        rows.push(state.values.clone());
                        state.mark_inserted();
                    }
                    ObjectStatus::Deleted => rows.retain(|row| !same_identity(&table, row, &state.values)),
                    _ => {
                        for row in rows.iter_mut().filter(|row| same_identity(&table, row, &state.values)) {
                            row.extend(state.changes.clone());
                        }
                    }
                }
            }
        }

        let txn = self.begin();
        for listener in &host.listeners {
            listener.after_flush(&session, txn, &flush)?;
        }
        for listener in &host.listeners {
            listener.after_flush_postexec(&session, txn, &flush)?;
        }

        for (index, mut state) in dirty.into_iter().zip(flush.states) {
            state.changes.clear();
            state.inserted = false;
            if state.status == ObjectStatus::Deleted {
                state.status = ObjectStatus::Detached;
            }
            self.tracked[index] = state;
        }
        Ok(FlushDecision::Proceed)
    }

    /// Flush, then commit the open transaction
    pub fn commit(&mut self) -> Result<()> {
        if let FlushDecision::Rollback { reason } = self.flush()? {
            return Err(Error::Policy(reason));
        }
        let Some(txn) = self.txn.take() else {
            return Ok(());
        };
        self.snapshot = None;
        self.touched.clear();
        for listener in &self.host.listeners {
            listener.after_commit(&self.session, &txn)?;
        }
        Ok(())
    }

    /// Restore the tables and drop every tracked object
    pub fn rollback(&mut self) {
        let Some(txn) = self.txn.take() else {
            return;
        };
        if let Some(mut snapshot) = self.snapshot.take() {
            let mut tables = self.host.tables.lock();
            for table in self.touched.drain(..) {
                match snapshot.remove(&table) {
                    Some(rows) => tables.insert(table, rows),
                    None => tables.remove(&table),
                };
            }
        }
        self.tracked.clear();
        for listener in &self.host.listeners {
            listener.after_rollback(&self.session, &txn);
        }
    }
}

impl Drop for MemorySession<'_> {
    fn drop(&mut self) {
        self.rollback();
    }
}

fn assign_key(table: &Table, rows: &[Row], values: &mut Row) {
    if table.primary_key() != ["id"] || values.get("id").is_some_and(|v| !v.is_null()) {
        return;
    }
    let next = rows
        .iter()
        .filter_map(|row| row.get("id").and_then(Value::as_i64))
        .max()
        .unwrap_or(0)
        + 1;
    values.insert("id".to_string(), json!(next));
}

fn same_identity(table: &Table, row: &Row, values: &Row) -> bool {
    table
        .primary_key()
        .iter()
        .all(|column| row.get(column).is_some() && row.get(column) == values.get(column))
}
