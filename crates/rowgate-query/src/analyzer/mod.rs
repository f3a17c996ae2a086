//! Statement analyzer
//!
//! Reports which entities a statement touches, under what condition, and
//! with which values.

use rowgate_common::error::{AnalysisError, Result};
use rowgate_common::{Parameters, Row};
use tracing::{debug, warn};

use crate::conditions::{Condition, ConditionExtractor};
use crate::expr::{BoolOp, Expr};
use crate::resolver::{EntityResolver, ReferencedEntity};
use crate::schema::{EntityRegistry, Table};
use crate::statement::{Delete, Insert, InsertValues, Select, Selectable, Statement, Update};

/// Entities and condition of a query
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Analysis {
    /// Referenced entities, one per distinct relation, in FROM order
    pub entities: Vec<ReferencedEntity>,
    pub condition: Option<Condition>,
}

impl Analysis {
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }
}

/// Target, condition and change set of an UPDATE or DELETE
#[derive(Debug, Clone, PartialEq)]
pub struct WriteAnalysis {
    pub entity: ReferencedEntity,
    pub condition: Option<Condition>,
    /// Assigned values; empty for DELETE
    pub changes: Row,
}

/// Target and rows of an INSERT
#[derive(Debug, Clone, PartialEq)]
pub struct InsertAnalysis {
    pub entity: ReferencedEntity,
    /// Inserted rows; empty for INSERT ... SELECT
    pub values: Vec<Row>,
    /// Analysis of the embedded query of an INSERT ... SELECT
    pub source: Option<Analysis>,
}

/// Analyzed statement
#[derive(Debug, Clone, PartialEq)]
pub enum AnalyzedStatement {
    Select(Analysis),
    Insert(InsertAnalysis),
    Update(WriteAnalysis),
    Delete(WriteAnalysis),
}

/// Statement analyzer
pub struct StatementAnalyzer<'r> {
    registry: &'r EntityRegistry,
}

impl<'r> StatementAnalyzer<'r> {
    /// Create a new analyzer
    #[must_use]
    pub fn new(registry: &'r EntityRegistry) -> Self {
        Self { registry }
    }

    /// Analyze any statement
    pub fn analyze(&self, statement: &Statement, parameters: &Parameters) -> Result<AnalyzedStatement> {
        match statement {
            Statement::Select(select) => Ok(AnalyzedStatement::Select(
                self.analyze_select(select, parameters),
            )),
            Statement::Insert(insert) => self
                .analyze_insert(insert, parameters)
                .map(AnalyzedStatement::Insert),
            Statement::Update(update) => self
                .analyze_update(update, parameters)
                .map(AnalyzedStatement::Update),
            Statement::Delete(delete) => self
                .analyze_delete(delete, parameters)
                .map(AnalyzedStatement::Delete),
        }
    }

    /// Entities and combined condition of a SELECT
    ///
    /// Join on-clauses come first in FROM order, the WHERE clause last.
    /// Entities are de-duplicated by the relation they are addressed through.
    #[must_use]
    pub fn analyze_select(&self, select: &Select, parameters: &Parameters) -> Analysis {
        let resolver = EntityResolver::new(self.registry);
        let extractor = ConditionExtractor::new(parameters);

        let mut entities: Vec<ReferencedEntity> = Vec::new();
        let mut conditions = Vec::new();

        for from in select.froms() {
            for referenced in resolver.resolve(from) {
                if entities.iter().all(|e| e.selectable != referenced.selectable) {
                    entities.push(referenced);
                }
            }
            Self::collect_join_conditions(from, &extractor, &mut conditions);
        }

        if let Some(condition) = select.where_clause().and_then(|w| extractor.extract(w)) {
            conditions.push(condition);
        }

        debug!(
            entities = entities.len(),
            conditions = conditions.len(),
            "Analyzed select"
        );

        Analysis {
            entities,
            condition: Condition::conjunction(conditions),
        }
    }

    fn collect_join_conditions(
        selectable: &Selectable,
        extractor: &ConditionExtractor<'_>,
        out: &mut Vec<Condition>,
    ) {
        let Selectable::Join(join) = selectable else {
            return;
        };
        Self::collect_join_conditions(&join.left, extractor, out);
        Self::collect_join_conditions(&join.right, extractor, out);

        match &join.on {
            Some(Expr::Clauses {
                operator: BoolOp::And,
                clauses,
            }) => out.extend(clauses.iter().filter_map(|c| extractor.extract(c))),
            Some(on) => out.extend(extractor.extract(on)),
            None => {}
        }
    }

    fn target(&self, table: &Table) -> Result<ReferencedEntity> {
        self.registry
            .entity_for_table(table)
            .map(ReferencedEntity::base)
            .ok_or_else(|| AnalysisError::UnknownEntity(table.name().to_string()).into())
    }

    /// Target, WHERE condition and assigned values of an UPDATE
    pub fn analyze_update(&self, update: &Update, parameters: &Parameters) -> Result<WriteAnalysis> {
        let entity = self.target(update.table())?;
        let extractor = ConditionExtractor::new(parameters);

        let changes = update
            .values()
            .iter()
            .map(|(column, expr)| (column.clone(), extractor.literal_value(expr)))
            .collect();

        Ok(WriteAnalysis {
            entity,
            condition: update.where_clause().and_then(|w| extractor.extract(w)),
            changes,
        })
    }

    /// Target and WHERE condition of a DELETE
    pub fn analyze_delete(&self, delete: &Delete, parameters: &Parameters) -> Result<WriteAnalysis> {
        let entity = self.target(delete.table())?;
        let extractor = ConditionExtractor::new(parameters);

        Ok(WriteAnalysis {
            entity,
            condition: delete.where_clause().and_then(|w| extractor.extract(w)),
            changes: Row::new(),
        })
    }

    /// Target and normalized rows of an INSERT
    pub fn analyze_insert(&self, insert: &Insert, parameters: &Parameters) -> Result<InsertAnalysis> {
        let entity = self.target(insert.table())?;
        let extractor = ConditionExtractor::new(parameters);

        let (values, source) = match insert.insert_values() {
            InsertValues::Empty => (Self::parameter_rows(parameters), None),
            InsertValues::Single(pairs) => (vec![Self::pairs_row(pairs, &extractor)], None),
            InsertValues::Tuple(exprs) => {
                let columns = insert.table().columns();
                if exprs.len() != columns.len() {
                    warn!(
                        table = insert.table().name(),
                        values = exprs.len(),
                        columns = columns.len(),
                        "Positional insert does not cover every column"
                    );
                }
                let row = columns
                    .iter()
                    .zip(exprs)
                    .map(|(column, expr)| (column.clone(), extractor.literal_value(expr)))
                    .collect();
                (vec![row], None)
            }
            InsertValues::Multi(rows) => (
                rows.iter()
                    .map(|pairs| Self::pairs_row(pairs, &extractor))
                    .collect(),
                None,
            ),
            InsertValues::FromSelect { query, .. } => {
                (Vec::new(), Some(self.analyze_select(query, parameters)))
            }
        };

        Ok(InsertAnalysis {
            entity,
            values,
            source,
        })
    }

    fn pairs_row(pairs: &[(String, Expr)], extractor: &ConditionExtractor<'_>) -> Row {
        pairs
            .iter()
            .map(|(column, expr)| (column.clone(), extractor.literal_value(expr)))
            .collect()
    }

    /// Rows supplied entirely through execution parameters
    fn parameter_rows(parameters: &Parameters) -> Vec<Row> {
        match parameters {
            Parameters::None => Vec::new(),
            Parameters::Keyed(row) => vec![row.clone()],
            Parameters::Positional(rows) => rows.clone(),
        }
    }
}
