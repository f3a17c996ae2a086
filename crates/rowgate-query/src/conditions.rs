//! Condition extraction
//!
//! Turns a statement's predicate tree into the normalized [`Condition`]
//! model handed to authorization handlers. Extraction is lossy on purpose:
//! shapes it cannot represent are dropped with a diagnostic instead of
//! failing the statement.

use rowgate_common::{Parameters, Row, Value};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::expr::{BindParam, BoolOp, Expr, Operator, UnaryOperator};
use crate::resolver::ReferencedEntity;
use crate::schema::ColumnRef;

/// One side of a condition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Operand {
    Column(ColumnRef),
    Literal(Value),
    /// Arithmetic over columns and literals only
    ColumnExpression {
        operator: Operator,
        left: Box<Operand>,
        right: Box<Operand>,
    },
    /// Arithmetic with at least one side that is itself an expression
    NestedExpression {
        operator: Operator,
        left: Box<Operand>,
        right: Box<Operand>,
    },
}

impl Operand {
    #[must_use]
    pub fn is_expression(&self) -> bool {
        matches!(
            self,
            Operand::ColumnExpression { .. } | Operand::NestedExpression { .. }
        )
    }

    #[must_use]
    pub fn references_column(&self) -> bool {
        match self {
            Operand::Column(_) => true,
            Operand::Literal(_) => false,
            Operand::ColumnExpression { left, right, .. }
            | Operand::NestedExpression { left, right, .. } => {
                left.references_column() || right.references_column()
            }
        }
    }
}

/// Normalized predicate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Condition {
    Unary {
        operator: UnaryOperator,
        operand: Operand,
    },
    Reference {
        left: Operand,
        operator: Operator,
        right: Operand,
    },
    Composite {
        operator: BoolOp,
        conditions: Vec<Condition>,
    },
}

impl Condition {
    #[must_use]
    pub fn reference(left: Operand, operator: Operator, right: Operand) -> Self {
        Condition::Reference {
            left,
            operator,
            right,
        }
    }

    #[must_use]
    pub fn and(conditions: Vec<Condition>) -> Self {
        Condition::Composite {
            operator: BoolOp::And,
            conditions,
        }
    }

    /// Combine conditions: none, the single one, or an AND of all
    #[must_use]
    pub fn conjunction(mut conditions: Vec<Condition>) -> Option<Self> {
        match conditions.len() {
            0 => None,
            1 => conditions.pop(),
            _ => Some(Condition::and(conditions)),
        }
    }

    #[must_use]
    pub fn references_column(&self) -> bool {
        match self {
            Condition::Unary { operand, .. } => operand.references_column(),
            Condition::Reference { left, right, .. } => {
                left.references_column() || right.references_column()
            }
            Condition::Composite { conditions, .. } => {
                conditions.iter().any(Condition::references_column)
            }
        }
    }

    /// Primary-key equality for one instance of an entity
    ///
    /// Returns `None` for entities without a primary key.
    #[must_use]
    pub fn primary_key(entity: &ReferencedEntity, values: &Row) -> Option<Self> {
        let conditions = entity
            .entity
            .table()
            .primary_key()
            .iter()
            .map(|column| {
                Condition::reference(
                    Operand::Column(entity.column(column)),
                    Operator::Eq,
                    Operand::Literal(values.get(column).cloned().unwrap_or(Value::Null)),
                )
            })
            .collect();
        Self::conjunction(conditions)
    }
}

/// Extracts conditions from expression trees, resolving bound parameters
/// against the execution parameters
pub struct ConditionExtractor<'p> {
    parameters: &'p Parameters,
}

impl<'p> ConditionExtractor<'p> {
    #[must_use]
    pub fn new(parameters: &'p Parameters) -> Self {
        Self { parameters }
    }

    /// Extract a condition, or `None` when nothing representable remains
    #[must_use]
    pub fn extract(&self, expr: &Expr) -> Option<Condition> {
        match expr {
            Expr::Clauses { operator, clauses } => {
                let conditions: Vec<Condition> =
                    clauses.iter().filter_map(|c| self.extract(c)).collect();
                if conditions.is_empty() {
                    None
                } else {
                    Some(Condition::Composite {
                        operator: *operator,
                        conditions,
                    })
                }
            }
            Expr::True => None,
            Expr::Unary { .. } if expr.is_tautology() => None,
            Expr::Unary {
                operator: None,
                element,
            } => {
                warn!(condition = %element, "Dropping unary condition without an operator");
                None
            }
            Expr::Unary {
                operator: Some(operator),
                element,
            } => Self::keep(Condition::Unary {
                operator: *operator,
                operand: self.resolve_operand(element),
            }),
            Expr::Binary {
                left,
                operator,
                right,
            } => Self::keep(Condition::reference(
                self.resolve_operand(left),
                *operator,
                self.resolve_operand(right),
            )),
            other => {
                warn!(condition = %other, "Dropping unrecognized condition");
                None
            }
        }
    }

    fn keep(condition: Condition) -> Option<Condition> {
        if condition.references_column() {
            Some(condition)
        } else {
            warn!(?condition, "Dropping condition that references no column");
            None
        }
    }

    /// Resolve an expression into an operand
    #[must_use]
    pub fn resolve_operand(&self, expr: &Expr) -> Operand {
        match expr {
            Expr::Bind(param) => Operand::Literal(self.parameter_value(param)),
            Expr::Column(column) => Operand::Column(column.clone()),
            Expr::Binary {
                left,
                operator,
                right,
            } => {
                let left = self.resolve_operand(left);
                let right = self.resolve_operand(right);
                if left.is_expression() || right.is_expression() {
                    Operand::NestedExpression {
                        operator: *operator,
                        left: Box::new(left),
                        right: Box::new(right),
                    }
                } else {
                    Operand::ColumnExpression {
                        operator: *operator,
                        left: Box::new(left),
                        right: Box::new(right),
                    }
                }
            }
            Expr::Null => Operand::Literal(Value::Null),
            Expr::True => Operand::Literal(Value::Bool(true)),
            Expr::False => Operand::Literal(Value::Bool(false)),
            other => {
                warn!(operand = %other, "Unrecognized operand; substituting NULL");
                Operand::Literal(Value::Null)
            }
        }
    }

    /// Value of a bound parameter
    ///
    /// Execution parameters take precedence over the build-time value.
    #[must_use]
    pub fn parameter_value(&self, param: &BindParam) -> Value {
        match self.parameters.lookup(&param.key) {
            Some(value) => value.clone(),
            None => param.effective_value(),
        }
    }

    /// Plain value of a literal expression, used for change sets and row values
    #[must_use]
    pub fn literal_value(&self, expr: &Expr) -> Value {
        match self.resolve_operand(expr) {
            Operand::Literal(value) => value,
            operand => {
                debug!(?operand, "Value is computed by the database; recording NULL");
                Value::Null
            }
        }
    }
}
