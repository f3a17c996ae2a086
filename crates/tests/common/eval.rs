//! Predicate evaluation over in-memory rows

use std::cmp::Ordering;
use std::collections::HashMap;

use rowgate_common::{Parameters, Row, Value};
use rowgate_query::{BoolOp, Expr, Operator, Relation, UnaryOperator};
use serde_json::json;

/// Rows visible to a predicate, by relation
pub type Scope = HashMap<Relation, Row>;

pub struct Evaluator<'p> {
    parameters: &'p Parameters,
}

impl<'p> Evaluator<'p> {
    pub fn new(parameters: &'p Parameters) -> Self {
        Self { parameters }
    }

    pub fn truthy(&self, expr: &Expr, scope: &Scope) -> bool {
        self.value(expr, scope) == Value::Bool(true)
    }

    pub fn value(&self, expr: &Expr, scope: &Scope) -> Value {
        match expr {
            Expr::Clauses {
                operator: BoolOp::And,
                clauses,
            } => Value::Bool(clauses.iter().all(|c| self.truthy(c, scope))),
            Expr::Clauses {
                operator: BoolOp::Or,
                clauses,
            } => Value::Bool(clauses.iter().any(|c| self.truthy(c, scope))),
            Expr::Unary { operator, element } => {
                let value = self.value(element, scope);
                match operator {
                    None => value,
                    Some(UnaryOperator::IsTrue) => Value::Bool(value == Value::Bool(true)),
                    Some(UnaryOperator::IsFalse) => Value::Bool(value == Value::Bool(false)),
                    Some(UnaryOperator::Not) => Value::Bool(value != Value::Bool(true)),
                    Some(UnaryOperator::IsNull) => Value::Bool(value.is_null()),
                    Some(UnaryOperator::IsNotNull) => Value::Bool(!value.is_null()),
                }
            }
            Expr::Binary {
                left,
                operator,
                right,
            } => binary(*operator, &self.value(left, scope), &self.value(right, scope)),
            Expr::Column(column) => scope
                .get(&column.relation)
                .and_then(|row| row.get(&column.name))
                .cloned()
                .unwrap_or(Value::Null),
            Expr::Bind(param) => self
                .parameters
                .lookup(&param.key)
                .cloned()
                .unwrap_or_else(|| param.effective_value()),
            Expr::True => Value::Bool(true),
            Expr::False => Value::Bool(false),
            Expr::Null | Expr::Function { .. } => Value::Null,
        }
    }
}

fn compare(left: &Value, right: &Value) -> Option<Ordering> {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => a.as_f64()?.partial_cmp(&b.as_f64()?),
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        _ => None,
    }
}

fn text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn like(value: &str, pattern: &str) -> bool {
    match pattern.split_once('%') {
        None => value == pattern,
        Some((prefix, rest)) => {
            value.starts_with(prefix)
                && (0..=value.len() - prefix.len())
                    .filter(|i| value.is_char_boundary(prefix.len() + i))
                    .any(|i| like(&value[prefix.len() + i..], rest))
        }
    }
}

fn arithmetic(op: Operator, left: &Value, right: &Value) -> Value {
    if let (Some(a), Some(b)) = (left.as_i64(), right.as_i64()) {
        return match op {
            Operator::Add => json!(a + b),
            Operator::Sub => json!(a - b),
            Operator::Mul => json!(a * b),
            _ if b != 0 => json!(a / b),
            _ => Value::Null,
        };
    }
    match (left.as_f64(), right.as_f64()) {
        (Some(a), Some(b)) => match op {
            Operator::Add => json!(a + b),
            Operator::Sub => json!(a - b),
            Operator::Mul => json!(a * b),
            _ => json!(a / b),
        },
        _ => Value::Null,
    }
}

fn binary(op: Operator, left: &Value, right: &Value) -> Value {
    let comparable = !left.is_null() && !right.is_null();
    let result = match op {
        Operator::Eq => comparable && left == right,
        Operator::Ne => comparable && left != right,
        Operator::Lt => compare(left, right) == Some(Ordering::Less),
        Operator::Le => matches!(compare(left, right), Some(Ordering::Less | Ordering::Equal)),
        Operator::Gt => compare(left, right) == Some(Ordering::Greater),
        Operator::Ge => matches!(compare(left, right), Some(Ordering::Greater | Ordering::Equal)),
        Operator::In => right.as_array().map_or(false, |values| values.contains(left)),
        Operator::NotIn => right.as_array().map_or(false, |values| !values.contains(left)),
        Operator::Like => comparable && like(&text(left), &text(right)),
        Operator::NotLike => comparable && !like(&text(left), &text(right)),
        Operator::StartsWith => comparable && text(left).starts_with(&text(right)),
        Operator::EndsWith => comparable && text(left).ends_with(&text(right)),
        Operator::Contains => comparable && text(left).contains(&text(right)),
        Operator::Is => left == right,
        Operator::IsNot => left != right,
        Operator::Concat => {
            return if comparable {
                Value::String(text(left) + &text(right))
            } else {
                Value::Null
            }
        }
        Operator::Add | Operator::Sub | Operator::Mul | Operator::Div => {
            return arithmetic(op, left, right)
        }
    };
    Value::Bool(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_like() {
        assert!(like("alice", "a%"));
        assert!(like("alice", "%ice"));
        assert!(like("alice", "%li%"));
        assert!(!like("bob", "a%"));
        assert!(like("x", "x"));
    }
}
