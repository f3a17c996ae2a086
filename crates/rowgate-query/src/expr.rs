//! Expression trees produced by the statement builder

use std::collections::HashSet;
use std::fmt;

use rowgate_common::Value;
use serde::{Deserialize, Serialize};

use crate::schema::{ColumnRef, Relation};

/// Binary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operator {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    In,
    NotIn,
    Like,
    NotLike,
    StartsWith,
    EndsWith,
    Contains,
    Is,
    IsNot,
    Concat,
    Add,
    Sub,
    Mul,
    Div,
}

impl Operator {
    #[must_use]
    pub fn symbol(self) -> &'static str {
        match self {
            Operator::Eq => "=",
            Operator::Ne => "!=",
            Operator::Lt => "<",
            Operator::Le => "<=",
            Operator::Gt => ">",
            Operator::Ge => ">=",
            Operator::In => "IN",
            Operator::NotIn => "NOT IN",
            Operator::Like => "LIKE",
            Operator::NotLike => "NOT LIKE",
            Operator::StartsWith => "STARTS WITH",
            Operator::EndsWith => "ENDS WITH",
            Operator::Contains => "CONTAINS",
            Operator::Is => "IS",
            Operator::IsNot => "IS NOT",
            Operator::Concat => "||",
            Operator::Add => "+",
            Operator::Sub => "-",
            Operator::Mul => "*",
            Operator::Div => "/",
        }
    }
}

/// Boolean conjunction operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BoolOp {
    And,
    Or,
}

impl BoolOp {
    #[must_use]
    pub fn keyword(self) -> &'static str {
        match self {
            BoolOp::And => "AND",
            BoolOp::Or => "OR",
        }
    }
}

/// Unary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnaryOperator {
    IsTrue,
    IsFalse,
    Not,
    IsNull,
    IsNotNull,
}

/// A bound parameter
#[derive(Debug, Clone, PartialEq)]
pub struct BindParam {
    pub key: String,
    /// Value bound at build time, if any
    pub value: Option<Value>,
    /// Generated by the builder; renumbered when its key is already taken
    pub unique: bool,
}

impl BindParam {
    pub fn new(key: impl Into<String>, value: Option<Value>) -> Self {
        Self {
            key: key.into(),
            value,
            unique: false,
        }
    }

    /// A builder-generated parameter, keyed `{column}_{n}`
    pub fn unique(key: impl Into<String>, value: Option<Value>) -> Self {
        Self {
            unique: true,
            ..Self::new(key, value)
        }
    }

    /// Claim a key in `taken`, moving to the next free number on a clash
    fn claim(&mut self, taken: &mut HashSet<String>) {
        if self.unique && taken.contains(&self.key) {
            let (base, first) = match self.key.rsplit_once('_') {
                Some((base, n)) => (base.to_string(), n.parse::<u32>().unwrap_or(1)),
                None => (self.key.clone(), 1),
            };
            self.key = (first + 1..)
                .map(|n| format!("{base}_{n}"))
                .find(|key| !taken.contains(key))
                .unwrap_or_else(|| format!("{base}_{first}"));
        }
        taken.insert(self.key.clone());
    }

    /// The build-time value, or NULL when none was bound
    #[must_use]
    pub fn effective_value(&self) -> Value {
        self.value.clone().unwrap_or(Value::Null)
    }
}

/// Expression node
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// AND / OR over a list of clauses
    Clauses { operator: BoolOp, clauses: Vec<Expr> },
    /// Unary wrapper; the operator is absent for bare groupings
    Unary {
        operator: Option<UnaryOperator>,
        element: Box<Expr>,
    },
    Binary {
        left: Box<Expr>,
        operator: Operator,
        right: Box<Expr>,
    },
    Column(ColumnRef),
    Bind(BindParam),
    True,
    False,
    Null,
    Function { name: String, args: Vec<Expr> },
}

/// Conversion into the right-hand side of a binary expression
///
/// Plain values become bound parameters keyed after the left-hand column.
pub trait ToExpr {
    fn to_expr(self, key: &str) -> Expr;
}

impl ToExpr for Expr {
    fn to_expr(self, _key: &str) -> Expr {
        self
    }
}

macro_rules! bind_value {
    ($($t:ty),*) => {
        $(
            impl ToExpr for $t {
                fn to_expr(self, key: &str) -> Expr {
                    Expr::Bind(BindParam::unique(key, Some(Value::from(self))))
                }
            }
        )*
    };
}

bind_value!(Value, bool, i32, i64, u32, u64, f64, String, &str);

impl Expr {
    #[must_use]
    pub fn column(relation: &Relation, name: &str) -> Self {
        Expr::Column(relation.column(name))
    }

    /// Bound parameter with a build-time value
    pub fn bind(key: impl Into<String>, value: impl Into<Value>) -> Self {
        Expr::Bind(BindParam::new(key, Some(value.into())))
    }

    /// Bound parameter whose value is supplied at execution
    pub fn bind_key(key: impl Into<String>) -> Self {
        Expr::Bind(BindParam::new(key, None))
    }

    pub fn literal(value: impl Into<Value>) -> Self {
        Expr::bind("literal", value)
    }

    pub fn function(name: impl Into<String>, args: Vec<Expr>) -> Self {
        Expr::Function {
            name: name.into(),
            args,
        }
    }

    fn param_key(&self) -> String {
        match self {
            Expr::Column(column) => format!("{}_1", column.name),
            _ => "param_1".to_string(),
        }
    }

    fn binary(self, operator: Operator, rhs: impl ToExpr) -> Self {
        let key = self.param_key();
        Expr::Binary {
            left: Box::new(self),
            operator,
            right: Box::new(rhs.to_expr(&key)),
        }
    }

    fn unary(self, operator: UnaryOperator) -> Self {
        Expr::Unary {
            operator: Some(operator),
            element: Box::new(self),
        }
    }

    #[must_use]
    pub fn equals(self, rhs: impl ToExpr) -> Self {
        self.binary(Operator::Eq, rhs)
    }

    #[must_use]
    pub fn not_equals(self, rhs: impl ToExpr) -> Self {
        self.binary(Operator::Ne, rhs)
    }

    #[must_use]
    pub fn lt(self, rhs: impl ToExpr) -> Self {
        self.binary(Operator::Lt, rhs)
    }

    #[must_use]
    pub fn le(self, rhs: impl ToExpr) -> Self {
        self.binary(Operator::Le, rhs)
    }

    #[must_use]
    pub fn gt(self, rhs: impl ToExpr) -> Self {
        self.binary(Operator::Gt, rhs)
    }

    #[must_use]
    pub fn ge(self, rhs: impl ToExpr) -> Self {
        self.binary(Operator::Ge, rhs)
    }

    #[must_use]
    pub fn like(self, rhs: impl ToExpr) -> Self {
        self.binary(Operator::Like, rhs)
    }

    #[must_use]
    pub fn starts_with(self, rhs: impl ToExpr) -> Self {
        self.binary(Operator::StartsWith, rhs)
    }

    #[must_use]
    pub fn concat(self, rhs: impl ToExpr) -> Self {
        self.binary(Operator::Concat, rhs)
    }

    #[must_use]
    pub fn add(self, rhs: impl ToExpr) -> Self {
        self.binary(Operator::Add, rhs)
    }

    #[must_use]
    pub fn in_<I, V>(self, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        let values: Vec<Value> = values.into_iter().map(Into::into).collect();
        self.binary(Operator::In, Value::Array(values))
    }

    #[must_use]
    pub fn is_null(self) -> Self {
        self.unary(UnaryOperator::IsNull)
    }

    #[must_use]
    pub fn is_not_null(self) -> Self {
        self.unary(UnaryOperator::IsNotNull)
    }

    #[must_use]
    pub fn is_true(self) -> Self {
        self.unary(UnaryOperator::IsTrue)
    }

    #[must_use]
    pub fn not(self) -> Self {
        self.unary(UnaryOperator::Not)
    }

    /// Parenthesized grouping without an operator
    #[must_use]
    pub fn grouped(self) -> Self {
        Expr::Unary {
            operator: None,
            element: Box::new(self),
        }
    }

    #[must_use]
    pub fn and(self, other: Expr) -> Self {
        and_([self, other])
    }

    #[must_use]
    pub fn or(self, other: Expr) -> Self {
        or_([self, other])
    }

    /// The constant TRUE, bare or wrapped in IS TRUE
    #[must_use]
    pub fn is_tautology(&self) -> bool {
        match self {
            Expr::True => true,
            Expr::Unary {
                operator: Some(UnaryOperator::IsTrue),
                element,
            } => matches!(**element, Expr::True),
            _ => false,
        }
    }

    /// Every column referenced anywhere in the expression
    #[must_use]
    pub fn columns(&self) -> Vec<&ColumnRef> {
        let mut out = Vec::new();
        self.collect_columns(&mut out);
        out
    }

    fn collect_columns<'a>(&'a self, out: &mut Vec<&'a ColumnRef>) {
        match self {
            Expr::Column(column) => out.push(column),
            Expr::Clauses { clauses, .. } => clauses.iter().for_each(|c| c.collect_columns(out)),
            Expr::Function { args, .. } => args.iter().for_each(|a| a.collect_columns(out)),
            Expr::Unary { element, .. } => element.collect_columns(out),
            Expr::Binary { left, right, .. } => {
                left.collect_columns(out);
                right.collect_columns(out);
            }
            Expr::Bind(_) | Expr::True | Expr::False | Expr::Null => {}
        }
    }

    /// Keys of every bound parameter, in tree order
    #[must_use]
    pub fn bind_keys(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_bind_keys(&mut out);
        out
    }

    fn collect_bind_keys<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Expr::Bind(param) => out.push(&param.key),
            Expr::Clauses { clauses, .. } => clauses.iter().for_each(|c| c.collect_bind_keys(out)),
            Expr::Function { args, .. } => args.iter().for_each(|a| a.collect_bind_keys(out)),
            Expr::Unary { element, .. } => element.collect_bind_keys(out),
            Expr::Binary { left, right, .. } => {
                left.collect_bind_keys(out);
                right.collect_bind_keys(out);
            }
            Expr::Column(_) | Expr::True | Expr::False | Expr::Null => {}
        }
    }

    /// Renumber builder-generated parameters whose key is already in `taken`
    ///
    /// Every key the expression ends up with is added to `taken`. Explicitly
    /// named parameters keep their key.
    #[must_use]
    pub fn with_unique_binds(mut self, taken: &mut HashSet<String>) -> Expr {
        self.claim_binds(taken);
        self
    }

    fn claim_binds(&mut self, taken: &mut HashSet<String>) {
        match self {
            Expr::Bind(param) => param.claim(taken),
            Expr::Clauses { clauses, .. } => clauses.iter_mut().for_each(|c| c.claim_binds(taken)),
            Expr::Function { args, .. } => args.iter_mut().for_each(|a| a.claim_binds(taken)),
            Expr::Unary { element, .. } => element.claim_binds(taken),
            Expr::Binary { left, right, .. } => {
                left.claim_binds(taken);
                right.claim_binds(taken);
            }
            Expr::Column(_) | Expr::True | Expr::False | Expr::Null => {}
        }
    }

    /// Copy of the expression with columns of `from` moved onto `to`
    #[must_use]
    pub fn requalify(&self, from: &Relation, to: &Relation) -> Expr {
        match self {
            Expr::Column(column) if &column.relation == from => Expr::Column(to.column(&column.name)),
            Expr::Clauses { operator, clauses } => Expr::Clauses {
                operator: *operator,
                clauses: clauses.iter().map(|c| c.requalify(from, to)).collect(),
            },
            Expr::Unary { operator, element } => Expr::Unary {
                operator: *operator,
                element: Box::new(element.requalify(from, to)),
            },
            Expr::Binary {
                left,
                operator,
                right,
            } => Expr::Binary {
                left: Box::new(left.requalify(from, to)),
                operator: *operator,
                right: Box::new(right.requalify(from, to)),
            },
            Expr::Function { name, args } => Expr::Function {
                name: name.clone(),
                args: args.iter().map(|a| a.requalify(from, to)).collect(),
            },
            other => other.clone(),
        }
    }
}

fn clauses(operator: BoolOp, clauses: impl IntoIterator<Item = Expr>) -> Expr {
    let mut taken = HashSet::new();
    Expr::Clauses {
        operator,
        clauses: clauses
            .into_iter()
            .map(|c| c.with_unique_binds(&mut taken))
            .collect(),
    }
}

/// Conjunction of clauses
pub fn and_(items: impl IntoIterator<Item = Expr>) -> Expr {
    clauses(BoolOp::And, items)
}

/// Disjunction of clauses
pub fn or_(items: impl IntoIterator<Item = Expr>) -> Expr {
    clauses(BoolOp::Or, items)
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Clauses { operator, clauses } => {
                f.write_str("(")?;
                for (i, clause) in clauses.iter().enumerate() {
                    if i > 0 {
                        write!(f, " {} ", operator.keyword())?;
                    }
                    write!(f, "{clause}")?;
                }
                f.write_str(")")
            }
            Expr::Unary { operator, element } => match operator {
                None => write!(f, "({element})"),
                Some(UnaryOperator::Not) => write!(f, "NOT {element}"),
                Some(UnaryOperator::IsTrue) => write!(f, "{element} IS true"),
                Some(UnaryOperator::IsFalse) => write!(f, "{element} IS false"),
                Some(UnaryOperator::IsNull) => write!(f, "{element} IS NULL"),
                Some(UnaryOperator::IsNotNull) => write!(f, "{element} IS NOT NULL"),
            },
            Expr::Binary {
                left,
                operator,
                right,
            } => write!(f, "{left} {} {right}", operator.symbol()),
            Expr::Column(column) => write!(f, "{column}"),
            Expr::Bind(param) => match &param.value {
                Some(value) => write!(f, "{value}"),
                None => write!(f, ":{}", param.key),
            },
            Expr::True => f.write_str("true"),
            Expr::False => f.write_str("false"),
            Expr::Null => f.write_str("NULL"),
            Expr::Function { name, args } => {
                write!(f, "{name}(")?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{arg}")?;
                }
                f.write_str(")")
            }
        }
    }
}
