//! rowgate Query - Statement vocabulary and introspection
//!
//! Provides:
//! - Tables, relations, columns and the entity registry
//! - Expression trees and the statement builder
//! - Entity resolution over FROM clauses
//! - Condition extraction with bound-parameter resolution
//! - Statement analysis for SELECT, INSERT, UPDATE and DELETE
//! - The unit-of-work object model used by flush hooks

#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod analyzer;
pub mod conditions;
pub mod expr;
pub mod flush;
pub mod resolver;
pub mod schema;
pub mod statement;

pub use analyzer::{Analysis, AnalyzedStatement, InsertAnalysis, StatementAnalyzer, WriteAnalysis};
pub use conditions::{Condition, ConditionExtractor, Operand};
pub use expr::{and_, or_, BindParam, BoolOp, Expr, Operator, ToExpr, UnaryOperator};
pub use flush::{FlushContext, IdentityKey, InstanceState, ObjectStatus};
pub use resolver::{EntityResolver, ReferencedEntity};
pub use schema::{ColumnRef, Entity, EntityRegistry, Relation, Table};
pub use statement::{
    select, Alias, Delete, Insert, InsertValues, Join, Restriction, Select, Selectable, Statement,
    StatementKind, Update,
};
