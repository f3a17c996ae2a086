//! rowgate Security - Authorization for intercepted statements
//!
//! Provides:
//! - The authorization handler capability
//! - Statement-level filter splicing
//! - Object-level checks for flushed mutations
//! - Row policies grouped by entity and command

#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod authorizer;
pub mod handler;
pub mod policy;

pub use authorizer::{ObjectVerdict, StatementAuthorizer, StatementFilters};
pub use handler::{AllowAll, AuthorizationHandler, FilterStream};
pub use policy::{PolicyCommand, PolicyHandler, PolicyStore, RowPolicy};
