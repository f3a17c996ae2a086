//! rowgate Common - Shared utilities and types
//!
//! This crate provides functionality used by every rowgate component:
//! - Error types and handling
//! - Configuration management
//! - Bound values and parameter sets
//! - Session variants carried through the hooks

#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod error;
pub mod session;
pub mod types;

pub use config::Config;
pub use error::{Error, Result};
pub use session::{Principal, Session, SessionKind};
pub use types::*;
