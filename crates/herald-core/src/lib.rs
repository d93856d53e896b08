//! Herald Core Library
//!
//! Shared functionality for Herald components:
//! - Hierarchical permission-scope matching
//! - Configuration loading and validation
//! - `SQLite` pool helpers shared by the storage layer
//! - Tracing initialisation and common error types

pub mod config;
pub mod db;
pub mod error;
pub mod scopes;
pub mod tracing_init;

pub use config::HeraldConfig;
pub use error::{Error, Result};
pub use scopes::{match_scope, parse_scopes};
