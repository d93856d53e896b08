//! `SQLite` storage for the Herald server.
//!
//! Provides persistence for credentials, static tokens, the EventSub dedup
//! ledger, stream records, and the tracked-user/category/filter tables.

mod db;
mod models;
mod queries_auth;
mod queries_events;


pub use db::{DatabaseError, HeraldDatabase};
pub use models::*;
pub use queries_auth::NewStaticToken;
