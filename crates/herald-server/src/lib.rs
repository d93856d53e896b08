//! Herald Server Library
//!
//! Core functionality for Herald:
//! - SQLite storage for credentials, static tokens, the webhook ledger and streams
//! - Per-subject JWT authentication and the request gate
//! - EventSub intake, debounce and stream lifecycle tracking
//! - Concurrent announcement fanout to Discord, Mastodon and Bluesky
//! - axum routes for the webhook and auth endpoints

pub mod auth;
pub mod eventsub;
pub mod fanout;
pub mod http;
pub mod pipeline;
pub mod server;
pub mod storage;
