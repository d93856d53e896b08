//! HTTP shell for the Herald server.

pub mod routes;

pub use routes::{AppState, build_router};
