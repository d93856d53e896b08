//! Database connection and initialization.

pub use herald_core::db::DatabaseError;

herald_core::define_database!(HeraldDatabase, "Herald database migrations complete");
