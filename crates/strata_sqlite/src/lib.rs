//! SQLite-backed storage boundary for strata chain state.
//!
//! This crate knows nothing about entities, heights or accounts. It provides
//! pooled connections ([`db::DbRead`], [`db::DbWrite`]), the transaction
//! scopes every logical state operation runs inside, and the schema
//! migration machinery. The state layer builds its versioned-row semantics
//! on top of these scopes; the all-or-nothing guarantee for rollback and
//! trim is exactly the [`db::DbWrite::write`] commit boundary.

pub mod db;
pub mod error;
pub mod prelude;
pub mod schema;

// Re-exported so downstream crates use the same rusqlite the pool was built
// against.
pub use rusqlite;
