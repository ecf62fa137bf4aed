//! Height-versioned persistence of chain state.
//!
//! Every mutable on-chain entity lives in a table whose rows carry a
//! `(height, latest)` pair: mutations append a new row stamped with the
//! chain height at write time instead of overwriting, `latest` marks the
//! single current row per natural key, and the whole history stays in place
//! until a trim pass discards versions that finality has made unreachable.
//! That record model is what lets the node switch to a competing fork: a
//! rollback deletes every row at or above the divergence height and
//! re-marks the newest survivor per key.
//!
//! # Write serialization
//!
//! The store assumes a SINGLE LOGICAL WRITER per table: block application
//! and fork rollback are serialized by the surrounding consensus pipeline,
//! not by this crate. Readers may run concurrently with each other; a
//! reader racing a writer on the same key is only safe because each
//! operation runs inside its own storage transaction. Nothing here locks.

pub mod account_control;
pub mod cache;
pub mod key;
pub mod mutations;
pub mod prelude;
pub mod query;
pub mod table;
pub mod test_utils;
