//! Low-level row mutations for keyed and versioned entity tables.
//!
//! Everything here operates on the caller's transaction; nothing commits.
//! The table wrappers in [`crate::table`] layer cache maintenance on top of
//! these functions and are the interface the rest of the node uses.

use crate::key::{pk_clause, pk_columns, TableKey};
use crate::query::{StateQueryError, StateQueryResult};
use crate::table::{KeyedStore, VersionedStore};
use strata_sqlite::rusqlite::types::Value;
use strata_sqlite::rusqlite::{params_from_iter, Transaction};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StateMutationError {
    #[error(transparent)]
    Sql(#[from] strata_sqlite::rusqlite::Error),

    #[error(transparent)]
    DatabaseError(#[from] strata_sqlite::error::DatabaseError),

    #[error(transparent)]
    StateQueryError(#[from] StateQueryError),
}

pub type StateMutationResult<T> = Result<T, StateMutationError>;

/// Append a new version of `entity` at `height` and mark it latest.
///
/// A row the key already has at exactly `height` is replaced outright, so
/// re-application within one block (update, delete, re-insert) never leaves
/// two rows at the same height. The previously-latest row, if any, has its
/// marker cleared in the same operation.
pub fn insert_version<S: VersionedStore>(
    txn: &Transaction<'_>,
    entity: &S::Entity,
    height: u32,
) -> StateMutationResult<()> {
    let key = S::key(entity);

    let same_height = format!(
        "DELETE FROM {} {} AND height = ?",
        S::TABLE,
        pk_clause::<S::Key>()
    );
    let mut params: Vec<Value> = key.values();
    params.push(Value::from(i64::from(height)));
    txn.prepare_cached(&same_height)?
        .execute(params_from_iter(params))?;

    let clear_latest = format!(
        "UPDATE {} SET latest = FALSE {} AND latest = TRUE",
        S::TABLE,
        pk_clause::<S::Key>()
    );
    txn.prepare_cached(&clear_latest)?
        .execute(params_from_iter(key.values()))?;

    let placeholders = vec!["?"; S::Key::columns().len() + S::columns().len() + 1].join(", ");
    let insert = format!(
        "INSERT INTO {} ({}, {}, height, latest) VALUES ({}, TRUE)",
        S::TABLE,
        pk_columns::<S::Key>(),
        S::columns().join(", "),
        placeholders
    );
    let mut params: Vec<Value> = key.values();
    params.extend(S::encode(entity)?);
    params.push(Value::from(i64::from(height)));
    txn.prepare_cached(&insert)?
        .execute(params_from_iter(params))?;
    Ok(())
}

/// Flip the key's current row off, making the entity logically absent while
/// its version history stays behind for rollback.
pub fn clear_latest<S: VersionedStore>(
    txn: &Transaction<'_>,
    key: &S::Key,
) -> StateMutationResult<usize> {
    let sql = format!(
        "UPDATE {} SET latest = FALSE {} AND latest = TRUE",
        S::TABLE,
        pk_clause::<S::Key>()
    );
    Ok(txn
        .prepare_cached(&sql)?
        .execute(params_from_iter(key.values()))?)
}

/// Delete every row at `height` or above and re-mark `latest` on the newest
/// surviving row of each affected key. Keys with nothing left revert to
/// never having existed. Returns the affected keys so the caller can evict
/// them from its cache.
pub fn rollback_versions<S: VersionedStore>(
    txn: &Transaction<'_>,
    height: u32,
) -> StateMutationResult<Vec<S::Key>> {
    let select = format!(
        "SELECT DISTINCT {} FROM {} WHERE height >= ?",
        pk_columns::<S::Key>(),
        S::TABLE
    );
    let keys: Vec<S::Key> = txn
        .prepare_cached(&select)?
        .query_and_then([i64::from(height)], |row| S::Key::from_row(row))?
        .collect::<StateQueryResult<Vec<_>>>()?;
    if keys.is_empty() {
        return Ok(keys);
    }

    let delete = format!("DELETE FROM {} WHERE height >= ?", S::TABLE);
    txn.prepare_cached(&delete)?
        .execute([i64::from(height)])?;

    // MAX(height) over an emptied key is NULL, which matches no row, so a
    // fully deleted key simply ends up with no latest marker.
    let set_latest = format!(
        "UPDATE {table} SET latest = TRUE {pk} AND height = (SELECT MAX(height) FROM {table} {pk})",
        table = S::TABLE,
        pk = pk_clause::<S::Key>()
    );
    let mut stmt = txn.prepare_cached(&set_latest)?;
    for key in &keys {
        let params: Vec<Value> = key.values().into_iter().chain(key.values()).collect();
        stmt.execute(params_from_iter(params))?;
    }
    Ok(keys)
}

/// Compact the history below `height`: for every key with more than one
/// version strictly below it, delete all but the newest of those versions.
///
/// Rows at or above `height` are never touched, and neither is the single
/// retained row per key, so current reads are unaffected. The caller must
/// only pass heights the consensus layer guarantees are final: nothing
/// here can tell a safe height from an unsafe one, and a later rollback
/// below `height` would find its target versions gone.
pub fn trim_versions<S: VersionedStore>(
    txn: &Transaction<'_>,
    height: u32,
) -> StateMutationResult<usize> {
    let select = format!(
        "SELECT {pk_cols}, MAX(height) AS max_height FROM {table} \
         WHERE height < ? GROUP BY {pk_cols} HAVING COUNT(DISTINCT height) > 1",
        pk_cols = pk_columns::<S::Key>(),
        table = S::TABLE
    );
    let doomed: Vec<(S::Key, i64)> = txn
        .prepare_cached(&select)?
        .query_and_then([i64::from(height)], |row| {
            Ok((S::Key::from_row(row)?, row.get::<_, i64>("max_height")?))
        })?
        .collect::<StateQueryResult<Vec<_>>>()?;

    let delete = format!(
        "DELETE FROM {} {} AND height < ?",
        S::TABLE,
        pk_clause::<S::Key>()
    );
    let mut stmt = txn.prepare_cached(&delete)?;
    let mut deleted = 0;
    for (key, max_height) in &doomed {
        let params: Vec<Value> = key
            .values()
            .into_iter()
            .chain(std::iter::once(Value::from(*max_height)))
            .collect();
        deleted += stmt.execute(params_from_iter(params))?;
    }
    Ok(deleted)
}

/// Upsert for non-versioned tables: at most one row per key, no history.
pub fn upsert_row<S: KeyedStore>(
    txn: &Transaction<'_>,
    entity: &S::Entity,
) -> StateMutationResult<()> {
    let key = S::key(entity);

    let delete = format!("DELETE FROM {} {}", S::TABLE, pk_clause::<S::Key>());
    txn.prepare_cached(&delete)?
        .execute(params_from_iter(key.values()))?;

    let placeholders = vec!["?"; S::Key::columns().len() + S::columns().len()].join(", ");
    let insert = format!(
        "INSERT INTO {} ({}, {}) VALUES ({})",
        S::TABLE,
        pk_columns::<S::Key>(),
        S::columns().join(", "),
        placeholders
    );
    let mut params: Vec<Value> = key.values();
    params.extend(S::encode(entity)?);
    txn.prepare_cached(&insert)?
        .execute(params_from_iter(params))?;
    Ok(())
}
