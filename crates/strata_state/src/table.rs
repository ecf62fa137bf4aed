//! Table wrappers tying the row mutations, the read path and the entity
//! cache together.

use crate::cache::EntityCache;
use crate::key::{pk_clause, pk_columns, TableKey};
use crate::mutations;
use crate::mutations::StateMutationResult;
use crate::query::StateQueryResult;
use strata_sqlite::rusqlite::types::Value;
use strata_sqlite::rusqlite::{params_from_iter, Row, Transaction};
use strata_types::HeightSource;
use std::sync::Arc;

/// The explicit entity ↔ row mapping of one table, registered by
/// implementing this trait on a marker type.
///
/// `columns` lists the entity's attribute columns; the key's columns come
/// from [`TableKey::columns`] and precede them in the physical row.
/// `encode` produces one value per attribute column, in the same order;
/// `decode` reads a full row (key columns included) back into an entity.
pub trait KeyedStore {
    type Entity: Clone + Send + Sync;
    type Key: TableKey;

    const TABLE: &'static str;

    fn columns() -> &'static [&'static str];

    fn key(entity: &Self::Entity) -> Self::Key;

    fn encode(entity: &Self::Entity) -> StateQueryResult<Vec<Value>>;

    fn decode(row: &Row<'_>) -> StateQueryResult<Self::Entity>;
}

/// Marker for stores whose table carries the `(height, latest)` pair and
/// therefore supports rollback and trim.
pub trait VersionedStore: KeyedStore {}

fn select_one<S: KeyedStore>(
    txn: &Transaction<'_>,
    key: &S::Key,
    latest_only: bool,
) -> StateQueryResult<Option<S::Entity>> {
    let sql = if latest_only {
        format!(
            "SELECT * FROM {} {} AND latest = TRUE",
            S::TABLE,
            pk_clause::<S::Key>()
        )
    } else {
        format!("SELECT * FROM {} {}", S::TABLE, pk_clause::<S::Key>())
    };
    let mut stmt = txn.prepare_cached(&sql)?;
    let mut rows = stmt.query(params_from_iter(key.values()))?;
    match rows.next()? {
        Some(row) => Ok(Some(S::decode(row)?)),
        None => Ok(None),
    }
}

fn scan<S: KeyedStore>(
    txn: &Transaction<'_>,
    latest_only: bool,
    offset: u32,
    limit: u32,
) -> StateQueryResult<Vec<S::Entity>> {
    let filter = if latest_only { "WHERE latest = TRUE " } else { "" };
    let sql = format!(
        "SELECT * FROM {} {}ORDER BY {} LIMIT ? OFFSET ?",
        S::TABLE,
        filter,
        pk_columns::<S::Key>()
    );
    txn.prepare_cached(&sql)?
        .query_and_then([i64::from(limit), i64::from(offset)], |row| S::decode(row))?
        .collect()
}

fn count_rows<S: KeyedStore>(txn: &Transaction<'_>, latest_only: bool) -> StateQueryResult<u64> {
    let filter = if latest_only { " WHERE latest = TRUE" } else { "" };
    let sql = format!("SELECT COUNT(*) FROM {}{}", S::TABLE, filter);
    let count: i64 = txn.prepare_cached(&sql)?.query_row([], |row| row.get(0))?;
    Ok(count as u64)
}

/// CRUD over a non-versioned table: at most one row per key, mutations
/// overwrite in place, no height dimension.
pub struct EntityTable<S: KeyedStore> {
    cache: EntityCache<S::Key, S::Entity>,
}

impl<S: KeyedStore> EntityTable<S> {
    pub fn new(cache: EntityCache<S::Key, S::Entity>) -> Self {
        Self { cache }
    }

    pub fn get(
        &self,
        txn: &Transaction<'_>,
        key: &S::Key,
    ) -> StateQueryResult<Option<S::Entity>> {
        if let Some(hit) = self.cache.get(key) {
            return Ok(Some(hit));
        }
        let entity = select_one::<S>(txn, key, false)?;
        if let Some(entity) = &entity {
            self.cache.put(key.clone(), entity.clone());
        }
        Ok(entity)
    }

    pub fn insert(&self, txn: &Transaction<'_>, entity: &S::Entity) -> StateMutationResult<()> {
        mutations::upsert_row::<S>(txn, entity)?;
        self.cache.put(S::key(entity), entity.clone());
        Ok(())
    }

    /// Paginated scan in key order. A fresh call re-scans from storage; the
    /// returned page does not reflect writes made after the call.
    pub fn get_all(
        &self,
        txn: &Transaction<'_>,
        offset: u32,
        limit: u32,
    ) -> StateQueryResult<Vec<S::Entity>> {
        scan::<S>(txn, false, offset, limit)
    }

    pub fn count(&self, txn: &Transaction<'_>) -> StateQueryResult<u64> {
        count_rows::<S>(txn, false)
    }
}

/// CRUD plus history over a height-versioned table.
///
/// All writes to one table instance must come from the node's single
/// logical writer (block application or fork resolution); see the crate
/// docs. The injected [`HeightSource`] supplies the height stamped on every
/// mutation, and the injected cache is maintained write-through: populated
/// after storage writes, evicted after storage deletions.
pub struct VersionedTable<S: VersionedStore> {
    cache: EntityCache<S::Key, S::Entity>,
    height: Arc<dyn HeightSource>,
}

impl<S: VersionedStore> VersionedTable<S> {
    pub fn new(cache: EntityCache<S::Key, S::Entity>, height: Arc<dyn HeightSource>) -> Self {
        Self { cache, height }
    }

    /// Current version of the entity, or `None` when the entity does not
    /// exist (never created, logically deleted, or rolled back away).
    pub fn get(
        &self,
        txn: &Transaction<'_>,
        key: &S::Key,
    ) -> StateQueryResult<Option<S::Entity>> {
        if let Some(hit) = self.cache.get(key) {
            return Ok(Some(hit));
        }
        let entity = select_one::<S>(txn, key, true)?;
        if let Some(entity) = &entity {
            self.cache.put(key.clone(), entity.clone());
        }
        Ok(entity)
    }

    /// Paginated scan over current versions, in key order.
    pub fn get_all(
        &self,
        txn: &Transaction<'_>,
        offset: u32,
        limit: u32,
    ) -> StateQueryResult<Vec<S::Entity>> {
        scan::<S>(txn, true, offset, limit)
    }

    /// Number of currently existing entities (one per latest row).
    pub fn count(&self, txn: &Transaction<'_>) -> StateQueryResult<u64> {
        count_rows::<S>(txn, true)
    }

    /// Write a new version of `entity` at the current chain height.
    pub fn insert(&self, txn: &Transaction<'_>, entity: &S::Entity) -> StateMutationResult<()> {
        mutations::insert_version::<S>(txn, entity, self.height.current_height())?;
        self.cache.put(S::key(entity), entity.clone());
        Ok(())
    }

    /// Logically delete `entity`: its current field values are first saved
    /// as a version at the current height, then the latest marker is
    /// cleared. History stays behind so a rollback can resurrect it.
    pub fn delete(&self, txn: &Transaction<'_>, entity: &S::Entity) -> StateMutationResult<()> {
        let height = self.height.current_height();
        mutations::insert_version::<S>(txn, entity, height)?;
        let key = S::key(entity);
        mutations::clear_latest::<S>(txn, &key)?;
        self.cache.remove(&key);
        Ok(())
    }

    /// Discard all rows at `height` or above and restore the newest
    /// surviving version per affected key. A no-op when nothing was written
    /// at or above `height`, which also makes repeated calls idempotent.
    /// Returns the number of affected keys.
    #[tracing::instrument(skip(self, txn), fields(table = S::TABLE))]
    pub fn rollback(&self, txn: &Transaction<'_>, height: u32) -> StateMutationResult<usize> {
        let keys = mutations::rollback_versions::<S>(txn, height)?;
        for key in &keys {
            self.cache.remove(key);
        }
        tracing::debug!(affected = keys.len(), "rolled back versioned table");
        Ok(keys.len())
    }

    /// Compact history below `height`. Only safe for heights the consensus
    /// layer guarantees final; see [`mutations::trim_versions`]. Latest
    /// rows are never touched, so the cache stays valid. Returns the number
    /// of rows deleted.
    #[tracing::instrument(skip(self, txn), fields(table = S::TABLE))]
    pub fn trim(&self, txn: &Transaction<'_>, height: u32) -> StateMutationResult<usize> {
        let deleted = mutations::trim_versions::<S>(txn, height)?;
        tracing::debug!(deleted, "trimmed versioned table");
        Ok(deleted)
    }

    /// Drop every cache entry. For callers that had a write transaction
    /// fail after table operations already ran inside it.
    pub fn invalidate_all(&self) {
        self.cache.clear();
    }
}
