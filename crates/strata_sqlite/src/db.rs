//! Pooled database handles and the transaction scopes built on them.
//!
//! [`DbRead`] hands out read transactions; [`DbWrite`] additionally hands
//! out EXCLUSIVE write transactions that commit only if the closure
//! succeeds. One logical state operation (applying a block's mutations,
//! a fork rollback, a trim pass) is expected to run inside one such scope,
//! which is what makes those operations all-or-nothing.

use crate::error::{DatabaseError, DatabaseResult};
use crate::schema::SCHEMA_STATE;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{OpenFlags, Transaction, TransactionBehavior};
use std::ops::Deref;
use std::path::{Path, PathBuf};
use std::time::Duration;

const SQLITE_BUSY_TIMEOUT: Duration = Duration::from_secs(30);

/// A pooled connection checked out for direct use.
pub type PConn = r2d2::PooledConnection<SqliteConnectionManager>;

type ConnectionPool = r2d2::Pool<SqliteConnectionManager>;

/// Which database a handle refers to. The kind determines the filename and
/// which schema gets initialized on open.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DbKind {
    /// The chain state database.
    State,
    /// A throwaway database for tests, named uniquely per instance.
    Test(String),
}

impl DbKind {
    pub fn filename(&self) -> PathBuf {
        match self {
            DbKind::State => PathBuf::from("state.sqlite3"),
            DbKind::Test(name) => PathBuf::from(format!("{name}.sqlite3")),
        }
    }
}

impl std::fmt::Display for DbKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DbKind::State => write!(f, "state"),
            DbKind::Test(name) => write!(f, "test:{name}"),
        }
    }
}

/// Applied to every connection the pool creates.
#[derive(Clone, Debug)]
struct ConnCustomizer {
    /// WAL only makes sense for file-backed databases.
    wal: bool,
}

impl r2d2::CustomizeConnection<rusqlite::Connection, rusqlite::Error> for ConnCustomizer {
    fn on_acquire(&self, conn: &mut rusqlite::Connection) -> Result<(), rusqlite::Error> {
        conn.busy_timeout(SQLITE_BUSY_TIMEOUT)?;
        if self.wal {
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |_row| Ok(()))?;
        }
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        Ok(())
    }
}

/// How many concurrent readers the pool supports. The pool holds one more
/// connection than this for the writer.
pub fn num_read_threads() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
        .clamp(4, 16)
}

/// Read-only handle to a database: can produce read transactions, never
/// write ones. Cloning is cheap; all clones share the pool.
#[derive(Clone)]
pub struct DbRead {
    kind: DbKind,
    path: PathBuf,
    pool: ConnectionPool,
}

impl DbRead {
    pub fn kind(&self) -> &DbKind {
        &self.kind
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Check a raw connection out of the pool.
    pub fn conn(&self) -> DatabaseResult<PConn> {
        Ok(self.pool.get()?)
    }

    /// Run `f` inside a fresh read transaction. The transaction is dropped,
    /// never committed, when the closure returns.
    pub fn read<E, R, F>(&self, f: F) -> Result<R, E>
    where
        E: From<DatabaseError>,
        F: FnOnce(&Transaction) -> Result<R, E>,
    {
        let mut conn = self.conn()?;
        let txn = conn.transaction().map_err(DatabaseError::from)?;
        f(&txn)
    }
}

impl std::fmt::Debug for DbRead {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DbRead").field("kind", &self.kind).finish()
    }
}

/// Read-write handle to a database. Derefs to [`DbRead`] for the read path.
#[derive(Clone, Debug)]
pub struct DbWrite(DbRead);

impl Deref for DbWrite {
    type Target = DbRead;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl DbWrite {
    /// Open (creating if necessary) the database of the given kind under
    /// `dir`, run any pending schema migrations, and hand back a write
    /// handle.
    pub fn open(dir: &Path, kind: DbKind) -> DatabaseResult<Self> {
        std::fs::create_dir_all(dir)?;
        let path = dir.join(kind.filename());
        let manager = SqliteConnectionManager::file(&path);
        Self::new(manager, kind, path, true)
    }

    /// An on-disk test database with a unique name, for tests that need the
    /// real file/WAL code paths.
    pub fn test(dir: &Path) -> DatabaseResult<Self> {
        Self::open(dir, DbKind::Test(nanoid::nanoid!()))
    }

    /// A fresh in-memory database.
    ///
    /// Uses a named shared-cache URI so that every pooled connection sees
    /// the same store; the database lives as long as the pool keeps at
    /// least one connection open, which it does.
    pub fn test_in_mem() -> DatabaseResult<Self> {
        let name = nanoid::nanoid!();
        let uri = format!("file:strata-{name}?mode=memory&cache=shared");
        let manager = SqliteConnectionManager::file(&uri).with_flags(
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_URI
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        );
        Self::new(manager, DbKind::Test(name), PathBuf::from(uri), false)
    }

    fn new(
        manager: SqliteConnectionManager,
        kind: DbKind,
        path: PathBuf,
        wal: bool,
    ) -> DatabaseResult<Self> {
        let pool = r2d2::Pool::builder()
            .max_size(num_read_threads() as u32 + 1)
            .connection_customizer(Box::new(ConnCustomizer { wal }))
            .build(manager)?;
        let db = DbWrite(DbRead { kind, path, pool });
        {
            let mut conn = db.conn()?;
            SCHEMA_STATE.initialize(&mut conn, db.kind())?;
        }
        Ok(db)
    }

    /// Run `f` inside an EXCLUSIVE write transaction and commit it iff the
    /// closure succeeds. On any error the transaction rolls back and none
    /// of the closure's row changes survive.
    pub fn write<E, R, F>(&self, f: F) -> Result<R, E>
    where
        E: From<DatabaseError>,
        F: FnOnce(&mut Transaction) -> Result<R, E>,
    {
        let mut conn = self.conn()?;
        let mut txn = conn
            .transaction_with_behavior(TransactionBehavior::Exclusive)
            .map_err(DatabaseError::from)?;
        let result = f(&mut txn)?;
        txn.commit().map_err(DatabaseError::from)?;
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_commits_and_read_sees_it() {
        let db = DbWrite::test_in_mem().unwrap();
        db.write::<DatabaseError, _, _>(|txn| {
            txn.execute_batch("CREATE TABLE t (x INTEGER)")?;
            txn.execute("INSERT INTO t (x) VALUES (1)", [])?;
            Ok(())
        })
        .unwrap();

        let count: i64 = db
            .read::<DatabaseError, _, _>(|txn| {
                Ok(txn.query_row("SELECT COUNT(*) FROM t", [], |row| row.get(0))?)
            })
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn failed_write_rolls_back() {
        let db = DbWrite::test_in_mem().unwrap();
        db.write::<DatabaseError, _, _>(|txn| {
            txn.execute_batch("CREATE TABLE t (x INTEGER)")?;
            Ok(())
        })
        .unwrap();

        let result: Result<(), DatabaseError> = db.write(|txn| {
            txn.execute("INSERT INTO t (x) VALUES (1)", [])?;
            // force a rollback of the insert above
            txn.execute("INSERT INTO missing_table (x) VALUES (1)", [])?;
            Ok(())
        });
        assert!(result.is_err());

        let count: i64 = db
            .read::<DatabaseError, _, _>(|txn| {
                Ok(txn.query_row("SELECT COUNT(*) FROM t", [], |row| row.get(0))?)
            })
            .unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn on_disk_database_is_created_under_dir() {
        let dir = tempfile::tempdir().unwrap();
        let db = DbWrite::test(dir.path()).unwrap();
        assert!(db.path().exists());
    }
}
