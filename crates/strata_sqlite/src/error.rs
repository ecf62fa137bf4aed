use std::path::PathBuf;
use thiserror::Error;

/// Failures at the storage engine boundary.
///
/// Every variant is fatal to the operation that hit it: the store never
/// retries internally, and a caller that sees one of these mid-way through
/// block processing must stop rather than continue on possibly inconsistent
/// state. Retry policy, if any, belongs to the transaction manager above.
#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("error interacting with the underlying SQLite store: {0}")]
    SqliteError(#[from] rusqlite::Error),

    #[error("could not check a connection out of the pool: {0}")]
    DbConnectionPoolError(#[from] r2d2::Error),

    #[error("database directory is not usable: {0}")]
    DirectoryError(#[from] std::io::Error),

    #[error("database file missing at configured path: {0}")]
    DatabaseMissing(PathBuf),

    #[error(
        "database schema version {found} is newer than this binary supports (max {supported})"
    )]
    SchemaTooNew { found: usize, supported: usize },
}

pub type DatabaseResult<T> = Result<T, DatabaseError>;
