//! Schema and forward migration definitions.
//!
//! To add a migration, push a new [`Migration`] onto the schema's list; the
//! `user_version` pragma in the database records how many have been applied.
//! Migrations only ever run forward. A database whose recorded version is
//! ahead of this binary refuses to open rather than guessing.

use crate::db::DbKind;
use crate::error::{DatabaseError, DatabaseResult};
use once_cell::sync::Lazy;
use rusqlite::Connection;

/// Schema of the chain state database.
pub static SCHEMA_STATE: Lazy<Schema> = Lazy::new(|| Schema {
    migrations: vec![Migration::initial(include_str!("sql/state/schema/0.sql"))],
});

pub struct Schema {
    migrations: Vec<Migration>,
}

impl Schema {
    /// Bring `conn`'s database up to the current schema version, running
    /// any pending forward migrations in one transaction.
    pub fn initialize(&self, conn: &mut Connection, kind: &DbKind) -> DatabaseResult<()> {
        let user_version: u16 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;
        let applied = user_version as usize;
        let total = self.migrations.len();

        match applied.cmp(&total) {
            std::cmp::Ordering::Less => {
                let txn = conn.transaction()?;
                for v in applied..total {
                    self.migrations[v].run_forward(&txn)?;
                    txn.pragma_update(None, "user_version", (v + 1) as i64)?;
                }
                txn.commit()?;
                tracing::info!("database {} forward migrated from {} to {}", kind, applied, total);
                Ok(())
            }
            std::cmp::Ordering::Equal => {
                tracing::debug!("database {} already at schema version {}", kind, total);
                Ok(())
            }
            std::cmp::Ordering::Greater => Err(DatabaseError::SchemaTooNew {
                found: applied,
                supported: total,
            }),
        }
    }
}

pub struct Migration {
    forward: String,
}

impl Migration {
    /// The initial migration's forward script is the entire schema.
    pub fn initial(schema: &str) -> Self {
        Self {
            forward: schema.into(),
        }
    }

    fn run_forward(&self, txn: &rusqlite::Transaction<'_>) -> DatabaseResult<()> {
        txn.execute_batch(&self.forward)?;
        Ok(())
    }
}
