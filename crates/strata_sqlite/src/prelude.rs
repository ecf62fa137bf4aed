pub use crate::db::{num_read_threads, DbKind, DbRead, DbWrite, PConn};
pub use crate::error::{DatabaseError, DatabaseResult};
pub use crate::schema::{Migration, Schema, SCHEMA_STATE};
