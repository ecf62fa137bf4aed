pub use crate::account_control::{
    AccountControlViolation, AccountRestrictions, BlockDuplicates, ControlOutcome,
    PhasingControlKey, PhasingControlStore, PhasingOnly, ValidationContext, ValidationError,
};
pub use crate::cache::EntityCache;
pub use crate::key::{pk_clause, pk_columns, TableKey};
pub use crate::mutations::{StateMutationError, StateMutationResult};
pub use crate::query::{from_blob, to_blob, StateQueryError, StateQueryResult};
pub use crate::table::{EntityTable, KeyedStore, VersionedStore, VersionedTable};
pub use strata_sqlite::prelude::*;
pub use strata_types::prelude::*;
