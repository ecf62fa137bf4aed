use rusqlite::types::{FromSql, FromSqlResult, ToSqlOutput, ValueRef};
use rusqlite::ToSql;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// A 64 bit account identifier.
///
/// Identifiers are unsigned for display purposes but stored in SQLite as the
/// bit-identical signed integer, since SQLite has no unsigned 64 bit column
/// affinity.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub struct AccountId(pub u64);

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl ToSql for AccountId {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.0 as i64))
    }
}

impl FromSql for AccountId {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        i64::column_result(value).map(|v| AccountId(v as u64))
    }
}

/// Per-account policies that restrict which transactions the account may
/// submit.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ControlType {
    PhasingOnly,
}

/// The slice of account state the validation layer needs: identity plus the
/// set of active controls. Balance bookkeeping lives elsewhere.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Account {
    pub id: AccountId,
    pub controls: BTreeSet<ControlType>,
}

impl Account {
    pub fn new(id: AccountId) -> Self {
        Self {
            id,
            controls: BTreeSet::new(),
        }
    }

    pub fn has_control(&self, control: ControlType) -> bool {
        self.controls.contains(&control)
    }
}

/// Lookup and mutation of account control flags, implemented by the node's
/// account module.
pub trait AccountDirectory {
    fn get_account(&self, id: AccountId) -> Option<Account>;

    fn add_control(&self, id: AccountId, control: ControlType);

    fn remove_control(&self, id: AccountId, control: ControlType);
}
