use rusqlite::types::{FromSql, FromSqlResult, ToSqlOutput, ValueRef};
use rusqlite::ToSql;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Identifier of a child chain.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub struct ChainId(pub u32);

impl fmt::Display for ChainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl ToSql for ChainId {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.0 as i64))
    }
}

impl FromSql for ChainId {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        i64::column_result(value).map(|v| ChainId(v as u32))
    }
}

/// Static description of a chain, used only for rendering human readable
/// amounts and names in error text.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Chain {
    pub id: ChainId,
    pub name: String,
    /// Number of base fee units in one display coin.
    pub one_coin: u64,
}

/// Resolves chain identifiers to their static descriptions.
#[derive(Clone, Debug, Default)]
pub struct ChainRegistry {
    chains: BTreeMap<ChainId, Chain>,
}

impl ChainRegistry {
    pub fn new(chains: impl IntoIterator<Item = Chain>) -> Self {
        Self {
            chains: chains.into_iter().map(|c| (c.id, c)).collect(),
        }
    }

    pub fn get(&self, id: ChainId) -> Option<&Chain> {
        self.chains.get(&id)
    }

    /// Display name for a chain, falling back to the numeric id for chains
    /// missing from the registry.
    pub fn name_of(&self, id: ChainId) -> String {
        match self.get(id) {
            Some(chain) => chain.name.clone(),
            None => format!("chain#{id}"),
        }
    }

    pub fn one_coin_of(&self, id: ChainId) -> u64 {
        self.get(id).map(|c| c.one_coin).unwrap_or(1)
    }
}

/// The blockchain's height counter.
///
/// Monotonically non-decreasing while blocks are applied; moves backwards
/// only across an explicit fork rollback.
pub trait HeightSource: Send + Sync {
    fn current_height(&self) -> u32;
}
