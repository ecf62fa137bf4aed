//! Structural keys over entity tables.

use crate::query::StateQueryResult;
use strata_sqlite::rusqlite::types::Value;
use strata_sqlite::rusqlite::Row;
use std::hash::Hash;

/// The natural primary key of an entity, as the store sees it.
///
/// Two keys built from the same natural-key values must compare equal and
/// hash identically; that is what makes the cache and the per-key rollback
/// bookkeeping line up with the row predicates built from [`columns`] and
/// [`values`].
///
/// [`columns`]: TableKey::columns
/// [`values`]: TableKey::values
pub trait TableKey: Clone + Eq + Hash + Send + Sync {
    /// Ordered column names making up the key predicate.
    fn columns() -> &'static [&'static str];

    /// Bound values, one per column, in [`columns`](TableKey::columns) order.
    fn values(&self) -> Vec<Value>;

    /// Derive the key back out of a result row carrying the key columns.
    fn from_row(row: &Row<'_>) -> StateQueryResult<Self>;
}

/// `WHERE a = ? AND b = ?` over the key's columns.
pub fn pk_clause<K: TableKey>() -> String {
    let mut clause = String::from("WHERE ");
    for (i, col) in K::columns().iter().enumerate() {
        if i > 0 {
            clause.push_str(" AND ");
        }
        clause.push_str(col);
        clause.push_str(" = ?");
    }
    clause
}

/// Comma-separated key column list, for SELECT and GROUP BY fragments.
pub fn pk_columns<K: TableKey>() -> String {
    K::columns().join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, PartialEq, Eq, Hash)]
    struct PairKey(u64, u64);

    impl TableKey for PairKey {
        fn columns() -> &'static [&'static str] {
            &["holder_id", "asset_id"]
        }

        fn values(&self) -> Vec<Value> {
            vec![Value::from(self.0 as i64), Value::from(self.1 as i64)]
        }

        fn from_row(row: &Row<'_>) -> StateQueryResult<Self> {
            Ok(Self(
                row.get::<_, i64>("holder_id")? as u64,
                row.get::<_, i64>("asset_id")? as u64,
            ))
        }
    }

    #[test]
    fn clause_covers_all_columns_in_order() {
        assert_eq!(
            pk_clause::<PairKey>(),
            "WHERE holder_id = ? AND asset_id = ?"
        );
        assert_eq!(pk_columns::<PairKey>(), "holder_id, asset_id");
    }

    #[test]
    fn values_follow_column_order() {
        let key = PairKey(3, 9);
        assert_eq!(key.values(), vec![Value::from(3i64), Value::from(9i64)]);
    }
}
