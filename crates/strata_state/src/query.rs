//! Read-path error type and row/blob helpers.

use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StateQueryError {
    #[error(transparent)]
    Sql(#[from] strata_sqlite::rusqlite::Error),

    #[error(transparent)]
    DatabaseError(#[from] strata_sqlite::error::DatabaseError),

    #[error("error decoding stored blob: {0}")]
    BlobDecode(#[from] rmp_serde::decode::Error),

    #[error("error encoding value for storage: {0}")]
    BlobEncode(#[from] rmp_serde::encode::Error),
}

pub type StateQueryResult<T> = Result<T, StateQueryError>;

/// Encode a nested attribute into the single BLOB column that stores it.
pub fn to_blob<T: Serialize>(t: &T) -> StateQueryResult<Vec<u8>> {
    Ok(rmp_serde::to_vec_named(t)?)
}

/// Inverse of [`to_blob`].
pub fn from_blob<T: DeserializeOwned>(blob: &[u8]) -> StateQueryResult<T> {
    Ok(rmp_serde::from_slice(blob)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use strata_types::prelude::*;

    #[test]
    fn blob_roundtrip_preserves_structural_equality() {
        let params = PhasingParams {
            voting_model: VotingModel::Account,
            quorum: 3,
            min_balance: 0,
            min_balance_model: MinBalanceModel::None,
            holding_id: 0,
            whitelist: vec![AccountId(1), AccountId(2)],
        };
        let decoded: PhasingParams = from_blob(&to_blob(&params).unwrap()).unwrap();
        assert_eq!(decoded, params);

        let fees: BTreeMap<ChainId, u64> = [(ChainId(1), 100), (ChainId(2), 50)].into();
        let decoded: BTreeMap<ChainId, u64> = from_blob(&to_blob(&fees).unwrap()).unwrap();
        assert_eq!(decoded, fees);
    }

    #[test]
    fn garbage_blob_is_a_decode_error() {
        let result: StateQueryResult<PhasingParams> = from_blob(&[0xc1, 0xff, 0x00]);
        assert!(matches!(result, Err(StateQueryError::BlobDecode(_))));
    }
}
