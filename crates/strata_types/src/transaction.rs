use crate::account::AccountId;
use crate::chain::ChainId;
use crate::phasing::PhasingParams;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Transaction type tags, reduced to what validation dispatches on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TransactionType {
    OrdinaryPayment,
    AssetTransfer,
    /// Casting a vote on somebody's pending phased transaction.
    PhasingVoteCasting,
    /// Enabling, updating or removing the phasing-only account control.
    SetPhasingOnly,
}

/// The phasing appendix a transaction carries when it is itself phased.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhasingAppendix {
    pub params: PhasingParams,
    /// Height at which the phased transaction either executes or expires.
    pub finish_height: u32,
}

/// A child chain transaction, reduced to the fields account controls
/// inspect.
#[derive(Clone, Debug)]
pub struct ChildTransaction {
    pub sender: AccountId,
    pub chain: ChainId,
    pub fee: u64,
    pub transaction_type: TransactionType,
    pub phasing: Option<PhasingAppendix>,
}

/// A forging chain transaction. Accounts under phasing-only control may not
/// submit these at all, so only the sender matters here.
#[derive(Clone, Debug)]
pub struct FxtTransaction {
    pub sender: AccountId,
    pub fee: u64,
}

/// Payload of a set-phasing-only transaction.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetPhasingOnlyAttachment {
    pub params: PhasingParams,
    /// Per-chain cap on the total fees of pending phased transactions;
    /// chains absent from the map are uncapped.
    pub max_fees: BTreeMap<ChainId, u64>,
    /// Minimum allowed phasing duration in blocks, 0 for no bound.
    pub min_duration: u16,
    /// Maximum allowed phasing duration in blocks, 0 for no bound.
    pub max_duration: u16,
}
