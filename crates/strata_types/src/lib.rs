//! Value types shared across the strata node: accounts and their controls,
//! chains, phasing parameters, and the minimal transaction shapes the
//! validation layer operates on.
//!
//! Nothing in this crate touches storage; the collaborator traits defined
//! here ([`HeightSource`], [`AccountDirectory`], [`PhasingPollHome`],
//! [`HoldingDirectory`]) are the seams through which the state layer reaches
//! the rest of the node.

pub mod account;
pub mod chain;
pub mod phasing;
pub mod transaction;

pub mod prelude {
    pub use crate::account::{Account, AccountDirectory, AccountId, ControlType};
    pub use crate::chain::{Chain, ChainId, ChainRegistry, HeightSource};
    pub use crate::phasing::{
        HoldingDirectory, MinBalanceModel, NotCurrentlyValid, PhasingParams, PhasingPollHome,
        VotingModel,
    };
    pub use crate::transaction::{
        ChildTransaction, FxtTransaction, PhasingAppendix, SetPhasingOnlyAttachment,
        TransactionType,
    };
}

pub use account::{Account, AccountDirectory, AccountId, ControlType};
pub use chain::{Chain, ChainId, ChainRegistry, HeightSource};
pub use phasing::{
    HoldingDirectory, MinBalanceModel, NotCurrentlyValid, PhasingParams, PhasingPollHome,
    VotingModel,
};
pub use transaction::{
    ChildTransaction, FxtTransaction, PhasingAppendix, SetPhasingOnlyAttachment, TransactionType,
};
