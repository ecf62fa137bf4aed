use crate::account::AccountId;
use crate::chain::ChainId;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// How approval votes for a phased transaction are counted.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VotingModel {
    /// No voting at all. As an account control parameter this means
    /// "remove the control".
    None,
    /// One account, one vote.
    Account,
    /// Votes weighted by coin balance.
    Balance,
    /// Votes weighted by an asset holding.
    Asset,
    /// Votes weighted by a currency holding.
    Currency,
}

/// Which holding a minimum-balance requirement is measured in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MinBalanceModel {
    None,
    Coin,
    Asset,
    Currency,
}

/// A transient validity condition.
///
/// The two variants are deliberately consumed at different sites: an unknown
/// sender always rejects the transaction, while an unusable holding makes a
/// phasing control transparently inactive for the duration of the outage.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum NotCurrentlyValid {
    #[error("account {0} does not exist yet")]
    UnknownSender(AccountId),
    #[error("{model:?} holding {holding_id} is not currently usable for voting")]
    HoldingUnusable { model: VotingModel, holding_id: u64 },
}

/// The full parameter set of a phasing poll. Structural equality of two
/// parameter sets is what the phasing-only account control enforces.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhasingParams {
    pub voting_model: VotingModel,
    pub quorum: u64,
    pub min_balance: u64,
    pub min_balance_model: MinBalanceModel,
    /// Asset or currency the votes are weighted by; 0 when the voting model
    /// does not reference a holding.
    pub holding_id: u64,
    pub whitelist: Vec<AccountId>,
}

impl PhasingParams {
    /// Whether a poll with these parameters could currently be created.
    ///
    /// Holdings can be deleted out from under a stored parameter set, at
    /// which point the parameters are no longer approvable until the holding
    /// reappears.
    pub fn check_approvable(
        &self,
        holdings: &dyn HoldingDirectory,
    ) -> Result<(), NotCurrentlyValid> {
        match self.voting_model {
            VotingModel::Asset | VotingModel::Currency => {
                if !holdings.holding_usable(self.voting_model, self.holding_id) {
                    return Err(NotCurrentlyValid::HoldingUnusable {
                        model: self.voting_model,
                        holding_id: self.holding_id,
                    });
                }
            }
            VotingModel::None | VotingModel::Account | VotingModel::Balance => {}
        }
        if self.min_balance > 0 {
            let model = match self.min_balance_model {
                MinBalanceModel::Asset => Some(VotingModel::Asset),
                MinBalanceModel::Currency => Some(VotingModel::Currency),
                MinBalanceModel::None | MinBalanceModel::Coin => None,
            };
            if let Some(model) = model {
                if !holdings.holding_usable(model, self.holding_id) {
                    return Err(NotCurrentlyValid::HoldingUnusable {
                        model,
                        holding_id: self.holding_id,
                    });
                }
            }
        }
        Ok(())
    }
}

/// Read access to the phasing poll engine: the total fees already committed
/// to pending phased transactions by a sender on one chain.
pub trait PhasingPollHome {
    fn sender_phased_transaction_fees(&self, chain: ChainId, sender: AccountId) -> u64;
}

/// Existence checks for vote-weighting holdings (assets, currencies).
pub trait HoldingDirectory {
    fn holding_usable(&self, model: VotingModel, holding_id: u64) -> bool;
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NoHoldings;

    impl HoldingDirectory for NoHoldings {
        fn holding_usable(&self, _model: VotingModel, _holding_id: u64) -> bool {
            false
        }
    }

    fn params(model: VotingModel) -> PhasingParams {
        PhasingParams {
            voting_model: model,
            quorum: 1,
            min_balance: 0,
            min_balance_model: MinBalanceModel::None,
            holding_id: 7,
            whitelist: vec![],
        }
    }

    #[test]
    fn balance_voting_never_depends_on_holdings() {
        assert!(params(VotingModel::Balance)
            .check_approvable(&NoHoldings)
            .is_ok());
        assert!(params(VotingModel::Account)
            .check_approvable(&NoHoldings)
            .is_ok());
    }

    #[test]
    fn asset_voting_requires_usable_holding() {
        let err = params(VotingModel::Asset)
            .check_approvable(&NoHoldings)
            .unwrap_err();
        assert_eq!(
            err,
            NotCurrentlyValid::HoldingUnusable {
                model: VotingModel::Asset,
                holding_id: 7,
            }
        );
    }

    #[test]
    fn min_balance_holding_is_checked_too() {
        let mut p = params(VotingModel::Account);
        p.min_balance = 10;
        p.min_balance_model = MinBalanceModel::Currency;
        assert!(p.check_approvable(&NoHoldings).is_err());
    }
}
