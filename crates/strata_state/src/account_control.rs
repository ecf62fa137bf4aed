//! The phasing-only account control: a versioned entity that forces every
//! transaction of a controlled account through a mandatory phasing poll
//! with configured parameters, fee caps and duration bounds.

use crate::cache::EntityCache;
use crate::key::TableKey;
use crate::mutations::StateMutationError;
use crate::query::{from_blob, to_blob, StateQueryError, StateQueryResult};
use crate::table::{KeyedStore, VersionedStore, VersionedTable};
use strata_sqlite::rusqlite::types::Value;
use strata_sqlite::rusqlite::{Row, Transaction};
use strata_types::prelude::*;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use thiserror::Error;

/// A phasing-only policy rejection. Each variant is a distinct,
/// user-renderable reason; none of them is a storage failure.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum AccountControlViolation {
    #[error(
        "maximum total fees limit of {} {chain} exceeded, total fees are {} {chain}",
        coins(.limit, .one_coin),
        coins(.total, .one_coin)
    )]
    MaxFeesExceeded {
        limit: u64,
        total: u64,
        one_coin: u64,
        chain: String,
    },

    #[error("non-phased transaction when phasing account control is enabled")]
    NonPhasedTransaction,

    #[error("phasing parameters mismatch phasing account control")]
    ParamsMismatch,

    #[error("invalid phasing duration {0}")]
    InvalidDuration(i64),

    #[error("account {0} is under account control and cannot submit forging chain transactions")]
    ForgingChainRestricted(AccountId),
}

fn coins(units: &u64, one_coin: &u64) -> f64 {
    *units as f64 / (*one_coin).max(1) as f64
}

/// What a phasing-only check concluded. The caller decides what to do with
/// each case; in particular [`InactiveBypass`](ControlOutcome::InactiveBypass)
/// is a deliberate leniency, not an error.
#[derive(Debug, PartialEq, Eq)]
pub enum ControlOutcome {
    /// The transaction satisfies the control.
    Valid,
    /// The stored parameters are not currently approvable (the referenced
    /// holding is unusable), so the control is transparently inactive.
    InactiveBypass,
    /// The transaction violates the control.
    Rejected(AccountControlViolation),
}

/// Outward-facing validation failure: precise enough for API layers to
/// render the violated rule rather than a generic error.
#[derive(Error, Debug)]
pub enum ValidationError {
    #[error(transparent)]
    AccountControl(#[from] AccountControlViolation),

    #[error(transparent)]
    NotCurrentlyValid(#[from] NotCurrentlyValid),

    #[error(transparent)]
    Query(#[from] StateQueryError),

    #[error(transparent)]
    Mutation(#[from] StateMutationError),

    #[error(transparent)]
    Database(#[from] strata_sqlite::error::DatabaseError),
}

/// The node-side collaborators a control check consults.
pub struct ValidationContext<'a> {
    pub accounts: &'a dyn AccountDirectory,
    pub polls: &'a dyn PhasingPollHome,
    pub holdings: &'a dyn HoldingDirectory,
    pub chains: &'a ChainRegistry,
}

/// One account's phasing-only policy.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PhasingOnly {
    pub account_id: AccountId,
    /// Every transaction of the account must carry phasing parameters
    /// structurally equal to these.
    pub params: PhasingParams,
    /// Per-chain cap on total pending phased fees; absent chains are
    /// uncapped.
    pub max_fees: BTreeMap<ChainId, u64>,
    pub min_duration: u16,
    pub max_duration: u16,
}

impl PhasingOnly {
    /// Check one child chain transaction against this control.
    ///
    /// `validating_at_finish` marks the second validation pass that runs
    /// when an approved phased transaction finally executes; fee and
    /// duration limits only apply on the first pass.
    pub fn check_transaction(
        &self,
        tx: &ChildTransaction,
        validating_at_finish: bool,
        current_height: u32,
        ctx: &ValidationContext<'_>,
    ) -> ControlOutcome {
        let max_fee = self.max_fees.get(&tx.chain).copied().unwrap_or(0);
        if !validating_at_finish && max_fee > 0 {
            let pending = ctx.polls.sender_phased_transaction_fees(tx.chain, tx.sender);
            let total = tx.fee.saturating_add(pending);
            if total > max_fee {
                return ControlOutcome::Rejected(AccountControlViolation::MaxFeesExceeded {
                    limit: max_fee,
                    total,
                    one_coin: ctx.chains.one_coin_of(tx.chain),
                    chain: ctx.chains.name_of(tx.chain),
                });
            }
        }

        // casting a vote on someone's pending transaction is always allowed,
        // otherwise a controlled account could never participate in approvals
        if tx.transaction_type == TransactionType::PhasingVoteCasting {
            return ControlOutcome::Valid;
        }

        if let Err(reason) = self.params.check_approvable(ctx.holdings) {
            tracing::warn!(
                account = %self.account_id,
                %reason,
                "account control no longer valid, skipping check"
            );
            return ControlOutcome::InactiveBypass;
        }

        let appendix = match &tx.phasing {
            Some(appendix) => appendix,
            None => {
                return ControlOutcome::Rejected(AccountControlViolation::NonPhasedTransaction)
            }
        };
        if appendix.params != self.params {
            return ControlOutcome::Rejected(AccountControlViolation::ParamsMismatch);
        }

        if !validating_at_finish {
            let duration = i64::from(appendix.finish_height) - i64::from(current_height);
            if (self.max_duration > 0 && duration > i64::from(self.max_duration))
                || (self.min_duration > 0 && duration < i64::from(self.min_duration))
            {
                return ControlOutcome::Rejected(AccountControlViolation::InvalidDuration(
                    duration,
                ));
            }
        }

        ControlOutcome::Valid
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct PhasingControlKey(pub AccountId);

impl TableKey for PhasingControlKey {
    fn columns() -> &'static [&'static str] {
        &["account_id"]
    }

    fn values(&self) -> Vec<Value> {
        vec![Value::from(self.0 .0 as i64)]
    }

    fn from_row(row: &Row<'_>) -> StateQueryResult<Self> {
        Ok(Self(row.get("account_id")?))
    }
}

/// Row mapping for the `account_control_phasing` table. Nested parameters
/// and the fee map go into single BLOB columns.
pub struct PhasingControlStore;

impl KeyedStore for PhasingControlStore {
    type Entity = PhasingOnly;
    type Key = PhasingControlKey;

    const TABLE: &'static str = "account_control_phasing";

    fn columns() -> &'static [&'static str] {
        &["params", "max_fees", "min_duration", "max_duration"]
    }

    fn key(entity: &Self::Entity) -> Self::Key {
        PhasingControlKey(entity.account_id)
    }

    fn encode(entity: &Self::Entity) -> StateQueryResult<Vec<Value>> {
        Ok(vec![
            Value::Blob(to_blob(&entity.params)?),
            Value::Blob(to_blob(&entity.max_fees)?),
            Value::from(i64::from(entity.min_duration)),
            Value::from(i64::from(entity.max_duration)),
        ])
    }

    fn decode(row: &Row<'_>) -> StateQueryResult<Self::Entity> {
        Ok(PhasingOnly {
            account_id: row.get("account_id")?,
            params: from_blob(&row.get::<_, Vec<u8>>("params")?)?,
            max_fees: from_blob(&row.get::<_, Vec<u8>>("max_fees")?)?,
            min_duration: row.get("min_duration")?,
            max_duration: row.get("max_duration")?,
        })
    }
}

impl VersionedStore for PhasingControlStore {}

/// Tracks per-block duplicate slots: the first transaction to claim a slot
/// passes, every later claimant in the same block is a duplicate. State is
/// rebuilt fresh for each block being assembled or validated.
#[derive(Default)]
pub struct BlockDuplicates {
    slots: HashSet<(TransactionType, String)>,
}

impl BlockDuplicates {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `(slot, key)`; true when it was already claimed in this block.
    pub fn is_duplicate(&mut self, slot: TransactionType, key: String) -> bool {
        !self.slots.insert((slot, key))
    }
}

/// Validation entry points for account controls, owning the versioned table
/// the policies are stored in.
pub struct AccountRestrictions {
    table: VersionedTable<PhasingControlStore>,
    height: Arc<dyn HeightSource>,
}

impl AccountRestrictions {
    pub fn new(height: Arc<dyn HeightSource>) -> Self {
        Self {
            table: VersionedTable::new(EntityCache::new(), height.clone()),
            height,
        }
    }

    /// The backing table, for the node's fork-resolution and pruning wiring
    /// (`rollback`/`trim`).
    pub fn table(&self) -> &VersionedTable<PhasingControlStore> {
        &self.table
    }

    pub fn phasing_only(
        &self,
        txn: &Transaction<'_>,
        account: AccountId,
    ) -> StateQueryResult<Option<PhasingOnly>> {
        self.table.get(txn, &PhasingControlKey(account))
    }

    pub fn count(&self, txn: &Transaction<'_>) -> StateQueryResult<u64> {
        self.table.count(txn)
    }

    pub fn get_all(
        &self,
        txn: &Transaction<'_>,
        offset: u32,
        limit: u32,
    ) -> StateQueryResult<Vec<PhasingOnly>> {
        self.table.get_all(txn, offset, limit)
    }

    /// Apply a set-phasing-only transaction: voting model `None` removes
    /// the control (a logical delete, so a fork rollback can restore it),
    /// anything else creates or updates the stored policy.
    pub fn set_phasing_only(
        &self,
        txn: &Transaction<'_>,
        ctx: &ValidationContext<'_>,
        sender: AccountId,
        attachment: &SetPhasingOnlyAttachment,
    ) -> Result<(), ValidationError> {
        if attachment.params.voting_model == VotingModel::None {
            ctx.accounts.remove_control(sender, ControlType::PhasingOnly);
            if let Some(current) = self.phasing_only(txn, sender)? {
                self.table.delete(txn, &current)?;
            }
        } else {
            ctx.accounts.add_control(sender, ControlType::PhasingOnly);
            let control = PhasingOnly {
                account_id: sender,
                params: attachment.params.clone(),
                max_fees: attachment.max_fees.clone(),
                min_duration: attachment.min_duration,
                max_duration: attachment.max_duration,
            };
            self.table.insert(txn, &control)?;
        }
        Ok(())
    }

    /// Validate a child chain transaction against its sender's control.
    ///
    /// An unknown sender is always a rejection, unlike the unusable-holding
    /// case inside the control check, which bypasses. The two must not be
    /// unified.
    pub fn check_transaction(
        &self,
        txn: &Transaction<'_>,
        ctx: &ValidationContext<'_>,
        tx: &ChildTransaction,
        validating_at_finish: bool,
    ) -> Result<(), ValidationError> {
        let sender = ctx
            .accounts
            .get_account(tx.sender)
            .ok_or(NotCurrentlyValid::UnknownSender(tx.sender))?;
        if !sender.has_control(ControlType::PhasingOnly) {
            return Ok(());
        }
        let control = match self.phasing_only(txn, tx.sender)? {
            Some(control) => control,
            // control flag without stored parameters: nothing to enforce
            None => return Ok(()),
        };
        let outcome =
            control.check_transaction(tx, validating_at_finish, self.height.current_height(), ctx);
        match outcome {
            ControlOutcome::Valid | ControlOutcome::InactiveBypass => Ok(()),
            ControlOutcome::Rejected(violation) => Err(violation.into()),
        }
    }

    /// Forging chain transactions are flatly unavailable to controlled
    /// accounts.
    pub fn check_forging_chain_transaction(
        &self,
        ctx: &ValidationContext<'_>,
        tx: &FxtTransaction,
    ) -> Result<(), ValidationError> {
        let sender = ctx
            .accounts
            .get_account(tx.sender)
            .ok_or(NotCurrentlyValid::UnknownSender(tx.sender))?;
        if sender.has_control(ControlType::PhasingOnly) {
            return Err(AccountControlViolation::ForgingChainRestricted(tx.sender).into());
        }
        Ok(())
    }

    /// Whether `tx` would exceed the per-block slot for fee-capped
    /// controlled senders: at most one such transaction per sender per
    /// block.
    pub fn is_block_duplicate(
        &self,
        txn: &Transaction<'_>,
        ctx: &ValidationContext<'_>,
        tx: &ChildTransaction,
        duplicates: &mut BlockDuplicates,
    ) -> Result<bool, ValidationError> {
        let sender = match ctx.accounts.get_account(tx.sender) {
            Some(sender) => sender,
            None => return Ok(false),
        };
        if !sender.has_control(ControlType::PhasingOnly) {
            return Ok(false);
        }
        let control = match self.phasing_only(txn, tx.sender)? {
            Some(control) => control,
            None => return Ok(false),
        };
        if !control.max_fees.contains_key(&tx.chain) {
            return Ok(false);
        }
        Ok(tx.transaction_type != TransactionType::SetPhasingOnly
            && duplicates.is_duplicate(TransactionType::SetPhasingOnly, tx.sender.to_string()))
    }
}
