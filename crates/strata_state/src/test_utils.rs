//! Helpers for unit and integration tests.

use crate::cache::EntityCache;
use crate::key::TableKey;
use crate::query::StateQueryResult;
use crate::table::{KeyedStore, VersionedStore, VersionedTable};
use strata_sqlite::db::DbWrite;
use strata_sqlite::error::DatabaseError;
use strata_sqlite::rusqlite::types::Value;
use strata_sqlite::rusqlite::Row;
use strata_types::prelude::*;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tempfile::TempDir;

/// Install a test tracing subscriber. Safe to call from every test; only
/// the first call wins.
pub fn test_run() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// A fresh in-memory state database with the schema applied and the test
/// entity tables created.
pub fn test_state_db() -> DbWrite {
    let db = DbWrite::test_in_mem().expect("couldn't create test database");
    create_test_tables(&db);
    db
}

/// An on-disk test database, for tests that need the file/WAL code paths.
pub struct TestDb {
    pub db: DbWrite,
    /// Deleted when the test drops this.
    pub tmpdir: TempDir,
}

pub fn test_state_db_on_disk() -> TestDb {
    let tmpdir = tempfile::Builder::new()
        .prefix("strata-test-db")
        .tempdir()
        .unwrap();
    let db = DbWrite::test(tmpdir.path()).expect("couldn't create test database");
    create_test_tables(&db);
    TestDb { db, tmpdir }
}

const TEST_TABLES_DDL: &str = "
CREATE TABLE IF NOT EXISTS test_asset (
    asset_id     INTEGER NOT NULL,
    quantity     INTEGER NOT NULL,
    description  TEXT    NOT NULL,
    height       INTEGER NOT NULL,
    latest       INTEGER NOT NULL DEFAULT 1
);

CREATE TABLE IF NOT EXISTS peer (
    address   TEXT    NOT NULL,
    services  INTEGER NOT NULL
);
";

fn create_test_tables(db: &DbWrite) {
    db.write::<DatabaseError, _, _>(|txn| {
        txn.execute_batch(TEST_TABLES_DDL)?;
        Ok(())
    })
    .expect("couldn't create test tables");
}

/// Manually adjustable chain height.
pub struct TestHeight(AtomicU32);

impl TestHeight {
    pub fn new(height: u32) -> Arc<Self> {
        Arc::new(Self(AtomicU32::new(height)))
    }

    pub fn set(&self, height: u32) {
        self.0.store(height, Ordering::SeqCst);
    }
}

impl HeightSource for TestHeight {
    fn current_height(&self) -> u32 {
        self.0.load(Ordering::SeqCst)
    }
}

/// A versioned table over [`TestAssetStore`] plus the handles tests poke at.
pub fn test_asset_table(height: u32) -> (VersionedTable<TestAssetStore>, Arc<TestHeight>, EntityCache<TestAssetKey, TestAsset>) {
    let height = TestHeight::new(height);
    let cache = EntityCache::new();
    let table = VersionedTable::new(cache.clone(), height.clone());
    (table, height, cache)
}

/// A minimal versioned entity for exercising the store machinery.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TestAsset {
    pub asset_id: u64,
    pub quantity: u64,
    pub description: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct TestAssetKey(pub u64);

impl TableKey for TestAssetKey {
    fn columns() -> &'static [&'static str] {
        &["asset_id"]
    }

    fn values(&self) -> Vec<Value> {
        vec![Value::from(self.0 as i64)]
    }

    fn from_row(row: &Row<'_>) -> StateQueryResult<Self> {
        Ok(Self(row.get::<_, i64>("asset_id")? as u64))
    }
}

pub struct TestAssetStore;

impl KeyedStore for TestAssetStore {
    type Entity = TestAsset;
    type Key = TestAssetKey;

    const TABLE: &'static str = "test_asset";

    fn columns() -> &'static [&'static str] {
        &["quantity", "description"]
    }

    fn key(entity: &Self::Entity) -> Self::Key {
        TestAssetKey(entity.asset_id)
    }

    fn encode(entity: &Self::Entity) -> StateQueryResult<Vec<Value>> {
        Ok(vec![
            Value::from(entity.quantity as i64),
            Value::from(entity.description.clone()),
        ])
    }

    fn decode(row: &Row<'_>) -> StateQueryResult<Self::Entity> {
        Ok(TestAsset {
            asset_id: row.get::<_, i64>("asset_id")? as u64,
            quantity: row.get::<_, i64>("quantity")? as u64,
            description: row.get("description")?,
        })
    }
}

impl VersionedStore for TestAssetStore {}

/// A minimal non-versioned entity (text key, no height dimension).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TestPeer {
    pub address: String,
    pub services: u64,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct TestPeerKey(pub String);

impl TableKey for TestPeerKey {
    fn columns() -> &'static [&'static str] {
        &["address"]
    }

    fn values(&self) -> Vec<Value> {
        vec![Value::from(self.0.clone())]
    }

    fn from_row(row: &Row<'_>) -> StateQueryResult<Self> {
        Ok(Self(row.get("address")?))
    }
}

pub struct TestPeerStore;

impl KeyedStore for TestPeerStore {
    type Entity = TestPeer;
    type Key = TestPeerKey;

    const TABLE: &'static str = "peer";

    fn columns() -> &'static [&'static str] {
        &["services"]
    }

    fn key(entity: &Self::Entity) -> Self::Key {
        TestPeerKey(entity.address.clone())
    }

    fn encode(entity: &Self::Entity) -> StateQueryResult<Vec<Value>> {
        Ok(vec![Value::from(entity.services as i64)])
    }

    fn decode(row: &Row<'_>) -> StateQueryResult<Self::Entity> {
        Ok(TestPeer {
            address: row.get("address")?,
            services: row.get::<_, i64>("services")? as u64,
        })
    }
}

/// In-memory account directory.
#[derive(Default)]
pub struct TestAccounts {
    accounts: parking_lot::Mutex<HashMap<AccountId, Account>>,
}

impl TestAccounts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(&self, id: AccountId) {
        self.accounts.lock().insert(id, Account::new(id));
    }
}

impl AccountDirectory for TestAccounts {
    fn get_account(&self, id: AccountId) -> Option<Account> {
        self.accounts.lock().get(&id).cloned()
    }

    fn add_control(&self, id: AccountId, control: ControlType) {
        self.accounts
            .lock()
            .entry(id)
            .or_insert_with(|| Account::new(id))
            .controls
            .insert(control);
    }

    fn remove_control(&self, id: AccountId, control: ControlType) {
        if let Some(account) = self.accounts.lock().get_mut(&id) {
            account.controls.remove(&control);
        }
    }
}

/// In-memory stand-in for the phasing poll engine's pending fee totals.
#[derive(Default)]
pub struct TestPolls {
    fees: parking_lot::Mutex<HashMap<(ChainId, AccountId), u64>>,
}

impl TestPolls {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_pending_fees(&self, chain: ChainId, sender: AccountId, fees: u64) {
        self.fees.lock().insert((chain, sender), fees);
    }
}

impl PhasingPollHome for TestPolls {
    fn sender_phased_transaction_fees(&self, chain: ChainId, sender: AccountId) -> u64 {
        self.fees.lock().get(&(chain, sender)).copied().unwrap_or(0)
    }
}

/// In-memory holding directory; holdings are usable iff registered.
#[derive(Default)]
pub struct TestHoldings {
    usable: parking_lot::Mutex<HashSet<u64>>,
}

impl TestHoldings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, holding_id: u64) {
        self.usable.lock().insert(holding_id);
    }

    pub fn remove(&self, holding_id: u64) {
        self.usable.lock().remove(&holding_id);
    }
}

impl HoldingDirectory for TestHoldings {
    fn holding_usable(&self, _model: VotingModel, holding_id: u64) -> bool {
        self.usable.lock().contains(&holding_id)
    }
}

/// Two chains with different coin scales.
pub fn test_chains() -> ChainRegistry {
    ChainRegistry::new([
        Chain {
            id: ChainId(1),
            name: "alpha".into(),
            one_coin: 100_000_000,
        },
        Chain {
            id: ChainId(2),
            name: "beta".into(),
            one_coin: 100,
        },
    ])
}

/// Balance-weighted parameters: approvable without any holding.
pub fn balance_params(quorum: u64) -> PhasingParams {
    PhasingParams {
        voting_model: VotingModel::Balance,
        quorum,
        min_balance: 0,
        min_balance_model: MinBalanceModel::None,
        holding_id: 0,
        whitelist: vec![],
    }
}

/// Asset-weighted parameters: approvable only while the holding is usable.
pub fn asset_params(quorum: u64, holding_id: u64) -> PhasingParams {
    PhasingParams {
        voting_model: VotingModel::Asset,
        quorum,
        min_balance: 0,
        min_balance_model: MinBalanceModel::None,
        holding_id,
        whitelist: vec![],
    }
}

pub fn set_phasing_only_attachment(
    params: PhasingParams,
    max_fees: BTreeMap<ChainId, u64>,
    min_duration: u16,
    max_duration: u16,
) -> SetPhasingOnlyAttachment {
    SetPhasingOnlyAttachment {
        params,
        max_fees,
        min_duration,
        max_duration,
    }
}
