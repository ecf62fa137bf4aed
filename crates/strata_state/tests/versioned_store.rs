//! Scenario tests for the height-versioned entity store: fork rollback,
//! history trimming, the single-latest invariant and cache consistency.

use strata_sqlite::db::DbWrite;
use strata_state::prelude::*;
use strata_state::test_utils::*;
use strata_state::{cache::EntityCache, table::EntityTable};

fn asset(id: u64, quantity: u64, description: &str) -> TestAsset {
    TestAsset {
        asset_id: id,
        quantity,
        description: description.into(),
    }
}

fn insert_at(
    db: &DbWrite,
    table: &VersionedTable<TestAssetStore>,
    height: &TestHeight,
    h: u32,
    entity: &TestAsset,
) {
    height.set(h);
    db.write::<StateMutationError, _, _>(|txn| table.insert(txn, entity))
        .unwrap();
}

fn delete_at(
    db: &DbWrite,
    table: &VersionedTable<TestAssetStore>,
    height: &TestHeight,
    h: u32,
    entity: &TestAsset,
) {
    height.set(h);
    db.write::<StateMutationError, _, _>(|txn| table.delete(txn, entity))
        .unwrap();
}

fn rollback(db: &DbWrite, table: &VersionedTable<TestAssetStore>, h: u32) -> usize {
    db.write::<StateMutationError, _, _>(|txn| table.rollback(txn, h))
        .unwrap()
}

fn trim(db: &DbWrite, table: &VersionedTable<TestAssetStore>, h: u32) -> usize {
    db.write::<StateMutationError, _, _>(|txn| table.trim(txn, h))
        .unwrap()
}

fn get(db: &DbWrite, table: &VersionedTable<TestAssetStore>, id: u64) -> Option<TestAsset> {
    db.read::<StateQueryError, _, _>(|txn| table.get(txn, &TestAssetKey(id)))
        .unwrap()
}

fn latest_rows(db: &DbWrite, id: u64) -> i64 {
    db.conn()
        .unwrap()
        .query_row(
            "SELECT COUNT(*) FROM test_asset WHERE asset_id = ? AND latest = TRUE",
            [id as i64],
            |row| row.get(0),
        )
        .unwrap()
}

fn all_rows(db: &DbWrite) -> Vec<(u64, u32, bool)> {
    let conn = db.conn().unwrap();
    let mut stmt = conn
        .prepare("SELECT asset_id, height, latest FROM test_asset ORDER BY asset_id, height")
        .unwrap();
    let rows = stmt
        .query_map([], |row| {
            Ok((
                row.get::<_, i64>(0)? as u64,
                row.get::<_, i64>(1)? as u32,
                row.get(2)?,
            ))
        })
        .unwrap();
    rows.collect::<Result<_, _>>().unwrap()
}

fn rows_at_or_above(db: &DbWrite, h: u32) -> i64 {
    db.conn()
        .unwrap()
        .query_row(
            "SELECT COUNT(*) FROM test_asset WHERE height >= ?",
            [i64::from(h)],
            |row| row.get(0),
        )
        .unwrap()
}

#[test]
fn rollback_restores_prior_versions() {
    test_run();
    let db = test_state_db();
    let (table, height, _cache) = test_asset_table(0);

    insert_at(&db, &table, &height, 10, &asset(1, 100, "v1"));
    insert_at(&db, &table, &height, 20, &asset(1, 200, "v2"));
    insert_at(&db, &table, &height, 30, &asset(1, 300, "v3"));
    assert_eq!(get(&db, &table, 1).unwrap().quantity, 300);

    // everything written at or above 30 belongs to the abandoned branch
    let affected = rollback(&db, &table, 30);
    assert_eq!(affected, 1);
    assert_eq!(get(&db, &table, 1).unwrap().quantity, 200);
    assert_eq!(rows_at_or_above(&db, 30), 0);

    // rolling back to the first version's height erases the entity entirely
    rollback(&db, &table, 10);
    assert_eq!(get(&db, &table, 1), None);
    assert_eq!(all_rows(&db), vec![]);
}

#[test]
fn rollback_is_idempotent() {
    let db = test_state_db();
    let (table, height, _cache) = test_asset_table(0);

    insert_at(&db, &table, &height, 10, &asset(1, 100, "v1"));
    insert_at(&db, &table, &height, 20, &asset(1, 200, "v2"));

    rollback(&db, &table, 20);
    let rows = all_rows(&db);
    let current = get(&db, &table, 1);

    let affected = rollback(&db, &table, 20);
    assert_eq!(affected, 0);
    assert_eq!(all_rows(&db), rows);
    assert_eq!(get(&db, &table, 1), current);
}

#[test]
fn single_latest_invariant_holds_after_mixed_operations() {
    let db = test_state_db();
    let (table, height, _cache) = test_asset_table(0);

    insert_at(&db, &table, &height, 10, &asset(1, 100, "a"));
    insert_at(&db, &table, &height, 15, &asset(2, 10, "b"));
    insert_at(&db, &table, &height, 20, &asset(1, 110, "a"));
    delete_at(&db, &table, &height, 25, &asset(2, 10, "b"));
    delete_at(&db, &table, &height, 30, &asset(1, 110, "a"));
    insert_at(&db, &table, &height, 30, &asset(1, 120, "a"));
    rollback(&db, &table, 28);

    let offenders: Vec<i64> = {
        let conn = db.conn().unwrap();
        let mut stmt = conn
            .prepare("SELECT asset_id FROM test_asset GROUP BY asset_id HAVING SUM(latest) > 1")
            .unwrap();
        let rows = stmt.query_map([], |row| row.get(0)).unwrap();
        rows.collect::<Result<_, _>>().unwrap()
    };
    assert_eq!(offenders, Vec::<i64>::new());
    assert_eq!(latest_rows(&db, 1), 1);
    // key 2 was deleted below the rollback height and stays deleted
    assert_eq!(latest_rows(&db, 2), 0);
    assert_eq!(get(&db, &table, 1).unwrap().quantity, 110);
    assert_eq!(get(&db, &table, 2), None);
}

#[test]
fn trim_preserves_current_reads() {
    let db = test_state_db();
    let (table, height, _cache) = test_asset_table(0);

    insert_at(&db, &table, &height, 10, &asset(1, 100, "a"));
    insert_at(&db, &table, &height, 20, &asset(1, 200, "a"));
    insert_at(&db, &table, &height, 30, &asset(1, 300, "a"));
    insert_at(&db, &table, &height, 12, &asset(2, 10, "b"));
    insert_at(&db, &table, &height, 10, &asset(3, 5, "c"));
    delete_at(&db, &table, &height, 15, &asset(3, 5, "c"));
    height.set(40);

    let before: Vec<Option<TestAsset>> =
        (1..=3).map(|id| get(&db, &table, id)).collect();

    let deleted = trim(&db, &table, 25);
    // key 1 loses its height-10 version, key 3 its height-10 version;
    // key 2 has a single version and is untouched
    assert_eq!(deleted, 2);

    let after: Vec<Option<TestAsset>> = (1..=3).map(|id| get(&db, &table, id)).collect();
    assert_eq!(before, after);
}

#[test]
fn trim_never_touches_versions_at_or_above_the_trim_height() {
    let db = test_state_db();
    let (table, height, _cache) = test_asset_table(0);

    insert_at(&db, &table, &height, 10, &asset(1, 100, "a"));
    insert_at(&db, &table, &height, 20, &asset(1, 200, "a"));
    insert_at(&db, &table, &height, 30, &asset(1, 300, "a"));
    height.set(40);

    let recent_before = rows_at_or_above(&db, 25);
    trim(&db, &table, 25);
    assert_eq!(rows_at_or_above(&db, 25), recent_before);

    // the retained version below the trim height is the newest one below it
    assert_eq!(
        all_rows(&db),
        vec![(1, 20, false), (1, 30, true)]
    );
}

#[test]
fn delete_then_rollback_resurrects_the_entity() {
    let db = test_state_db();
    let (table, height, _cache) = test_asset_table(0);

    let original = asset(1, 100, "precious");
    insert_at(&db, &table, &height, 10, &original);
    delete_at(&db, &table, &height, 20, &original);
    assert_eq!(get(&db, &table, 1), None);

    rollback(&db, &table, 20);
    assert_eq!(get(&db, &table, 1), Some(original));
}

#[test]
fn same_height_reapplication_replaces_the_row() {
    let db = test_state_db();
    let (table, height, _cache) = test_asset_table(0);

    insert_at(&db, &table, &height, 10, &asset(1, 100, "first"));
    insert_at(&db, &table, &height, 10, &asset(1, 150, "second"));
    assert_eq!(all_rows(&db), vec![(1, 10, true)]);
    assert_eq!(get(&db, &table, 1).unwrap().quantity, 150);

    // update, delete, re-insert within one block must also leave one row
    delete_at(&db, &table, &height, 10, &asset(1, 150, "second"));
    insert_at(&db, &table, &height, 10, &asset(1, 175, "third"));
    assert_eq!(all_rows(&db), vec![(1, 10, true)]);
    assert_eq!(get(&db, &table, 1).unwrap().quantity, 175);
}

#[test]
fn cache_is_write_through_and_evicted_on_delete_and_rollback() {
    let db = test_state_db();
    let (table, height, cache) = test_asset_table(0);

    let v1 = asset(1, 100, "v1");
    insert_at(&db, &table, &height, 10, &v1);
    assert_eq!(cache.get(&TestAssetKey(1)), Some(v1.clone()));

    delete_at(&db, &table, &height, 20, &v1);
    assert_eq!(cache.get(&TestAssetKey(1)), None);

    rollback(&db, &table, 20);
    // rollback restored the entity in storage but must leave the cache cold
    assert_eq!(cache.get(&TestAssetKey(1)), None);

    // a read faults the entry back in
    assert_eq!(get(&db, &table, 1), Some(v1.clone()));
    assert_eq!(cache.get(&TestAssetKey(1)), Some(v1));
}

#[test]
fn reads_are_correct_with_a_cold_cache() {
    let db = test_state_db();
    let (table, height, _cache) = test_asset_table(0);

    insert_at(&db, &table, &height, 10, &asset(1, 100, "v1"));
    insert_at(&db, &table, &height, 20, &asset(1, 200, "v2"));

    // a second table instance over the same rows, with nothing cached
    let cold = VersionedTable::<TestAssetStore>::new(EntityCache::new(), height.clone());
    let warm_read = get(&db, &table, 1);
    let cold_read = db
        .read::<StateQueryError, _, _>(|txn| cold.get(txn, &TestAssetKey(1)))
        .unwrap();
    assert_eq!(warm_read, cold_read);
}

#[test]
fn get_all_is_ordered_paginated_and_skips_deleted() {
    let db = test_state_db();
    let (table, height, _cache) = test_asset_table(0);

    for id in 1..=5 {
        insert_at(&db, &table, &height, 10, &asset(id, id * 10, "x"));
    }
    delete_at(&db, &table, &height, 20, &asset(3, 30, "x"));

    let page: Vec<u64> = db
        .read::<StateQueryError, _, _>(|txn| table.get_all(txn, 0, 10))
        .unwrap()
        .into_iter()
        .map(|a| a.asset_id)
        .collect();
    assert_eq!(page, vec![1, 2, 4, 5]);

    let page: Vec<u64> = db
        .read::<StateQueryError, _, _>(|txn| table.get_all(txn, 1, 2))
        .unwrap()
        .into_iter()
        .map(|a| a.asset_id)
        .collect();
    assert_eq!(page, vec![2, 4]);

    let count = db
        .read::<StateQueryError, _, _>(|txn| table.count(txn))
        .unwrap();
    assert_eq!(count, 4);
}

#[test]
fn non_versioned_table_upserts_in_place() {
    let db = test_state_db();
    let table = EntityTable::<TestPeerStore>::new(EntityCache::new());

    let insert = |peer: &TestPeer| {
        db.write::<StateMutationError, _, _>(|txn| table.insert(txn, peer))
            .unwrap();
    };
    insert(&TestPeer {
        address: "10.0.0.2:7874".into(),
        services: 1,
    });
    insert(&TestPeer {
        address: "10.0.0.1:7874".into(),
        services: 1,
    });
    insert(&TestPeer {
        address: "10.0.0.2:7874".into(),
        services: 3,
    });

    let (count, peers) = db
        .read::<StateQueryError, _, _>(|txn| Ok((table.count(txn)?, table.get_all(txn, 0, 10)?)))
        .unwrap();
    assert_eq!(count, 2);
    assert_eq!(
        peers
            .iter()
            .map(|p| (p.address.as_str(), p.services))
            .collect::<Vec<_>>(),
        vec![("10.0.0.1:7874", 1), ("10.0.0.2:7874", 3)]
    );

    let updated = db
        .read::<StateQueryError, _, _>(|txn| {
            table.get(txn, &TestPeerKey("10.0.0.2:7874".into()))
        })
        .unwrap();
    assert_eq!(updated.unwrap().services, 3);
}

#[test]
fn works_on_disk_too() {
    let TestDb { db, tmpdir: _tmpdir } = test_state_db_on_disk();
    let (table, height, _cache) = test_asset_table(0);

    insert_at(&db, &table, &height, 10, &asset(1, 100, "v1"));
    insert_at(&db, &table, &height, 20, &asset(1, 200, "v2"));
    rollback(&db, &table, 20);
    assert_eq!(get(&db, &table, 1).unwrap().quantity, 100);
}
