//! Snapshot retention bound and idempotent cleanup

use chrono::TimeDelta;
use pretty_assertions::assert_eq;
use tempfile::tempdir;

use crate::common::test_data;
use funding_collector::retention::{RetentionPolicy, SnapshotStore};

#[tokio::test]
async fn test_keeps_most_recent_snapshots() {
    let temp_dir = tempdir().unwrap();
    let store = SnapshotStore::new(temp_dir.path(), RetentionPolicy { max_history_items: 3 });

    let mut saved = Vec::new();
    for i in 0..5 {
        let snapshot = test_data::create_test_snapshot(test_data::t0() + TimeDelta::minutes(i));
        saved.push(store.save(&snapshot).await.unwrap());
    }

    let remaining: Vec<u64> = store.list().await.unwrap().into_iter().map(|e| e.id).collect();
    let expected: Vec<u64> = saved[2..].iter().map(|e| e.id).collect();
    assert_eq!(remaining, expected);

    assert!(!saved[0].path.exists());
    assert!(!saved[1].path.exists());
}

#[tokio::test]
async fn test_cleanup_is_idempotent() {
    let temp_dir = tempdir().unwrap();
    let store = SnapshotStore::new(temp_dir.path(), RetentionPolicy { max_history_items: 2 });

    for i in 0..4 {
        let snapshot = test_data::create_test_snapshot(test_data::t0() + TimeDelta::seconds(i));
        store.save(&snapshot).await.unwrap();
    }

    assert_eq!(store.cleanup().await.unwrap(), 0);
    assert_eq!(store.cleanup().await.unwrap(), 0);
    assert_eq!(store.list().await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_fewer_saves_than_limit_are_all_kept() {
    let temp_dir = tempdir().unwrap();
    let store = SnapshotStore::new(temp_dir.path(), RetentionPolicy { max_history_items: 10 });

    for i in 0..3 {
        let snapshot = test_data::create_test_snapshot(test_data::t0() + TimeDelta::seconds(i));
        store.save(&snapshot).await.unwrap();
    }

    assert_eq!(store.list().await.unwrap().len(), 3);
}

#[tokio::test]
async fn test_get_latest_returns_newest() {
    let temp_dir = tempdir().unwrap();
    let store = SnapshotStore::new(temp_dir.path().join("nested/dir"), RetentionPolicy { max_history_items: 3 });

    assert!(store.get_latest().await.unwrap().is_none());

    let newest = test_data::t0() + TimeDelta::hours(1);
    store.save(&test_data::create_test_snapshot(test_data::t0())).await.unwrap();
    store.save(&test_data::create_test_snapshot(newest)).await.unwrap();

    let latest = store.get_latest().await.unwrap().unwrap();
    assert_eq!(latest.timestamp, newest);
}

#[tokio::test]
async fn test_reopened_store_continues_id_sequence() {
    let temp_dir = tempdir().unwrap();
    let policy = RetentionPolicy { max_history_items: 5 };

    let first = SnapshotStore::new(temp_dir.path(), policy)
        .save(&test_data::create_test_snapshot(test_data::t0()))
        .await
        .unwrap();

    // An older clock reading must still sort after what is on disk
    let second = SnapshotStore::new(temp_dir.path(), policy)
        .save(&test_data::create_test_snapshot(test_data::t0() - TimeDelta::minutes(5)))
        .await
        .unwrap();

    assert!(second.id > first.id);
}
