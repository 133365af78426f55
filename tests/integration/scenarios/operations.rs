//! Primary store operations through the cache manager

use crate::integration::mock_manager;
use mirrorcache::CacheError;
use std::collections::HashSet;

#[tokio::test]
async fn test_set_then_get_returns_value() {
    let (manager, _) = mock_manager(None);

    let written = manager
        .set(b"session:1", b"serialized-session".to_vec())
        .await
        .unwrap();
    assert_eq!(written, b"serialized-session".to_vec());

    let value = manager.get(b"session:1").await.unwrap();
    assert_eq!(value, Some(b"serialized-session".to_vec()));
}

#[tokio::test]
async fn test_binary_keys_and_values_are_opaque() {
    let (manager, _) = mock_manager(None);
    let key = vec![0u8, 159, 146, 150, 255];
    let value = vec![255u8, 0, 0, 10, 13];

    manager.set(&key, value.clone()).await.unwrap();
    assert_eq!(manager.get(&key).await.unwrap(), Some(value));
}

#[tokio::test]
async fn test_get_missing_key_is_none() {
    let (manager, _) = mock_manager(None);
    assert_eq!(manager.get(b"never-written").await.unwrap(), None);
}

#[tokio::test]
async fn test_delete_then_get_is_absent() {
    let (manager, _) = mock_manager(None);

    manager.set(b"session:2", b"v".to_vec()).await.unwrap();
    manager.delete(b"session:2").await.unwrap();

    assert_eq!(manager.get(b"session:2").await.unwrap(), None);
}

#[tokio::test]
async fn test_delete_absent_key_is_noop() {
    let (manager, _) = mock_manager(None);
    assert!(manager.delete(b"no-such-key").await.is_ok());
}

#[tokio::test]
async fn test_size_counts_primary_entries() {
    let (manager, _) = mock_manager(None);
    assert_eq!(manager.size().await.unwrap(), 0);

    manager.set(b"a", b"1".to_vec()).await.unwrap();
    manager.set(b"b", b"2".to_vec()).await.unwrap();
    manager.set(b"a", b"3".to_vec()).await.unwrap();

    assert_eq!(manager.size().await.unwrap(), 2);
}

#[tokio::test]
async fn test_keys_uses_glob_pattern() {
    let (manager, _) = mock_manager(None);
    manager.set(b"shiro:session:1", b"x".to_vec()).await.unwrap();
    manager.set(b"shiro:session:2", b"y".to_vec()).await.unwrap();
    manager.set(b"shiro:cache:authz", b"z".to_vec()).await.unwrap();

    let keys = manager.keys("shiro:session:*").await.unwrap();
    let expected: HashSet<Vec<u8>> = [b"shiro:session:1".to_vec(), b"shiro:session:2".to_vec()]
        .into_iter()
        .collect();
    assert_eq!(keys, expected);

    assert_eq!(manager.keys("*").await.unwrap().len(), 3);
}

#[tokio::test]
async fn test_keys_without_match_is_empty_set() {
    let (manager, _) = mock_manager(None);
    manager.set(b"a", b"1".to_vec()).await.unwrap();

    let keys = manager.keys("nothing:*").await.unwrap();
    assert!(keys.is_empty());
}

#[tokio::test]
async fn test_reads_are_served_by_primary_only() {
    let (manager, factory) = mock_manager(Some("mirror-a mirror-b"));
    manager.init().await.unwrap();

    let mirror_a = factory.store("mirror-a", 6379);
    mirror_a.set_stored_value(b"only-on-mirror", b"stale");

    assert_eq!(manager.get(b"only-on-mirror").await.unwrap(), None);
    assert_eq!(manager.size().await.unwrap(), 0);
    assert!(manager.keys("*").await.unwrap().is_empty());

    assert_eq!(mirror_a.stats().gets, 0);
    assert_eq!(factory.store("mirror-b", 6379).stats().gets, 0);
    assert_eq!(factory.store("primary", 6379).stats().gets, 1);
}

#[tokio::test]
async fn test_unreachable_primary_fails_regardless_of_mirrors() {
    let (manager, factory) = mock_manager(Some("mirror-a"));
    factory.store("primary", 6379).set_reachable(false);

    let err = manager.set(b"k", b"v".to_vec()).await.unwrap_err();
    assert!(err.is_connection_error());
    assert!(err.to_string().contains("primary:6379"));

    assert!(manager.get(b"k").await.unwrap_err().is_connection_error());
    assert!(manager.delete(b"k").await.unwrap_err().is_connection_error());
    assert!(matches!(manager.size().await, Err(CacheError::Backend(_))));
    assert!(matches!(manager.keys("*").await, Err(CacheError::Backend(_))));
}

#[tokio::test]
async fn test_primary_failure_after_mirror_write_leaves_mirror_updated() {
    let (manager, factory) = mock_manager(Some("mirror-a"));
    factory.store("primary", 6379).set_reachable(false);

    assert!(manager.set(b"k", b"v".to_vec()).await.is_err());

    // Mirrors are written before the primary is attempted
    assert_eq!(
        factory.store("mirror-a", 6379).get_stored_value(b"k"),
        Some(b"v".to_vec())
    );
}

#[tokio::test]
async fn test_primary_recovers_without_rebuilding_pools() {
    let (manager, factory) = mock_manager(None);
    let primary = factory.store("primary", 6379);

    primary.set_reachable(false);
    assert!(manager.get(b"k").await.is_err());

    primary.set_reachable(true);
    manager.set(b"k", b"v".to_vec()).await.unwrap();
    assert_eq!(manager.get(b"k").await.unwrap(), Some(b"v".to_vec()));
    assert_eq!(factory.created(), 1);
}
