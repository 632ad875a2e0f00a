use super::*;

// =============================================================================
// MemoryStore basics
// =============================================================================

#[test]
fn memory_store_get_absent_is_none() {
    let store = MemoryStore::new();
    assert_eq!(store.get("missing").unwrap(), None);
}

#[test]
fn memory_store_set_overwrites() {
    let store = MemoryStore::new();
    store.set("k", "one").unwrap();
    store.set("k", "two").unwrap();
    assert_eq!(store.get("k").unwrap().as_deref(), Some("two"));
    assert_eq!(store.len(), 1);
}

#[test]
fn memory_store_remove_absent_is_ok() {
    let store = MemoryStore::new();
    assert!(store.remove("nothing").is_ok());
    assert!(store.is_empty());
}

#[test]
fn memory_store_keys_are_sorted() {
    let store = MemoryStore::new();
    store.set("b", "2").unwrap();
    store.set("a", "1").unwrap();
    assert_eq!(store.keys().unwrap(), vec!["a".to_owned(), "b".to_owned()]);
}

#[test]
fn memory_store_clones_share_entries() {
    let store = MemoryStore::new();
    let other = store.clone();
    store.set("k", "v").unwrap();
    assert_eq!(other.get("k").unwrap().as_deref(), Some("v"));
}

// =============================================================================
// MemoryStore quota
// =============================================================================

#[test]
fn memory_store_quota_rejects_oversized_write() {
    let store = MemoryStore::with_quota(8);
    let err = store.set("key", "too-long-value").unwrap_err();
    assert!(matches!(err, StorageError::QuotaExceeded { ref key } if key == "key"));
    assert!(store.is_empty());
}

#[test]
fn memory_store_quota_counts_replaced_value_once() {
    // "k" + "1234" = 5 bytes; replacing with "5678" stays at 5.
    let store = MemoryStore::with_quota(5);
    store.set("k", "1234").unwrap();
    store.set("k", "5678").unwrap();
    assert_eq!(store.get("k").unwrap().as_deref(), Some("5678"));
}

#[test]
fn memory_store_quota_frees_space_on_remove() {
    let store = MemoryStore::with_quota(6);
    store.set("a", "12345").unwrap();
    assert!(store.set("b", "1").is_err());
    store.remove("a").unwrap();
    assert!(store.set("b", "1").is_ok());
}
