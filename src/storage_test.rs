use super::*;
use crate::timer::ManualScheduler;

const DAY_MS: i64 = 24 * 60 * 60 * 1000;
const START_MS: i64 = 1_700_000_000_000;

struct BrokenStore;

impl KeyValueStore for BrokenStore {
    fn get(&self, _key: &str) -> Result<Option<String>, StorageError> {
        Err(StorageError::Unavailable)
    }
    fn set(&self, _key: &str, _value: &str) -> Result<(), StorageError> {
        Err(StorageError::Unavailable)
    }
    fn remove(&self, _key: &str) -> Result<(), StorageError> {
        Err(StorageError::Unavailable)
    }
    fn keys(&self) -> Result<Vec<String>, StorageError> {
        Err(StorageError::Unavailable)
    }
}

fn setup() -> (DraftStorage, MemoryStore, ManualScheduler) {
    let store = MemoryStore::new();
    let clock = ManualScheduler::new(START_MS);
    let storage = DraftStorage::open(
        Arc::new(store.clone()),
        Arc::new(clock.clone()),
        "autosave_",
        Duration::from_millis(7 * DAY_MS as u64),
    );
    (storage, store, clock)
}

fn data(pairs: &[(&str, &str)]) -> FormData {
    pairs.iter().map(|(k, v)| ((*k).to_owned(), (*v).to_owned())).collect()
}

fn write_raw_record(store: &MemoryStore, key: &str, timestamp: i64) {
    let record = DraftRecord { data: data(&[("name", "old")]), timestamp, form_type: "contact".to_owned() };
    store.set(key, &serde_json::to_string(&record).unwrap()).unwrap();
}

// =============================================================================
// save / load / clear
// =============================================================================

#[test]
fn load_after_save_returns_data() {
    let (storage, _, _) = setup();
    let form = FormId::new("contact");
    let fields = data(&[("name", "Ada"), ("email", "ada@example.com")]);
    storage.save(&form, &fields).unwrap();
    assert_eq!(storage.load(&form), Some(fields));
}

#[test]
fn save_stamps_clock_time_and_form_type() {
    let (storage, store, _) = setup();
    let record = storage.save(&FormId::new("contact"), &data(&[("a", "1")])).unwrap();
    assert_eq!(record.timestamp, START_MS);
    assert_eq!(record.form_type, "contact");

    let raw = store.get("autosave_contact").unwrap().unwrap();
    let json: serde_json::Value = serde_json::from_str(&raw).unwrap();
    assert_eq!(json["formType"], "contact");
    assert_eq!(json["timestamp"], START_MS);
    assert_eq!(json["data"]["a"], "1");
}

#[test]
fn save_overwrites_single_record_per_key() {
    let (storage, store, _) = setup();
    let form = FormId::new("contact");
    storage.save(&form, &data(&[("name", "A")])).unwrap();
    storage.save(&form, &data(&[("name", "Ab")])).unwrap();
    assert_eq!(store.len(), 1);
    assert_eq!(storage.load(&form), Some(data(&[("name", "Ab")])));
}

#[test]
fn user_scoped_drafts_are_independent() {
    let (storage, _, _) = setup();
    let alice = FormId::for_user("contact", "alice");
    let bob = FormId::for_user("contact", "bob");
    storage.save(&alice, &data(&[("name", "Alice")])).unwrap();
    assert_eq!(storage.load(&bob), None);
    assert_eq!(storage.load(&alice), Some(data(&[("name", "Alice")])));
}

#[test]
fn clear_then_load_is_none_and_clear_is_idempotent() {
    let (storage, _, _) = setup();
    let form = FormId::new("contact");
    storage.save(&form, &data(&[("name", "A")])).unwrap();
    storage.clear(&form);
    assert_eq!(storage.load(&form), None);
    storage.clear(&form);
    assert_eq!(storage.load(&form), None);
}

#[test]
fn save_reports_quota_failure() {
    let store = MemoryStore::with_quota(16);
    let clock = ManualScheduler::new(START_MS);
    let storage = DraftStorage::open(Arc::new(store), Arc::new(clock), "autosave_", Duration::from_secs(60));
    let err = storage.save(&FormId::new("contact"), &data(&[("message", "far too long for the quota")])).unwrap_err();
    assert!(matches!(err, StorageError::QuotaExceeded { .. }));
}

// =============================================================================
// expiration
// =============================================================================

#[test]
fn load_returns_six_day_old_record() {
    let (storage, store, _) = setup();
    write_raw_record(&store, "autosave_contact", START_MS - 6 * DAY_MS);
    assert_eq!(storage.load(&FormId::new("contact")), Some(data(&[("name", "old")])));
}

#[test]
fn load_evicts_eight_day_old_record() {
    let (storage, store, _) = setup();
    write_raw_record(&store, "autosave_contact", START_MS - 8 * DAY_MS);
    let form = FormId::new("contact");
    assert_eq!(storage.load(&form), None);
    assert_eq!(store.get("autosave_contact").unwrap(), None);
    // Second load is also None without error.
    assert_eq!(storage.load(&form), None);
}

#[test]
fn record_expires_as_the_clock_advances() {
    let (storage, _, clock) = setup();
    let form = FormId::new("contact");
    storage.save(&form, &data(&[("name", "A")])).unwrap();
    clock.advance(Duration::from_millis(7 * DAY_MS as u64));
    assert!(storage.load(&form).is_some());
    clock.advance(Duration::from_millis(1));
    assert_eq!(storage.load(&form), None);
}

#[test]
fn corrupt_record_is_evicted_on_load() {
    let (storage, store, _) = setup();
    store.set("autosave_contact", "{not json").unwrap();
    assert_eq!(storage.load(&FormId::new("contact")), None);
    assert!(store.is_empty());
}

// =============================================================================
// clear_all / sweep_expired
// =============================================================================

#[test]
fn clear_all_removes_only_prefixed_keys() {
    let (storage, store, _) = setup();
    storage.save(&FormId::new("formA"), &data(&[("x", "1")])).unwrap();
    storage.save(&FormId::new("formB"), &data(&[("y", "2")])).unwrap();
    store.set("unrelated", "keep").unwrap();

    assert_eq!(storage.clear_all(), 2);
    assert_eq!(storage.load(&FormId::new("formA")), None);
    assert_eq!(storage.load(&FormId::new("formB")), None);
    assert_eq!(store.get("unrelated").unwrap().as_deref(), Some("keep"));
}

#[test]
fn scoped_clear_leaves_other_form_intact() {
    let (storage, _, _) = setup();
    storage.save(&FormId::new("formA"), &data(&[("x", "1")])).unwrap();
    storage.save(&FormId::new("formB"), &data(&[("y", "2")])).unwrap();

    storage.clear(&FormId::new("formA"));
    assert_eq!(storage.load(&FormId::new("formA")), None);
    assert_eq!(storage.load(&FormId::new("formB")), Some(data(&[("y", "2")])));
}

#[test]
fn sweep_evicts_expired_and_corrupt_but_keeps_fresh() {
    let (storage, store, _) = setup();
    write_raw_record(&store, "autosave_old", START_MS - 8 * DAY_MS);
    write_raw_record(&store, "autosave_fresh", START_MS - DAY_MS);
    store.set("autosave_broken", "garbage").unwrap();
    store.set("other_old", "garbage").unwrap();

    assert_eq!(storage.sweep_expired(), 2);
    let mut keys = store.keys().unwrap();
    keys.sort();
    assert_eq!(keys, vec!["autosave_fresh".to_owned(), "other_old".to_owned()]);
}

// =============================================================================
// degradation
// =============================================================================

#[test]
fn open_healthy_store_is_not_degraded_and_leaves_no_probe() {
    let (storage, store, _) = setup();
    assert!(!storage.is_degraded());
    assert!(store.is_empty());
}

#[test]
fn open_unavailable_store_falls_back_to_memory() {
    let clock = ManualScheduler::new(START_MS);
    let storage = DraftStorage::open(Arc::new(BrokenStore), Arc::new(clock), "autosave_", Duration::from_secs(60));
    assert!(storage.is_degraded());

    let form = FormId::new("contact");
    storage.save(&form, &data(&[("name", "A")])).unwrap();
    assert_eq!(storage.load(&form), Some(data(&[("name", "A")])));
}

#[test]
fn unreadable_store_yields_no_draft() {
    let clock = ManualScheduler::new(START_MS);
    let storage = DraftStorage::new(Arc::new(BrokenStore), Arc::new(clock), "autosave_", Duration::from_secs(60));
    assert_eq!(storage.load(&FormId::new("contact")), None);
    assert_eq!(storage.clear_all(), 0);
    assert_eq!(storage.sweep_expired(), 0);
}
