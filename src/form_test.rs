use super::*;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::config::{AutoSaveConfig, FormConfig};
use crate::store::MemoryStore;
use crate::timer::ManualScheduler;

/// Records firings without delivering them; tests deliver by hand.
struct RecordingArm {
    sched: ManualScheduler,
    fired: Arc<Mutex<Vec<(TimerKind, u64)>>>,
}

impl Arm for RecordingArm {
    fn arm(&self, slot: &mut TimerSlot, kind: TimerKind, delay: Duration) {
        let fired = Arc::clone(&self.fired);
        slot.start(&self.sched, delay, move |generation| fired.lock().unwrap().push((kind, generation)));
    }
}

struct Fixture {
    arm: RecordingArm,
    storage: DraftStorage,
    store: MemoryStore,
}

impl Fixture {
    fn new() -> Self {
        let sched = ManualScheduler::new(0);
        let store = MemoryStore::new();
        let storage = DraftStorage::new(
            Arc::new(store.clone()),
            Arc::new(sched.clone()),
            "t_",
            Duration::from_secs(3_600),
        );
        Self { arm: RecordingArm { sched, fired: Arc::default() }, storage, store }
    }

    fn advance_and_deliver(&self, rt: &mut FormRuntime, by: Duration) -> Vec<StorageError> {
        self.arm.sched.advance(by);
        let fired = std::mem::take(&mut *self.arm.fired.lock().unwrap());
        fired
            .into_iter()
            .filter_map(|(kind, generation)| rt.fire(kind, generation, &self.storage, &self.arm))
            .collect()
    }
}

fn runtime(form: FormConfig) -> FormRuntime {
    let config = AutoSaveConfig::default().with_form("contact", form);
    let settings = config.resolve_form("contact", None).unwrap();
    FormRuntime::new(1, FormId::new("contact"), settings, None)
}

fn data(pairs: &[(&str, &str)]) -> FormData {
    pairs.iter().map(|(k, v)| ((*k).to_owned(), (*v).to_owned())).collect()
}

#[test]
fn new_runtime_is_idle() {
    let rt = runtime(FormConfig::default());
    assert_eq!(rt.view(), StatusView { status: SaveStatus::Idle, in_session: false, enabled: true });
    assert!(!rt.has_pending_timers());
    assert_eq!(rt.mount_id(), 1);
}

#[test]
fn observe_opens_session_and_publishes() {
    let fx = Fixture::new();
    let mut rt = runtime(FormConfig::default());
    let mut rx = rt.subscribe();

    assert!(rt.observe(&data(&[("name", "A")]), &fx.arm));
    assert!(rx.has_changed().unwrap());
    assert!(rx.borrow_and_update().in_session);
}

#[test]
fn manual_save_writes_filtered_fields() {
    let fx = Fixture::new();
    let mut rt = runtime(FormConfig::default().tracking(["name"]));
    let outcome = rt.save_now(&data(&[("name", "A"), ("card", "4111")]), &fx.storage, &fx.arm);
    assert!(matches!(outcome, Persisted::Saved));
    assert_eq!(rt.view().status, SaveStatus::Saved);
    assert_eq!(fx.storage.load(rt.id()), Some(data(&[("name", "A")])));
}

#[test]
fn saved_reverts_to_idle_without_session() {
    let fx = Fixture::new();
    let mut rt = runtime(FormConfig::default());
    rt.save_now(&data(&[("name", "A")]), &fx.storage, &fx.arm);

    assert!(fx.advance_and_deliver(&mut rt, Duration::from_millis(2_000)).is_empty());
    assert_eq!(rt.view().status, SaveStatus::Idle);
    assert!(!rt.has_pending_timers());
}

#[test]
fn failed_save_reports_error_and_reverts_to_idle() {
    let fx = Fixture::new();
    let store = MemoryStore::with_quota(8);
    let storage = DraftStorage::new(Arc::new(store), Arc::new(fx.arm.sched.clone()), "t_", Duration::from_secs(60));
    let mut rt = runtime(FormConfig::default());

    let outcome = rt.save_now(&data(&[("name", "A")]), &storage, &fx.arm);
    assert!(matches!(outcome, Persisted::Failed(StorageError::QuotaExceeded { .. })));
    assert_eq!(rt.view().status, SaveStatus::Error);

    fx.advance_and_deliver(&mut rt, Duration::from_millis(2_000));
    assert_eq!(rt.view().status, SaveStatus::Idle);
}

#[test]
fn disabled_runtime_refuses_observe_and_save() {
    let fx = Fixture::new();
    let mut rt = runtime(FormConfig { enabled: false, ..FormConfig::default() });
    assert!(!rt.observe(&data(&[("name", "A")]), &fx.arm));
    assert!(matches!(rt.save_now(&data(&[("name", "A")]), &fx.storage, &fx.arm), Persisted::Skipped));
    assert!(fx.store.is_empty());
}

#[test]
fn disabling_clears_draft_and_session() {
    let fx = Fixture::new();
    let mut rt = runtime(FormConfig::default());
    rt.save_now(&data(&[("name", "A")]), &fx.storage, &fx.arm);
    rt.observe(&data(&[("name", "Ab")]), &fx.arm);

    rt.set_enabled(false, &fx.storage);
    assert!(fx.store.is_empty());
    assert_eq!(rt.view(), StatusView { status: SaveStatus::Idle, in_session: false, enabled: false });
    assert!(!rt.has_pending_timers());
    assert_eq!(fx.arm.sched.pending(), 0);
}

#[test]
fn end_session_cancels_everything() {
    let fx = Fixture::new();
    let mut rt = runtime(FormConfig::default());
    rt.observe(&data(&[("name", "A")]), &fx.arm);
    assert!(rt.has_pending_timers());

    rt.end_session();
    rt.end_session();
    assert!(!rt.has_pending_timers());
    assert_eq!(rt.view().status, SaveStatus::Idle);
    assert!(fx.advance_and_deliver(&mut rt, Duration::from_secs(600)).is_empty());
    assert!(fx.store.is_empty());
}
