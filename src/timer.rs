//! Cancellable scheduled tasks.
//!
//! DESIGN
//! ======
//! Debounce, save, status and session timers are all one-shot callbacks
//! scheduled through [`Scheduler`]. Each returns a [`TaskHandle`] whose
//! `cancel()` guarantees the callback will not run afterwards. Three
//! implementations:
//! - [`TokioScheduler`]: `tokio::time::sleep` on a runtime handle.
//! - [`ManualScheduler`]: fake clock; tasks fire only from `advance()`.
//! - `BrowserScheduler` (feature `hydrate`): `gloo-timers` timeouts.
//!
//! [`TimerSlot`] adds a generation token on top, so a callback that was
//! already in flight when its slot was re-armed recognizes itself as stale.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::task::AbortHandle;
use tracing::debug;

use crate::clock::Clock;
use crate::error::SchedulerError;
use crate::lock;

/// A one-shot callback.
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Runs tasks after a delay.
pub trait Scheduler: Send + Sync {
    fn schedule(&self, delay: Duration, task: Task) -> TaskHandle;
}

/// Handle to a scheduled task.
///
/// Dropping the handle does not cancel the task.
#[derive(Debug)]
pub struct TaskHandle {
    cancelled: Arc<AtomicBool>,
    abort: Option<AbortHandle>,
}

impl TaskHandle {
    fn new() -> (Self, Arc<AtomicBool>) {
        let cancelled = Arc::new(AtomicBool::new(false));
        (Self { cancelled: Arc::clone(&cancelled), abort: None }, cancelled)
    }

    /// Prevent the task from running. Idempotent; a no-op after it ran.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        if let Some(abort) = &self.abort {
            abort.abort();
        }
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

fn duration_ms(delay: Duration) -> i64 {
    i64::try_from(delay.as_millis()).unwrap_or(i64::MAX)
}

// =============================================================================
// TOKIO
// =============================================================================

/// Scheduler backed by a tokio runtime.
#[derive(Clone, Debug)]
pub struct TokioScheduler {
    handle: Handle,
}

impl TokioScheduler {
    #[must_use]
    pub fn new(handle: Handle) -> Self {
        Self { handle }
    }

    /// Use the runtime the caller is running on.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::NoRuntime`] outside a tokio runtime.
    pub fn current() -> Result<Self, SchedulerError> {
        Handle::try_current().map(Self::new).map_err(|_| SchedulerError::NoRuntime)
    }
}

impl Scheduler for TokioScheduler {
    fn schedule(&self, delay: Duration, task: Task) -> TaskHandle {
        let (mut handle, cancelled) = TaskHandle::new();
        let join = self.handle.spawn(async move {
            tokio::time::sleep(delay).await;
            if !cancelled.load(Ordering::SeqCst) {
                task();
            }
        });
        handle.abort = Some(join.abort_handle());
        handle
    }
}

// =============================================================================
// MANUAL (FAKE CLOCK)
// =============================================================================

/// Deterministic scheduler with its own clock.
///
/// Time only moves when [`advance`](Self::advance) is called; due tasks run
/// synchronously on the caller's thread in deadline order (ties in
/// scheduling order), with the clock set to each task's deadline while it
/// runs. Tasks scheduled by a running task fire in the same `advance` call
/// if they fall due before its target.
#[derive(Clone, Debug)]
pub struct ManualScheduler {
    inner: Arc<Mutex<ManualInner>>,
}

#[derive(Debug, Default)]
struct ManualInner {
    now_ms: i64,
    seq: u64,
    queue: BTreeMap<(i64, u64), Pending>,
}

struct Pending {
    task: Task,
    cancelled: Arc<AtomicBool>,
}

impl std::fmt::Debug for Pending {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pending").field("cancelled", &self.cancelled).finish_non_exhaustive()
    }
}

impl ManualScheduler {
    /// Start the fake clock at `start_ms` (epoch milliseconds).
    #[must_use]
    pub fn new(start_ms: i64) -> Self {
        Self { inner: Arc::new(Mutex::new(ManualInner { now_ms: start_ms, ..ManualInner::default() })) }
    }

    /// Move the clock forward by `by`, running every task that falls due.
    pub fn advance(&self, by: Duration) {
        let target = lock(&self.inner).now_ms.saturating_add(duration_ms(by));
        loop {
            // EDGE: release the queue lock before running a task; tasks
            // schedule follow-up tasks.
            let next = {
                let mut inner = lock(&self.inner);
                let due_at = inner.queue.first_key_value().map(|(&(at, _), _)| at);
                match due_at {
                    Some(at) if at <= target => {
                        inner.now_ms = inner.now_ms.max(at);
                        inner.queue.pop_first().map(|(_, pending)| pending)
                    }
                    _ => None,
                }
            };
            let Some(pending) = next else {
                break;
            };
            if !pending.cancelled.load(Ordering::SeqCst) {
                (pending.task)();
            }
        }
        let mut inner = lock(&self.inner);
        inner.now_ms = inner.now_ms.max(target);
    }

    /// Number of scheduled tasks that are neither cancelled nor run.
    #[must_use]
    pub fn pending(&self) -> usize {
        lock(&self.inner).queue.values().filter(|p| !p.cancelled.load(Ordering::SeqCst)).count()
    }
}

impl Scheduler for ManualScheduler {
    fn schedule(&self, delay: Duration, task: Task) -> TaskHandle {
        let (handle, cancelled) = TaskHandle::new();
        let mut inner = lock(&self.inner);
        let at = inner.now_ms.saturating_add(duration_ms(delay));
        let seq = inner.seq;
        inner.seq += 1;
        inner.queue.insert((at, seq), Pending { task, cancelled });
        handle
    }
}

impl Clock for ManualScheduler {
    fn now_ms(&self) -> i64 {
        lock(&self.inner).now_ms
    }
}

// =============================================================================
// BROWSER
// =============================================================================

/// Scheduler backed by `setTimeout` via `gloo-timers`.
#[cfg(feature = "hydrate")]
#[derive(Clone, Copy, Debug, Default)]
pub struct BrowserScheduler;

#[cfg(feature = "hydrate")]
impl Scheduler for BrowserScheduler {
    fn schedule(&self, delay: Duration, task: Task) -> TaskHandle {
        let (handle, cancelled) = TaskHandle::new();
        let millis = u32::try_from(delay.as_millis()).unwrap_or(u32::MAX);
        // The JS timeout is not Send; cancellation goes through the flag.
        gloo_timers::callback::Timeout::new(millis, move || {
            if !cancelled.load(Ordering::SeqCst) {
                task();
            }
        })
        .forget();
        handle
    }
}

// =============================================================================
// TIMER SLOT
// =============================================================================

/// Which per-form timer a callback belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum TimerKind {
    Debounce,
    Save,
    StatusReset,
    Inactivity,
    ImmediateResponse,
}

/// Arms a slot so that its expiry is routed back to the owning form.
pub(crate) trait Arm {
    fn arm(&self, slot: &mut TimerSlot, kind: TimerKind, delay: Duration);
}

/// At most one live task of a given kind, plus a generation token.
#[derive(Debug, Default)]
pub(crate) struct TimerSlot {
    handle: Option<TaskHandle>,
    generation: u64,
}

impl TimerSlot {
    /// Cancel any live task, then schedule `fire(generation)` after `delay`.
    pub(crate) fn start(
        &mut self,
        scheduler: &dyn Scheduler,
        delay: Duration,
        fire: impl FnOnce(u64) + Send + 'static,
    ) {
        self.cancel();
        self.generation += 1;
        let generation = self.generation;
        self.handle = Some(scheduler.schedule(delay, Box::new(move || fire(generation))));
    }

    pub(crate) fn cancel(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.cancel();
        }
    }

    pub(crate) fn is_armed(&self) -> bool {
        self.handle.is_some()
    }

    /// Accept a firing only if it belongs to the live arming; disarms the slot.
    pub(crate) fn claim(&mut self, generation: u64) -> bool {
        if self.handle.is_some() && self.generation == generation {
            self.handle = None;
            true
        } else {
            debug!(generation, current = self.generation, "stale timer ignored");
            false
        }
    }
}

#[cfg(test)]
#[path = "timer_test.rs"]
mod tests;
