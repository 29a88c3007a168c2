//! Delayed task execution for expiry timers.
//!
//! ## Architecture
//!
//! ```text
//!   engine ──schedule(delay, ScheduledTask)──► Scheduler ──► worker runs task
//!      │                                                         │
//!      └──────────── TimerHandle (shared state) ◄────────────────┘
//!                    Pending ─cancel()─► Cancelled
//!                    Pending ─run()───► Running ─► Done
//! ```
//!
//! A task and the handle returned for it share one atomic state. Whoever
//! moves it out of `Pending` first wins: a cancelled task never starts, and a
//! task that already started cannot be cancelled (its own revalidation has to
//! cope with that).
//!
//! ## Key Components
//!
//! - [`Scheduler`]: the executor contract.
//! - [`ThreadScheduler`]: a single background worker with a deadline queue.
//! - [`ManualScheduler`]: a virtual clock driven by [`ManualScheduler::advance`],
//!   for deterministic tests.

use std::collections::BTreeMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle, ThreadId};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex, MutexGuard};

const PENDING: u8 = 0;
const RUNNING: u8 = 1;
const DONE: u8 = 2;
const CANCELLED: u8 = 3;

/// Queue length below which cancelled tasks are left for their deadline.
const PURGE_FLOOR: usize = 64;

/// Error returned when a scheduler cannot accept work.
#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    /// The scheduler has been shut down.
    #[error("scheduler has been shut down")]
    Shutdown,
    /// The worker thread could not be spawned.
    #[error("failed to spawn scheduler worker: {0}")]
    Spawn(#[source] std::io::Error),
}

// ---------------------------------------------------------------------------
// TimerHandle
// ---------------------------------------------------------------------------

/// Cancellable handle to a scheduled task.
#[derive(Clone)]
pub struct TimerHandle {
    state: Arc<AtomicU8>,
}

impl TimerHandle {
    /// Creates a handle in the pending state.
    pub fn new() -> Self {
        Self {
            state: Arc::new(AtomicU8::new(PENDING)),
        }
    }

    /// Cancels the task if it has not started yet.
    ///
    /// Returns `true` only for the call that won the race against execution;
    /// repeated calls return `false`.
    pub fn cancel(&self) -> bool {
        self.state
            .compare_exchange(PENDING, CANCELLED, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Returns `true` once the task completed or was cancelled.
    pub fn is_done(&self) -> bool {
        matches!(self.state.load(Ordering::Acquire), DONE | CANCELLED)
    }

    /// Returns `true` if the task was cancelled before it started.
    pub fn is_cancelled(&self) -> bool {
        self.state.load(Ordering::Acquire) == CANCELLED
    }

    /// Returns `true` while the task is neither started nor cancelled.
    pub fn is_pending(&self) -> bool {
        self.state.load(Ordering::Acquire) == PENDING
    }

    /// Returns `true` if both handles refer to the same task.
    pub fn ptr_eq(&self, other: &TimerHandle) -> bool {
        Arc::ptr_eq(&self.state, &other.state)
    }

    pub(crate) fn begin(&self) -> bool {
        self.state
            .compare_exchange(PENDING, RUNNING, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    fn finish(&self) {
        self.state.store(DONE, Ordering::Release);
    }
}

impl Default for TimerHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for TimerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match self.state.load(Ordering::Acquire) {
            PENDING => "pending",
            RUNNING => "running",
            DONE => "done",
            _ => "cancelled",
        };
        f.debug_tuple("TimerHandle").field(&state).finish()
    }
}

// ---------------------------------------------------------------------------
// ScheduledTask
// ---------------------------------------------------------------------------

/// A unit of delayed work paired with its [`TimerHandle`].
pub struct ScheduledTask {
    handle: TimerHandle,
    work: Box<dyn FnOnce() + Send + 'static>,
}

impl ScheduledTask {
    /// Pairs `work` with `handle`.
    pub fn new(handle: TimerHandle, work: impl FnOnce() + Send + 'static) -> Self {
        Self {
            handle,
            work: Box::new(work),
        }
    }

    /// The handle controlling this task.
    pub fn handle(&self) -> &TimerHandle {
        &self.handle
    }

    /// Runs the task unless it was cancelled. Panics are caught and logged so
    /// a failing task never takes down a shared worker.
    pub fn run(self) {
        if self.handle.begin() {
            self.execute();
        }
    }

    /// Runs the work of a task whose handle already left `Pending`.
    pub(crate) fn execute(self) {
        let outcome = panic::catch_unwind(AssertUnwindSafe(self.work));
        self.handle.finish();
        if outcome.is_err() {
            tracing::error!("scheduled task panicked");
        }
    }

    /// Cancels the task without running it.
    pub fn discard(self) {
        self.handle.cancel();
    }
}

impl fmt::Debug for ScheduledTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScheduledTask")
            .field("handle", &self.handle)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Scheduler
// ---------------------------------------------------------------------------

/// Executor for delayed tasks.
///
/// Implementations run tasks on their own thread(s), concurrently with
/// callers. The lifecycle of a scheduler is owned by whoever created it.
pub trait Scheduler: Send + Sync {
    /// Runs `task` after `delay`. Returns the task's handle, or an error if
    /// the scheduler no longer accepts work.
    fn schedule(&self, delay: Duration, task: ScheduledTask) -> Result<TimerHandle, SchedulerError>;

    /// Stops accepting work and cancels pending tasks.
    fn shutdown(&self) {}
}

// ---------------------------------------------------------------------------
// Cancelled-task purging
// ---------------------------------------------------------------------------

/// Drops cancelled tasks from a deadline queue once it doubles past its last
/// purged size, so cancel-and-reschedule churn keeps the queue within twice
/// the number of live tasks (plus [`PURGE_FLOOR`]).
///
/// Returns the purged tasks; callers drop them after releasing their lock.
fn purge_cancelled<T: Ord>(
    entries: &mut BTreeMap<T, ScheduledTask>,
    purge_at: &mut usize,
) -> Vec<ScheduledTask> {
    if entries.len() < (*purge_at).max(PURGE_FLOOR) {
        return Vec::new();
    }
    let (live, cancelled): (BTreeMap<_, _>, BTreeMap<_, _>) = std::mem::take(entries)
        .into_iter()
        .partition(|(_, task)| !task.handle().is_cancelled());
    *entries = live;
    *purge_at = entries.len() * 2;
    cancelled.into_values().collect()
}

// ---------------------------------------------------------------------------
// ThreadScheduler
// ---------------------------------------------------------------------------

#[derive(Default)]
struct Queue {
    entries: BTreeMap<(Instant, u64), ScheduledTask>,
    seq: u64,
    purge_at: usize,
    shutdown: bool,
}

struct Worker {
    queue: Mutex<Queue>,
    wakeup: Condvar,
}

impl Worker {
    fn run(&self) {
        let mut queue = self.queue.lock();
        loop {
            if queue.shutdown {
                break;
            }
            let next = queue.entries.keys().next().copied();
            match next {
                Some(key) if key.0 <= Instant::now() => {
                    if let Some(task) = queue.entries.remove(&key) {
                        MutexGuard::unlocked(&mut queue, || task.run());
                    }
                },
                Some((due, _)) => {
                    self.wakeup.wait_until(&mut queue, due);
                },
                None => self.wakeup.wait(&mut queue),
            }
        }
    }
}

/// Scheduler backed by one dedicated worker thread.
///
/// # Example
///
/// ```
/// use std::sync::mpsc;
/// use std::time::Duration;
///
/// use cachebridge::expiry::scheduler::{ScheduledTask, Scheduler, ThreadScheduler, TimerHandle};
///
/// let scheduler = ThreadScheduler::new().unwrap();
/// let (tx, rx) = mpsc::channel();
/// scheduler
///     .schedule(Duration::from_millis(5), ScheduledTask::new(TimerHandle::new(), move || {
///         tx.send(42).unwrap();
///     }))
///     .unwrap();
/// assert_eq!(rx.recv_timeout(Duration::from_secs(5)), Ok(42));
/// ```
pub struct ThreadScheduler {
    worker: Arc<Worker>,
    thread: Mutex<Option<JoinHandle<()>>>,
    thread_id: ThreadId,
}

impl ThreadScheduler {
    /// Spawns the worker thread.
    pub fn new() -> Result<Self, SchedulerError> {
        let worker = Arc::new(Worker {
            queue: Mutex::new(Queue::default()),
            wakeup: Condvar::new(),
        });
        let runner = worker.clone();
        let thread = thread::Builder::new()
            .name("cachebridge-expiry".into())
            .spawn(move || runner.run())
            .map_err(SchedulerError::Spawn)?;
        let thread_id = thread.thread().id();
        Ok(Self {
            worker,
            thread: Mutex::new(Some(thread)),
            thread_id,
        })
    }

    /// Number of queued (not yet started) tasks. Cancelled tasks count until
    /// their deadline passes or the queue purges them.
    pub fn queued(&self) -> usize {
        self.worker.queue.lock().entries.len()
    }
}

impl Scheduler for ThreadScheduler {
    fn schedule(&self, delay: Duration, task: ScheduledTask) -> Result<TimerHandle, SchedulerError> {
        let handle = task.handle().clone();
        let mut queue = self.worker.queue.lock();
        if queue.shutdown {
            return Err(SchedulerError::Shutdown);
        }
        let due = Instant::now() + delay;
        queue.seq += 1;
        let seq = queue.seq;
        let Queue {
            entries, purge_at, ..
        } = &mut *queue;
        let purged = purge_cancelled(entries, purge_at);
        let wake = queue.entries.keys().next().map_or(true, |first| (due, seq) < *first);
        queue.entries.insert((due, seq), task);
        drop(queue);
        drop(purged);
        if wake {
            self.worker.wakeup.notify_one();
        }
        Ok(handle)
    }

    fn shutdown(&self) {
        let pending = {
            let mut queue = self.worker.queue.lock();
            if queue.shutdown {
                return;
            }
            queue.shutdown = true;
            std::mem::take(&mut queue.entries)
        };
        for task in pending.into_values() {
            task.discard();
        }
        self.worker.wakeup.notify_all();

        // The last owner can be dropped from inside a task; never join ourselves.
        if thread::current().id() == self.thread_id {
            return;
        }
        if let Some(thread) = self.thread.lock().take() {
            if thread.join().is_err() {
                tracing::error!("expiry worker terminated abnormally");
            }
        }
    }
}

impl Drop for ThreadScheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl fmt::Debug for ThreadScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThreadScheduler")
            .field("queued", &self.queued())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// ManualScheduler
// ---------------------------------------------------------------------------

#[derive(Default)]
struct ManualState {
    now: Duration,
    seq: u64,
    entries: BTreeMap<(Duration, u64), ScheduledTask>,
    purge_at: usize,
    shutdown: bool,
}

/// Scheduler driven by a virtual clock.
///
/// Nothing runs until [`advance`](Self::advance) is called; due tasks then run
/// on the calling thread in deadline order.
///
/// # Example
///
/// ```
/// use std::sync::atomic::{AtomicBool, Ordering};
/// use std::sync::Arc;
/// use std::time::Duration;
///
/// use cachebridge::expiry::scheduler::{ManualScheduler, ScheduledTask, Scheduler, TimerHandle};
///
/// let scheduler = ManualScheduler::new();
/// let fired = Arc::new(AtomicBool::new(false));
/// let flag = fired.clone();
/// scheduler
///     .schedule(Duration::from_millis(100), ScheduledTask::new(TimerHandle::new(), move || {
///         flag.store(true, Ordering::SeqCst);
///     }))
///     .unwrap();
///
/// scheduler.advance(Duration::from_millis(99));
/// assert!(!fired.load(Ordering::SeqCst));
/// scheduler.advance(Duration::from_millis(1));
/// assert!(fired.load(Ordering::SeqCst));
/// ```
#[derive(Default)]
pub struct ManualScheduler {
    state: Mutex<ManualState>,
}

impl ManualScheduler {
    /// Creates a scheduler whose clock starts at zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current virtual time.
    pub fn now(&self) -> Duration {
        self.state.lock().now
    }

    /// Moves the clock forward by `by`, running every task due on the way.
    pub fn advance(&self, by: Duration) {
        let target = self.state.lock().now + by;
        loop {
            let task = {
                let mut state = self.state.lock();
                let next = state.entries.keys().next().copied();
                match next {
                    Some(key) if key.0 <= target => {
                        state.now = key.0;
                        state.entries.remove(&key)
                    },
                    _ => {
                        state.now = target;
                        None
                    },
                }
            };
            match task {
                Some(task) => task.run(),
                None => break,
            }
        }
    }

    /// Number of scheduled tasks held, cancelled ones included.
    pub fn queued(&self) -> usize {
        self.state.lock().entries.len()
    }

    /// Number of scheduled tasks that are still pending.
    pub fn active_timers(&self) -> usize {
        self.state
            .lock()
            .entries
            .values()
            .filter(|task| task.handle().is_pending())
            .count()
    }
}

impl Scheduler for ManualScheduler {
    fn schedule(&self, delay: Duration, task: ScheduledTask) -> Result<TimerHandle, SchedulerError> {
        let handle = task.handle().clone();
        let mut state = self.state.lock();
        if state.shutdown {
            return Err(SchedulerError::Shutdown);
        }
        let due = state.now + delay;
        state.seq += 1;
        let seq = state.seq;
        let ManualState {
            entries, purge_at, ..
        } = &mut *state;
        let purged = purge_cancelled(entries, purge_at);
        entries.insert((due, seq), task);
        drop(state);
        drop(purged);
        Ok(handle)
    }

    fn shutdown(&self) {
        let pending = {
            let mut state = self.state.lock();
            state.shutdown = true;
            std::mem::take(&mut state.entries)
        };
        for task in pending.into_values() {
            task.discard();
        }
    }
}

impl fmt::Debug for ManualScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("ManualScheduler")
            .field("now", &state.now)
            .field("scheduled", &state.entries.len())
            .finish()
    }
}
