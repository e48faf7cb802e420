//! Timer providers.
//!
//! A [`TimerProvider`] schedules one-shot callbacks and reports the current
//! time. It is the only seam between the engine and the clock:
//! [`SystemTimerProvider`] runs callbacks on a dedicated worker thread in real
//! time, and [`ManualTimerProvider`] only runs them when a test advances its
//! virtual clock.

use std::cmp::Ordering as CmpOrdering;
use std::collections::BinaryHeap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use tracing::{trace, warn};

/// Callback run once when a timer elapses.
pub type TimerCallback = Box<dyn FnOnce() + Send + 'static>;

/// Cancellation handle for a scheduled callback.
///
/// Cancelling is idempotent. Providers must check [`is_cancelled`](Self::is_cancelled)
/// immediately before running a callback.
#[derive(Debug, Clone)]
pub struct TimerHandle {
    id: u64,
    cancelled: Arc<AtomicBool>,
}

impl TimerHandle {
    /// Fresh, uncancelled handle.
    #[must_use]
    pub fn new(id: u64) -> Self {
        Self {
            id,
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Provider-assigned id.
    #[must_use]
    pub const fn id(&self) -> u64 {
        self.id
    }

    /// Prevents the callback from running, if it has not run yet.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    /// Whether [`cancel`](Self::cancel) was called.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

/// Source of time and one-shot scheduling for the monitor engine.
pub trait TimerProvider: Send + Sync + fmt::Debug {
    /// Schedules `callback` to run once after `delay`.
    fn create_timer(&self, delay: Duration, callback: TimerCallback) -> TimerHandle;

    /// Current time according to this provider.
    fn now(&self) -> DateTime<Utc>;
}

/// Configuration of the real-time timer worker.
#[derive(Debug, Clone)]
pub struct SystemTimerConfig {
    /// Name of the worker thread.
    pub thread_name: String,
}

impl Default for SystemTimerConfig {
    fn default() -> Self {
        Self {
            thread_name: "varmon-timer".to_string(),
        }
    }
}

struct ScheduleMsg {
    due: Instant,
    handle: TimerHandle,
    callback: TimerCallback,
}

struct Scheduled {
    due: Instant,
    handle: TimerHandle,
    callback: TimerCallback,
}

impl PartialEq for Scheduled {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == CmpOrdering::Equal
    }
}

impl Eq for Scheduled {}

impl PartialOrd for Scheduled {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl Ord for Scheduled {
    // Reversed so the BinaryHeap pops the earliest deadline first.
    fn cmp(&self, other: &Self) -> CmpOrdering {
        other
            .due
            .cmp(&self.due)
            .then_with(|| other.handle.id.cmp(&self.handle.id))
    }
}

/// Wall-clock timer provider backed by a dedicated worker thread.
///
/// Callbacks run on the worker thread. A panicking callback is caught and
/// logged so later timers still fire.
pub struct SystemTimerProvider {
    schedule_tx: Sender<ScheduleMsg>,
    next_id: AtomicU64,
    join: Mutex<Option<JoinHandle<()>>>,
}

impl fmt::Debug for SystemTimerProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SystemTimerProvider")
            .field("next_id", &self.next_id.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl SystemTimerProvider {
    /// Starts a provider with the default configuration.
    ///
    /// # Panics
    ///
    /// Panics if the worker thread cannot be spawned.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(SystemTimerConfig::default())
    }

    /// # Panics
    ///
    /// Panics if the worker thread cannot be spawned.
    #[must_use]
    pub fn with_config(cfg: SystemTimerConfig) -> Self {
        let (schedule_tx, schedule_rx) = unbounded::<ScheduleMsg>();

        let join = thread::Builder::new()
            .name(cfg.thread_name)
            .spawn(move || worker_loop(&schedule_rx))
            .expect("failed to spawn varmon timer worker");

        Self {
            schedule_tx,
            next_id: AtomicU64::new(1),
            join: Mutex::new(Some(join)),
        }
    }
}

impl Default for SystemTimerProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl TimerProvider for SystemTimerProvider {
    fn create_timer(&self, delay: Duration, callback: TimerCallback) -> TimerHandle {
        let handle = TimerHandle::new(self.next_id.fetch_add(1, Ordering::Relaxed));
        let delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);

        // A deadline past what `Instant` can represent is never reached.
        let Some(due) = Instant::now().checked_add(delay) else {
            trace!(timer_id = handle.id(), delay_ms, "timer deadline unrepresentable; it will never fire");
            return handle;
        };
        let msg = ScheduleMsg {
            due,
            handle: handle.clone(),
            callback,
        };

        if self.schedule_tx.send(msg).is_err() {
            warn!(timer_id = handle.id(), "timer worker is gone; timer will never fire");
            handle.cancel();
        } else {
            trace!(timer_id = handle.id(), delay_ms, "timer scheduled");
        }

        handle
    }

    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

impl Drop for SystemTimerProvider {
    fn drop(&mut self) {
        // Close the channel so the worker terminates, then detach it.
        let (dummy_tx, _) = unbounded::<ScheduleMsg>();
        drop(std::mem::replace(&mut self.schedule_tx, dummy_tx));

        if let Ok(mut guard) = self.join.lock() {
            // A callback holding the last reference to this provider runs on the
            // worker itself; joining there would deadlock.
            drop(guard.take());
        }
    }
}

fn run_callback(entry: Scheduled) {
    if entry.handle.is_cancelled() {
        return;
    }

    let timer_id = entry.handle.id();
    if panic::catch_unwind(AssertUnwindSafe(entry.callback)).is_err() {
        warn!(timer_id, "timer callback panicked");
    }
}

fn worker_loop(schedule_rx: &Receiver<ScheduleMsg>) {
    let mut heap: BinaryHeap<Scheduled> = BinaryHeap::new();

    loop {
        let now = Instant::now();
        while heap.peek().is_some_and(|top| top.due <= now) {
            if let Some(entry) = heap.pop() {
                run_callback(entry);
            }
        }
        heap.retain(|entry| !entry.handle.is_cancelled());

        let msg = match heap.peek() {
            None => schedule_rx.recv().ok(),
            Some(top) => {
                let wait = top.due.saturating_duration_since(Instant::now());
                match schedule_rx.recv_timeout(wait) {
                    Ok(msg) => Some(msg),
                    Err(RecvTimeoutError::Timeout) => continue,
                    Err(RecvTimeoutError::Disconnected) => None,
                }
            }
        };

        let Some(ScheduleMsg { due, handle, callback }) = msg else {
            // Every sender is gone: the provider was dropped.
            break;
        };
        heap.push(Scheduled { due, handle, callback });
    }
}

struct PendingTimer {
    due: DateTime<Utc>,
    handle: TimerHandle,
    callback: TimerCallback,
}

struct ManualState {
    now: DateTime<Utc>,
    next_id: u64,
    pending: Vec<PendingTimer>,
}

/// Virtual clock for deterministic tests.
///
/// Time only moves when [`advance`](Self::advance) is called, and due callbacks
/// run synchronously on the calling thread in deadline order. Callbacks may
/// schedule further timers; those fire within the same `advance` call if
/// they fall due before its target time.
///
/// # Examples
///
/// ```
/// use std::sync::atomic::{AtomicBool, Ordering};
/// use std::sync::Arc;
/// use std::time::Duration;
/// use varmon::{ManualTimerProvider, TimerProvider};
///
/// let clock = ManualTimerProvider::new();
/// let fired = Arc::new(AtomicBool::new(false));
/// let flag = Arc::clone(&fired);
/// clock.create_timer(Duration::from_secs(5), Box::new(move || flag.store(true, Ordering::SeqCst)));
///
/// clock.advance(Duration::from_secs(4));
/// assert!(!fired.load(Ordering::SeqCst));
/// clock.advance(Duration::from_secs(1));
/// assert!(fired.load(Ordering::SeqCst));
/// ```
pub struct ManualTimerProvider {
    state: Mutex<ManualState>,
}

impl fmt::Debug for ManualTimerProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut d = f.debug_struct("ManualTimerProvider");
        if let Ok(state) = self.state.lock() {
            d.field("now", &state.now).field("pending", &state.pending.len());
        }
        d.finish()
    }
}

impl ManualTimerProvider {
    /// Virtual clock starting at the current wall-clock time.
    #[must_use]
    pub fn new() -> Self {
        Self::starting_at(Utc::now())
    }

    /// Virtual clock starting at `start`.
    #[must_use]
    pub fn starting_at(start: DateTime<Utc>) -> Self {
        Self {
            state: Mutex::new(ManualState {
                now: start,
                next_id: 1,
                pending: Vec::new(),
            }),
        }
    }

    /// Moves the clock forward by `by`, running every callback that falls due.
    ///
    /// Returns the number of callbacks that ran.
    pub fn advance(&self, by: Duration) -> usize {
        let delta = chrono::Duration::from_std(by).unwrap_or(chrono::Duration::MAX);
        let target = {
            let Ok(state) = self.state.lock() else {
                return 0;
            };
            state.now.checked_add_signed(delta).unwrap_or(DateTime::<Utc>::MAX_UTC)
        };

        let mut fired = 0;
        loop {
            let next = {
                let Ok(mut state) = self.state.lock() else {
                    return fired;
                };
                state.pending.retain(|p| !p.handle.is_cancelled());

                let due_idx = state
                    .pending
                    .iter()
                    .enumerate()
                    .filter(|(_, p)| p.due <= target)
                    .min_by(|(_, a), (_, b)| a.due.cmp(&b.due).then(a.handle.id.cmp(&b.handle.id)))
                    .map(|(idx, _)| idx);

                match due_idx {
                    Some(idx) => {
                        let timer = state.pending.swap_remove(idx);
                        if timer.due > state.now {
                            state.now = timer.due;
                        }
                        Some(timer)
                    }
                    None => {
                        state.now = target;
                        None
                    }
                }
            };

            // The lock is released here so callbacks can schedule new timers.
            let Some(timer) = next else {
                break;
            };
            if !timer.handle.is_cancelled() {
                (timer.callback)();
                fired += 1;
            }
        }

        fired
    }

    /// Number of scheduled callbacks that have not fired or been cancelled.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.state.lock().map_or(0, |state| {
            state
                .pending
                .iter()
                .filter(|p| !p.handle.is_cancelled())
                .count()
        })
    }
}

impl Default for ManualTimerProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl TimerProvider for ManualTimerProvider {
    fn create_timer(&self, delay: Duration, callback: TimerCallback) -> TimerHandle {
        let delta = chrono::Duration::from_std(delay).unwrap_or(chrono::Duration::MAX);
        let Ok(mut state) = self.state.lock() else {
            let handle = TimerHandle::new(0);
            handle.cancel();
            return handle;
        };

        let handle = TimerHandle::new(state.next_id);
        state.next_id += 1;
        let due = state.now.checked_add_signed(delta).unwrap_or(DateTime::<Utc>::MAX_UTC);
        state.pending.push(PendingTimer {
            due,
            handle: handle.clone(),
            callback,
        });
        handle
    }

    fn now(&self) -> DateTime<Utc> {
        self.state.lock().map_or_else(|_| Utc::now(), |state| state.now)
    }
}
