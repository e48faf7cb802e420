//! Delay tracking for delayed conditions.
//!
//! A [`ConditionTimer`] starts counting when its wrapped condition first
//! becomes true and runs an expiry callback once the condition has held for
//! the full delay. A condition that drops before the delay elapses resets the
//! timer, so a short spike never raises an alarm and the next episode starts
//! timing from zero.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::error::{lock_err, MonitorResult};
use crate::timer::{TimerHandle, TimerProvider};

/// Callback run after the delay has fully elapsed.
pub type ExpiryCallback = Arc<dyn Fn() + Send + Sync>;

#[derive(Debug, Default)]
struct TimerState {
    condition_met: bool,
    delay_expired: bool,
    first_met_at: Option<DateTime<Utc>>,
    handle: Option<TimerHandle>,
    /// Bumped on every start and reset; a scheduled callback only counts if
    /// its epoch is still current.
    epoch: u64,
    disposed: bool,
}

impl TimerState {
    fn reset(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.cancel();
        }
        self.condition_met = false;
        self.delay_expired = false;
        self.first_met_at = None;
        self.epoch += 1;
    }
}

/// Per-condition delay state machine.
pub struct ConditionTimer {
    delay: Duration,
    provider: Arc<dyn TimerProvider>,
    state: Arc<Mutex<TimerState>>,
    on_expired: ExpiryCallback,
}

impl fmt::Debug for ConditionTimer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConditionTimer")
            .field("delay", &self.delay)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl ConditionTimer {
    /// Creates an idle timer. `on_expired` runs on the provider's thread once
    /// the condition has held for `delay`.
    pub fn new<F>(delay: Duration, provider: Arc<dyn TimerProvider>, on_expired: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        Self {
            delay,
            provider,
            state: Arc::new(Mutex::new(TimerState::default())),
            on_expired: Arc::new(on_expired),
        }
    }

    fn lock(&self) -> MonitorResult<MutexGuard<'_, TimerState>> {
        self.state.lock().map_err(|_| lock_err("condition timer"))
    }

    /// Configured delay.
    pub const fn delay(&self) -> Duration {
        self.delay
    }

    /// Feeds the wrapped condition's latest result into the timer.
    ///
    /// Repeating the current state is a no-op.
    ///
    /// # Errors
    ///
    /// Returns `MonitorError::Internal` if the timer state lock is poisoned.
    pub fn on_condition_changed(&self, is_active: bool) -> MonitorResult<()> {
        let mut state = self.lock()?;
        if state.disposed || state.condition_met == is_active {
            return Ok(());
        }

        if !is_active {
            state.reset();
            return Ok(());
        }

        if let Some(previous) = state.handle.take() {
            previous.cancel();
        }
        state.condition_met = true;
        state.delay_expired = false;
        state.first_met_at = Some(self.provider.now());
        state.epoch += 1;

        let epoch = state.epoch;
        let weak_state = Arc::downgrade(&self.state);
        let on_expired = Arc::clone(&self.on_expired);
        let handle = self.provider.create_timer(
            self.delay,
            Box::new(move || {
                let Some(state) = weak_state.upgrade() else {
                    return;
                };
                {
                    let Ok(mut s) = state.lock() else {
                        return;
                    };
                    if s.disposed || s.epoch != epoch || !s.condition_met {
                        return;
                    }
                    s.delay_expired = true;
                    s.handle = None;
                }
                on_expired();
            }),
        );
        state.handle = Some(handle);
        Ok(())
    }

    /// Time left before expiry, or `None` when not timing (condition not met
    /// or delay already elapsed).
    #[must_use]
    pub fn time_remaining(&self) -> Option<Duration> {
        let state = self.lock().ok()?;
        if !state.condition_met || state.delay_expired {
            return None;
        }
        let first_met_at = state.first_met_at?;
        let elapsed = (self.provider.now() - first_met_at).to_std().unwrap_or(Duration::ZERO);
        Some(self.delay.saturating_sub(elapsed))
    }

    /// Whether the condition currently holds.
    #[must_use]
    pub fn is_condition_met(&self) -> bool {
        self.lock().is_ok_and(|s| s.condition_met)
    }

    /// Whether the delay elapsed while the condition held.
    #[must_use]
    pub fn is_delay_expired(&self) -> bool {
        self.lock().is_ok_and(|s| s.delay_expired)
    }

    /// When the condition started holding, if it does.
    #[must_use]
    pub fn first_met_at(&self) -> Option<DateTime<Utc>> {
        self.lock().ok().and_then(|s| s.first_met_at)
    }

    /// Cancels any pending callback. Safe to call more than once.
    pub fn dispose(&self) {
        if let Ok(mut state) = self.state.lock() {
            state.reset();
            state.disposed = true;
        }
    }
}

impl Drop for ConditionTimer {
    fn drop(&mut self) {
        self.dispose();
    }
}
