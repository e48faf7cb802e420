//! Ordered observer registry for alarm notifications.

use std::fmt;
use std::sync::{Arc, RwLock};

use crate::error::{lock_err, MonitorResult};

use super::alarm::{AlarmEvent, SubscriptionId};

/// Callback invoked synchronously for each alarm event.
pub type AlarmCallback = Arc<dyn Fn(&AlarmEvent) + Send + Sync>;

/// Observers are called in subscription order. The list is snapshotted before
/// any callback runs, so a callback may subscribe, unsubscribe, or call back
/// into the engine.
#[derive(Default)]
pub struct ObserverRegistry {
    observers: RwLock<Vec<(SubscriptionId, AlarmCallback)>>,
}

impl fmt::Debug for ObserverRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObserverRegistry")
            .field("len", &self.len())
            .finish()
    }
}

impl ObserverRegistry {
    /// Empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// # Errors
    ///
    /// Returns `MonitorError::Internal` if the registry lock is poisoned.
    pub fn subscribe(&self, callback: AlarmCallback) -> MonitorResult<SubscriptionId> {
        let id = SubscriptionId::new();
        self.observers
            .write()
            .map_err(|_| lock_err("observers"))?
            .push((id, callback));
        Ok(id)
    }

    /// Returns `false` if `id` was not subscribed.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let Ok(mut observers) = self.observers.write() else {
            return false;
        };
        let before = observers.len();
        observers.retain(|(sid, _)| *sid != id);
        observers.len() != before
    }

    /// Number of subscribed observers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.observers.read().map_or(0, |o| o.len())
    }

    /// Whether no observer is subscribed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Invokes every observer with `event`. Observer panics propagate to the
    /// caller.
    ///
    /// # Errors
    ///
    /// Returns `MonitorError::Internal` if the registry lock is poisoned.
    pub fn notify(&self, event: &AlarmEvent) -> MonitorResult<()> {
        let snapshot: Vec<AlarmCallback> = self
            .observers
            .read()
            .map_err(|_| lock_err("observers"))?
            .iter()
            .map(|(_, cb)| Arc::clone(cb))
            .collect();

        for cb in snapshot {
            cb(event);
        }
        Ok(())
    }
}
