use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, TryRecvError};

use crate::error::{ExecutionError, MonitorError, MonitorResult};

use super::alarm::{AlarmEvent, SubscriptionId};
use super::observers::ObserverRegistry;

/// A channel-backed subscription receiving both triggered and cleared events.
///
/// Dropping this stream unsubscribes it.
#[derive(Debug)]
pub struct AlarmStream {
    triggered_id: SubscriptionId,
    cleared_id: SubscriptionId,
    rx: Receiver<AlarmEvent>,
    triggered: Arc<ObserverRegistry>,
    cleared: Arc<ObserverRegistry>,
    unregistered: AtomicBool,
}

impl AlarmStream {
    pub(crate) fn new(
        triggered_id: SubscriptionId,
        cleared_id: SubscriptionId,
        rx: Receiver<AlarmEvent>,
        triggered: Arc<ObserverRegistry>,
        cleared: Arc<ObserverRegistry>,
    ) -> Self {
        Self {
            triggered_id,
            cleared_id,
            rx,
            triggered,
            cleared,
            unregistered: AtomicBool::new(false),
        }
    }

    /// Explicit unsubscription. Idempotent; events already buffered can
    /// still be received.
    pub fn unsubscribe(&self) {
        if self.unregistered.swap(true, Ordering::AcqRel) {
            return;
        }
        self.triggered.unsubscribe(self.triggered_id);
        self.cleared.unsubscribe(self.cleared_id);
    }

    /// Receive the next event (blocking).
    pub fn recv(&self) -> MonitorResult<AlarmEvent> {
        self.rx.recv().map_err(|_| disconnected())
    }

    /// Receive the next event with a timeout.
    pub fn recv_timeout(&self, timeout: Duration) -> MonitorResult<AlarmEvent> {
        self.rx.recv_timeout(timeout).map_err(|err| match err {
            RecvTimeoutError::Timeout => MonitorError::Execution(ExecutionError::Timeout {
                duration_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
            }),
            RecvTimeoutError::Disconnected => disconnected(),
        })
    }

    /// Returns `Ok(None)` if no event is buffered.
    pub fn try_recv(&self) -> MonitorResult<Option<AlarmEvent>> {
        match self.rx.try_recv() {
            Ok(ev) => Ok(Some(ev)),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => Err(disconnected()),
        }
    }

    /// Drains every buffered event.
    pub fn drain(&self) -> Vec<AlarmEvent> {
        self.rx.try_iter().collect()
    }
}

fn disconnected() -> MonitorError {
    MonitorError::Execution(ExecutionError::Disconnected {
        path: "alarm_stream".to_string(),
    })
}

impl Drop for AlarmStream {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}
