//! Monitor engine: variable registry, condition evaluation and alarm state.
//!
//! Locking: a read-mostly map from variable id to a per-variable mutex. The
//! map lock is only held long enough to look up or swap a slot, so updates to
//! different variables never wait on each other. All state changes for one
//! variable (value, hysteresis flags, timers, active alarms) happen under its
//! mutex, and observers are only invoked after it has been released.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};
use crossbeam_channel::{bounded, TrySendError};
use tracing::{debug, trace, warn};

use crate::condition::{Classification, Condition, Direction};
use crate::error::{lock_err, MonitorError, MonitorResult, ValidationError};
use crate::timer::{SystemTimerProvider, TimerProvider};
use crate::value::{Value, ValueType};

use super::alarm::{ActiveAlarm, AlarmEvent, AlarmKey, RegisteredVariable, SubscriptionId, ValueChangedEvent};
use super::condition_timer::ConditionTimer;
use super::evaluator::{validate_condition, ConditionSlot, Transition};
use super::observers::{AlarmCallback, ObserverRegistry};
use super::stream::AlarmStream;

/// Engine tuning knobs.
#[derive(Debug, Clone)]
pub struct MonitorEngineConfig {
    /// Per-stream buffer capacity for [`MonitorEngine::subscribe_stream`].
    pub stream_capacity: usize,
}

impl Default for MonitorEngineConfig {
    fn default() -> Self {
        Self {
            stream_capacity: 1024,
        }
    }
}

#[derive(Debug)]
struct VariableState {
    id: String,
    name: String,
    value_type: ValueType,
    current: Value,
    conditions: Vec<ConditionSlot>,
    active: BTreeMap<AlarmKey, ActiveAlarm>,
    /// Set once the variable is unregistered or replaced.
    retired: bool,
}

type VariableSlot = Arc<Mutex<VariableState>>;

impl VariableState {
    fn trigger(
        &mut self,
        index: usize,
        current: &Value,
        previous: Option<&Value>,
        now: DateTime<Utc>,
    ) -> Option<AlarmEvent> {
        let slot = self.conditions.get(index)?;
        let key = slot.key;
        if self.active.contains_key(&key) {
            return None;
        }

        let alarm = ActiveAlarm {
            variable_id: self.id.clone(),
            key,
            message: slot.condition.message().to_string(),
            timestamp: now,
            current_value: current.clone(),
            previous_value: previous.cloned(),
            threshold_value: slot.condition.threshold_value().cloned(),
        };
        let event = AlarmEvent::triggered(&self.name, &alarm);
        self.active.insert(key, alarm);
        trace!(variable_id = %self.id, condition_index = index, classification = %key.classification, "alarm triggered");
        Some(event)
    }

    fn clear(
        &mut self,
        index: usize,
        current: &Value,
        previous: Option<&Value>,
        now: DateTime<Utc>,
    ) -> Option<AlarmEvent> {
        let key = self.conditions.get(index)?.key;
        let alarm = self.active.remove(&key)?;
        trace!(variable_id = %self.id, condition_index = index, classification = %key.classification, "alarm cleared");
        Some(AlarmEvent::cleared(
            &self.name,
            &alarm,
            current.clone(),
            previous.cloned(),
            now,
        ))
    }

    /// Evaluates every condition in registration order.
    fn evaluate(
        &mut self,
        old: &Value,
        new: &Value,
        now: DateTime<Utc>,
    ) -> MonitorResult<Vec<AlarmEvent>> {
        let mut events = Vec::new();
        for index in 0..self.conditions.len() {
            let key = self.conditions[index].key;
            let alarm_active = self.active.contains_key(&key);
            let transition = self.conditions[index].evaluate(Some(old), new, alarm_active)?;

            let event = match transition {
                Transition::Unchanged => None,
                Transition::Trigger => self.trigger(index, new, Some(old), now),
                Transition::Clear => self.clear(index, new, Some(old), now),
            };
            events.extend(event);
        }
        Ok(events)
    }

    fn retire(&mut self) {
        self.retired = true;
        for slot in &self.conditions {
            slot.dispose();
        }
        self.active.clear();
    }

    fn snapshot(&self) -> RegisteredVariable {
        RegisteredVariable {
            id: self.id.clone(),
            name: self.name.clone(),
            value_type: self.value_type,
            current_value: self.current.clone(),
            condition_count: self.conditions.len(),
        }
    }
}

fn lock_var(slot: &VariableSlot) -> MonitorResult<MutexGuard<'_, VariableState>> {
    slot.lock().map_err(|_| lock_err("variable"))
}

/// Engine-wide snapshots skip a variable poisoned by a panicking condition
/// test instead of failing for every variable.
fn lock_for_snapshot(slot: &VariableSlot) -> Option<MutexGuard<'_, VariableState>> {
    match slot.lock() {
        Ok(var) => Some(var),
        Err(poisoned) => {
            warn!(variable_id = %poisoned.get_ref().id, "variable state poisoned; skipped in snapshot");
            None
        }
    }
}

struct Shared {
    cfg: MonitorEngineConfig,
    variables: RwLock<HashMap<String, VariableSlot>>,
    triggered: Arc<ObserverRegistry>,
    cleared: Arc<ObserverRegistry>,
    timers: Arc<dyn TimerProvider>,
    dropped_events: Arc<AtomicU64>,
}

impl Shared {
    fn slot(&self, id: &str) -> MonitorResult<Option<VariableSlot>> {
        let vars = self.variables.read().map_err(|_| lock_err("variables"))?;
        Ok(vars.get(id).cloned())
    }

    fn dispatch(&self, events: &[AlarmEvent]) -> MonitorResult<()> {
        for event in events {
            if event.active {
                self.triggered.notify(event)?;
            } else {
                self.cleared.notify(event)?;
            }
        }
        Ok(())
    }

    /// Expiry path for delayed conditions: raise the alarm with the value
    /// stored at expiry time and no previous value.
    fn on_delay_expired(&self, slot: &VariableSlot, index: usize) -> MonitorResult<()> {
        let event = {
            let mut var = lock_var(slot)?;
            if var.retired {
                return Ok(());
            }
            let expired = var
                .conditions
                .get(index)
                .and_then(|c| c.timer.as_ref())
                .is_some_and(ConditionTimer::is_delay_expired);
            if !expired {
                return Ok(());
            }
            let current = var.current.clone();
            let now = self.timers.now();
            var.trigger(index, &current, None, now)
        };

        if let Some(event) = event {
            self.triggered.notify(&event)?;
        }
        Ok(())
    }
}

/// Variable monitoring and alarm engine.
///
/// All operations take `&self` and are safe to call from multiple threads.
/// Observers run synchronously on the thread that caused the event (the
/// timer provider's thread for delayed conditions), after the engine state
/// has been fully updated and with no engine lock held. A panicking observer
/// propagates to that caller.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use std::time::Duration;
/// use varmon::{Classification, DelayedCondition, ManualTimerProvider, MonitorEngine};
/// use varmon::factories::upper_threshold;
///
/// let clock = Arc::new(ManualTimerProvider::new());
/// let engine = MonitorEngine::with_timer_provider(clock.clone());
///
/// let overheat = DelayedCondition::new(
///     upper_threshold(85.0, Classification::Critical, "overheating"),
///     Duration::from_secs(5),
/// )?;
/// engine.register_variable("temp1", "Boiler temperature", 20.0, vec![overheat.into()])?;
///
/// engine.notify_value_changed("temp1", 90.0)?;
/// assert!(engine.get_active_alarms()?.is_empty());
///
/// clock.advance(Duration::from_secs(5));
/// assert_eq!(engine.get_active_alarms()?.len(), 1);
/// # Ok::<(), varmon::MonitorError>(())
/// ```
pub struct MonitorEngine {
    shared: Arc<Shared>,
}

impl fmt::Debug for MonitorEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MonitorEngine")
            .field("cfg", &self.shared.cfg)
            .field("timers", &self.shared.timers)
            .field("triggered", &self.shared.triggered)
            .field("cleared", &self.shared.cleared)
            .finish_non_exhaustive()
    }
}

impl Default for MonitorEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl MonitorEngine {
    /// Engine driven by the wall clock.
    #[must_use]
    pub fn new() -> Self {
        Self::with_timer_provider(Arc::new(SystemTimerProvider::new()))
    }

    /// Engine driven by `timers`, with the default configuration.
    #[must_use]
    pub fn with_timer_provider(timers: Arc<dyn TimerProvider>) -> Self {
        Self::with_config(MonitorEngineConfig::default(), timers)
    }

    /// Engine with explicit configuration and timer provider.
    #[must_use]
    pub fn with_config(cfg: MonitorEngineConfig, timers: Arc<dyn TimerProvider>) -> Self {
        Self {
            shared: Arc::new(Shared {
                cfg,
                variables: RwLock::new(HashMap::new()),
                triggered: Arc::new(ObserverRegistry::new()),
                cleared: Arc::new(ObserverRegistry::new()),
                timers,
                dropped_events: Arc::new(AtomicU64::new(0)),
            }),
        }
    }

    /// Registers `id`, replacing any previous registration.
    ///
    /// A replaced registration loses its active alarms and pending delay
    /// timers; nothing carries over.
    ///
    /// # Errors
    ///
    /// - `NullValue` if `initial_value` is null.
    /// - `TypeMismatch` if a threshold or hysteresis literal does not match the
    ///   initial value's type, the type is not orderable, or a threshold uses
    ///   [`Direction::Custom`].
    pub fn register_variable(
        &self,
        id: impl Into<String>,
        name: impl Into<String>,
        initial_value: impl Into<Value>,
        conditions: impl IntoIterator<Item = Condition>,
    ) -> MonitorResult<()> {
        let id = id.into();
        let name = name.into();
        let initial_value = initial_value.into();
        if initial_value.is_null() {
            return Err(ValidationError::null_value("initial_value").into());
        }

        let value_type = initial_value.value_type();
        let conditions: Vec<Condition> = conditions.into_iter().collect();
        for (index, condition) in conditions.iter().enumerate() {
            validate_condition(index, condition, value_type)?;
        }

        let condition_count = conditions.len();
        let weak_shared = Arc::downgrade(&self.shared);
        let timers = Arc::clone(&self.shared.timers);
        let slot: VariableSlot = Arc::new_cyclic(|weak_slot: &Weak<Mutex<VariableState>>| {
            let slots = conditions
                .into_iter()
                .enumerate()
                .map(|(index, condition)| {
                    let timer = match &condition {
                        Condition::Delayed(d) => Some(ConditionTimer::new(
                            d.delay(),
                            Arc::clone(&timers),
                            expiry_callback(weak_shared.clone(), weak_slot.clone(), index),
                        )),
                        _ => None,
                    };
                    ConditionSlot::new(index, condition, timer)
                })
                .collect();

            Mutex::new(VariableState {
                id: id.clone(),
                name,
                value_type,
                current: initial_value,
                conditions: slots,
                active: BTreeMap::new(),
                retired: false,
            })
        });

        let previous = self
            .shared
            .variables
            .write()
            .map_err(|_| lock_err("variables"))?
            .insert(id.clone(), slot);

        if let Some(previous) = previous {
            lock_var(&previous)?.retire();
            debug!(variable_id = %id, condition_count, "variable re-registered");
        } else {
            debug!(variable_id = %id, condition_count, "variable registered");
        }
        Ok(())
    }

    /// Removes `id` with its conditions, alarms and timers.
    ///
    /// Returns `false` if `id` was not registered.
    ///
    /// Events are dispatched after the variable's lock is released, so an
    /// update that finished evaluating before this call may still deliver its
    /// triggered or cleared events to observers after this returns. No update
    /// that starts afterwards produces events for `id`.
    pub fn unregister_variable(&self, id: &str) -> MonitorResult<bool> {
        let removed = self
            .shared
            .variables
            .write()
            .map_err(|_| lock_err("variables"))?
            .remove(id);

        let Some(slot) = removed else {
            return Ok(false);
        };
        lock_var(&slot)?.retire();
        debug!(variable_id = %id, "variable unregistered");
        Ok(true)
    }

    /// Stores `new_value` and evaluates every condition of `id` against it.
    ///
    /// # Errors
    ///
    /// - `UnregisteredVariable` if `id` is unknown.
    /// - `NullValue` if `new_value` is null.
    /// - `TypeMismatch` if `new_value` differs in type from the registered value.
    pub fn notify_value_changed(&self, id: &str, new_value: impl Into<Value>) -> MonitorResult<()> {
        let new_value = new_value.into();
        let slot = self
            .shared
            .slot(id)?
            .ok_or_else(|| MonitorError::unregistered(id))?;
        if new_value.is_null() {
            return Err(ValidationError::null_value("new_value").into());
        }

        let events = {
            let mut var = lock_var(&slot)?;
            if var.retired {
                return Err(MonitorError::unregistered(id));
            }
            if new_value.value_type() != var.value_type {
                return Err(ValidationError::type_mismatch(
                    format!("value of '{id}'"),
                    var.value_type.name(),
                    new_value.type_name(),
                )
                .into());
            }

            let old_value = std::mem::replace(&mut var.current, new_value.clone());
            let now = self.shared.timers.now();
            var.evaluate(&old_value, &new_value, now)?
        };

        self.shared.dispatch(&events)
    }

    /// Event-payload form of [`notify_value_changed`](Self::notify_value_changed).
    ///
    /// The stored value stays authoritative for `previous_value`; the event's
    /// `old_value` is informational.
    pub fn notify_value_change_event(&self, event: ValueChangedEvent) -> MonitorResult<()> {
        self.notify_value_changed(&event.variable_id, event.new_value)
    }

    /// Silently drops one active alarm. No cleared event is emitted.
    ///
    /// Returns `false` if no such alarm was active.
    ///
    /// # Errors
    ///
    /// Returns `UnregisteredVariable` if `variable_id` is unknown.
    pub fn acknowledge_alarm(
        &self,
        variable_id: &str,
        classification: Classification,
        direction: Direction,
        condition_index: usize,
    ) -> MonitorResult<bool> {
        let slot = self
            .shared
            .slot(variable_id)?
            .ok_or_else(|| MonitorError::unregistered(variable_id))?;
        let mut var = lock_var(&slot)?;

        let key = AlarmKey::new(condition_index, direction, classification);
        let removed = var.active.remove(&key).is_some();
        if removed {
            debug!(variable_id, condition_index, %classification, "alarm acknowledged");
        }
        Ok(removed)
    }

    /// Silently drops every active alarm of `variable_id`.
    ///
    /// Returns how many alarms were acknowledged.
    ///
    /// # Errors
    ///
    /// Returns `UnregisteredVariable` if `variable_id` is unknown.
    pub fn acknowledge_all_alarms(&self, variable_id: &str) -> MonitorResult<usize> {
        let slot = self
            .shared
            .slot(variable_id)?
            .ok_or_else(|| MonitorError::unregistered(variable_id))?;
        let mut var = lock_var(&slot)?;

        let count = var.active.len();
        var.active.clear();
        debug!(variable_id, count, "all alarms acknowledged");
        Ok(count)
    }

    fn slots(&self) -> MonitorResult<Vec<VariableSlot>> {
        let vars = self.shared.variables.read().map_err(|_| lock_err("variables"))?;
        Ok(vars.values().cloned().collect())
    }

    /// Snapshot of every active alarm, ordered by variable id then alarm key.
    ///
    /// Variables whose state was poisoned by a panicking condition test are
    /// skipped.
    pub fn get_active_alarms(&self) -> MonitorResult<Vec<ActiveAlarm>> {
        let mut out = Vec::new();
        for slot in self.slots()? {
            let Some(var) = lock_for_snapshot(&slot) else {
                continue;
            };
            out.extend(var.active.values().cloned());
        }
        out.sort_by(|a, b| a.variable_id.cmp(&b.variable_id).then(a.key.cmp(&b.key)));
        Ok(out)
    }

    /// Snapshot of the active alarms of one variable. Unknown ids have none.
    pub fn get_active_alarms_for(&self, variable_id: &str) -> MonitorResult<Vec<ActiveAlarm>> {
        let Some(slot) = self.shared.slot(variable_id)? else {
            return Ok(Vec::new());
        };
        let var = lock_var(&slot)?;
        Ok(var.active.values().cloned().collect())
    }

    /// Snapshot of every registration, ordered by id. Poisoned variables are
    /// skipped, as in [`get_active_alarms`](Self::get_active_alarms).
    pub fn get_registered_variables(&self) -> MonitorResult<Vec<RegisteredVariable>> {
        let mut out = Vec::new();
        for slot in self.slots()? {
            let Some(var) = lock_for_snapshot(&slot) else {
                continue;
            };
            out.push(var.snapshot());
        }
        out.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(out)
    }

    /// Whether `id` is currently registered.
    #[must_use]
    pub fn is_registered(&self, id: &str) -> bool {
        self.shared.slot(id).is_ok_and(|s| s.is_some())
    }

    /// Last stored value of `id`, or [`Value::Null`] if unknown.
    #[must_use]
    pub fn get_current_value(&self, id: &str) -> Value {
        let Ok(Some(slot)) = self.shared.slot(id) else {
            return Value::Null;
        };
        slot.lock().map_or(Value::Null, |var| var.current.clone())
    }

    /// Typed form of [`get_current_value`](Self::get_current_value): falls
    /// back to `T::default()` when `id` is unknown or holds another type.
    #[must_use]
    pub fn get_current_value_as<T>(&self, id: &str) -> T
    where
        T: TryFrom<Value> + Default,
    {
        T::try_from(self.get_current_value(id)).unwrap_or_default()
    }

    /// Time left on a delayed condition's timer, if it is currently timing.
    ///
    /// # Errors
    ///
    /// Returns `UnregisteredVariable` if `variable_id` is unknown.
    pub fn delay_remaining(&self, variable_id: &str, condition_index: usize) -> MonitorResult<Option<Duration>> {
        let slot = self
            .shared
            .slot(variable_id)?
            .ok_or_else(|| MonitorError::unregistered(variable_id))?;
        let var = lock_var(&slot)?;
        Ok(var
            .conditions
            .get(condition_index)
            .and_then(|c| c.timer.as_ref())
            .and_then(ConditionTimer::time_remaining))
    }

    /// Subscribes to "alarm triggered" notifications.
    pub fn subscribe_triggered<F>(&self, callback: F) -> MonitorResult<SubscriptionId>
    where
        F: Fn(&AlarmEvent) + Send + Sync + 'static,
    {
        self.shared.triggered.subscribe(Arc::new(callback))
    }

    /// Subscribes to "alarm cleared" notifications.
    pub fn subscribe_cleared<F>(&self, callback: F) -> MonitorResult<SubscriptionId>
    where
        F: Fn(&AlarmEvent) + Send + Sync + 'static,
    {
        self.shared.cleared.subscribe(Arc::new(callback))
    }

    /// Removes a triggered subscription. Returns `false` if unknown.
    pub fn unsubscribe_triggered(&self, id: SubscriptionId) -> bool {
        self.shared.triggered.unsubscribe(id)
    }

    /// Removes a cleared subscription. Returns `false` if unknown.
    pub fn unsubscribe_cleared(&self, id: SubscriptionId) -> bool {
        self.shared.cleared.unsubscribe(id)
    }

    /// Opens a buffered stream of triggered and cleared events.
    ///
    /// Events that do not fit in the stream's buffer are dropped and counted
    /// in [`dropped_events`](Self::dropped_events).
    pub fn subscribe_stream(&self) -> MonitorResult<AlarmStream> {
        let (tx, rx) = bounded::<AlarmEvent>(self.shared.cfg.stream_capacity.max(1));
        let dropped = Arc::clone(&self.shared.dropped_events);

        let forward: AlarmCallback = Arc::new(move |event: &AlarmEvent| {
            match tx.try_send(event.clone()) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) | Err(TrySendError::Disconnected(_)) => {
                    dropped.fetch_add(1, Ordering::Relaxed);
                    warn!(variable_id = %event.variable_id, "alarm stream full or closed; event dropped");
                }
            }
        });

        let triggered_id = self.shared.triggered.subscribe(Arc::clone(&forward))?;
        let cleared_id = match self.shared.cleared.subscribe(forward) {
            Ok(id) => id,
            Err(err) => {
                self.shared.triggered.unsubscribe(triggered_id);
                return Err(err);
            }
        };

        Ok(AlarmStream::new(
            triggered_id,
            cleared_id,
            rx,
            Arc::clone(&self.shared.triggered),
            Arc::clone(&self.shared.cleared),
        ))
    }

    /// Stream events dropped because a stream was full or closed.
    #[must_use]
    pub fn dropped_events(&self) -> u64 {
        self.shared.dropped_events.load(Ordering::Relaxed)
    }
}

fn expiry_callback(
    shared: Weak<Shared>,
    slot: Weak<Mutex<VariableState>>,
    index: usize,
) -> impl Fn() + Send + Sync + 'static {
    move || {
        let (Some(shared), Some(slot)) = (shared.upgrade(), slot.upgrade()) else {
            return;
        };
        if let Err(err) = shared.on_delay_expired(&slot, index) {
            warn!(condition_index = index, error = %err, "delayed alarm could not be raised");
        }
    }
}
