//! Monitor subsystem: registered variables, condition evaluation and alarms.
//!
//! The engine is embedded and synchronous. Value updates are evaluated on the
//! caller's thread; the only asynchrony is delayed-condition expiry, which
//! arrives from the engine's [`TimerProvider`](crate::timer::TimerProvider).

/// Alarm keys, records and event payloads.
pub mod alarm;
/// Delay tracking for delayed conditions.
pub mod condition_timer;
/// The monitor engine.
pub mod engine;
/// Condition evaluation.
pub(crate) mod evaluator;
/// Observer registry.
pub mod observers;
/// Subscriber stream handle.
pub mod stream;

pub use alarm::{ActiveAlarm, AlarmEvent, AlarmKey, RegisteredVariable, SubscriptionId, ValueChangedEvent};
pub use condition_timer::ConditionTimer;
pub use engine::{MonitorEngine, MonitorEngineConfig};
pub use observers::{AlarmCallback, ObserverRegistry};
pub use stream::AlarmStream;
