//! # varmon - Variable Monitoring and Alarm Evaluation
//!
//! varmon watches named variables and raises alarms when their values meet
//! declarative conditions. Callers register a variable with an initial value
//! and a list of conditions, then push value updates; the engine evaluates
//! every condition on each update and notifies observers when an alarm is
//! triggered or cleared.
//!
//! ## Core Concepts
//!
//! - **Value**: A closed, tagged value type fixed per variable at registration
//! - **Condition**: Threshold, predicate, value-change, delayed or hysteresis
//! - **Active alarm**: A triggered condition tracked until cleared or acknowledged
//! - **Timer provider**: The clock seam; real-time or manually advanced
//!
//! ## Usage
//!
//! ```rust
//! use std::sync::Arc;
//! use varmon::{Classification, Direction, HysteresisCondition, ManualTimerProvider, MonitorEngine};
//!
//! let engine = MonitorEngine::with_timer_provider(Arc::new(ManualTimerProvider::new()));
//! let overheat = HysteresisCondition::new(
//!     Direction::UpperBound, 85.0, 75.0, Classification::Warning, "boiler overheating",
//! )?;
//! engine.register_variable("temp1", "Boiler temperature", 70.0, vec![overheat.into()])?;
//! engine.subscribe_triggered(|ev| println!("{}: {}", ev.variable_name, ev.message))?;
//!
//! engine.notify_value_changed("temp1", 90.0)?;
//! assert_eq!(engine.get_active_alarms()?.len(), 1);
//! # Ok::<(), varmon::MonitorError>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod condition;
pub mod error;
pub mod monitor;
pub mod timer;
pub mod value;

// Re-export primary types at crate root for convenience
pub use condition::factories;
pub use condition::{
	Classification, Condition, DelayedCondition, DelayedInner, Direction, HysteresisCondition,
	PredicateCondition, ThresholdCondition, ValueChangeCondition,
};
pub use error::{ExecutionError, MonitorError, MonitorResult, ValidationError};
pub use monitor::{
	ActiveAlarm, AlarmEvent, AlarmKey, AlarmStream, ConditionTimer, MonitorEngine,
	MonitorEngineConfig, RegisteredVariable, SubscriptionId, ValueChangedEvent,
};
pub use timer::{
	ManualTimerProvider, SystemTimerConfig, SystemTimerProvider, TimerCallback, TimerHandle,
	TimerProvider,
};
pub use value::{EnumValue, Value, ValueType};
