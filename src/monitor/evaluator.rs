//! Condition evaluation.
//!
//! Each registered condition gets a [`ConditionSlot`] holding its alarm key
//! and runtime state. Evaluating a slot against a value update yields a
//! [`Transition`]; the engine applies transitions to the active-alarm set.

use crate::condition::{Condition, DelayedInner, Direction, ThresholdCondition};
use crate::error::{MonitorResult, ValidationError};
use crate::value::{Value, ValueType};

use super::alarm::AlarmKey;
use super::condition_timer::ConditionTimer;

/// What an evaluation asks the engine to do with a condition's alarm.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Transition {
    Unchanged,
    Trigger,
    Clear,
}

/// A registered condition together with its evaluation state.
#[derive(Debug)]
pub(crate) struct ConditionSlot {
    pub condition: Condition,
    pub key: AlarmKey,
    /// Hysteresis band state; unused by other kinds.
    pub hysteresis_active: bool,
    /// Present for delayed conditions only.
    pub timer: Option<ConditionTimer>,
}

impl ConditionSlot {
    pub fn new(index: usize, condition: Condition, timer: Option<ConditionTimer>) -> Self {
        let key = AlarmKey::new(index, condition.direction(), condition.classification());
        Self {
            condition,
            key,
            hysteresis_active: false,
            timer,
        }
    }

    /// Evaluates the condition for one update.
    ///
    /// `alarm_active` tells whether this slot's key is currently in the
    /// variable's active set.
    pub fn evaluate(
        &mut self,
        old: Option<&Value>,
        new: &Value,
        alarm_active: bool,
    ) -> MonitorResult<Transition> {
        match &self.condition {
            Condition::Threshold(c) => Ok(immediate(threshold_hit(c, new), alarm_active)),
            Condition::Predicate(c) => Ok(immediate((c.test)(new), alarm_active)),
            Condition::ValueChange(c) => {
                let hit = old.is_some_and(|old| (c.test)(old, new));
                Ok(immediate(hit, alarm_active))
            }
            Condition::Hysteresis(c) => {
                if self.hysteresis_active {
                    if c.should_clear(new) {
                        self.hysteresis_active = false;
                        return Ok(Transition::Clear);
                    }
                    Ok(Transition::Unchanged)
                } else if c.should_trigger(new) {
                    self.hysteresis_active = true;
                    Ok(Transition::Trigger)
                } else {
                    Ok(Transition::Unchanged)
                }
            }
            Condition::Delayed(c) => {
                let hit = inner_hit(c.inner(), old, new);
                if let Some(timer) = &self.timer {
                    timer.on_condition_changed(hit)?;
                }
                // Triggering is left to the timer's expiry callback.
                if !hit && alarm_active {
                    Ok(Transition::Clear)
                } else {
                    Ok(Transition::Unchanged)
                }
            }
        }
    }

    pub fn dispose(&self) {
        if let Some(timer) = &self.timer {
            timer.dispose();
        }
    }
}

fn immediate(hit: bool, alarm_active: bool) -> Transition {
    match (hit, alarm_active) {
        (true, false) => Transition::Trigger,
        (false, true) => Transition::Clear,
        _ => Transition::Unchanged,
    }
}

fn threshold_hit(c: &ThresholdCondition, value: &Value) -> bool {
    c.is_exceeded_by(value)
}

fn inner_hit(inner: &DelayedInner, old: Option<&Value>, new: &Value) -> bool {
    match inner {
        DelayedInner::Threshold(c) => threshold_hit(c, new),
        DelayedInner::Predicate(c) => (c.test)(new),
        DelayedInner::ValueChange(c) => old.is_some_and(|old| (c.test)(old, new)),
    }
}

/// Checks a condition against the variable's declared value type.
pub(crate) fn validate_condition(
    index: usize,
    condition: &Condition,
    value_type: ValueType,
) -> Result<(), ValidationError> {
    match condition {
        Condition::Threshold(c) => validate_threshold(index, c, value_type),
        Condition::Delayed(d) => match d.inner() {
            DelayedInner::Threshold(c) => validate_threshold(index, c, value_type),
            DelayedInner::Predicate(_) | DelayedInner::ValueChange(_) => Ok(()),
        },
        Condition::Hysteresis(c) => {
            let actual = c.trigger().value_type();
            if actual == value_type {
                Ok(())
            } else {
                Err(ValidationError::type_mismatch(
                    format!("hysteresis condition {index}"),
                    value_type.name(),
                    actual.name(),
                ))
            }
        }
        Condition::Predicate(_) | Condition::ValueChange(_) => Ok(()),
    }
}

fn validate_threshold(
    index: usize,
    c: &ThresholdCondition,
    value_type: ValueType,
) -> Result<(), ValidationError> {
    let context = format!("threshold condition {index}");
    if c.direction == Direction::Custom {
        return Err(ValidationError::type_mismatch(
            context,
            "lower_bound or upper_bound",
            "custom",
        ));
    }
    if !value_type.is_orderable() {
        return Err(ValidationError::type_mismatch(
            context,
            "orderable variable type",
            value_type.name(),
        ));
    }
    let actual = c.threshold.value_type();
    if actual != value_type {
        return Err(ValidationError::type_mismatch(context, value_type.name(), actual.name()));
    }
    Ok(())
}
