//! Alarm condition definitions.
//!
//! A [`Condition`] is one of five kinds: threshold, predicate, value-change,
//! delayed, or hysteresis. Conditions are immutable descriptions; all per-
//! condition runtime state (hysteresis activation, delay timers) lives in the
//! engine.

/// Convenience constructors for common conditions.
pub mod factories;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::value::Value;

/// Which side of a boundary a condition watches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// Fires when the value drops below the threshold.
    LowerBound,
    /// Fires when the value rises above the threshold.
    UpperBound,
    /// Direction-agnostic (predicate and value-change conditions).
    Custom,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::LowerBound => "lower_bound",
            Self::UpperBound => "upper_bound",
            Self::Custom => "custom",
        })
    }
}

/// Severity or category of an alarm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Classification {
    /// Informational notice.
    Information,
    /// Needs attention.
    Warning,
    /// Fault condition.
    Error,
    /// Requires immediate action.
    Critical,
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Information => "information",
            Self::Warning => "warning",
            Self::Error => "error",
            Self::Critical => "critical",
        })
    }
}

/// Single-value test used by predicate conditions.
pub type PredicateFn = Arc<dyn Fn(&Value) -> bool + Send + Sync>;

/// Two-value `(old, new)` test used by value-change conditions.
pub type ChangeFn = Arc<dyn Fn(&Value, &Value) -> bool + Send + Sync>;

/// Fires when the value crosses a single threshold (strictly).
#[derive(Debug, Clone, PartialEq)]
pub struct ThresholdCondition {
    /// Which side of the threshold fires.
    pub direction: Direction,
    /// Boundary value; must match the variable's type.
    pub threshold: Value,
    /// Severity of the raised alarm.
    pub classification: Classification,
    /// Text carried by alarm events.
    pub message: String,
}

impl ThresholdCondition {
    /// Builds a threshold condition. Prefer [`factories::upper_threshold`] or
    /// [`factories::lower_threshold`] for the common cases.
    pub fn new(
        direction: Direction,
        threshold: impl Into<Value>,
        classification: Classification,
        message: impl Into<String>,
    ) -> Self {
        Self {
            direction,
            threshold: threshold.into(),
            classification,
            message: message.into(),
        }
    }

    /// `true` when `value` lies strictly past the threshold.
    pub(crate) fn is_exceeded_by(&self, value: &Value) -> bool {
        crosses(self.direction, value, &self.threshold)
    }
}

/// Fires while a single-value test holds.
#[derive(Clone)]
pub struct PredicateCondition {
    /// Returns `true` while the alarm should be active.
    pub test: PredicateFn,
    /// Severity of the raised alarm.
    pub classification: Classification,
    /// Text carried by alarm events.
    pub message: String,
}

impl PredicateCondition {
    /// Wraps `test` as a predicate condition.
    pub fn new<F>(test: F, classification: Classification, message: impl Into<String>) -> Self
    where
        F: Fn(&Value) -> bool + Send + Sync + 'static,
    {
        Self {
            test: Arc::new(test),
            classification,
            message: message.into(),
        }
    }
}

impl fmt::Debug for PredicateCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PredicateCondition")
            .field("classification", &self.classification)
            .field("message", &self.message)
            .finish_non_exhaustive()
    }
}

/// Fires while a test over the previous and new value holds.
#[derive(Clone)]
pub struct ValueChangeCondition {
    /// Receives `(old, new)`; returns `true` while the alarm should be active.
    pub test: ChangeFn,
    /// Severity of the raised alarm.
    pub classification: Classification,
    /// Text carried by alarm events.
    pub message: String,
}

impl ValueChangeCondition {
    /// Wraps `test` as a value-change condition.
    pub fn new<F>(test: F, classification: Classification, message: impl Into<String>) -> Self
    where
        F: Fn(&Value, &Value) -> bool + Send + Sync + 'static,
    {
        Self {
            test: Arc::new(test),
            classification,
            message: message.into(),
        }
    }
}

impl fmt::Debug for ValueChangeCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValueChangeCondition")
            .field("classification", &self.classification)
            .field("message", &self.message)
            .finish_non_exhaustive()
    }
}

/// The immediate conditions a [`DelayedCondition`] may wrap.
#[derive(Debug, Clone)]
pub enum DelayedInner {
    /// See [`ThresholdCondition`].
    Threshold(ThresholdCondition),
    /// See [`PredicateCondition`].
    Predicate(PredicateCondition),
    /// See [`ValueChangeCondition`].
    ValueChange(ValueChangeCondition),
}

impl DelayedInner {
    /// Direction of the wrapped condition.
    pub const fn direction(&self) -> Direction {
        match self {
            Self::Threshold(c) => c.direction,
            Self::Predicate(_) | Self::ValueChange(_) => Direction::Custom,
        }
    }

    /// Classification of the wrapped condition.
    pub const fn classification(&self) -> Classification {
        match self {
            Self::Threshold(c) => c.classification,
            Self::Predicate(c) => c.classification,
            Self::ValueChange(c) => c.classification,
        }
    }

    /// Message of the wrapped condition.
    pub fn message(&self) -> &str {
        match self {
            Self::Threshold(c) => &c.message,
            Self::Predicate(c) => &c.message,
            Self::ValueChange(c) => &c.message,
        }
    }
}

impl From<ThresholdCondition> for DelayedInner {
    fn from(c: ThresholdCondition) -> Self {
        Self::Threshold(c)
    }
}

impl From<PredicateCondition> for DelayedInner {
    fn from(c: PredicateCondition) -> Self {
        Self::Predicate(c)
    }
}

impl From<ValueChangeCondition> for DelayedInner {
    fn from(c: ValueChangeCondition) -> Self {
        Self::ValueChange(c)
    }
}

/// Wraps an immediate condition that must hold continuously for `delay`
/// before the alarm fires.
#[derive(Debug, Clone)]
pub struct DelayedCondition {
    inner: DelayedInner,
    delay: Duration,
}

impl DelayedCondition {
    /// # Errors
    ///
    /// Returns `ValidationError::InvalidConfiguration` if `delay` is zero.
    pub fn new(inner: impl Into<DelayedInner>, delay: Duration) -> Result<Self, ValidationError> {
        if delay.is_zero() {
            return Err(ValidationError::invalid_configuration(
                "delayed condition requires a positive delay",
            ));
        }
        Ok(Self {
            inner: inner.into(),
            delay,
        })
    }

    /// The condition that must hold.
    pub const fn inner(&self) -> &DelayedInner {
        &self.inner
    }

    /// How long it must hold before the alarm fires.
    pub const fn delay(&self) -> Duration {
        self.delay
    }
}

/// Two-threshold condition: fires past `trigger`, clears only once the value
/// returns to or past `clear`.
///
/// # Examples
///
/// ```
/// use varmon::{Classification, Direction, HysteresisCondition};
///
/// let ok = HysteresisCondition::new(
///     Direction::UpperBound, 85.0, 75.0, Classification::Warning, "overheat",
/// );
/// assert!(ok.is_ok());
///
/// // Clear must sit below trigger for an upper bound.
/// let bad = HysteresisCondition::new(
///     Direction::UpperBound, 75.0, 85.0, Classification::Warning, "overheat",
/// );
/// assert!(bad.is_err());
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct HysteresisCondition {
    direction: Direction,
    trigger: Value,
    clear: Value,
    classification: Classification,
    message: String,
}

impl HysteresisCondition {
    /// # Errors
    ///
    /// - `TypeMismatch` if the thresholds differ in type, are not orderable, or
    ///   `direction` is [`Direction::Custom`].
    /// - `InvalidConfiguration` unless `trigger > clear` (upper bound) or
    ///   `trigger < clear` (lower bound).
    pub fn new(
        direction: Direction,
        trigger: impl Into<Value>,
        clear: impl Into<Value>,
        classification: Classification,
        message: impl Into<String>,
    ) -> Result<Self, ValidationError> {
        let trigger = trigger.into();
        let clear = clear.into();

        if direction == Direction::Custom {
            return Err(ValidationError::type_mismatch(
                "hysteresis direction",
                "lower_bound or upper_bound",
                "custom",
            ));
        }
        if trigger.value_type() != clear.value_type() {
            return Err(ValidationError::type_mismatch(
                "hysteresis clear threshold",
                trigger.type_name(),
                clear.type_name(),
            ));
        }
        if !trigger.is_orderable() {
            return Err(ValidationError::type_mismatch(
                "hysteresis threshold",
                "orderable value",
                trigger.type_name(),
            ));
        }

        let ordered = match direction {
            Direction::UpperBound => crosses(Direction::UpperBound, &trigger, &clear),
            Direction::LowerBound => crosses(Direction::LowerBound, &trigger, &clear),
            Direction::Custom => false,
        };
        if !ordered {
            return Err(ValidationError::invalid_configuration(format!(
                "hysteresis {direction} requires trigger {} clear (trigger={trigger}, clear={clear})",
                if direction == Direction::UpperBound { ">" } else { "<" },
            )));
        }

        Ok(Self {
            direction,
            trigger,
            clear,
            classification,
            message: message.into(),
        })
    }

    /// Side of the band that fires.
    pub const fn direction(&self) -> Direction {
        self.direction
    }

    /// Value past which the alarm triggers.
    pub const fn trigger(&self) -> &Value {
        &self.trigger
    }

    /// Value at or past which the alarm clears.
    pub const fn clear(&self) -> &Value {
        &self.clear
    }

    /// Severity of the raised alarm.
    pub const fn classification(&self) -> Classification {
        self.classification
    }

    /// Text carried by alarm events.
    pub fn message(&self) -> &str {
        &self.message
    }

    pub(crate) fn should_trigger(&self, value: &Value) -> bool {
        crosses(self.direction, value, &self.trigger)
    }

    /// Value back at or past the clear threshold, on the safe side.
    pub(crate) fn should_clear(&self, value: &Value) -> bool {
        use std::cmp::Ordering;

        match (self.direction, value.compare(&self.clear)) {
            (Direction::UpperBound, Some(Ordering::Less | Ordering::Equal)) => true,
            (Direction::LowerBound, Some(Ordering::Greater | Ordering::Equal)) => true,
            _ => false,
        }
    }
}

/// Any condition the monitor engine can evaluate.
#[derive(Debug, Clone)]
pub enum Condition {
    /// Single strict threshold.
    Threshold(ThresholdCondition),
    /// Test over the new value.
    Predicate(PredicateCondition),
    /// Test over the previous and new value.
    ValueChange(ValueChangeCondition),
    /// Condition that must hold for a delay.
    Delayed(DelayedCondition),
    /// Two-threshold band.
    Hysteresis(HysteresisCondition),
}

impl Condition {
    /// Direction reported in this condition's alarm key.
    pub const fn direction(&self) -> Direction {
        match self {
            Self::Threshold(c) => c.direction,
            Self::Predicate(_) | Self::ValueChange(_) => Direction::Custom,
            Self::Delayed(c) => c.inner.direction(),
            Self::Hysteresis(c) => c.direction,
        }
    }

    /// Classification reported in this condition's alarm key.
    pub const fn classification(&self) -> Classification {
        match self {
            Self::Threshold(c) => c.classification,
            Self::Predicate(c) => c.classification,
            Self::ValueChange(c) => c.classification,
            Self::Delayed(c) => c.inner.classification(),
            Self::Hysteresis(c) => c.classification,
        }
    }

    /// Message carried by this condition's alarms.
    pub fn message(&self) -> &str {
        match self {
            Self::Threshold(c) => &c.message,
            Self::Predicate(c) => &c.message,
            Self::ValueChange(c) => &c.message,
            Self::Delayed(c) => c.inner.message(),
            Self::Hysteresis(c) => &c.message,
        }
    }

    /// Threshold literal reported with alarms raised by this condition.
    pub fn threshold_value(&self) -> Option<&Value> {
        match self {
            Self::Threshold(c) => Some(&c.threshold),
            Self::Delayed(DelayedCondition {
                inner: DelayedInner::Threshold(c),
                ..
            }) => Some(&c.threshold),
            Self::Hysteresis(c) => Some(&c.trigger),
            _ => None,
        }
    }

    /// Short name of the condition kind, for logs.
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Threshold(_) => "threshold",
            Self::Predicate(_) => "predicate",
            Self::ValueChange(_) => "value_change",
            Self::Delayed(_) => "delayed",
            Self::Hysteresis(_) => "hysteresis",
        }
    }
}

impl From<ThresholdCondition> for Condition {
    fn from(c: ThresholdCondition) -> Self {
        Self::Threshold(c)
    }
}

impl From<PredicateCondition> for Condition {
    fn from(c: PredicateCondition) -> Self {
        Self::Predicate(c)
    }
}

impl From<ValueChangeCondition> for Condition {
    fn from(c: ValueChangeCondition) -> Self {
        Self::ValueChange(c)
    }
}

impl From<DelayedCondition> for Condition {
    fn from(c: DelayedCondition) -> Self {
        Self::Delayed(c)
    }
}

impl From<HysteresisCondition> for Condition {
    fn from(c: HysteresisCondition) -> Self {
        Self::Hysteresis(c)
    }
}

/// Strict crossing test: `value > threshold` for upper bounds,
/// `value < threshold` for lower bounds.
fn crosses(direction: Direction, value: &Value, threshold: &Value) -> bool {
    use std::cmp::Ordering;

    match (direction, value.compare(threshold)) {
        (Direction::UpperBound, Some(Ordering::Greater)) => true,
        (Direction::LowerBound, Some(Ordering::Less)) => true,
        _ => false,
    }
}
