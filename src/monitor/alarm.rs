//! Alarm keys, active-alarm records and the event payloads sent to observers.
//!
//! These types are serializable so embedders can forward them as they see fit.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::condition::{Classification, Direction};
use crate::value::{Value, ValueType};

/// Unique identifier for an observer subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubscriptionId(Uuid);

impl SubscriptionId {
    /// Create a new random subscription id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SubscriptionId {
    fn default() -> Self {
        Self::new()
    }
}

/// Identifies one condition's alarm within a variable.
///
/// The condition index alone is unique per registration; direction and
/// classification are carried so acknowledgments can name the alarm the way
/// users see it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AlarmKey {
    /// Position of the condition in the registration list.
    pub condition_index: usize,
    /// Direction of the condition.
    pub direction: Direction,
    /// Classification of the condition.
    pub classification: Classification,
}

impl AlarmKey {
    /// Builds a key from its parts.
    #[must_use]
    pub const fn new(condition_index: usize, direction: Direction, classification: Classification) -> Self {
        Self {
            condition_index,
            direction,
            classification,
        }
    }
}

/// A currently firing alarm.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActiveAlarm {
    /// Variable the alarm belongs to.
    pub variable_id: String,
    /// Identifies the firing condition.
    pub key: AlarmKey,
    /// Condition message.
    pub message: String,
    /// When the alarm was raised.
    pub timestamp: DateTime<Utc>,
    /// Value that raised the alarm.
    pub current_value: Value,
    /// Value before the raising update; `None` for delayed alarms.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_value: Option<Value>,
    /// Threshold literal, for threshold-like conditions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub threshold_value: Option<Value>,
}

impl ActiveAlarm {
    /// Classification from the alarm key.
    pub const fn classification(&self) -> Classification {
        self.key.classification
    }

    /// Direction from the alarm key.
    pub const fn direction(&self) -> Direction {
        self.key.direction
    }
}

/// Snapshot delivered to "alarm triggered" and "alarm cleared" observers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlarmEvent {
    /// Unique per emitted event.
    pub event_id: Uuid,
    /// Variable the alarm belongs to.
    pub variable_id: String,
    /// Display name given at registration.
    pub variable_name: String,
    /// Identifies the condition.
    pub key: AlarmKey,
    /// Value at the time of the event.
    pub current_value: Value,
    /// Value before the update that caused the event.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_value: Option<Value>,
    /// Threshold literal, for threshold-like conditions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub threshold_value: Option<Value>,
    /// Condition message.
    pub message: String,
    /// When the event was produced.
    pub timestamp: DateTime<Utc>,
    /// `true` for triggered events, `false` for cleared events.
    pub active: bool,
}

impl AlarmEvent {
    pub(crate) fn triggered(variable_name: &str, alarm: &ActiveAlarm) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            variable_id: alarm.variable_id.clone(),
            variable_name: variable_name.to_string(),
            key: alarm.key,
            current_value: alarm.current_value.clone(),
            previous_value: alarm.previous_value.clone(),
            threshold_value: alarm.threshold_value.clone(),
            message: alarm.message.clone(),
            timestamp: alarm.timestamp,
            active: true,
        }
    }

    /// Cleared events report the value that resolved the alarm.
    pub(crate) fn cleared(
        variable_name: &str,
        alarm: &ActiveAlarm,
        current_value: Value,
        previous_value: Option<Value>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            variable_id: alarm.variable_id.clone(),
            variable_name: variable_name.to_string(),
            key: alarm.key,
            current_value,
            previous_value,
            threshold_value: alarm.threshold_value.clone(),
            message: alarm.message.clone(),
            timestamp,
            active: false,
        }
    }

    /// Classification from the alarm key.
    pub const fn classification(&self) -> Classification {
        self.key.classification
    }

    /// Direction from the alarm key.
    pub const fn direction(&self) -> Direction {
        self.key.direction
    }
}

/// Pre-built value-change notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValueChangedEvent {
    /// Variable that changed.
    pub variable_id: String,
    /// Value before the change.
    pub old_value: Value,
    /// Value after the change.
    pub new_value: Value,
}

impl ValueChangedEvent {
    /// Builds a value-change event.
    pub fn new(variable_id: impl Into<String>, old_value: impl Into<Value>, new_value: impl Into<Value>) -> Self {
        Self {
            variable_id: variable_id.into(),
            old_value: old_value.into(),
            new_value: new_value.into(),
        }
    }
}

/// Snapshot of a registered variable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegisteredVariable {
    /// Registered id.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Type fixed at registration.
    pub value_type: ValueType,
    /// Last stored value.
    pub current_value: Value,
    /// Number of registered conditions.
    pub condition_count: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alarm() -> ActiveAlarm {
        ActiveAlarm {
            variable_id: "temp1".to_string(),
            key: AlarmKey::new(0, Direction::UpperBound, Classification::Warning),
            message: "too hot".to_string(),
            timestamp: Utc::now(),
            current_value: Value::Float(90.0),
            previous_value: Some(Value::Float(70.0)),
            threshold_value: Some(Value::Float(85.0)),
        }
    }

    #[test]
    fn triggered_event_copies_alarm_snapshot() {
        let a = alarm();
        let ev = AlarmEvent::triggered("Temperature", &a);
        assert!(ev.active);
        assert_eq!(ev.variable_id, "temp1");
        assert_eq!(ev.variable_name, "Temperature");
        assert_eq!(ev.classification(), Classification::Warning);
        assert_eq!(ev.direction(), Direction::UpperBound);
        assert_eq!(ev.current_value, Value::Float(90.0));
        assert_eq!(ev.previous_value, Some(Value::Float(70.0)));
        assert_eq!(ev.threshold_value, Some(Value::Float(85.0)));
        assert_eq!(ev.timestamp, a.timestamp);
    }

    #[test]
    fn cleared_event_reports_resolving_value() {
        let a = alarm();
        let at = a.timestamp + chrono::Duration::seconds(3);
        let ev = AlarmEvent::cleared("Temperature", &a, Value::Float(60.0), Some(Value::Float(90.0)), at);
        assert!(!ev.active);
        assert_eq!(ev.current_value, Value::Float(60.0));
        assert_eq!(ev.previous_value, Some(Value::Float(90.0)));
        assert_eq!(ev.threshold_value, Some(Value::Float(85.0)));
        assert_eq!(ev.timestamp, at);
    }

    #[test]
    fn alarm_keys_distinguish_conditions() {
        let a = AlarmKey::new(0, Direction::UpperBound, Classification::Warning);
        let b = AlarmKey::new(1, Direction::UpperBound, Classification::Warning);
        let c = AlarmKey::new(0, Direction::UpperBound, Classification::Critical);
        assert_ne!(a, b);
        assert_ne!(a, c);
        assert!(a < b);
    }

    #[test]
    fn active_alarm_serialization() {
        let a = alarm();
        let json = serde_json::to_string(&a).unwrap();
        let back: ActiveAlarm = serde_json::from_str(&json).unwrap();
        assert_eq!(a, back);
    }
}
