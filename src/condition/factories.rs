//! Shorthands for conditions that come up in almost every deployment.
//!
//! Every factory returns one of the five plain condition kinds, so the engine
//! treats them exactly like hand-built conditions.

use regex::Regex;

use crate::error::ValidationError;
use crate::value::{EnumValue, Value};

use super::{Classification, Direction, PredicateCondition, ThresholdCondition, ValueChangeCondition};

/// Fires when the value rises strictly above `threshold`.
pub fn upper_threshold(
    threshold: impl Into<Value>,
    classification: Classification,
    message: impl Into<String>,
) -> ThresholdCondition {
    ThresholdCondition::new(Direction::UpperBound, threshold, classification, message)
}

/// Fires when the value drops strictly below `threshold`.
pub fn lower_threshold(
    threshold: impl Into<Value>,
    classification: Classification,
    message: impl Into<String>,
) -> ThresholdCondition {
    ThresholdCondition::new(Direction::LowerBound, threshold, classification, message)
}

/// Fires while a boolean variable is `true`.
pub fn bool_is_true(classification: Classification, message: impl Into<String>) -> PredicateCondition {
    PredicateCondition::new(|v| v.as_bool() == Some(true), classification, message)
}

/// Fires while a string variable equals `expected`.
pub fn string_equals(
    expected: impl Into<String>,
    classification: Classification,
    message: impl Into<String>,
) -> PredicateCondition {
    let expected = expected.into();
    PredicateCondition::new(
        move |v| v.as_string() == Some(expected.as_str()),
        classification,
        message,
    )
}

/// Fires while a string variable matches `pattern`.
///
/// # Errors
///
/// Returns `ValidationError::InvalidConfiguration` if the pattern does not compile.
pub fn string_matches(
    pattern: &str,
    classification: Classification,
    message: impl Into<String>,
) -> Result<PredicateCondition, ValidationError> {
    let re = Regex::new(pattern).map_err(|e| {
        ValidationError::invalid_configuration(format!("invalid regex '{pattern}': {e}"))
    })?;
    Ok(PredicateCondition::new(
        move |v| v.as_string().is_some_and(|s| re.is_match(s)),
        classification,
        message,
    ))
}

/// Fires when a numeric value moves by strictly more than `jump` in a single
/// update, in either direction.
pub fn value_jump(jump: f64, classification: Classification, message: impl Into<String>) -> ValueChangeCondition {
    ValueChangeCondition::new(
        move |old, new| match (old.as_float(), new.as_float()) {
            (Some(a), Some(b)) => (b - a).abs() > jump,
            _ => false,
        },
        classification,
        message,
    )
}

/// Fires while an enum variable holds `expected`.
pub fn enum_equals(
    expected: EnumValue,
    classification: Classification,
    message: impl Into<String>,
) -> PredicateCondition {
    PredicateCondition::new(move |v| v.as_enum() == Some(&expected), classification, message)
}

/// Fires when an enum variable switches to a different member.
pub fn enum_changed(classification: Classification, message: impl Into<String>) -> ValueChangeCondition {
    ValueChangeCondition::new(
        |old, new| match (old.as_enum(), new.as_enum()) {
            (Some(a), Some(b)) => a != b,
            _ => false,
        },
        classification,
        message,
    )
}
