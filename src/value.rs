//! Value types that monitored variables can hold.
//!
//! A variable's value type is fixed at registration from its initial value.
//! Conditions are checked against that tag up front, so a comparison never
//! meets two values of different kinds at evaluation time.

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// A named enumeration member, e.g. `PumpState::Running`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EnumValue {
    /// Name of the enumeration type.
    pub enum_type: String,
    /// Name of the selected member.
    pub variant: String,
}

impl EnumValue {
    /// Builds an enum member value.
    #[must_use]
    pub fn new(enum_type: impl Into<String>, variant: impl Into<String>) -> Self {
        Self {
            enum_type: enum_type.into(),
            variant: variant.into(),
        }
    }
}

impl fmt::Display for EnumValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}", self.enum_type, self.variant)
    }
}

/// Possible values a monitored variable can hold.
///
/// # Examples
///
/// ```
/// use varmon::Value;
///
/// let temp = Value::Float(21.5);
/// let running = Value::Bool(true);
///
/// assert!(temp.is_float());
/// assert!(temp.is_orderable());
/// assert!(!running.is_orderable());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Value {
    /// Boolean.
    Bool(bool),
    /// Signed integer.
    Int(i64),
    /// Floating point number.
    Float(f64),
    /// UTF-8 text.
    String(String),
    /// Enumeration member.
    Enum(EnumValue),
    /// Arbitrary JSON document.
    Structured(serde_json::Value),
    /// Absent value; never valid as a variable's value.
    Null,
}

/// Type tag of a [`Value`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueType {
    /// [`Value::Bool`].
    Bool,
    /// [`Value::Int`].
    Int,
    /// [`Value::Float`].
    Float,
    /// [`Value::String`].
    String,
    /// [`Value::Enum`].
    Enum,
    /// [`Value::Structured`].
    Structured,
    /// [`Value::Null`].
    Null,
}

impl ValueType {
    /// Whether values of this type support ordering comparison.
    #[must_use]
    pub const fn is_orderable(self) -> bool {
        matches!(self, Self::Int | Self::Float | Self::String)
    }

    /// Lowercase name used in error messages.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Bool => "bool",
            Self::Int => "int",
            Self::Float => "float",
            Self::String => "string",
            Self::Enum => "enum",
            Self::Structured => "structured",
            Self::Null => "null",
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl Value {
    /// Type tag of this value.
    pub const fn value_type(&self) -> ValueType {
        match self {
            Self::Bool(_) => ValueType::Bool,
            Self::Int(_) => ValueType::Int,
            Self::Float(_) => ValueType::Float,
            Self::String(_) => ValueType::String,
            Self::Enum(_) => ValueType::Enum,
            Self::Structured(_) => ValueType::Structured,
            Self::Null => ValueType::Null,
        }
    }

    /// Returns true for booleans.
    pub const fn is_bool(&self) -> bool {
        matches!(self, Self::Bool(_))
    }

    /// Returns true for integers.
    pub const fn is_int(&self) -> bool {
        matches!(self, Self::Int(_))
    }

    /// Returns true for floats.
    pub const fn is_float(&self) -> bool {
        matches!(self, Self::Float(_))
    }

    /// Returns true for strings.
    pub const fn is_string(&self) -> bool {
        matches!(self, Self::String(_))
    }

    /// Returns true for enum members.
    pub const fn is_enum(&self) -> bool {
        matches!(self, Self::Enum(_))
    }

    /// Returns true for null.
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Whether this value supports ordering comparison.
    pub const fn is_orderable(&self) -> bool {
        self.value_type().is_orderable()
    }

    /// Boolean payload, if any.
    pub const fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(v) => Some(*v),
            _ => None,
        }
    }

    /// Integer payload, if any.
    pub const fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Numeric view of the value. Ints widen to float.
    #[allow(clippy::cast_precision_loss)]
    pub const fn as_float(&self) -> Option<f64> {
        match self {
            Self::Float(v) => Some(*v),
            Self::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    /// String payload, if any.
    pub fn as_string(&self) -> Option<&str> {
        match self {
            Self::String(v) => Some(v),
            _ => None,
        }
    }

    /// Enum payload, if any.
    pub const fn as_enum(&self) -> Option<&EnumValue> {
        match self {
            Self::Enum(v) => Some(v),
            _ => None,
        }
    }

    /// JSON payload, if any.
    pub const fn as_structured(&self) -> Option<&serde_json::Value> {
        match self {
            Self::Structured(v) => Some(v),
            _ => None,
        }
    }

    /// Orders two values of the same orderable type.
    ///
    /// Returns `None` when the types differ, the type has no ordering, or a
    /// float comparison involves NaN.
    #[must_use]
    pub fn compare(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Self::Int(a), Self::Int(b)) => Some(a.cmp(b)),
            (Self::Float(a), Self::Float(b)) => a.partial_cmp(b),
            (Self::String(a), Self::String(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }

    /// Returns a human-readable type name.
    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        self.value_type().name()
    }
}

impl Default for Value {
    fn default() -> Self {
        Self::Null
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(v) => write!(f, "{v}"),
            Self::Int(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::String(v) => write!(f, "{v:?}"),
            Self::Enum(v) => write!(f, "{v}"),
            Self::Structured(v) => write!(f, "{v}"),
            Self::Null => write!(f, "null"),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Self::Float(f64::from(v))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

impl From<EnumValue> for Value {
    fn from(v: EnumValue) -> Self {
        Self::Enum(v)
    }
}

impl From<serde_json::Value> for Value {
    fn from(v: serde_json::Value) -> Self {
        Self::Structured(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::Null, Into::into)
    }
}

fn extract_mismatch(expected: ValueType, actual: &Value) -> ValidationError {
    ValidationError::type_mismatch("value extraction", expected.name(), actual.type_name())
}

impl TryFrom<Value> for bool {
    type Error = ValidationError;

    fn try_from(v: Value) -> Result<Self, Self::Error> {
        v.as_bool().ok_or_else(|| extract_mismatch(ValueType::Bool, &v))
    }
}

impl TryFrom<Value> for i64 {
    type Error = ValidationError;

    fn try_from(v: Value) -> Result<Self, Self::Error> {
        v.as_int().ok_or_else(|| extract_mismatch(ValueType::Int, &v))
    }
}

impl TryFrom<Value> for f64 {
    type Error = ValidationError;

    fn try_from(v: Value) -> Result<Self, Self::Error> {
        match v {
            Value::Float(f) => Ok(f),
            other => Err(extract_mismatch(ValueType::Float, &other)),
        }
    }
}

impl TryFrom<Value> for String {
    type Error = ValidationError;

    fn try_from(v: Value) -> Result<Self, Self::Error> {
        match v {
            Value::String(s) => Ok(s),
            other => Err(extract_mismatch(ValueType::String, &other)),
        }
    }
}
