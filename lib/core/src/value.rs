use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use uuid::Uuid;

use crate::types::Type;

/// An immutable attribute value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Boolean(bool),
    Byte(i8),
    Short(i16),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    String(String),
    Text(String),
    DateTime(DateTime<Utc>),
    Uuid(Uuid),
    BooleanVector(Vec<bool>),
    IntVector(Vec<i32>),
    LongVector(Vec<i64>),
    FloatVector(Vec<f32>),
    DoubleVector(Vec<f64>),
}

impl Value {
    /// The [`Type`] of this value. Vector types take their length as dimensionality.
    pub fn value_type(&self) -> Type {
        match self {
            Value::Boolean(_) => Type::Boolean,
            Value::Byte(_) => Type::Byte,
            Value::Short(_) => Type::Short,
            Value::Int(_) => Type::Int,
            Value::Long(_) => Type::Long,
            Value::Float(_) => Type::Float,
            Value::Double(_) => Type::Double,
            Value::String(_) => Type::String,
            Value::Text(_) => Type::Text,
            Value::DateTime(_) => Type::DateTime,
            Value::Uuid(_) => Type::Uuid,
            Value::BooleanVector(v) => Type::BooleanVector(v.len()),
            Value::IntVector(v) => Type::IntVector(v.len()),
            Value::LongVector(v) => Type::LongVector(v.len()),
            Value::FloatVector(v) => Type::FloatVector(v.len()),
            Value::DoubleVector(v) => Type::DoubleVector(v.len()),
        }
    }

    #[inline]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) | Value::Text(s) => Some(s),
            _ => None,
        }
    }

    #[inline]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Byte(v) => Some(*v as f64),
            Value::Short(v) => Some(*v as f64),
            Value::Int(v) => Some(*v as f64),
            Value::Long(v) => Some(*v as f64),
            Value::Float(v) => Some(*v as f64),
            Value::Double(v) => Some(*v),
            _ => None,
        }
    }

    /// Vector values widened to `f64`; booleans map to 0.0/1.0.
    pub fn as_f64_vector(&self) -> Option<Vec<f64>> {
        match self {
            Value::BooleanVector(v) => Some(v.iter().map(|b| if *b { 1.0 } else { 0.0 }).collect()),
            Value::IntVector(v) => Some(v.iter().map(|x| *x as f64).collect()),
            Value::LongVector(v) => Some(v.iter().map(|x| *x as f64).collect()),
            Value::FloatVector(v) => Some(v.iter().map(|x| *x as f64).collect()),
            Value::DoubleVector(v) => Some(v.clone()),
            _ => None,
        }
    }

    /// Vector values narrowed to `f32`.
    pub fn as_f32_vector(&self) -> Option<Vec<f32>> {
        match self {
            Value::FloatVector(v) => Some(v.clone()),
            other => other
                .as_f64_vector()
                .map(|v| v.into_iter().map(|x| x as f32).collect()),
        }
    }

    /// Compares two values of compatible type.
    ///
    /// Returns `None` for incompatible kinds, vectors and NaN. `String` and `Text`
    /// compare with each other.
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Boolean(a), Value::Boolean(b)) => Some(a.cmp(b)),
            (Value::Byte(a), Value::Byte(b)) => Some(a.cmp(b)),
            (Value::Short(a), Value::Short(b)) => Some(a.cmp(b)),
            (Value::Int(a), Value::Int(b)) => Some(a.cmp(b)),
            (Value::Long(a), Value::Long(b)) => Some(a.cmp(b)),
            (Value::Float(a), Value::Float(b)) => a.partial_cmp(b),
            (Value::Double(a), Value::Double(b)) => a.partial_cmp(b),
            (Value::DateTime(a), Value::DateTime(b)) => Some(a.cmp(b)),
            (Value::Uuid(a), Value::Uuid(b)) => Some(a.cmp(b)),
            (a, b) => match (a.as_str(), b.as_str()) {
                (Some(a), Some(b)) => Some(a.cmp(b)),
                _ => None,
            },
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Boolean(v)
    }
}

impl From<i8> for Value {
    fn from(v: i8) -> Self {
        Value::Byte(v)
    }
}

impl From<i16> for Value {
    fn from(v: i16) -> Self {
        Value::Short(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Long(v)
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Value::Float(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Double(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<Uuid> for Value {
    fn from(v: Uuid) -> Self {
        Value::Uuid(v)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(v: DateTime<Utc>) -> Self {
        Value::DateTime(v)
    }
}

impl From<Vec<f32>> for Value {
    fn from(v: Vec<f32>) -> Self {
        Value::FloatVector(v)
    }
}

impl From<Vec<f64>> for Value {
    fn from(v: Vec<f64>) -> Self {
        Value::DoubleVector(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_type_of_vectors() {
        assert_eq!(Value::FloatVector(vec![1.0, 0.0, 0.0]).value_type(), Type::FloatVector(3));
        assert_eq!(Value::BooleanVector(vec![]).value_type(), Type::BooleanVector(0));
    }

    #[test]
    fn test_compare_same_kind() {
        assert_eq!(Value::Int(1).compare(&Value::Int(2)), Some(Ordering::Less));
        assert_eq!(
            Value::Text("b".into()).compare(&Value::String("a".into())),
            Some(Ordering::Greater)
        );
        assert_eq!(Value::Int(1).compare(&Value::Long(1)), None);
        assert_eq!(Value::Double(f64::NAN).compare(&Value::Double(1.0)), None);
        assert_eq!(
            Value::FloatVector(vec![1.0]).compare(&Value::FloatVector(vec![1.0])),
            None
        );
    }

    #[test]
    fn test_vector_widening() {
        let v = Value::IntVector(vec![1, 2]);
        assert_eq!(v.as_f64_vector(), Some(vec![1.0, 2.0]));
        assert_eq!(v.as_f32_vector(), Some(vec![1.0, 2.0]));
        assert_eq!(Value::Int(1).as_f64_vector(), None);
    }
}
