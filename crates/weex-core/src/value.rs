//! Unit-aware value container

use serde::{Deserialize, Serialize};

use crate::units::{UnitError, UnitResult};

/// The value carried by a [`ValueTuple`]: nothing, a scalar, or a time series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Scalar(f64),
    Series(Vec<Option<f64>>),
    Null,
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_scalar(&self) -> Option<f64> {
        match self {
            Value::Scalar(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_series(&self) -> Option<&[Option<f64>]> {
        match self {
            Value::Series(values) => Some(values),
            _ => None,
        }
    }

    /// Apply `f` to every present number, keeping the shape and any gaps.
    pub fn map(&self, f: impl Fn(f64) -> f64) -> Value {
        match self {
            Value::Null => Value::Null,
            Value::Scalar(v) => Value::Scalar(f(*v)),
            Value::Series(values) => Value::Series(values.iter().map(|v| v.map(&f)).collect()),
        }
    }

    /// Combine two values of the same shape. `None` when the shapes differ.
    fn zip_with(&self, other: &Value, f: impl Fn(f64, f64) -> f64) -> Option<Value> {
        match (self, other) {
            (Value::Null, _) | (_, Value::Null) => Some(Value::Null),
            (Value::Scalar(a), Value::Scalar(b)) => Some(Value::Scalar(f(*a, *b))),
            (Value::Series(a), Value::Series(b)) if a.len() == b.len() => Some(Value::Series(
                a.iter()
                    .zip(b)
                    .map(|(x, y)| match (x, y) {
                        (Some(x), Some(y)) => Some(f(*x, *y)),
                        _ => None,
                    })
                    .collect(),
            )),
            _ => None,
        }
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Scalar(v)
    }
}

impl From<Option<f64>> for Value {
    fn from(v: Option<f64>) -> Self {
        v.map_or(Value::Null, Value::Scalar)
    }
}

impl From<Vec<Option<f64>>> for Value {
    fn from(v: Vec<Option<f64>>) -> Self {
        Value::Series(v)
    }
}

/// Value, unit and unit group, threaded through every measurement boundary.
///
/// A tuple is never changed in place; conversions and arithmetic return new
/// tuples. A missing unit means "unknown", a missing group means the
/// observation belongs to no unit group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValueTuple {
    value: Value,
    unit: Option<String>,
    group: Option<String>,
}

impl ValueTuple {
    pub fn new(value: impl Into<Value>, unit: Option<&str>, group: Option<&str>) -> Self {
        Self {
            value: value.into(),
            unit: unit.map(str::to_string),
            group: group.map(str::to_string),
        }
    }

    pub fn scalar(value: f64, unit: &str, group: &str) -> Self {
        Self::new(value, Some(unit), Some(group))
    }

    pub fn null(unit: Option<&str>, group: Option<&str>) -> Self {
        Self::new(Value::Null, unit, group)
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    pub fn unit(&self) -> Option<&str> {
        self.unit.as_deref()
    }

    pub fn group(&self) -> Option<&str> {
        self.group.as_deref()
    }

    /// Scalar payload, if any
    pub fn raw(&self) -> Option<f64> {
        self.value.as_scalar()
    }

    pub fn is_null(&self) -> bool {
        self.value.is_null()
    }

    /// A tuple with the same unit and group but a different value
    pub fn with_value(&self, value: impl Into<Value>) -> Self {
        Self {
            value: value.into(),
            unit: self.unit.clone(),
            group: self.group.clone(),
        }
    }

    pub fn into_parts(self) -> (Value, Option<String>, Option<String>) {
        (self.value, self.unit, self.group)
    }

    pub fn checked_add(&self, other: &ValueTuple) -> UnitResult<ValueTuple> {
        self.combine(other, |a, b| a + b)
    }

    pub fn checked_sub(&self, other: &ValueTuple) -> UnitResult<ValueTuple> {
        self.combine(other, |a, b| a - b)
    }

    fn combine(&self, other: &ValueTuple, f: impl Fn(f64, f64) -> f64) -> UnitResult<ValueTuple> {
        if self.unit != other.unit || self.group != other.group {
            return Err(UnitError::IncompatibleUnits {
                left: self.unit.clone().unwrap_or_default(),
                right: other.unit.clone().unwrap_or_default(),
            });
        }
        let value = self
            .value
            .zip_with(&other.value, f)
            .ok_or(UnitError::ShapeMismatch)?;
        Ok(self.with_value(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_map_preserves_gaps() {
        let series = Value::Series(vec![Some(1.0), None, Some(3.0)]);
        assert_eq!(
            series.map(|v| v * 2.0),
            Value::Series(vec![Some(2.0), None, Some(6.0)])
        );
        assert_eq!(Value::Null.map(|v| v + 1.0), Value::Null);
    }

    #[test]
    fn test_add_same_unit() {
        let a = ValueTuple::scalar(1.5, "mm", "group_rain");
        let b = ValueTuple::scalar(2.0, "mm", "group_rain");
        assert_eq!(a.checked_add(&b).unwrap().raw(), Some(3.5));

        let missing = ValueTuple::null(Some("mm"), Some("group_rain"));
        assert!(a.checked_add(&missing).unwrap().is_null());
    }

    #[test]
    fn test_add_mismatched_units_fails() {
        let a = ValueTuple::scalar(1.0, "mm", "group_rain");
        let b = ValueTuple::scalar(1.0, "inch", "group_rain");
        assert!(matches!(
            a.checked_add(&b),
            Err(UnitError::IncompatibleUnits { .. })
        ));
    }

    #[test]
    fn test_series_subtraction() {
        let a = ValueTuple::new(vec![Some(5.0), Some(4.0), None], Some("mbar"), Some("group_pressure"));
        let b = ValueTuple::new(vec![Some(1.0), None, Some(2.0)], Some("mbar"), Some("group_pressure"));
        let diff = a.checked_sub(&b).unwrap();
        assert_eq!(diff.value(), &Value::Series(vec![Some(4.0), None, None]));

        let short = ValueTuple::new(vec![Some(1.0)], Some("mbar"), Some("group_pressure"));
        assert!(matches!(a.checked_sub(&short), Err(UnitError::ShapeMismatch)));
    }

    #[test]
    fn test_value_tuple_json() {
        let vt = ValueTuple::scalar(21.5, "degree_C", "group_temperature");
        let json = serde_json::to_string(&vt).unwrap();
        assert_eq!(json, r#"{"value":21.5,"unit":"degree_C","group":"group_temperature"}"#);
        let back: ValueTuple = serde_json::from_str(&json).unwrap();
        assert_eq!(back, vt);
    }
}
