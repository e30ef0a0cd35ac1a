//! Row-value model consumed by the matching engines.
//!
//! A [`Tuple`] is the minimal per-row payload an engine looks at: an ordered,
//! fixed-length sequence of scalar [`Value`]s (for example `[x, y, z]`,
//! `[ra, dec]`, or `[x, y, error_radius]`). Tuples are immutable value
//! objects owned by the caller; engines never mutate or retain them beyond a
//! single call. [`ValueInfo`] carries per-field metadata so drivers can
//! present or validate the tuple shape an engine expects.

use serde::{Deserialize, Serialize};

/// One scalar value of a row tuple.
///
/// Catalog data is dirty; anything that is not cleanly numeric is carried as
/// [`Value::Null`] and degrades to NaN on numeric access, which the engines
/// in turn treat as "no candidate" rather than an error.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// Integral value, kept distinct so bound extension can round outward
    /// instead of silently narrowing.
    Int(i64),
    /// Floating-point value.
    Float(f64),
    /// Missing or non-numeric value.
    Null,
}

impl Value {
    /// Numeric view of this value; `Null` maps to NaN.
    #[inline]
    pub fn as_f64(&self) -> f64 {
        match *self {
            Value::Int(i) => i as f64,
            Value::Float(f) => f,
            Value::Null => f64::NAN,
        }
    }

    /// True if this value has a usable (finite or infinite, non-NaN)
    /// numeric reading.
    #[inline]
    pub fn is_numeric(&self) -> bool {
        !self.as_f64().is_nan()
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

/// An ordered, fixed-length sequence of scalar values for one row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tuple {
    values: Vec<Value>,
}

impl Tuple {
    /// Build a tuple from explicit values.
    pub fn new(values: Vec<Value>) -> Self {
        Self { values }
    }

    /// Build a tuple of floats, the common case for coordinate rows.
    pub fn from_f64s(coords: &[f64]) -> Self {
        Self {
            values: coords.iter().copied().map(Value::Float).collect(),
        }
    }

    /// Number of fields in this tuple.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// True if the tuple has no fields.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// The value at `index`, if present.
    pub fn get(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    /// Numeric reading of the field at `index`; out-of-range or non-numeric
    /// fields read as NaN so per-row dirt degrades to "no candidate".
    #[inline]
    pub fn real(&self, index: usize) -> f64 {
        self.values
            .get(index)
            .map(Value::as_f64)
            .unwrap_or(f64::NAN)
    }

    /// All values in order.
    pub fn values(&self) -> &[Value] {
        &self.values
    }
}

impl From<Vec<f64>> for Tuple {
    fn from(coords: Vec<f64>) -> Self {
        Tuple::from_f64s(&coords)
    }
}

/// Metadata describing one tuple field or one tuning parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValueInfo {
    /// Short human-readable name, e.g. `"RA"` or `"Bin Factor"`.
    pub name: String,
    /// One-line description of what the value means.
    pub description: String,
    /// Physical units where applicable, e.g. `"radians"`.
    pub units: Option<String>,
}

impl ValueInfo {
    /// New descriptor with no units.
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            units: None,
        }
    }

    /// Attach units to this descriptor.
    pub fn with_units(mut self, units: impl Into<String>) -> Self {
        self.units = Some(units.into());
        self
    }
}
