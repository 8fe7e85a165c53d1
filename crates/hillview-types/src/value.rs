use std::cmp::Ordering;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use twox_hash::XxHash64;

/// A single cell value, copied out of a column.
///
/// Dates and durations are carried as milliseconds (since the epoch for
/// dates). Doubles compare and hash by their bit pattern so that `Value`
/// can be a hash-map key; `Missing` sorts after every present value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Value {
    Int(i32),
    Double(f64),
    String(Arc<str>),
    Date(f64),
    Duration(f64),
    Missing,
}

impl Value {
    pub fn is_missing(&self) -> bool {
        matches!(self, Value::Missing)
    }

    /// Numeric projection; `None` for strings and missing values.
    pub fn as_double(&self) -> Option<f64> {
        match self {
            Value::Int(v) => Some(*v as f64),
            Value::Double(v) | Value::Date(v) | Value::Duration(v) => Some(*v),
            Value::String(_) | Value::Missing => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// 64-bit seeded hash of the value contents.
    pub fn hash64(&self, seed: u64) -> u64 {
        let mut hasher = XxHash64::with_seed(seed);
        self.hash(&mut hasher);
        hasher.finish()
    }

    fn rank(&self) -> u8 {
        match self {
            Value::Int(_) => 0,
            Value::Double(_) => 1,
            Value::Date(_) => 2,
            Value::Duration(_) => 3,
            Value::String(_) => 4,
            Value::Missing => 5,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Double(a), Value::Double(b))
            | (Value::Date(a), Value::Date(b))
            | (Value::Duration(a), Value::Duration(b)) => a.to_bits() == b.to_bits(),
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Missing, Value::Missing) => true,
            _ => false,
        }
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.rank().hash(state);
        match self {
            Value::Int(v) => v.hash(state),
            Value::Double(v) | Value::Date(v) | Value::Duration(v) => v.to_bits().hash(state),
            Value::String(s) => s.hash(state),
            Value::Missing => {}
        }
    }
}

impl Ord for Value {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => a.cmp(b),
            (Value::Double(a), Value::Double(b))
            | (Value::Date(a), Value::Date(b))
            | (Value::Duration(a), Value::Duration(b)) => a.total_cmp(b),
            (Value::String(a), Value::String(b)) => a.cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Double(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(Arc::from(v))
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Missing)
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Int(v) => write!(f, "{}", v),
            Value::Double(v) | Value::Date(v) | Value::Duration(v) => write!(f, "{}", v),
            Value::String(s) => write!(f, "{}", s),
            Value::Missing => write!(f, "NULL"),
        }
    }
}
