//! Typed, possibly-missing-value columns.
//!
//! Every column kind stores its values in a [`ColumnValues`] vector and
//! tracks missing slots in a bitset. [`ArrayColumn`] holds one contiguous
//! vector; the segmented [`ListColumn`](crate::list_column::ListColumn)
//! holds a list of fixed-size ones.

use std::fmt::Debug;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use hillview_types::bitset::DenseBitset;
use hillview_types::error::{HillviewError, Result};
use hillview_types::kind::ContentsKind;
use hillview_types::value::Value;

use crate::schema::ColumnDescription;

/// Projects strings onto doubles so numeric sketches can consume
/// string-like columns.
pub trait StringConverter: Send + Sync + Debug {
    fn as_double(&self, s: &str) -> f64;
}

/// Maps a string to the index of the largest boundary that is `<=` it,
/// or -1 if it precedes every boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SortedStringsConverter {
    boundaries: Vec<String>,
}

impl SortedStringsConverter {
    pub fn new(boundaries: Vec<String>) -> Result<Self> {
        if boundaries.windows(2).any(|w| w[0] > w[1]) {
            return Err(HillviewError::Config(
                "Converter boundaries must be sorted".to_string(),
            ));
        }
        Ok(SortedStringsConverter { boundaries })
    }
}

impl StringConverter for SortedStringsConverter {
    fn as_double(&self, s: &str) -> f64 {
        match self.boundaries.binary_search_by(|b| b.as_str().cmp(s)) {
            Ok(i) => i as f64,
            Err(i) => i as f64 - 1.0,
        }
    }
}

/// The contiguous value storage shared by all column layouts.
///
/// Missing slots hold a placeholder (zero, NaN, or the empty string);
/// the owning column's bitset says which slots are missing.
#[derive(Debug, Clone)]
pub enum ColumnValues {
    Int(Vec<i32>),
    Double(Vec<f64>),
    String(Vec<Arc<str>>),
    Date(Vec<f64>),
    Duration(Vec<f64>),
}

impl ColumnValues {
    pub fn empty(kind: ContentsKind) -> Self {
        Self::with_capacity(kind, 0)
    }

    pub fn with_capacity(kind: ContentsKind, capacity: usize) -> Self {
        match kind {
            ContentsKind::Integer => ColumnValues::Int(Vec::with_capacity(capacity)),
            ContentsKind::Double => ColumnValues::Double(Vec::with_capacity(capacity)),
            ContentsKind::String | ContentsKind::Category | ContentsKind::Json => {
                ColumnValues::String(Vec::with_capacity(capacity))
            }
            ContentsKind::Date => ColumnValues::Date(Vec::with_capacity(capacity)),
            ContentsKind::Duration => ColumnValues::Duration(Vec::with_capacity(capacity)),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            ColumnValues::Int(v) => v.len(),
            ColumnValues::Double(v) | ColumnValues::Date(v) | ColumnValues::Duration(v) => {
                v.len()
            }
            ColumnValues::String(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether this storage can hold values of `kind`.
    pub fn matches(&self, kind: ContentsKind) -> bool {
        matches!(
            (self, kind),
            (ColumnValues::Int(_), ContentsKind::Integer)
                | (ColumnValues::Double(_), ContentsKind::Double)
                | (ColumnValues::Date(_), ContentsKind::Date)
                | (ColumnValues::Duration(_), ContentsKind::Duration)
                | (
                    ColumnValues::String(_),
                    ContentsKind::String | ContentsKind::Category | ContentsKind::Json
                )
        )
    }

    /// Append a value; `Value::Missing` appends a placeholder.
    /// Integers are accepted into double storage.
    pub fn push(&mut self, value: &Value) -> Result<()> {
        match (self, value) {
            (ColumnValues::Int(v), Value::Int(x)) => v.push(*x),
            (ColumnValues::Int(v), Value::Missing) => v.push(0),
            (ColumnValues::Double(v), Value::Double(x)) => v.push(*x),
            (ColumnValues::Double(v), Value::Int(x)) => v.push(*x as f64),
            (ColumnValues::Date(v), Value::Date(x)) => v.push(*x),
            (ColumnValues::Duration(v), Value::Duration(x)) => v.push(*x),
            (
                ColumnValues::Double(v) | ColumnValues::Date(v) | ColumnValues::Duration(v),
                Value::Missing,
            ) => v.push(f64::NAN),
            (ColumnValues::String(v), Value::String(s)) => v.push(s.clone()),
            (ColumnValues::String(v), Value::Missing) => v.push(Arc::from("")),
            (storage, value) => {
                return Err(HillviewError::Type(format!(
                    "Cannot store {:?} in {} storage",
                    value,
                    storage.kind_name()
                )))
            }
        }
        Ok(())
    }

    /// Value at `index`, ignoring missingness.
    pub fn get(&self, index: usize) -> Value {
        match self {
            ColumnValues::Int(v) => Value::Int(v[index]),
            ColumnValues::Double(v) => Value::Double(v[index]),
            ColumnValues::Date(v) => Value::Date(v[index]),
            ColumnValues::Duration(v) => Value::Duration(v[index]),
            ColumnValues::String(v) => Value::String(v[index].clone()),
        }
    }

    fn kind_name(&self) -> &'static str {
        match self {
            ColumnValues::Int(_) => "integer",
            ColumnValues::Double(_) => "double",
            ColumnValues::String(_) => "string",
            ColumnValues::Date(_) => "date",
            ColumnValues::Duration(_) => "duration",
        }
    }
}

/// Read-only access to one column of a table.
pub trait Column: Send + Sync + Debug {
    fn description(&self) -> &ColumnDescription;

    fn size_in_rows(&self) -> usize;

    fn is_missing(&self, row: usize) -> bool;

    /// The value at `row`, `Value::Missing` when missing.
    fn value(&self, row: usize) -> Value;

    fn name(&self) -> &str {
        &self.description().name
    }

    fn kind(&self) -> ContentsKind {
        self.description().kind
    }

    fn get_int(&self, row: usize) -> Result<Option<i32>> {
        self.check_kind(ContentsKind::Integer)?;
        Ok(match self.value(row) {
            Value::Int(v) => Some(v),
            _ => None,
        })
    }

    fn get_double(&self, row: usize) -> Result<Option<f64>> {
        self.check_kind(ContentsKind::Double)?;
        Ok(match self.value(row) {
            Value::Double(v) => Some(v),
            _ => None,
        })
    }

    fn get_date(&self, row: usize) -> Result<Option<f64>> {
        self.check_kind(ContentsKind::Date)?;
        Ok(self.value(row).as_double())
    }

    fn get_duration(&self, row: usize) -> Result<Option<f64>> {
        self.check_kind(ContentsKind::Duration)?;
        Ok(self.value(row).as_double())
    }

    fn get_string(&self, row: usize) -> Result<Option<Arc<str>>> {
        if !self.kind().is_string() {
            return Err(HillviewError::Type(format!(
                "Column {} of kind {} is not a string column",
                self.name(),
                self.kind()
            )));
        }
        Ok(match self.value(row) {
            Value::String(s) => Some(s),
            _ => None,
        })
    }

    /// Numeric projection used uniformly by sketches. Missing rows map to
    /// NaN; string-like columns need a converter.
    fn as_double(&self, row: usize, converter: Option<&dyn StringConverter>) -> Result<f64> {
        match self.value(row) {
            Value::Missing => Ok(f64::NAN),
            Value::String(s) => match converter {
                Some(c) => Ok(c.as_double(&s)),
                None => Err(HillviewError::Config(format!(
                    "Column {} of kind {} needs a string converter",
                    self.name(),
                    self.kind()
                ))),
            },
            v => Ok(v.as_double().unwrap_or(f64::NAN)),
        }
    }

    fn as_string(&self, row: usize) -> Option<String> {
        match self.value(row) {
            Value::Missing => None,
            v => Some(v.to_string()),
        }
    }

    fn check_kind(&self, kind: ContentsKind) -> Result<()> {
        if self.kind() != kind {
            return Err(HillviewError::Type(format!(
                "Column {} has kind {}, not {}",
                self.name(),
                self.kind(),
                kind
            )));
        }
        Ok(())
    }
}

/// An immutable column backed by one contiguous vector.
#[derive(Debug, Clone)]
pub struct ArrayColumn {
    description: ColumnDescription,
    values: ColumnValues,
    missing: Option<DenseBitset>,
}

impl ArrayColumn {
    pub fn new(
        description: ColumnDescription,
        values: ColumnValues,
        missing: Option<DenseBitset>,
    ) -> Result<Self> {
        if !values.matches(description.kind) {
            return Err(HillviewError::Type(format!(
                "Column {} of kind {} cannot hold {} values",
                description.name,
                description.kind,
                values.kind_name()
            )));
        }
        if let Some(m) = &missing {
            if m.len() > values.len() {
                return Err(HillviewError::Format(format!(
                    "Missing mask of column {} has {} bits for {} rows",
                    description.name,
                    m.len(),
                    values.len()
                )));
            }
            if !description.allow_missing && m.count_ones() > 0 {
                return Err(HillviewError::Config(format!(
                    "Column {} does not allow missing values",
                    description.name
                )));
            }
        }
        Ok(ArrayColumn {
            description,
            values,
            missing,
        })
    }

    /// Build a column from a sequence of values.
    pub fn from_values(
        description: ColumnDescription,
        values: impl IntoIterator<Item = Value>,
    ) -> Result<Self> {
        let mut storage = ColumnValues::empty(description.kind);
        let mut missing = DenseBitset::default();
        let mut any_missing = false;
        for v in values {
            let is_missing = v.is_missing();
            storage.push(&v)?;
            missing.push(is_missing);
            any_missing |= is_missing;
        }
        ArrayColumn::new(description, storage, any_missing.then_some(missing))
    }

    pub fn from_ints(name: &str, values: Vec<i32>) -> Self {
        ArrayColumn {
            description: ColumnDescription::new(name, ContentsKind::Integer),
            values: ColumnValues::Int(values),
            missing: None,
        }
    }

    pub fn from_doubles(name: &str, values: Vec<f64>) -> Self {
        ArrayColumn {
            description: ColumnDescription::new(name, ContentsKind::Double),
            values: ColumnValues::Double(values),
            missing: None,
        }
    }

    pub fn from_strings(name: &str, values: &[Option<&str>]) -> Self {
        let mut missing = DenseBitset::new(values.len());
        let mut storage = Vec::with_capacity(values.len());
        for (i, v) in values.iter().enumerate() {
            match v {
                Some(s) => storage.push(Arc::from(*s)),
                None => {
                    missing.set(i, true);
                    storage.push(Arc::from(""));
                }
            }
        }
        let any_missing = missing.count_ones() > 0;
        ArrayColumn {
            description: ColumnDescription::new(name, ContentsKind::String),
            values: ColumnValues::String(storage),
            missing: any_missing.then_some(missing),
        }
    }

    /// Same data under a different name.
    pub fn renamed(&self, name: &str) -> Self {
        let mut c = self.clone();
        c.description.name = name.to_string();
        c
    }
}

impl Column for ArrayColumn {
    fn description(&self) -> &ColumnDescription {
        &self.description
    }

    fn size_in_rows(&self) -> usize {
        self.values.len()
    }

    fn is_missing(&self, row: usize) -> bool {
        self.missing.as_ref().is_some_and(|m| m.get(row))
    }

    fn value(&self, row: usize) -> Value {
        if self.is_missing(row) {
            Value::Missing
        } else {
            self.values.get(row)
        }
    }
}
