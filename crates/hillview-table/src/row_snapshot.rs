//! Rows as hashable, comparable keys.
//!
//! [`RowSnapshot`] owns a copy of a row's values; [`VirtualRowSnapshot`]
//! is a cursor over a live table that reads values on demand. Both hash
//! and compare purely over the schema's values, so a virtual row can
//! probe a map keyed by snapshots.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use twox_hash::XxHash64;

use hillview_types::error::{HillviewError, Result};
use hillview_types::value::Value;

use crate::column::Column;
use crate::record_order::RecordOrder;
use crate::schema::Schema;
use crate::table::Table;

const ROW_HASH_SEED: u64 = 0x6869_6c6c_7669_6577;

/// A row projected through a schema.
pub trait RowView {
    fn schema(&self) -> &Schema;

    /// Value of the `index`-th schema column.
    fn value_at(&self, index: usize) -> Value;

    fn value(&self, name: &str) -> Result<Value> {
        self.schema()
            .position(name)
            .map(|i| self.value_at(i))
            .ok_or_else(|| HillviewError::MissingColumn(name.to_string()))
    }

    fn compute_hash(&self) -> u64 {
        let mut hasher = XxHash64::with_seed(ROW_HASH_SEED);
        for i in 0..self.schema().len() {
            self.value_at(i).hash(&mut hasher);
        }
        hasher.finish()
    }

    fn compare_for_equality(&self, other: &dyn RowView) -> bool {
        self.schema() == other.schema()
            && (0..self.schema().len()).all(|i| self.value_at(i) == other.value_at(i))
    }

    /// Compare under `order`; columns absent from either row compare
    /// as missing.
    fn compare_to(&self, other: &dyn RowView, order: &RecordOrder) -> Ordering {
        for o in order.orientations() {
            let a = self.value(&o.column.name).unwrap_or(Value::Missing);
            let b = other.value(&o.column.name).unwrap_or(Value::Missing);
            let ord = if o.ascending { a.cmp(&b) } else { b.cmp(&a) };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    }
}

/// An owned copy of one row's values.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RowSnapshot {
    schema: Arc<Schema>,
    values: Vec<Value>,
}

impl RowSnapshot {
    pub fn new(schema: Arc<Schema>, values: Vec<Value>) -> Result<Self> {
        if values.len() != schema.len() {
            return Err(HillviewError::Format(format!(
                "Row has {} values for {} columns",
                values.len(),
                schema.len()
            )));
        }
        Ok(RowSnapshot { schema, values })
    }

    pub fn from_table(table: &Table, row: usize, schema: Arc<Schema>) -> Result<Self> {
        let values = schema
            .columns()
            .iter()
            .map(|d| Ok(table.column(&d.name)?.value(row)))
            .collect::<Result<Vec<_>>>()?;
        Ok(RowSnapshot { schema, values })
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }
}

impl RowView for RowSnapshot {
    fn schema(&self) -> &Schema {
        &self.schema
    }

    fn value_at(&self, index: usize) -> Value {
        self.values[index].clone()
    }
}

impl PartialEq for RowSnapshot {
    fn eq(&self, other: &Self) -> bool {
        self.compare_for_equality(other)
    }
}

impl Eq for RowSnapshot {}

impl Hash for RowSnapshot {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.compute_hash());
    }
}

/// A movable cursor over the rows of a table.
///
/// Cheap to re-point, but the values it reports change with the cursor;
/// call [`materialize`](Self::materialize) before storing it.
#[derive(Debug)]
pub struct VirtualRowSnapshot<'a> {
    schema: Arc<Schema>,
    columns: Vec<&'a Arc<dyn Column>>,
    row: usize,
}

impl<'a> VirtualRowSnapshot<'a> {
    pub fn new(table: &'a Table, schema: Arc<Schema>) -> Result<Self> {
        let columns = schema
            .columns()
            .iter()
            .map(|d| table.column(&d.name))
            .collect::<Result<Vec<_>>>()?;
        Ok(VirtualRowSnapshot {
            schema,
            columns,
            row: 0,
        })
    }

    pub fn set_row(&mut self, row: usize) {
        self.row = row;
    }

    pub fn row(&self) -> usize {
        self.row
    }

    pub fn materialize(&self) -> RowSnapshot {
        RowSnapshot {
            schema: self.schema.clone(),
            values: self.columns.iter().map(|c| c.value(self.row)).collect(),
        }
    }
}

impl RowView for VirtualRowSnapshot<'_> {
    fn schema(&self) -> &Schema {
        &self.schema
    }

    fn value_at(&self, index: usize) -> Value {
        self.columns[index].value(self.row)
    }
}

/// Map keyed by row snapshots that can also be probed with any
/// [`RowView`], including a virtual cursor.
#[derive(Debug, Clone)]
pub struct RowSnapshotMap<V> {
    buckets: HashMap<u64, Vec<(RowSnapshot, V)>>,
    len: usize,
}

impl<V> Default for RowSnapshotMap<V> {
    fn default() -> Self {
        RowSnapshotMap {
            buckets: HashMap::new(),
            len: 0,
        }
    }
}

impl<V> RowSnapshotMap<V> {
    pub fn new() -> Self {
        RowSnapshotMap::default()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn get(&self, key: &dyn RowView) -> Option<&V> {
        self.buckets
            .get(&key.compute_hash())?
            .iter()
            .find(|(k, _)| k.compare_for_equality(key))
            .map(|(_, v)| v)
    }

    pub fn get_mut(&mut self, key: &dyn RowView) -> Option<&mut V> {
        self.buckets
            .get_mut(&key.compute_hash())?
            .iter_mut()
            .find(|(k, _)| k.compare_for_equality(key))
            .map(|(_, v)| v)
    }

    pub fn contains_key(&self, key: &dyn RowView) -> bool {
        self.get(key).is_some()
    }

    /// Insert, returning the previous value for an equal key.
    pub fn insert(&mut self, key: RowSnapshot, value: V) -> Option<V> {
        let bucket = self.buckets.entry(key.compute_hash()).or_default();
        if let Some(slot) = bucket.iter_mut().find(|(k, _)| *k == key) {
            return Some(std::mem::replace(&mut slot.1, value));
        }
        bucket.push((key, value));
        self.len += 1;
        None
    }

    /// Value for `key`, inserting `make()` under a materialised copy of
    /// it when absent.
    pub fn get_or_insert_with(
        &mut self,
        key: &dyn RowView,
        materialize: impl FnOnce() -> RowSnapshot,
        make: impl FnOnce() -> V,
    ) -> &mut V {
        let bucket = self.buckets.entry(key.compute_hash()).or_default();
        let index = match bucket.iter().position(|(k, _)| k.compare_for_equality(key)) {
            Some(i) => i,
            None => {
                bucket.push((materialize(), make()));
                self.len += 1;
                bucket.len() - 1
            }
        };
        &mut bucket[index].1
    }

    pub fn remove(&mut self, key: &dyn RowView) -> Option<V> {
        let hash = key.compute_hash();
        let bucket = self.buckets.get_mut(&hash)?;
        let index = bucket.iter().position(|(k, _)| k.compare_for_equality(key))?;
        let (_, v) = bucket.swap_remove(index);
        if bucket.is_empty() {
            self.buckets.remove(&hash);
        }
        self.len -= 1;
        Some(v)
    }

    pub fn retain(&mut self, mut keep: impl FnMut(&RowSnapshot, &mut V) -> bool) {
        let mut removed = 0;
        self.buckets.retain(|_, bucket| {
            let before = bucket.len();
            bucket.retain_mut(|(k, v)| keep(k, v));
            removed += before - bucket.len();
            !bucket.is_empty()
        });
        self.len -= removed;
    }

    pub fn iter(&self) -> impl Iterator<Item = (&RowSnapshot, &V)> {
        self.buckets
            .values()
            .flat_map(|b| b.iter().map(|(k, v)| (k, v)))
    }

    pub fn into_entries(self) -> impl Iterator<Item = (RowSnapshot, V)> {
        self.buckets.into_values().flatten()
    }
}
