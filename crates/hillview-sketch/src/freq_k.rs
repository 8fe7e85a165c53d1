//! Misra-Gries heavy hitters.
//!
//! Each partition keeps at most `K` counters while scanning; when a new
//! row arrives with every counter taken, all counters are decremented and
//! zeros are evicted. Decrements are applied lazily: they accumulate in
//! `dec` until they reach the smallest stored count.
//!
//! Partition summaries merge with the mergeable-summaries rule of
//! Agarwal et al., "Mergeable Summaries", PODS 2012: add the counters,
//! subtract the `(K+1)`-th largest combined count, and keep what stays
//! positive. For a list over `N` rows whose counts sum to `S`, every
//! listed row's true frequency lies in `[count, count + (N-S)/(K+1)]`.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use hillview_dataset::api::Sketch;
use hillview_table::row_snapshot::{RowSnapshot, RowSnapshotMap, VirtualRowSnapshot};
use hillview_table::schema::Schema;
use hillview_table::table::Table;
use hillview_types::error::{HillviewError, Result};

/// Multiplier turning the error parameter into a counter budget.
const ALPHA: f64 = 5.0;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FreqKSketch {
    schema: Arc<Schema>,
    max_size: usize,
}

impl FreqKSketch {
    /// Budget of `ceil(5/epsilon)` counters.
    pub fn new(schema: Schema, epsilon: f64) -> Result<Self> {
        if !(epsilon > 0.0 && epsilon <= 1.0) {
            return Err(HillviewError::Config(format!(
                "Heavy hitters epsilon must be in (0, 1], got {}",
                epsilon
            )));
        }
        Self::with_max_size(schema, (ALPHA / epsilon).ceil() as usize)
    }

    pub fn with_max_size(schema: Schema, max_size: usize) -> Result<Self> {
        if max_size == 0 {
            return Err(HillviewError::Config(
                "Heavy hitters need at least one counter".to_string(),
            ));
        }
        if schema.is_empty() {
            return Err(HillviewError::Config(
                "Heavy hitters need at least one column".to_string(),
            ));
        }
        Ok(FreqKSketch {
            schema: Arc::new(schema),
            max_size,
        })
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }
}

/// The retained counters of a Misra-Gries summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FreqKList {
    /// Rows summarised, including rows without a counter.
    pub total_rows: u64,
    pub max_size: usize,
    /// Retained rows and their lower-bound counts.
    pub entries: Vec<(RowSnapshot, u64)>,
}

impl FreqKList {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn count(&self, row: &RowSnapshot) -> Option<u64> {
        self.entries.iter().find(|(r, _)| r == row).map(|(_, c)| *c)
    }

    /// Largest amount by which any listed count may underestimate the
    /// true frequency.
    pub fn err_bound(&self) -> f64 {
        let retained: u64 = self.entries.iter().map(|(_, c)| c).sum();
        (self.total_rows.saturating_sub(retained)) as f64 / (self.max_size + 1) as f64
    }

    /// Entries by decreasing count; ties keep their stored order.
    pub fn sorted_list(&self) -> Vec<(RowSnapshot, u64)> {
        let mut list = self.entries.clone();
        list.sort_by(|a, b| b.1.cmp(&a.1));
        list
    }

    pub fn top(&self, n: usize) -> Vec<(RowSnapshot, u64)> {
        let mut list = self.sorted_list();
        list.truncate(n);
        list
    }

    /// Rows that may occur in at least `fraction` of all rows.
    pub fn heavy_hitters(&self, fraction: f64) -> Vec<(RowSnapshot, u64)> {
        let threshold = fraction * self.total_rows as f64;
        let err = self.err_bound();
        self.sorted_list()
            .into_iter()
            .filter(|(_, c)| *c as f64 + err >= threshold)
            .collect()
    }

    /// Drop entries whose count is below `threshold`.
    pub fn filter_below(&mut self, threshold: u64) {
        self.entries.retain(|(_, c)| *c >= threshold);
    }
}

impl Sketch<Table> for FreqKSketch {
    type Output = FreqKList;

    fn zero(&self) -> FreqKList {
        FreqKList {
            total_rows: 0,
            max_size: self.max_size,
            entries: Vec::new(),
        }
    }

    fn create(&self, data: &Table) -> Result<FreqKList> {
        let mut counters: RowSnapshotMap<u64> = RowSnapshotMap::new();
        let mut cursor = VirtualRowSnapshot::new(data, self.schema.clone())?;
        // Lower bound on the smallest stored count.
        let mut min: u64 = 0;
        let mut dec: u64 = 0;
        for row in data.row_iter() {
            cursor.set_row(row);
            if let Some(c) = counters.get_mut(&cursor) {
                *c += 1;
            } else if counters.len() < self.max_size {
                counters.insert(cursor.materialize(), 1);
                min = 1;
            } else {
                dec += 1;
                if dec >= min {
                    counters.retain(|_, c| {
                        *c -= dec.min(*c);
                        *c > 0
                    });
                    dec = 0;
                    min = counters.iter().map(|(_, c)| *c).min().unwrap_or(0);
                }
            }
        }
        if dec > 0 {
            counters.retain(|_, c| {
                *c -= dec.min(*c);
                *c > 0
            });
        }
        debug!(
            "Heavy hitters kept {} of {} counters over {} rows",
            counters.len(),
            self.max_size,
            data.num_rows()
        );
        Ok(FreqKList {
            total_rows: data.num_rows() as u64,
            max_size: self.max_size,
            entries: counters.into_entries().collect(),
        })
    }

    fn add(&self, left: &FreqKList, right: &FreqKList) -> Result<FreqKList> {
        let mut index: RowSnapshotMap<usize> = RowSnapshotMap::new();
        let mut merged: Vec<(RowSnapshot, u64)> =
            Vec::with_capacity(left.entries.len() + right.entries.len());
        for (row, count) in left.entries.iter().chain(&right.entries) {
            match index.get(row) {
                Some(&i) => merged[i].1 += count,
                None => {
                    index.insert(row.clone(), merged.len());
                    merged.push((row.clone(), *count));
                }
            }
        }
        merged.sort_by(|a, b| b.1.cmp(&a.1));
        let k = if merged.len() > self.max_size {
            merged[self.max_size].1
        } else {
            0
        };
        merged.truncate(self.max_size);
        let entries = merged
            .into_iter()
            .filter(|(_, c)| *c > k)
            .map(|(r, c)| (r, c - k))
            .collect();
        Ok(FreqKList {
            total_rows: left.total_rows + right.total_rows,
            max_size: self.max_size,
            entries,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hillview_table::column::{ArrayColumn, Column};
    use hillview_types::value::Value;

    fn table(values: Vec<i32>) -> Table {
        Table::from_columns(vec![Arc::new(ArrayColumn::from_ints("x", values)) as Arc<dyn Column>])
            .unwrap()
    }

    fn key(t: &Table, v: i32) -> RowSnapshot {
        RowSnapshot::new(t.schema().clone(), vec![Value::Int(v)]).unwrap()
    }

    /// 40% sevens, the rest spread over many values.
    fn skewed(n: usize, offset: i32) -> Vec<i32> {
        (0..n)
            .map(|i| if i % 5 < 2 { 7 } else { offset + (i as i32 % 997) })
            .collect()
    }

    #[test]
    fn test_heavy_hitter_found() {
        let t = table(skewed(10_000, 1000));
        let sketch = FreqKSketch::with_max_size((**t.schema()).clone(), 10).unwrap();
        let list = sketch.create(&t).unwrap();
        assert!(list.len() <= 10);
        let count = list.count(&key(&t, 7)).unwrap();
        assert!(count <= 4000);
        assert!(count as f64 + list.err_bound() >= 4000.0);
        assert!(list.err_bound() >= 0.0);
        let hh = list.heavy_hitters(0.3);
        assert_eq!(hh.len(), 1);
        assert_eq!(hh[0].0, key(&t, 7));
    }

    #[test]
    fn test_counts_never_exceed_truth() {
        let values: Vec<i32> = (0..5000).map(|i| (i * i % 31) as i32).collect();
        let t = table(values.clone());
        let sketch = FreqKSketch::with_max_size((**t.schema()).clone(), 8).unwrap();
        let list = sketch.create(&t).unwrap();
        for (row, count) in &list.entries {
            let v = match row.values()[0] {
                Value::Int(v) => v,
                _ => unreachable!(),
            };
            let truth = values.iter().filter(|&&x| x == v).count() as u64;
            assert!(*count <= truth);
            assert!(*count as f64 + list.err_bound() >= truth as f64);
        }
    }

    #[test]
    fn test_merge_keeps_heavy_hitter() {
        let a = table(skewed(6_000, 1000));
        let b = table(skewed(4_000, 5000));
        let sketch = FreqKSketch::new((**a.schema()).clone(), 0.5).unwrap();
        assert_eq!(sketch.max_size(), 10);
        let left = sketch.create(&a).unwrap();
        let right = sketch.create(&b).unwrap();
        let merged = sketch.add(&left, &right).unwrap();
        assert_eq!(merged.total_rows, 10_000);
        assert!(merged.len() <= 10);
        let count = merged.count(&key(&a, 7)).unwrap();
        assert!(count <= 4000);
        assert!(count as f64 + merged.err_bound() >= 4000.0);

        let swapped = sketch.add(&right, &left).unwrap();
        assert_eq!(swapped.count(&key(&a, 7)), Some(count));
    }

    #[test]
    fn test_zero_is_identity() {
        let t = table(skewed(1_000, 100));
        let sketch = FreqKSketch::with_max_size((**t.schema()).clone(), 20).unwrap();
        let x = sketch.create(&t).unwrap();
        let sum = sketch.add(&sketch.zero(), &x).unwrap();
        assert_eq!(sum.total_rows, x.total_rows);
        for (row, count) in &x.entries {
            assert_eq!(sum.count(row), Some(*count));
        }
    }

    #[test]
    fn test_exact_when_few_distinct() {
        let t = table(vec![1, 2, 1, 3, 1, 2]);
        let sketch = FreqKSketch::with_max_size((**t.schema()).clone(), 5).unwrap();
        let list = sketch.create(&t).unwrap();
        assert_eq!(list.err_bound(), 0.0);
        let top = list.top(2);
        assert_eq!(top[0], (key(&t, 1), 3));
        assert_eq!(top[1], (key(&t, 2), 2));
        let mut filtered = list.clone();
        filtered.filter_below(2);
        assert_eq!(filtered.len(), 2);
    }

    #[test]
    fn test_bad_parameters() {
        let s = Schema::new();
        assert!(FreqKSketch::with_max_size(s.clone(), 3).is_err());
        let t = table(vec![1]);
        assert!(FreqKSketch::new((**t.schema()).clone(), 0.0).is_err());
    }
}
