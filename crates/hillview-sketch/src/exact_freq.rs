//! Exact counts for a fixed list of candidate rows, typically the output
//! of a heavy-hitters pass.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use hillview_dataset::api::Sketch;
use hillview_table::row_snapshot::{RowSnapshot, RowSnapshotMap, VirtualRowSnapshot};
use hillview_table::schema::Schema;
use hillview_table::table::Table;
use hillview_types::error::{HillviewError, Result};

use crate::freq_k::FreqKList;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExactFreqSketch {
    schema: Arc<Schema>,
    candidates: Vec<RowSnapshot>,
}

impl ExactFreqSketch {
    pub fn new(schema: Schema, candidates: Vec<RowSnapshot>) -> Self {
        ExactFreqSketch {
            schema: Arc::new(schema),
            candidates,
        }
    }

    pub fn from_list(schema: Schema, list: &FreqKList) -> Self {
        Self::new(schema, list.entries.iter().map(|(r, _)| r.clone()).collect())
    }
}

/// Counts aligned with the sketch's candidate list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExactFreqList {
    pub total_rows: u64,
    pub counts: Vec<(RowSnapshot, u64)>,
}

impl ExactFreqList {
    pub fn count(&self, row: &RowSnapshot) -> Option<u64> {
        self.counts.iter().find(|(r, _)| r == row).map(|(_, c)| *c)
    }

    /// Candidates that occur in at least `fraction` of all rows, by
    /// decreasing count.
    pub fn above(&self, fraction: f64) -> Vec<(RowSnapshot, u64)> {
        let threshold = fraction * self.total_rows as f64;
        let mut list: Vec<_> = self
            .counts
            .iter()
            .filter(|(_, c)| *c as f64 >= threshold)
            .cloned()
            .collect();
        list.sort_by(|a, b| b.1.cmp(&a.1));
        list
    }
}

impl Sketch<Table> for ExactFreqSketch {
    type Output = ExactFreqList;

    fn zero(&self) -> ExactFreqList {
        ExactFreqList {
            total_rows: 0,
            counts: self.candidates.iter().map(|r| (r.clone(), 0)).collect(),
        }
    }

    fn create(&self, data: &Table) -> Result<ExactFreqList> {
        let mut index: RowSnapshotMap<usize> = RowSnapshotMap::new();
        for (i, c) in self.candidates.iter().enumerate() {
            index.insert(c.clone(), i);
        }
        let mut result = self.zero();
        let mut cursor = VirtualRowSnapshot::new(data, self.schema.clone())?;
        for row in data.row_iter() {
            cursor.set_row(row);
            if let Some(&i) = index.get(&cursor) {
                result.counts[i].1 += 1;
            }
        }
        result.total_rows = data.num_rows() as u64;
        Ok(result)
    }

    fn add(&self, left: &ExactFreqList, right: &ExactFreqList) -> Result<ExactFreqList> {
        if left.counts.len() != right.counts.len() {
            return Err(HillviewError::Format(format!(
                "Cannot add exact counts over {} and {} candidates",
                left.counts.len(),
                right.counts.len()
            )));
        }
        Ok(ExactFreqList {
            total_rows: left.total_rows + right.total_rows,
            counts: left
                .counts
                .iter()
                .zip(&right.counts)
                .map(|((r, a), (_, b))| (r.clone(), a + b))
                .collect(),
        })
    }
}
