//! Approximate quantiles from a sorted uniform row sample.
//!
//! Sampling about `5·r²` rows gives every sampled quantile a rank error of
//! roughly `1/r` with high probability.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use hillview_dataset::api::Sketch;
use hillview_table::column::{ArrayColumn, Column};
use hillview_table::membership::MembershipSet;
use hillview_table::record_order::RecordOrder;
use hillview_table::row_snapshot::RowSnapshot;
use hillview_table::schema::Schema;
use hillview_table::table::Table;
use hillview_types::error::{HillviewError, Result};
use hillview_types::value::Value;

const MIN_RESOLUTION: u32 = 100;
const OVERSAMPLING: f64 = 5.0;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SampleQuantileSketch {
    order: RecordOrder,
    rate: f64,
    seed: u64,
}

impl SampleQuantileSketch {
    /// `resolution` is floored at 100; `data_size` is the (estimated) row
    /// count of the whole dataset.
    pub fn new(order: RecordOrder, resolution: u32, data_size: u64, seed: u64) -> Result<Self> {
        if order.orientations().is_empty() {
            return Err(HillviewError::Config(
                "Quantiles need at least one sort column".to_string(),
            ));
        }
        let n = resolution.max(MIN_RESOLUTION) as f64;
        let rate = if data_size == 0 {
            1.0
        } else {
            (OVERSAMPLING * n * n / data_size as f64).min(1.0)
        };
        Ok(SampleQuantileSketch { order, rate, seed })
    }

    pub fn sampling_rate(&self) -> f64 {
        self.rate
    }
}

/// A sorted sample over the ordered columns.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "SampleRows", into = "SampleRows")]
pub struct SampleList {
    pub table: Table,
}

impl SampleList {
    pub fn len(&self) -> usize {
        self.table.num_rows()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn row(&self, index: usize) -> Result<RowSnapshot> {
        RowSnapshot::from_table(&self.table, index, self.table.schema().clone())
    }

    /// The sampled row at quantile `q` in `[0, 1]`.
    pub fn quantile(&self, q: f64) -> Result<Option<RowSnapshot>> {
        if self.is_empty() {
            return Ok(None);
        }
        let index = ((q.clamp(0.0, 1.0) * self.len() as f64) as usize).min(self.len() - 1);
        self.row(index).map(Some)
    }

    /// Left boundaries of `buckets` equal-population buckets.
    pub fn left_boundaries(&self, buckets: usize) -> Result<Vec<RowSnapshot>> {
        if self.is_empty() || buckets == 0 {
            return Ok(Vec::new());
        }
        (0..buckets)
            .map(|i| self.row(i * self.len() / buckets))
            .collect()
    }
}

/// Column-major wire form of a [`SampleList`].
#[derive(Serialize, Deserialize)]
struct SampleRows {
    schema: Schema,
    columns: Vec<Vec<Value>>,
}

impl From<SampleList> for SampleRows {
    fn from(list: SampleList) -> Self {
        let rows: Vec<usize> = list.table.row_iter().collect();
        SampleRows {
            schema: (**list.table.schema()).clone(),
            columns: list
                .table
                .columns()
                .iter()
                .map(|c| rows.iter().map(|&r| c.value(r)).collect())
                .collect(),
        }
    }
}

impl TryFrom<SampleRows> for SampleList {
    type Error = HillviewError;

    fn try_from(rows: SampleRows) -> Result<Self> {
        let table = build_table(&rows.schema, rows.columns)?;
        Ok(SampleList { table })
    }
}

fn build_table(schema: &Schema, columns: Vec<Vec<Value>>) -> Result<Table> {
    if columns.len() != schema.len() {
        return Err(HillviewError::Format(format!(
            "{} columns for a schema of {}",
            columns.len(),
            schema.len()
        )));
    }
    let size = columns.first().map_or(0, |c| c.len());
    let columns = schema
        .columns()
        .iter()
        .zip(columns)
        .map(|(d, values)| {
            Ok(Arc::new(ArrayColumn::from_values(d.clone(), values)?) as Arc<dyn Column>)
        })
        .collect::<Result<Vec<_>>>()?;
    Table::new(columns, MembershipSet::full(size))
}

impl Sketch<Table> for SampleQuantileSketch {
    type Output = SampleList;

    fn zero(&self) -> SampleList {
        let schema = self.order.schema().unwrap_or_default();
        let columns = vec![Vec::new(); schema.len()];
        let table = build_table(&schema, columns).unwrap_or_else(|_| Table::empty());
        SampleList { table }
    }

    fn create(&self, data: &Table) -> Result<SampleList> {
        let sample = data.sample(self.rate, self.seed);
        let table = sample.compress(&self.order.schema()?, Some(&self.order))?;
        Ok(SampleList { table })
    }

    /// Merges the two sorted samples without re-sorting.
    fn add(&self, left: &SampleList, right: &SampleList) -> Result<SampleList> {
        if left.is_empty() {
            return Ok(right.clone());
        }
        if right.is_empty() {
            return Ok(left.clone());
        }
        if left.table.schema() != right.table.schema() {
            return Err(HillviewError::Format(
                "Cannot merge samples with different schemas".to_string(),
            ));
        }
        let (l, r) = (left.table.num_rows(), right.table.num_rows());
        let mut take_left = Vec::with_capacity(l + r);
        {
            let cmp = self.order.cross_comparator(&left.table, &right.table)?;
            let (mut i, mut j) = (0, 0);
            while i < l || j < r {
                let from_left = j == r || (i < l && cmp(i, j) != std::cmp::Ordering::Greater);
                take_left.push(from_left);
                if from_left {
                    i += 1;
                } else {
                    j += 1;
                }
            }
        }
        let columns = left
            .table
            .columns()
            .iter()
            .zip(right.table.columns())
            .map(|(lc, rc)| {
                let (mut i, mut j) = (0, 0);
                take_left
                    .iter()
                    .map(|&from_left| {
                        if from_left {
                            i += 1;
                            lc.value(i - 1)
                        } else {
                            j += 1;
                            rc.value(j - 1)
                        }
                    })
                    .collect::<Vec<_>>()
            })
            .collect();
        Ok(SampleList {
            table: build_table(left.table.schema(), columns)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hillview_types::kind::ContentsKind;
    use hillview_table::schema::ColumnDescription;

    fn table(n: i32) -> Table {
        // A permutation of 0..n.
        let values: Vec<i32> = (0..n).map(|i| (i * 7919) % n).collect();
        Table::from_columns(vec![Arc::new(ArrayColumn::from_ints("x", values)) as Arc<dyn Column>])
            .unwrap()
    }

    fn order() -> RecordOrder {
        let mut o = RecordOrder::new();
        o.append(ColumnDescription::new("x", ContentsKind::Integer), true);
        o
    }

    fn int(row: &RowSnapshot) -> i32 {
        match row.values()[0] {
            Value::Int(v) => v,
            _ => panic!("not an int"),
        }
    }

    #[test]
    fn test_rate() {
        let s = SampleQuantileSketch::new(order(), 10, 1_000_000, 0).unwrap();
        assert!((s.sampling_rate() - 0.05).abs() < 1e-12);
        let s = SampleQuantileSketch::new(order(), 10, 1_000, 0).unwrap();
        assert_eq!(s.sampling_rate(), 1.0);
        assert!(SampleQuantileSketch::new(RecordOrder::new(), 10, 10, 0).is_err());
    }

    #[test]
    fn test_merge_keeps_order_and_quantiles() {
        let t = table(100_000);
        let sketch = SampleQuantileSketch::new(order(), 100, 100_000, 42).unwrap();
        let a = sketch.create(&t.filter(|r| r % 2 == 0)).unwrap();
        let b = sketch.create(&t.filter(|r| r % 2 == 1)).unwrap();
        let merged = sketch.add(&a, &b).unwrap();
        assert_eq!(merged.len(), a.len() + b.len());
        let values: Vec<i32> = (0..merged.len())
            .map(|i| int(&merged.row(i).unwrap()))
            .collect();
        assert!(values.windows(2).all(|w| w[0] <= w[1]));

        let median = int(&merged.quantile(0.5).unwrap().unwrap());
        assert!((median - 50_000).abs() < 2_000, "median {}", median);
        let bounds = merged.left_boundaries(4).unwrap();
        assert_eq!(bounds.len(), 4);
        assert!((int(&bounds[1]) - 25_000).abs() < 2_000);
    }

    #[test]
    fn test_zero_is_identity() {
        let t = table(500);
        let sketch = SampleQuantileSketch::new(order(), 100, 500, 1).unwrap();
        let x = sketch.create(&t).unwrap();
        assert_eq!(x.len(), 500);
        let z = sketch.add(&sketch.zero(), &x).unwrap();
        assert_eq!(z.len(), 500);
        assert_eq!(int(&z.quantile(0.0).unwrap().unwrap()), 0);
        assert_eq!(int(&z.quantile(1.0).unwrap().unwrap()), 499);
        assert!(sketch.zero().quantile(0.5).unwrap().is_none());
    }

    #[test]
    fn test_wire_form() {
        let t = table(50);
        let sketch = SampleQuantileSketch::new(order(), 100, 50, 1).unwrap();
        let x = sketch.create(&t).unwrap();
        let bytes = bincode::serialize(&x).unwrap();
        let back: SampleList = bincode::deserialize(&bytes).unwrap();
        assert_eq!(back.len(), 50);
        assert_eq!(back.row(7).unwrap(), x.row(7).unwrap());
    }
}
