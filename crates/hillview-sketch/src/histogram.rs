//! One-dimensional histograms.

use std::borrow::Cow;

use serde::{Deserialize, Serialize};
use tracing::debug;

use hillview_dataset::api::Sketch;
use hillview_table::column::Column;
use hillview_table::table::Table;
use hillview_types::error::{HillviewError, Result};

use crate::decomposition::{IntervalDecomposition, NumericIntervalDecomposition};

/// `count` equal-width buckets over `[min, max]`; `max` falls in the last
/// bucket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NumericBuckets {
    min: f64,
    max: f64,
    count: usize,
}

impl NumericBuckets {
    pub fn new(min: f64, max: f64, count: usize) -> Result<Self> {
        if !(min.is_finite() && max.is_finite() && max >= min) || count == 0 {
            return Err(HillviewError::Config(format!(
                "Bad numeric buckets: {} over [{}, {}]",
                count, min, max
            )));
        }
        Ok(NumericBuckets { min, max, count })
    }

    pub fn index_of(&self, value: f64) -> Option<usize> {
        if !(value >= self.min && value <= self.max) {
            return None;
        }
        if self.max == self.min {
            return Some(0);
        }
        let index = ((value - self.min) / (self.max - self.min) * self.count as f64) as usize;
        Some(index.min(self.count - 1))
    }
}

/// Buckets starting at sorted string boundaries. Without `max` the last
/// bucket is unbounded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StringBuckets {
    left_boundaries: Vec<String>,
    max: Option<String>,
}

impl StringBuckets {
    pub fn new(left_boundaries: Vec<String>, max: Option<String>) -> Result<Self> {
        if left_boundaries.is_empty() {
            return Err(HillviewError::Config("No string buckets".to_string()));
        }
        if left_boundaries.windows(2).any(|w| w[0] >= w[1]) {
            return Err(HillviewError::Config(
                "String bucket boundaries must be strictly increasing".to_string(),
            ));
        }
        if let Some(m) = &max {
            if left_boundaries.last().is_some_and(|l| l > m) {
                return Err(HillviewError::Config(format!(
                    "String bucket maximum {} precedes the last boundary",
                    m
                )));
            }
        }
        Ok(StringBuckets {
            left_boundaries,
            max,
        })
    }

    pub fn index_of(&self, value: &str) -> Option<usize> {
        if self.max.as_deref().is_some_and(|m| value > m) {
            return None;
        }
        self.left_boundaries
            .partition_point(|b| b.as_str() <= value)
            .checked_sub(1)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Buckets {
    Numeric(NumericBuckets),
    Strings(StringBuckets),
    /// Buckets made of whole leaves of a quantized range.
    Dyadic(NumericIntervalDecomposition),
}

impl Buckets {
    pub fn bucket_count(&self) -> usize {
        match self {
            Buckets::Numeric(b) => b.count,
            Buckets::Strings(b) => b.left_boundaries.len(),
            Buckets::Dyadic(d) => d.bucket_count(),
        }
    }

    fn check_column(&self, column: &dyn Column) -> Result<()> {
        let ok = match self {
            Buckets::Strings(_) => column.kind().is_string(),
            Buckets::Numeric(_) | Buckets::Dyadic(_) => column.kind().is_double_convertible(),
        };
        if !ok {
            return Err(HillviewError::Config(format!(
                "Column {} of kind {} does not fit these buckets",
                column.name(),
                column.kind()
            )));
        }
        Ok(())
    }

    /// Bucket of a present value, or `None` when out of range.
    fn index_of(&self, column: &dyn Column, row: usize) -> Result<Option<usize>> {
        Ok(match self {
            Buckets::Numeric(b) => b.index_of(column.as_double(row, None)?),
            Buckets::Dyadic(d) => d.bucket_of(column.as_double(row, None)?),
            Buckets::Strings(b) => column
                .get_string(row)?
                .and_then(|s| b.index_of(&s)),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Histogram {
    pub buckets: Vec<u64>,
    pub missing: u64,
    pub out_of_range: u64,
}

impl Histogram {
    pub fn new(bucket_count: usize) -> Self {
        Histogram {
            buckets: vec![0; bucket_count],
            missing: 0,
            out_of_range: 0,
        }
    }

    /// Rows counted in some bucket.
    pub fn total(&self) -> u64 {
        self.buckets.iter().sum()
    }

    /// Cumulative bucket counts.
    pub fn integrate(&self) -> Vec<u64> {
        self.buckets
            .iter()
            .scan(0u64, |acc, c| {
                *acc += c;
                Some(*acc)
            })
            .collect()
    }

    fn rescaled(mut self, rate: f64) -> Self {
        let scale = |c: &mut u64| *c = (*c as f64 / rate).round() as u64;
        self.buckets.iter_mut().for_each(scale);
        scale(&mut self.missing);
        scale(&mut self.out_of_range);
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistogramSketch {
    column: String,
    buckets: Buckets,
    rate: f64,
    seed: u64,
}

impl HistogramSketch {
    pub fn new(column: impl Into<String>, buckets: Buckets) -> Self {
        HistogramSketch {
            column: column.into(),
            buckets,
            rate: 1.0,
            seed: 0,
        }
    }

    /// Count a seeded Bernoulli sample of the rows and scale the counts
    /// back up by `1/rate`.
    pub fn with_sampling(mut self, rate: f64, seed: u64) -> Result<Self> {
        if !(rate > 0.0 && rate <= 1.0) {
            return Err(HillviewError::Config(format!(
                "Sampling rate must be in (0, 1], got {}",
                rate
            )));
        }
        self.rate = rate;
        self.seed = seed;
        Ok(self)
    }

    pub fn buckets(&self) -> &Buckets {
        &self.buckets
    }
}

impl Sketch<Table> for HistogramSketch {
    type Output = Histogram;

    fn zero(&self) -> Histogram {
        Histogram::new(self.buckets.bucket_count())
    }

    fn create(&self, data: &Table) -> Result<Histogram> {
        let column = data.column(&self.column)?;
        self.buckets.check_column(column.as_ref())?;
        let table = if self.rate < 1.0 {
            Cow::Owned(data.sample(self.rate, self.seed))
        } else {
            Cow::Borrowed(data)
        };
        let mut result = self.zero();
        for row in table.row_iter() {
            if column.is_missing(row) {
                result.missing += 1;
                continue;
            }
            match self.buckets.index_of(column.as_ref(), row)? {
                Some(i) => result.buckets[i] += 1,
                None => result.out_of_range += 1,
            }
        }
        debug!(
            "Histogram of {} over {} rows",
            self.column,
            table.num_rows()
        );
        Ok(if self.rate < 1.0 {
            result.rescaled(self.rate)
        } else {
            result
        })
    }

    fn add(&self, left: &Histogram, right: &Histogram) -> Result<Histogram> {
        if left.buckets.len() != right.buckets.len() {
            return Err(HillviewError::Format(format!(
                "Cannot add histograms with {} and {} buckets",
                left.buckets.len(),
                right.buckets.len()
            )));
        }
        Ok(Histogram {
            buckets: left
                .buckets
                .iter()
                .zip(&right.buckets)
                .map(|(a, b)| a + b)
                .collect(),
            missing: left.missing + right.missing,
            out_of_range: left.out_of_range + right.out_of_range,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hillview_table::column::ArrayColumn;
    use hillview_table::schema::ColumnDescription;
    use hillview_types::kind::ContentsKind;
    use hillview_types::value::Value;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    fn numbers() -> Table {
        let values = (0..100).map(|i| {
            if i % 25 == 0 {
                Value::Missing
            } else {
                Value::Double(i as f64)
            }
        });
        let column =
            ArrayColumn::from_values(ColumnDescription::new("v", ContentsKind::Double), values)
                .unwrap();
        Table::from_columns(vec![Arc::new(column) as Arc<dyn Column>]).unwrap()
    }

    #[test]
    fn test_numeric_histogram() {
        let t = numbers();
        let sketch = HistogramSketch::new("v", Buckets::Numeric(NumericBuckets::new(10.0, 49.0, 4).unwrap()));
        let h = sketch.create(&t).unwrap();
        assert_eq!(h.missing, 4);
        // 10..=49 minus the missing 25.
        assert_eq!(h.total(), 39);
        assert_eq!(h.out_of_range, 100 - 4 - 39);
        assert_eq!(h.buckets, vec![10, 9, 10, 10]);
        assert_eq!(h.integrate(), vec![10, 19, 29, 39]);

        let a = sketch.create(&t.filter(|r| r % 2 == 0)).unwrap();
        let b = sketch.create(&t.filter(|r| r % 2 == 1)).unwrap();
        assert_eq!(sketch.add(&a, &b).unwrap(), h);
        assert_eq!(sketch.add(&sketch.zero(), &h).unwrap(), h);
    }

    #[test]
    fn test_string_histogram() {
        let values = [Some("apple"), Some("banana"), None, Some("cherry"), Some("zebra"), Some("0")];
        let t = Table::from_columns(vec![
            Arc::new(ArrayColumn::from_strings("s", &values)) as Arc<dyn Column>
        ])
        .unwrap();
        let buckets = StringBuckets::new(vec!["a".into(), "c".into()], Some("m".into())).unwrap();
        let h = HistogramSketch::new("s", Buckets::Strings(buckets)).create(&t).unwrap();
        assert_eq!(h.buckets, vec![2, 1]);
        assert_eq!(h.missing, 1);
        assert_eq!(h.out_of_range, 2);

        let open = StringBuckets::new(vec!["a".into(), "c".into()], None).unwrap();
        let h = HistogramSketch::new("s", Buckets::Strings(open)).create(&t).unwrap();
        assert_eq!(h.buckets, vec![2, 2]);

        assert!(StringBuckets::new(vec!["c".into(), "a".into()], None).is_err());
        let numeric = HistogramSketch::new("s", Buckets::Numeric(NumericBuckets::new(0.0, 1.0, 2).unwrap()));
        assert!(matches!(numeric.create(&t), Err(HillviewError::Config(_))));
    }

    #[test]
    fn test_dyadic_histogram() {
        let t = numbers();
        let d = NumericIntervalDecomposition::new(0.0, 99.0, 3, 0.0, 100.0, 5.0).unwrap();
        let h = HistogramSketch::new("v", Buckets::Dyadic(d.clone())).create(&t).unwrap();
        assert_eq!(h.total() + h.missing + h.out_of_range, 100);
        assert_eq!(h.out_of_range, 0);
        for b in 0..3 {
            let (l, r) = d.bucket_range(b, false);
            let expected = (0..100)
                .filter(|i| i % 25 != 0)
                .filter(|&i| (l * 5..r * 5).contains(&i))
                .count() as u64;
            assert_eq!(h.buckets[b], expected);
        }
    }

    #[test]
    fn test_sampled_histogram_rescales() {
        let t = Table::from_columns(vec![Arc::new(ArrayColumn::from_ints(
            "x",
            (0..20_000).map(|i| i % 10).collect(),
        )) as Arc<dyn Column>])
        .unwrap();
        let sketch = HistogramSketch::new("x", Buckets::Numeric(NumericBuckets::new(0.0, 10.0, 2).unwrap()))
            .with_sampling(0.25, 4)
            .unwrap();
        let h = sketch.create(&t).unwrap();
        for c in &h.buckets {
            assert!((*c as f64 - 10_000.0).abs() < 800.0, "count {}", c);
        }
        assert!(sketch.clone().with_sampling(0.0, 1).is_err());
    }
}
