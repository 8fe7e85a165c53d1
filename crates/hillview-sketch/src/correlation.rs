//! Correlation sketches over Integer and Double columns.

use std::borrow::Cow;

use serde::{Deserialize, Serialize};
use tracing::debug;

use hillview_dataset::api::Sketch;
use hillview_table::column::Column;
use hillview_table::table::Table;
use hillview_types::error::{HillviewError, Result};

use crate::corr_matrix::CorrMatrix;

/// Rows sampled per column by the PCA sketch.
const ROWS_PER_COLUMN: f64 = 10_000.0;

pub(crate) fn numeric_columns<'a>(
    table: &'a Table,
    names: &[String],
    sketch: &str,
) -> Result<Vec<&'a std::sync::Arc<dyn Column>>> {
    names
        .iter()
        .map(|name| {
            let column = table.column(name)?;
            if !column.kind().is_numeric() {
                return Err(HillviewError::Config(format!(
                    "{} requires Integer or Double columns; {} is {}",
                    sketch,
                    name,
                    column.kind()
                )));
            }
            Ok(column)
        })
        .collect()
}

fn sampled(table: &Table, rate: f64, seed: u64) -> Cow<'_, Table> {
    if rate >= 1.0 {
        Cow::Borrowed(table)
    } else {
        Cow::Owned(table.sample(rate, seed))
    }
}

/// Centered correlations for PCA. Products and means are averaged over
/// the rows where the values involved are present; partitions combine by
/// weighting each average with its row count.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FullCorrelationSketch {
    columns: Vec<String>,
    rate: f64,
    seed: u64,
}

impl FullCorrelationSketch {
    pub fn new(columns: Vec<String>) -> Self {
        FullCorrelationSketch {
            columns,
            rate: 1.0,
            seed: 0,
        }
    }

    /// Samples about 10000 rows per column out of `total_rows`.
    pub fn with_sampling(columns: Vec<String>, total_rows: u64, seed: u64) -> Self {
        let rate = if total_rows == 0 {
            1.0
        } else {
            (ROWS_PER_COLUMN * columns.len() as f64 / total_rows as f64).min(1.0)
        };
        FullCorrelationSketch {
            columns,
            rate,
            seed,
        }
    }

    pub fn sampling_rate(&self) -> f64 {
        self.rate
    }
}

impl Sketch<Table> for FullCorrelationSketch {
    type Output = CorrMatrix;

    fn zero(&self) -> CorrMatrix {
        CorrMatrix::new(self.columns.clone())
    }

    fn create(&self, data: &Table) -> Result<CorrMatrix> {
        let columns = numeric_columns(data, &self.columns, "Correlation sketch")?;
        let table = sampled(data, self.rate, self.seed);
        let n = columns.len();
        let mut sums = vec![0.0; n];
        let mut products = vec![vec![0.0; n]; n];
        let mut counts = vec![vec![0u64; n]; n];
        let mut values = vec![0.0; n];
        let mut rows = 0u64;
        for row in table.row_iter() {
            rows += 1;
            for (v, c) in values.iter_mut().zip(&columns) {
                *v = c.as_double(row, None)?;
            }
            for i in 0..n {
                if values[i].is_nan() {
                    continue;
                }
                sums[i] += values[i];
                for j in i..n {
                    if !values[j].is_nan() {
                        products[i][j] += values[i] * values[j];
                        counts[i][j] += 1;
                    }
                }
            }
        }
        let mut result = self.zero();
        result.count = rows;
        for i in 0..n {
            if counts[i][i] > 0 {
                result.means[i] = sums[i] / counts[i][i] as f64;
            }
            for j in i..n {
                if counts[i][j] > 0 {
                    result.put(i, j, products[i][j] / counts[i][j] as f64);
                }
                result.set_non_missing(i, j, counts[i][j] as f64);
            }
        }
        debug!("Correlation over {} of {} rows", rows, data.num_rows());
        Ok(result)
    }

    fn add(&self, left: &CorrMatrix, right: &CorrMatrix) -> Result<CorrMatrix> {
        let n = self.columns.len();
        let mut result = self.zero();
        for i in 0..n {
            let (li, ri) = (left.non_missing(i, i), right.non_missing(i, i));
            if li + ri > 0.0 {
                let alpha = li / (li + ri);
                result.means[i] = alpha * left.means[i] + (1.0 - alpha) * right.means[i];
            }
            for j in i..n {
                let (l, r) = (left.non_missing(i, j), right.non_missing(i, j));
                if l + r > 0.0 {
                    let alpha = l / (l + r);
                    result.put(i, j, alpha * left.get(i, j) + (1.0 - alpha) * right.get(i, j));
                }
                result.set_non_missing(i, j, l + r);
            }
        }
        result.count = left.count + right.count;
        Ok(result)
    }
}

/// Raw sums of products over a seeded row sample; missing values count
/// as zero. Correlations derived from the result are uncentered.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SampleCorrelationSketch {
    columns: Vec<String>,
    rate: f64,
    seed: u64,
}

impl SampleCorrelationSketch {
    pub fn new(columns: Vec<String>, rate: f64, seed: u64) -> Result<Self> {
        if !(rate > 0.0 && rate <= 1.0) {
            return Err(HillviewError::Config(format!(
                "Sampling rate must be in (0, 1], got {}",
                rate
            )));
        }
        Ok(SampleCorrelationSketch {
            columns,
            rate,
            seed,
        })
    }
}

impl Sketch<Table> for SampleCorrelationSketch {
    type Output = CorrMatrix;

    fn zero(&self) -> CorrMatrix {
        CorrMatrix::new(self.columns.clone())
    }

    fn create(&self, data: &Table) -> Result<CorrMatrix> {
        let columns = numeric_columns(data, &self.columns, "Correlation sketch")?;
        let table = sampled(data, self.rate, self.seed);
        let mut result = self.zero();
        let mut values = vec![0.0; columns.len()];
        for row in table.row_iter() {
            for (v, c) in values.iter_mut().zip(&columns) {
                let x = c.as_double(row, None)?;
                *v = if x.is_nan() { 0.0 } else { x };
            }
            for i in 0..values.len() {
                for j in i..values.len() {
                    result.update(i, j, values[i] * values[j]);
                }
            }
        }
        result.count = table.num_rows() as u64;
        Ok(result)
    }

    fn add(&self, left: &CorrMatrix, right: &CorrMatrix) -> Result<CorrMatrix> {
        let mut result = left.clone();
        for i in 0..self.columns.len() {
            for j in i..self.columns.len() {
                result.update(i, j, right.get(i, j));
            }
        }
        result.count += right.count;
        Ok(result)
    }
}
