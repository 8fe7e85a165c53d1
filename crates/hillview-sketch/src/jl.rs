//! Johnson-Lindenstrauss projection of numeric columns.
//!
//! Each column, viewed as a vector over the rows, is multiplied by a
//! random `low_dim × rows` matrix of ±1 entries; the same matrix is used
//! for every column, so inner products between the projected vectors
//! estimate inner products between the columns.

use std::hash::Hasher;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use twox_hash::XxHash64;

use hillview_dataset::api::Sketch;
use hillview_table::table::Table;
use hillview_types::error::{HillviewError, Result};

use crate::correlation::numeric_columns;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JLSketch {
    columns: Vec<String>,
    low_dim: usize,
    seed: u64,
}

impl JLSketch {
    pub fn new(columns: Vec<String>, low_dim: usize, seed: u64) -> Result<Self> {
        if low_dim == 0 {
            return Err(HillviewError::Config(
                "JL projection dimension must be positive".to_string(),
            ));
        }
        Ok(JLSketch {
            columns,
            low_dim,
            seed,
        })
    }

    /// Partitions hold unrelated rows at the same positions, so the sign
    /// generator is keyed by the partition contents as well as the seed.
    fn partition_seed(&self, data: &Table) -> Result<u64> {
        let mut hasher = XxHash64::with_seed(self.seed);
        hasher.write_u64(data.num_rows() as u64);
        for name in &self.columns {
            let column = data.column(name)?;
            for row in data.row_iter() {
                hasher.write_u64(column.value(row).hash64(self.seed));
            }
        }
        Ok(hasher.finish())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JLProjection {
    pub column_names: Vec<String>,
    pub low_dim: usize,
    /// Rows projected.
    pub high_dim: u64,
    vectors: Vec<Vec<f64>>,
}

impl JLProjection {
    pub fn new(column_names: Vec<String>, low_dim: usize) -> Self {
        let vectors = vec![vec![0.0; low_dim]; column_names.len()];
        JLProjection {
            column_names,
            low_dim,
            high_dim: 0,
            vectors,
        }
    }

    fn vector(&self, column: &str) -> Result<&[f64]> {
        self.column_names
            .iter()
            .position(|c| c == column)
            .map(|i| self.vectors[i].as_slice())
            .ok_or_else(|| HillviewError::MissingColumn(column.to_string()))
    }

    fn check_rows(&self) -> Result<f64> {
        if self.high_dim == 0 {
            return Err(HillviewError::Config(
                "JL projection over zero rows".to_string(),
            ));
        }
        Ok((self.low_dim as u64 * self.high_dim) as f64)
    }

    pub fn norm(&self, column: &str) -> Result<f64> {
        let scale = self.check_rows()?;
        let a = self.vector(column)?;
        Ok((a.iter().map(|x| x * x).sum::<f64>() / scale).sqrt())
    }

    pub fn inner_product(&self, a: &str, b: &str) -> Result<f64> {
        let scale = self.check_rows()?;
        let (a, b) = (self.vector(a)?, self.vector(b)?);
        Ok(a.iter().zip(b).map(|(x, y)| x * y).sum::<f64>() / scale)
    }

    pub fn correlation(&self, a: &str, b: &str) -> Result<f64> {
        Ok(cosine(self.vector(a)?, self.vector(b)?))
    }

    pub fn correlation_matrix(&self) -> Vec<Vec<f64>> {
        self.vectors
            .iter()
            .map(|a| self.vectors.iter().map(|b| cosine(a, b)).collect())
            .collect()
    }
}

fn cosine(a: &[f64], b: &[f64]) -> f64 {
    let (mut ab, mut aa, mut bb) = (0.0, 0.0, 0.0);
    for (x, y) in a.iter().zip(b) {
        ab += x * y;
        aa += x * x;
        bb += y * y;
    }
    if aa == 0.0 || bb == 0.0 {
        0.0
    } else {
        ab / (aa * bb).sqrt()
    }
}

impl Sketch<Table> for JLSketch {
    type Output = JLProjection;

    fn zero(&self) -> JLProjection {
        JLProjection::new(self.columns.clone(), self.low_dim)
    }

    fn create(&self, data: &Table) -> Result<JLProjection> {
        let columns = numeric_columns(data, &self.columns, "JL sketch")?;
        let mut rng = StdRng::seed_from_u64(self.partition_seed(data)?);
        let mut result = self.zero();
        let mut values = vec![0.0; columns.len()];
        for row in data.row_iter() {
            for (v, c) in values.iter_mut().zip(&columns) {
                let x = c.as_double(row, None)?;
                *v = if x.is_nan() { 0.0 } else { x };
            }
            for d in 0..self.low_dim {
                let sign = if rng.gen::<bool>() { 1.0 } else { -1.0 };
                for (vector, v) in result.vectors.iter_mut().zip(&values) {
                    vector[d] += sign * v;
                }
            }
        }
        result.high_dim = data.num_rows() as u64;
        Ok(result)
    }

    fn add(&self, left: &JLProjection, right: &JLProjection) -> Result<JLProjection> {
        let mut result = left.clone();
        for (l, r) in result.vectors.iter_mut().zip(&right.vectors) {
            for (x, y) in l.iter_mut().zip(r) {
                *x += y;
            }
        }
        result.high_dim += right.high_dim;
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hillview_table::column::{ArrayColumn, Column};
    use std::sync::Arc;

    fn table() -> Table {
        let x: Vec<f64> = (0..2000).map(|i| ((i * 37) % 101) as f64 - 50.0).collect();
        let neg: Vec<f64> = x.iter().map(|v| -v).collect();
        let twice: Vec<f64> = x.iter().map(|v| 2.0 * v).collect();
        Table::from_columns(vec![
            Arc::new(ArrayColumn::from_doubles("x", x)) as Arc<dyn Column>,
            Arc::new(ArrayColumn::from_doubles("neg", neg)),
            Arc::new(ArrayColumn::from_doubles("twice", twice)),
        ])
        .unwrap()
    }

    fn names() -> Vec<String> {
        vec!["x".into(), "neg".into(), "twice".into()]
    }

    #[test]
    fn test_norm_estimate() {
        let t = table();
        let sketch = JLSketch::new(names(), 400, 5).unwrap();
        let a = sketch.create(&t.filter(|r| r < 1000)).unwrap();
        let b = sketch.create(&t.filter(|r| r >= 1000)).unwrap();
        let p = sketch.add(&a, &b).unwrap();
        assert_eq!(p.high_dim, 2000);
        let truth = ((0..2000)
            .map(|i| (((i * 37) % 101) as f64 - 50.0).powi(2))
            .sum::<f64>()
            / 2000.0)
            .sqrt();
        let norm = p.norm("x").unwrap();
        assert!((norm - truth).abs() < 0.15 * truth, "norm {} for {}", norm, truth);
        let twice = p.norm("twice").unwrap();
        assert!((twice - 2.0 * norm).abs() < 1e-9);
        assert!((p.inner_product("x", "twice").unwrap() - 2.0 * norm * norm).abs() < 1e-9);
    }

    #[test]
    fn test_exact_correlations_for_scaled_columns() {
        let t = table();
        let p = JLSketch::new(names(), 50, 1).unwrap().create(&t).unwrap();
        assert!((p.correlation("x", "neg").unwrap() + 1.0).abs() < 1e-12);
        assert!((p.correlation("x", "twice").unwrap() - 1.0).abs() < 1e-12);
        let m = p.correlation_matrix();
        assert!((m[1][2] + 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_errors() {
        assert!(JLSketch::new(names(), 0, 1).is_err());
        let sketch = JLSketch::new(names(), 4, 1).unwrap();
        assert!(sketch.zero().norm("x").is_err());
        assert!(sketch.create(&table()).unwrap().norm("y").is_err());
    }
}
