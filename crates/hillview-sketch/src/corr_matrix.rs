//! Accumulated inner products between numeric columns, and the
//! statistics derived from them.

use serde::{Deserialize, Serialize};

use hillview_types::error::{HillviewError, Result};

use crate::projection::LinearProjectionMap;

/// Correlations whose standard deviation falls below this are reported
/// as zero.
const SIGMA_EPSILON: f64 = 1e-6;
const MAX_JACOBI_SWEEPS: usize = 100;

/// Symmetric matrix of inner products over a list of columns.
///
/// `raw[i][j]` (upper triangle) holds either a raw sum of products or a
/// per-pair average, depending on the sketch that produced it; `means` is
/// zero when the producer does not center.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrMatrix {
    pub column_names: Vec<String>,
    raw: Vec<f64>,
    pub means: Vec<f64>,
    /// Rows with both values present, per pair.
    non_missing: Vec<f64>,
    /// Rows processed.
    pub count: u64,
}

impl CorrMatrix {
    pub fn new(column_names: Vec<String>) -> Self {
        let n = column_names.len();
        CorrMatrix {
            column_names,
            raw: vec![0.0; n * n],
            means: vec![0.0; n],
            non_missing: vec![0.0; n * n],
            count: 0,
        }
    }

    pub fn dim(&self) -> usize {
        self.column_names.len()
    }

    fn slot(&self, i: usize, j: usize) -> usize {
        let (i, j) = if i <= j { (i, j) } else { (j, i) };
        i * self.dim() + j
    }

    pub fn get(&self, i: usize, j: usize) -> f64 {
        self.raw[self.slot(i, j)]
    }

    pub fn put(&mut self, i: usize, j: usize, value: f64) {
        let s = self.slot(i, j);
        self.raw[s] = value;
    }

    pub fn update(&mut self, i: usize, j: usize, delta: f64) {
        let s = self.slot(i, j);
        self.raw[s] += delta;
    }

    pub fn non_missing(&self, i: usize, j: usize) -> f64 {
        self.non_missing[self.slot(i, j)]
    }

    pub fn set_non_missing(&mut self, i: usize, j: usize, value: f64) {
        let s = self.slot(i, j);
        self.non_missing[s] = value;
    }

    pub fn index(&self, column: &str) -> Result<usize> {
        self.column_names
            .iter()
            .position(|c| c == column)
            .ok_or_else(|| HillviewError::MissingColumn(column.to_string()))
    }

    /// Pearson correlations, centered by `means`.
    pub fn correlation_matrix(&self) -> Vec<Vec<f64>> {
        let n = self.dim();
        let sigma: Vec<f64> = (0..n)
            .map(|i| (self.get(i, i) - self.means[i] * self.means[i]).max(0.0).sqrt())
            .collect();
        let mut result = vec![vec![0.0; n]; n];
        for i in 0..n {
            for j in i..n {
                let value = if sigma[i] < SIGMA_EPSILON || sigma[j] < SIGMA_EPSILON {
                    0.0
                } else {
                    (self.get(i, j) - self.means[i] * self.means[j]) / (sigma[i] * sigma[j])
                };
                result[i][j] = value;
                result[j][i] = value;
            }
        }
        result
    }

    pub fn correlation(&self, a: &str, b: &str) -> Result<f64> {
        let (i, j) = (self.index(a)?, self.index(b)?);
        Ok(self.correlation_matrix()[i][j])
    }

    pub fn correlation_with(&self, a: &str) -> Result<Vec<f64>> {
        let i = self.index(a)?;
        Ok(self.correlation_matrix().swap_remove(i))
    }

    pub fn norm(&self, a: &str) -> Result<f64> {
        let i = self.index(a)?;
        Ok(self.get(i, i).sqrt())
    }

    pub fn inner_product(&self, a: &str, b: &str) -> Result<f64> {
        Ok(self.get(self.index(a)?, self.index(b)?))
    }

    /// Eigenvalues of the correlation matrix in decreasing order, with
    /// their unit eigenvectors.
    pub fn eigen(&self) -> (Vec<f64>, Vec<Vec<f64>>) {
        let (values, vectors) = jacobi_eigen(self.correlation_matrix());
        let mut order: Vec<usize> = (0..values.len()).collect();
        order.sort_by(|&a, &b| values[b].total_cmp(&values[a]));
        (
            order.iter().map(|&i| values[i]).collect(),
            order.into_iter().map(|i| vectors[i].clone()).collect(),
        )
    }

    /// The `n` principal eigenvectors, one per row.
    pub fn eigen_vectors(&self, n: usize) -> Result<Vec<Vec<f64>>> {
        if n == 0 || n > self.dim() {
            return Err(HillviewError::Config(format!(
                "Cannot take {} eigenvectors of a {}-column matrix",
                n,
                self.dim()
            )));
        }
        let (_, mut vectors) = self.eigen();
        vectors.truncate(n);
        Ok(vectors)
    }

    /// A map appending the projections on the `n` principal components as
    /// columns `PCA0`, `PCA1`, ...
    pub fn eigen_vector_projection(&self, n: usize) -> Result<LinearProjectionMap> {
        LinearProjectionMap::new(self.column_names.clone(), self.eigen_vectors(n)?, "PCA")
    }
}

/// Cyclic Jacobi rotations for a symmetric matrix. Returns the eigenvalues
/// and the matching eigenvectors (unsorted).
fn jacobi_eigen(mut a: Vec<Vec<f64>>) -> (Vec<f64>, Vec<Vec<f64>>) {
    let n = a.len();
    let mut v: Vec<Vec<f64>> = (0..n)
        .map(|i| (0..n).map(|j| if i == j { 1.0 } else { 0.0 }).collect())
        .collect();
    let scale: f64 = a.iter().flatten().map(|x| x * x).sum::<f64>().sqrt().max(1.0);
    for _ in 0..MAX_JACOBI_SWEEPS {
        let mut off = 0.0;
        for p in 0..n {
            for q in p + 1..n {
                off += a[p][q] * a[p][q];
            }
        }
        if off.sqrt() <= 1e-12 * scale {
            break;
        }
        for p in 0..n {
            for q in p + 1..n {
                let apq = a[p][q];
                if apq == 0.0 {
                    continue;
                }
                let theta = (a[q][q] - a[p][p]) / (2.0 * apq);
                let t = theta.signum() / (theta.abs() + (theta * theta + 1.0).sqrt());
                let c = 1.0 / (t * t + 1.0).sqrt();
                let s = t * c;
                for row in a.iter_mut() {
                    let (kp, kq) = (row[p], row[q]);
                    row[p] = c * kp - s * kq;
                    row[q] = s * kp + c * kq;
                }
                for k in 0..n {
                    let (pk, qk) = (a[p][k], a[q][k]);
                    a[p][k] = c * pk - s * qk;
                    a[q][k] = s * pk + c * qk;
                }
                for row in v.iter_mut() {
                    let (kp, kq) = (row[p], row[q]);
                    row[p] = c * kp - s * kq;
                    row[q] = s * kp + c * kq;
                }
            }
        }
    }
    let values = (0..n).map(|i| a[i][i]).collect();
    let vectors = (0..n).map(|j| (0..n).map(|i| v[i][j]).collect()).collect();
    (values, vectors)
}
