//! Differentially private release of a histogram over quantized buckets.
//!
//! Every node of the k-ary tree over the leaves gets independent noise
//! `Laplace(log2(T / epsilon))`, where `T` is the global leaf count. A
//! bucket (or a CDF prefix) receives the sum of the noise of the nodes in
//! its canonical decomposition.

use serde::{Deserialize, Serialize};

use hillview_types::error::{HillviewError, Result};

use crate::decomposition::{IntervalDecomposition, NumericIntervalDecomposition};
use crate::histogram::Histogram;
use crate::laplace::SecureLaplace;

/// Noise added to one range and the variance of that noise.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Noise {
    pub noise: f64,
    pub variance: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrivateHistogram {
    /// Noisy counts, clamped at zero.
    pub buckets: Vec<f64>,
    /// Half-width of the confidence interval of each bucket.
    pub confidence: Vec<f64>,
    /// Noisy non-decreasing CDF, when requested.
    pub cdf: Option<Vec<f64>>,
    pub missing: u64,
    pub out_of_range: u64,
}

impl PrivateHistogram {
    pub fn new(
        histogram: &Histogram,
        decomposition: &NumericIntervalDecomposition,
        epsilon: f64,
        laplace: &SecureLaplace,
        with_cdf: bool,
    ) -> Result<Self> {
        if !(epsilon > 0.0) {
            return Err(HillviewError::Config(format!(
                "Privacy budget must be positive, got {}",
                epsilon
            )));
        }
        if histogram.buckets.len() != decomposition.bucket_count() {
            return Err(HillviewError::Format(format!(
                "Histogram has {} buckets, decomposition {}",
                histogram.buckets.len(),
                decomposition.bucket_count()
            )));
        }
        let scale = (decomposition.leaf_count() as f64 / epsilon).log2();
        let mut buckets = Vec::with_capacity(histogram.buckets.len());
        let mut confidence = Vec::with_capacity(histogram.buckets.len());
        for (i, count) in histogram.buckets.iter().enumerate() {
            let n = noise_for_bucket(decomposition, i, false, scale, laplace)?;
            buckets.push((*count as f64 + n.noise).max(0.0));
            confidence.push(2.0 * n.variance.sqrt());
        }
        let cdf = if with_cdf {
            let mut cdf: Vec<f64> = Vec::with_capacity(histogram.buckets.len());
            for (i, prefix) in histogram.integrate().into_iter().enumerate() {
                let n = noise_for_bucket(decomposition, i, true, scale, laplace)?;
                let value = prefix as f64 + n.noise;
                let floor = cdf.last().copied().unwrap_or(f64::NEG_INFINITY);
                cdf.push(value.max(floor));
            }
            Some(cdf)
        } else {
            None
        };
        Ok(PrivateHistogram {
            buckets,
            confidence,
            cdf,
            missing: histogram.missing,
            out_of_range: histogram.out_of_range,
        })
    }
}

/// Noise for one bucket, or for the prefix ending at it when `cdf`.
pub fn noise_for_bucket(
    decomposition: &impl IntervalDecomposition,
    bucket: usize,
    cdf: bool,
    scale: f64,
    laplace: &SecureLaplace,
) -> Result<Noise> {
    let nodes = decomposition.bucket_decomposition(bucket, cdf)?;
    Ok(nodes.into_iter().fold(Noise::default(), |acc, node| Noise {
        noise: acc.noise + laplace.sample_laplace(node, scale),
        variance: acc.variance + 2.0 * scale * scale,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> (Histogram, NumericIntervalDecomposition) {
        let d = NumericIntervalDecomposition::new(0.0, 100.0, 4, 0.0, 100.0, 1.0).unwrap();
        let h = Histogram {
            buckets: vec![1000, 0, 500, 2500],
            missing: 3,
            out_of_range: 7,
        };
        (h, d)
    }

    #[test]
    fn test_noise_is_reproducible() {
        let (h, d) = setup();
        let key = SecureLaplace::new(b"dataset-1/column-x").unwrap();
        let a = PrivateHistogram::new(&h, &d, 1.0, &key, true).unwrap();
        let b = PrivateHistogram::new(&h, &d, 1.0, &key, true).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.missing, 3);
        assert_eq!(a.out_of_range, 7);
    }

    #[test]
    fn test_noise_shape() {
        let (h, d) = setup();
        let key = SecureLaplace::new(b"k").unwrap();
        let p = PrivateHistogram::new(&h, &d, 0.5, &key, true).unwrap();
        let scale = (100.0f64 / 0.5).log2();
        for (i, c) in p.buckets.iter().enumerate() {
            assert!(*c >= 0.0);
            let nodes = d.bucket_decomposition(i, false).unwrap().len() as f64;
            let expected = 2.0 * (2.0 * scale * scale * nodes).sqrt();
            assert!((p.confidence[i] - expected).abs() < 1e-9);
        }
        let cdf = p.cdf.unwrap();
        assert!(cdf.windows(2).all(|w| w[0] <= w[1]));
        assert!((cdf[3] - 4000.0).abs() < 400.0);
    }

    #[test]
    fn test_rejects_mismatch() {
        let (h, _) = setup();
        let d = NumericIntervalDecomposition::new(0.0, 100.0, 3, 0.0, 100.0, 1.0).unwrap();
        let key = SecureLaplace::new(b"k").unwrap();
        assert!(PrivateHistogram::new(&h, &d, 1.0, &key, false).is_err());
        let (h, d) = setup();
        assert!(PrivateHistogram::new(&h, &d, 0.0, &key, false).is_err());
    }
}
