//! Canonical decompositions of leaf intervals, for the binary (and k-ary)
//! mechanism of Chan, Song, Shi, "Private and Continual Release of
//! Statistics", TISSEC 2011.
//!
//! Leaves are quantization intervals of a column's global range, indexed
//! from 0. A node `(start, len)` covers leaves `start..start + len`.

use serde::{Deserialize, Serialize};

use hillview_types::error::{HillviewError, Result};

/// Branching factor of the tree used for bucket noise.
pub const BRANCHING_FACTOR: usize = 20;

fn check_interval(left: usize, right: usize) -> Result<()> {
    if right < left {
        return Err(HillviewError::Config(format!(
            "Invalid interval bounds {}:{}",
            left, right
        )));
    }
    Ok(())
}

/// Fewest power-of-two aligned nodes covering `[left, right)`.
pub fn dyadic_decomposition(mut left: usize, right: usize) -> Result<Vec<(usize, usize)>> {
    check_interval(left, right)?;
    let mut nodes = Vec::new();
    while left < right {
        let fits = usize::BITS - 1 - (right - left).leading_zeros();
        let pow = if left == 0 {
            fits
        } else {
            left.trailing_zeros().min(fits)
        };
        let len = 1usize << pow;
        nodes.push((left, len));
        left += len;
    }
    Ok(nodes)
}

/// Fewest nodes of a `k`-ary tree covering `[left, right)`. An interval of
/// exactly `k` leaves is reported as `k` unit nodes.
pub fn kadic_decomposition(mut left: usize, right: usize, k: usize) -> Result<Vec<(usize, usize)>> {
    check_interval(left, right)?;
    if k < 2 {
        return Err(HillviewError::Config(format!(
            "Branching factor must be at least 2, got {}",
            k
        )));
    }
    if right - left == k {
        return Ok((left..right).map(|i| (i, 1)).collect());
    }
    let mut nodes = Vec::new();
    while left < right {
        let remaining = right - left;
        let mut len = 1usize;
        while let Some(next) = len.checked_mul(k) {
            if next > remaining || left % next != 0 {
                break;
            }
            len = next;
        }
        nodes.push((left, len));
        left += len;
    }
    Ok(nodes)
}

/// Buckets laid over the leaves of a quantized range.
pub trait IntervalDecomposition {
    /// Leaves in the whole (unfiltered) range.
    fn leaf_count(&self) -> usize;

    fn bucket_count(&self) -> usize;

    /// Leaves of bucket `bucket` as a right-exclusive range; with `cdf`
    /// the range starts at leaf 0. Bucket edges outside the leaf range are
    /// clamped onto it.
    fn bucket_range(&self, bucket: usize, cdf: bool) -> (usize, usize);

    fn bucket_decomposition(&self, bucket: usize, cdf: bool) -> Result<Vec<(usize, usize)>> {
        let (left, right) = self.bucket_range(bucket, cdf);
        kadic_decomposition(left, right, BRANCHING_FACTOR)
    }
}

/// Uniform buckets over `[min, max]` of a numeric column whose global
/// range `[global_min, global_max]` is quantized into leaves of width
/// `granularity`. Each leaf belongs to the bucket containing its left
/// edge; the first bucket starts at the leaf containing `min`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NumericIntervalDecomposition {
    pub min: f64,
    pub max: f64,
    pub global_min: f64,
    pub global_max: f64,
    pub granularity: f64,
    leaves: usize,
    /// First leaf of each bucket, followed by the end leaf.
    bucket_leaves: Vec<usize>,
}

impl NumericIntervalDecomposition {
    pub fn new(
        min: f64,
        max: f64,
        bucket_count: usize,
        global_min: f64,
        global_max: f64,
        granularity: f64,
    ) -> Result<Self> {
        if !(granularity > 0.0) || !(global_max >= global_min) || !(max >= min) {
            return Err(HillviewError::Config(format!(
                "Bad quantization: range [{}, {}] of [{}, {}] with granularity {}",
                min, max, global_min, global_max, granularity
            )));
        }
        if bucket_count == 0 {
            return Err(HillviewError::Config("Zero buckets".to_string()));
        }
        let leaves = (((global_max - global_min) / granularity) as usize).max(1);
        let clamp = |leaf: f64| -> usize { leaf.max(0.0).min(leaves as f64) as usize };
        let first = clamp(((min - global_min) / granularity).floor());
        let end = clamp(((max - global_min) / granularity).floor() + 1.0);
        let width = (max - min) / bucket_count as f64;
        let mut bucket_leaves = Vec::with_capacity(bucket_count + 1);
        bucket_leaves.push(first);
        for i in 1..bucket_count {
            let edge = min + i as f64 * width;
            let leaf = clamp(((edge - global_min) / granularity).ceil());
            bucket_leaves.push(leaf.max(first).min(end));
        }
        bucket_leaves.push(end.max(first));
        Ok(NumericIntervalDecomposition {
            min,
            max,
            global_min,
            global_max,
            granularity,
            leaves,
            bucket_leaves,
        })
    }

    /// Bucket holding `value`, or `None` outside `[min, max]` or the
    /// quantized range.
    pub fn bucket_of(&self, value: f64) -> Option<usize> {
        if !(value >= self.min && value <= self.max) {
            return None;
        }
        let leaf = ((value - self.global_min) / self.granularity).floor();
        if leaf < 0.0 {
            return None;
        }
        let leaf = leaf as usize;
        if leaf >= *self.bucket_leaves.last()? {
            return None;
        }
        let buckets = &self.bucket_leaves[..self.bucket_count()];
        buckets.partition_point(|&l| l <= leaf).checked_sub(1)
    }

    /// Leaves assigned to `bucket`.
    pub fn leaves_in_bucket(&self, bucket: usize) -> usize {
        self.bucket_leaves[bucket + 1] - self.bucket_leaves[bucket]
    }
}

impl IntervalDecomposition for NumericIntervalDecomposition {
    fn leaf_count(&self) -> usize {
        self.leaves
    }

    fn bucket_count(&self) -> usize {
        self.bucket_leaves.len() - 1
    }

    fn bucket_range(&self, bucket: usize, cdf: bool) -> (usize, usize) {
        let left = if cdf { 0 } else { self.bucket_leaves[bucket] };
        (left, self.bucket_leaves[bucket + 1])
    }
}
