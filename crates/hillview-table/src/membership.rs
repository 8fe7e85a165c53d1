//! Membership sets: which rows of a table are visible in a view.

use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use hillview_types::bitset::DenseBitset;

/// Below this density a narrowed set is kept as an explicit index list.
const SPARSE_DENSITY: f64 = 1.0 / 16.0;

/// A logical subset of `[0, max)`.
///
/// Iteration always yields strictly increasing row indices.
#[derive(Debug, Clone)]
pub enum MembershipSet {
    /// Every row in `[0, size)`.
    Full { size: usize },
    /// An explicit, sorted list of rows.
    Sparse { max: usize, rows: Arc<Vec<usize>> },
    /// One bit per row of the underlying table.
    Dense {
        max: usize,
        bits: Arc<DenseBitset>,
        size: usize,
    },
}

impl MembershipSet {
    pub fn full(size: usize) -> Self {
        MembershipSet::Full { size }
    }

    /// Build from an increasing sequence of rows below `max`, choosing the
    /// representation by density.
    pub fn from_rows(max: usize, rows: Vec<usize>) -> Self {
        debug_assert!(rows.windows(2).all(|w| w[0] < w[1]));
        debug_assert!(rows.last().map_or(true, |&r| r < max));
        if rows.len() == max {
            return MembershipSet::Full { size: max };
        }
        if max == 0 || (rows.len() as f64) < (max as f64) * SPARSE_DENSITY {
            return MembershipSet::Sparse {
                max,
                rows: Arc::new(rows),
            };
        }
        let mut bits = DenseBitset::new(max);
        for &r in &rows {
            bits.set(r, true);
        }
        MembershipSet::Dense {
            max,
            bits: Arc::new(bits),
            size: rows.len(),
        }
    }

    /// Number of member rows.
    pub fn size(&self) -> usize {
        match self {
            MembershipSet::Full { size } => *size,
            MembershipSet::Sparse { rows, .. } => rows.len(),
            MembershipSet::Dense { size, .. } => *size,
        }
    }

    /// Exclusive upper bound on row indices.
    pub fn max(&self) -> usize {
        match self {
            MembershipSet::Full { size } => *size,
            MembershipSet::Sparse { max, .. } | MembershipSet::Dense { max, .. } => *max,
        }
    }

    pub fn is_member(&self, row: usize) -> bool {
        match self {
            MembershipSet::Full { size } => row < *size,
            MembershipSet::Sparse { rows, .. } => rows.binary_search(&row).is_ok(),
            MembershipSet::Dense { max, bits, .. } => row < *max && bits.get(row),
        }
    }

    pub fn iter(&self) -> Box<dyn Iterator<Item = usize> + '_> {
        match self {
            MembershipSet::Full { size } => Box::new(0..*size),
            MembershipSet::Sparse { rows, .. } => Box::new(rows.iter().copied()),
            MembershipSet::Dense { bits, .. } => Box::new(bits.iter_ones()),
        }
    }

    /// The members satisfying `predicate`.
    pub fn filter(&self, mut predicate: impl FnMut(usize) -> bool) -> MembershipSet {
        let rows: Vec<usize> = self.iter().filter(|&r| predicate(r)).collect();
        MembershipSet::from_rows(self.max(), rows)
    }

    /// Bernoulli sample: each member is kept independently with
    /// probability `rate`. The same seed always selects the same rows.
    pub fn sample(&self, rate: f64, seed: u64) -> MembershipSet {
        if rate >= 1.0 {
            return self.clone();
        }
        let mut rng = StdRng::seed_from_u64(seed);
        if rate <= 0.0 {
            return MembershipSet::from_rows(self.max(), Vec::new());
        }
        self.filter(|_| rng.gen::<f64>() < rate)
    }

    /// Bernoulli sample with a seed drawn from the thread's generator.
    pub fn sample_random(&self, rate: f64) -> MembershipSet {
        self.sample(rate, rand::thread_rng().gen())
    }

    /// Rows present in both sets.
    pub fn intersect(&self, other: &MembershipSet) -> MembershipSet {
        if let MembershipSet::Full { size } = other {
            if *size >= self.max() {
                return self.clone();
            }
        }
        self.filter(|r| other.is_member(r))
    }
}
