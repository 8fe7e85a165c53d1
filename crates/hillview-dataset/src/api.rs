//! The operation traits datasets are parameterised by.

use std::sync::Arc;

use hillview_types::error::Result;

/// A commutative monoid over `R`.
pub trait Monoid<R>: Send + Sync {
    fn zero(&self) -> R;

    fn add(&self, left: &R, right: &R) -> Result<R>;

    fn reduce(&self, items: &[R]) -> Result<R> {
        let mut acc = self.zero();
        for item in items {
            acc = self.add(&acc, item)?;
        }
        Ok(acc)
    }
}

/// A summary computed independently over each partition and merged.
///
/// `zero` must be an identity for `add`, and `add` must be associative
/// and commutative.
pub trait Sketch<T>: Send + Sync + 'static {
    type Output: Clone + Send + Sync + 'static;

    fn zero(&self) -> Self::Output;

    fn create(&self, data: &T) -> Result<Self::Output>;

    fn add(&self, left: &Self::Output, right: &Self::Output) -> Result<Self::Output>;
}

/// A per-partition transformation.
pub trait Map<T, S>: Send + Sync + 'static {
    fn apply(&self, data: &T) -> Result<S>;
}

/// Element of a zipped dataset: the co-located partitions of two datasets.
#[derive(Debug)]
pub struct Zipped<T, S> {
    pub first: Arc<T>,
    pub second: Arc<S>,
}

impl<T, S> Clone for Zipped<T, S> {
    fn clone(&self) -> Self {
        Zipped {
            first: self.first.clone(),
            second: self.second.clone(),
        }
    }
}
