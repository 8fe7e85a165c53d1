//! Partial results and the streams that carry them.

use std::pin::Pin;

use futures::stream::{Stream, StreamExt};
use serde::{Deserialize, Serialize};

use hillview_types::error::Result;

use crate::api::Monoid;

/// An incremental contribution to an operation's result.
///
/// `delta_done` is the fraction of the whole operation this contribution
/// completes; the `delta_done`s of one stream sum to at most 1.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartialResult<R> {
    pub delta_done: f64,
    pub delta_value: R,
}

impl<R> PartialResult<R> {
    pub fn new(delta_done: f64, delta_value: R) -> Self {
        PartialResult {
            delta_done,
            delta_value,
        }
    }

    /// Rescale progress, e.g. by `1/n` for one of `n` children.
    pub fn scale(self, factor: f64) -> Self {
        PartialResult {
            delta_done: self.delta_done * factor,
            delta_value: self.delta_value,
        }
    }

    pub fn map_value<S>(self, f: impl FnOnce(R) -> S) -> PartialResult<S> {
        PartialResult {
            delta_done: self.delta_done,
            delta_value: f(self.delta_value),
        }
    }
}

/// Lifts a monoid over `R` to partial results over `R`: progress adds,
/// values add.
pub struct PartialResultMonoid<M>(pub M);

impl<R, M: Monoid<R>> Monoid<PartialResult<R>> for PartialResultMonoid<M> {
    fn zero(&self) -> PartialResult<R> {
        PartialResult::new(0.0, self.0.zero())
    }

    fn add(&self, left: &PartialResult<R>, right: &PartialResult<R>) -> Result<PartialResult<R>> {
        Ok(PartialResult::new(
            left.delta_done + right.delta_done,
            self.0.add(&left.delta_value, &right.delta_value)?,
        ))
    }
}

/// A stream of partial results. Errors arrive in-band; a stream yields
/// nothing after its first error.
pub type PartialStream<R> = Pin<Box<dyn Stream<Item = Result<PartialResult<R>>> + Send>>;

/// Truncate `input` right after its first error.
pub fn stop_after_error<R: Send + 'static>(input: PartialStream<R>) -> PartialStream<R> {
    Box::pin(input.scan(false, |failed, item| {
        let out = if *failed {
            None
        } else {
            *failed = item.is_err();
            Some(item)
        };
        futures::future::ready(out)
    }))
}

/// Fold an entire stream with `add`, returning the final value.
pub async fn fold_stream<R>(
    mut input: PartialStream<R>,
    zero: R,
    add: impl Fn(&R, &R) -> Result<R>,
) -> Result<R> {
    let mut acc = zero;
    while let Some(item) = input.next().await {
        acc = add(&acc, &item?.delta_value)?;
    }
    Ok(acc)
}

/// The last value of a stream, which for map-like operations is the
/// produced dataset.
pub async fn last_value<R>(mut input: PartialStream<Option<R>>) -> Result<Option<R>> {
    let mut last = None;
    while let Some(item) = input.next().await {
        if let Some(v) = item?.delta_value {
            last = Some(v);
        }
    }
    Ok(last)
}
