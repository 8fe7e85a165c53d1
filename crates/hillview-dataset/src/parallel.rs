//! Datasets made of child datasets processed concurrently.
//!
//! Child streams are merged as they produce; each child's progress is
//! scaled by `1/n`. Partial results that arrive within one bundling
//! interval are pre-added and emitted together, which bounds the message
//! rate seen by the client regardless of fan-out.

use std::any::type_name;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::future;
use futures::stream::{self, select_all, StreamExt};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use hillview_types::error::{HillviewError, Result};

use crate::api::{Map, Monoid, Sketch, Zipped};
use crate::control::{ControlMessage, StatusList, StatusListMonoid};
use crate::dataset::DataSet;
use crate::partial::{stop_after_error, PartialResult, PartialStream};

struct ParallelInner<T> {
    children: Vec<DataSet<T>>,
    bundle_interval_ms: AtomicU64,
}

pub struct ParallelDataSet<T> {
    inner: Arc<ParallelInner<T>>,
}

impl<T> Clone for ParallelDataSet<T> {
    fn clone(&self) -> Self {
        ParallelDataSet {
            inner: self.inner.clone(),
        }
    }
}

impl<T> ParallelDataSet<T> {
    pub fn size(&self) -> usize {
        self.inner.children.len()
    }

    pub fn children(&self) -> &[DataSet<T>] {
        &self.inner.children
    }

    pub fn bundle_interval(&self) -> Duration {
        Duration::from_millis(self.inner.bundle_interval_ms.load(Ordering::Relaxed))
    }

    /// Zero disables bundling.
    pub fn set_bundle_interval(&self, interval: Duration) {
        self.inner
            .bundle_interval_ms
            .store(interval.as_millis() as u64, Ordering::Relaxed);
    }
}

impl<T: Send + Sync + 'static> ParallelDataSet<T> {
    pub fn new(children: Vec<DataSet<T>>) -> Self {
        Self::with_bundle_interval(children, hillview_config::get_bundle_interval())
    }

    pub fn with_bundle_interval(children: Vec<DataSet<T>>, interval: Duration) -> Self {
        ParallelDataSet {
            inner: Arc::new(ParallelInner {
                children,
                bundle_interval_ms: AtomicU64::new(interval.as_millis() as u64),
            }),
        }
    }

    pub fn sketch<S>(&self, sketch: Arc<S>) -> PartialStream<S::Output>
    where
        S: Sketch<T> + Serialize,
        S::Output: Serialize + DeserializeOwned,
    {
        if self.inner.children.is_empty() {
            let zero = PartialResult::new(1.0, sketch.zero());
            return Box::pin(stream::once(future::ready(Ok(zero))));
        }
        debug!(
            "Parallel sketch {} over {} children",
            type_name::<S>(),
            self.size()
        );
        let factor = 1.0 / self.size() as f64;
        let streams = self
            .inner
            .children
            .iter()
            .map(|c| scaled(c.sketch(sketch.clone()), factor));
        let merged = stop_after_error(Box::pin(select_all(streams)));
        bundle(merged, self.bundle_interval(), move |a, b| sketch.add(a, b))
    }

    pub fn map<S, M>(&self, mapper: Arc<M>) -> PartialStream<Option<DataSet<S>>>
    where
        S: Send + Sync + 'static,
        M: Map<T, S> + Serialize,
    {
        let streams = self
            .inner
            .children
            .iter()
            .map(|c| c.map(mapper.clone()))
            .collect();
        self.gather(streams)
    }

    pub fn flat_map<S, M>(&self, mapper: Arc<M>) -> PartialStream<Option<DataSet<S>>>
    where
        S: Send + Sync + 'static,
        M: Map<T, Vec<S>> + Serialize,
    {
        let streams = self
            .inner
            .children
            .iter()
            .map(|c| c.flat_map(mapper.clone()))
            .collect();
        self.gather(streams)
    }

    /// Zip child-by-child with another parallel dataset of the same size.
    pub fn zip<S>(&self, other: &DataSet<S>) -> PartialStream<Option<DataSet<Zipped<T, S>>>>
    where
        S: Send + Sync + 'static,
    {
        let other = match other {
            DataSet::Parallel(o) if o.size() == self.size() => o,
            DataSet::Parallel(o) => {
                return error_stream(HillviewError::Type(format!(
                    "Cannot zip parallel datasets of sizes {} and {}",
                    self.size(),
                    o.size()
                )))
            }
            _ => {
                return error_stream(HillviewError::Type(format!(
                    "Cannot zip a parallel dataset with a {} one",
                    other.kind_name()
                )))
            }
        };
        let streams = self
            .inner
            .children
            .iter()
            .zip(other.children())
            .map(|(a, b)| a.zip(b))
            .collect();
        self.gather(streams)
    }

    /// Apply the message here, then forward it to every child.
    pub fn manage(&self, message: ControlMessage) -> PartialStream<StatusList> {
        let own = StatusList(message.parallel_action(self).into_iter().collect());
        if self.inner.children.is_empty() {
            return Box::pin(stream::once(future::ready(Ok(PartialResult::new(1.0, own)))));
        }
        let factor = 1.0 / self.size() as f64;
        let streams = self
            .inner
            .children
            .iter()
            .map(|c| scaled(c.manage(message), factor));
        let first = stream::once(future::ready(Ok(PartialResult::new(0.0, own))));
        let merged = stop_after_error(Box::pin(first.chain(select_all(streams))));
        bundle(merged, self.bundle_interval(), |a, b| StatusListMonoid.add(a, b))
    }

    /// Merge the children's map-like streams. Progress flows through
    /// while the children's datasets are collected; once all children
    /// finish, one final item carries the new parallel dataset.
    fn gather<S: Send + Sync + 'static>(
        &self,
        streams: Vec<PartialStream<Option<DataSet<S>>>>,
    ) -> PartialStream<Option<DataSet<S>>> {
        if streams.is_empty() {
            return error_stream(HillviewError::Config("Empty children".to_string()));
        }
        let n = streams.len();
        let factor = 1.0 / n as f64;
        let slots: Arc<Mutex<Vec<Option<DataSet<S>>>>> =
            Arc::new(Mutex::new((0..n).map(|_| None).collect()));
        let progress = streams.into_iter().enumerate().map(|(i, s)| {
            let slots = slots.clone();
            let s: PartialStream<Option<DataSet<S>>> = Box::pin(s.map(move |item| {
                item.map(|p| {
                    let done = p.delta_done * factor;
                    if let Some(ds) = p.delta_value {
                        slots.lock()[i] = Some(ds);
                    }
                    PartialResult::new(done, None)
                })
            }));
            s
        });
        let progress = bundle(
            stop_after_error(Box::pin(select_all(progress))),
            self.bundle_interval(),
            |_, _| Ok(None),
        );
        let interval = self.bundle_interval();
        let last = stream::once(async move {
            let children = std::mem::take(&mut *slots.lock())
                .into_iter()
                .collect::<Option<Vec<_>>>()
                .ok_or_else(|| {
                    HillviewError::Format("A child finished without producing a dataset".to_string())
                })?;
            Ok(PartialResult::new(
                0.0,
                Some(DataSet::Parallel(ParallelDataSet::with_bundle_interval(
                    children, interval,
                ))),
            ))
        });
        stop_after_error(Box::pin(progress.chain(last)))
    }
}

fn scaled<R: Send + 'static>(input: PartialStream<R>, factor: f64) -> PartialStream<R> {
    Box::pin(input.map(move |item| item.map(|p| p.scale(factor))))
}

fn error_stream<R: Send + 'static>(error: HillviewError) -> PartialStream<R> {
    Box::pin(stream::once(future::ready(Err(error))))
}

struct BundleState<R, F> {
    input: PartialStream<R>,
    add: F,
    interval: Duration,
    pending: Option<PartialResult<R>>,
    error: Option<HillviewError>,
    finished: bool,
}

impl<R, F: Fn(&R, &R) -> Result<R>> BundleState<R, F> {
    fn absorb(&mut self, item: PartialResult<R>) {
        self.pending = match self.pending.take() {
            None => Some(item),
            Some(p) => match (self.add)(&p.delta_value, &item.delta_value) {
                Ok(v) => Some(PartialResult::new(p.delta_done + item.delta_done, v)),
                Err(e) => {
                    self.error = Some(e);
                    Some(p)
                }
            },
        };
    }
}

/// Pre-add the items of `input` that arrive within each `interval`.
/// Pending items are flushed before an error is reported. A zero
/// interval passes the stream through.
pub fn bundle<R, F>(input: PartialStream<R>, interval: Duration, add: F) -> PartialStream<R>
where
    R: Send + 'static,
    F: Fn(&R, &R) -> Result<R> + Send + 'static,
{
    if interval.is_zero() {
        return input;
    }
    let state = BundleState {
        input,
        add,
        interval,
        pending: None,
        error: None,
        finished: false,
    };
    Box::pin(stream::unfold(state, |mut st| async move {
        loop {
            if let Some(e) = st.error.take() {
                st.finished = true;
                return Some((Err(e), st));
            }
            if st.finished {
                return None;
            }
            let deadline = tokio::time::sleep(st.interval);
            tokio::pin!(deadline);
            loop {
                let next = tokio::select! {
                    item = st.input.next() => Some(item),
                    _ = &mut deadline => None,
                };
                match next {
                    None => break,
                    Some(Some(Ok(p))) => {
                        st.absorb(p);
                        if st.error.is_some() {
                            break;
                        }
                    }
                    Some(Some(Err(e))) => {
                        st.error = Some(e);
                        break;
                    }
                    Some(None) => {
                        st.finished = true;
                        break;
                    }
                }
            }
            if let Some(p) = st.pending.take() {
                return Some((Ok(p), st));
            }
        }
    }))
}
