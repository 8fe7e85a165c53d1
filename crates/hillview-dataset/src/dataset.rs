//! The distributed dataset tree.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::api::{Map, Sketch, Zipped};
use crate::control::{ControlMessage, StatusList};
use crate::local::LocalDataSet;
use crate::parallel::ParallelDataSet;
use crate::partial::{fold_stream, last_value, PartialStream};
use crate::remote::RemoteDataSet;

use hillview_types::error::Result;

/// A possibly-distributed collection of `T` partitions.
///
/// Every operation returns a lazy stream of partial results; nothing runs
/// until the stream is polled, and dropping the stream cancels the work
/// behind it.
pub enum DataSet<T> {
    /// One partition held in this process.
    Local(LocalDataSet<T>),
    /// Children whose results are merged.
    Parallel(ParallelDataSet<T>),
    /// A dataset held by another worker.
    Remote(RemoteDataSet<T>),
}

impl<T> Clone for DataSet<T> {
    fn clone(&self) -> Self {
        match self {
            DataSet::Local(d) => DataSet::Local(d.clone()),
            DataSet::Parallel(d) => DataSet::Parallel(d.clone()),
            DataSet::Remote(d) => DataSet::Remote(d.clone()),
        }
    }
}

impl<T> std::fmt::Debug for DataSet<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DataSet::Local(_) => write!(f, "DataSet::Local"),
            DataSet::Parallel(p) => write!(f, "DataSet::Parallel({} children)", p.size()),
            DataSet::Remote(r) => write!(f, "DataSet::Remote({}#{})", r.address(), r.handle()),
        }
    }
}

impl<T: Send + Sync + 'static> DataSet<T> {
    pub fn local(data: T) -> Self {
        DataSet::Local(LocalDataSet::new(data))
    }

    pub fn parallel(children: Vec<DataSet<T>>) -> Self {
        DataSet::Parallel(ParallelDataSet::new(children))
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            DataSet::Local(_) => "local",
            DataSet::Parallel(_) => "parallel",
            DataSet::Remote(_) => "remote",
        }
    }

    pub fn sketch<S>(&self, sketch: Arc<S>) -> PartialStream<S::Output>
    where
        S: Sketch<T> + Serialize,
        S::Output: Serialize + DeserializeOwned,
    {
        match self {
            DataSet::Local(d) => d.sketch(sketch),
            DataSet::Parallel(d) => d.sketch(sketch),
            DataSet::Remote(d) => d.sketch(sketch),
        }
    }

    pub fn map<S, M>(&self, mapper: Arc<M>) -> PartialStream<Option<DataSet<S>>>
    where
        S: Send + Sync + 'static,
        M: Map<T, S> + Serialize,
    {
        match self {
            DataSet::Local(d) => d.map(mapper),
            DataSet::Parallel(d) => d.map(mapper),
            DataSet::Remote(d) => d.map(mapper),
        }
    }

    /// Each partition becomes zero or more partitions.
    pub fn flat_map<S, M>(&self, mapper: Arc<M>) -> PartialStream<Option<DataSet<S>>>
    where
        S: Send + Sync + 'static,
        M: Map<T, Vec<S>> + Serialize,
    {
        match self {
            DataSet::Local(d) => d.flat_map(mapper),
            DataSet::Parallel(d) => d.flat_map(mapper),
            DataSet::Remote(d) => d.flat_map(mapper),
        }
    }

    /// Pair up co-located partitions of two identically-shaped datasets.
    pub fn zip<S>(&self, other: &DataSet<S>) -> PartialStream<Option<DataSet<Zipped<T, S>>>>
    where
        S: Send + Sync + 'static,
    {
        match self {
            DataSet::Local(d) => d.zip(other),
            DataSet::Parallel(d) => d.zip(other),
            DataSet::Remote(d) => d.zip(other),
        }
    }

    pub fn manage(&self, message: ControlMessage) -> PartialStream<StatusList> {
        match self {
            DataSet::Local(d) => d.manage(message),
            DataSet::Parallel(d) => d.manage(message),
            DataSet::Remote(d) => d.manage(message),
        }
    }

    /// Run a sketch to completion and return the merged result.
    pub async fn blocking_sketch<S>(&self, sketch: Arc<S>) -> Result<S::Output>
    where
        S: Sketch<T> + Serialize,
        S::Output: Serialize + DeserializeOwned,
    {
        let stream = self.sketch(sketch.clone());
        fold_stream(stream, sketch.zero(), |a, b| sketch.add(a, b)).await
    }

    /// Run a map to completion and return the produced dataset.
    pub async fn blocking_map<S, M>(&self, mapper: Arc<M>) -> Result<Option<DataSet<S>>>
    where
        S: Send + Sync + 'static,
        M: Map<T, S> + Serialize,
    {
        last_value(self.map(mapper)).await
    }
}
