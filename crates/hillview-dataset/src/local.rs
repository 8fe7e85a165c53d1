//! A single in-memory partition.

use std::any::type_name;
use std::sync::Arc;

use futures::future;
use futures::stream::{self, StreamExt};
use tracing::debug;

use hillview_types::error::{HillviewError, Result};

use crate::api::{Map, Sketch, Zipped};
use crate::control::{ControlMessage, StatusList};
use crate::dataset::DataSet;
use crate::parallel::ParallelDataSet;
use crate::partial::{PartialResult, PartialStream};

pub struct LocalDataSet<T> {
    data: Arc<T>,
    separate_thread: bool,
}

impl<T> Clone for LocalDataSet<T> {
    fn clone(&self) -> Self {
        LocalDataSet {
            data: self.data.clone(),
            separate_thread: self.separate_thread,
        }
    }
}

/// Run `f` on a blocking worker thread, or inline.
async fn compute<R: Send + 'static>(
    separate_thread: bool,
    f: impl FnOnce() -> Result<R> + Send + 'static,
) -> Result<R> {
    if separate_thread {
        tokio::task::spawn_blocking(f).await.map_err(|e| {
            if e.is_cancelled() {
                HillviewError::Cancelled
            } else {
                HillviewError::Execution(e.to_string())
            }
        })?
    } else {
        f()
    }
}

impl<T: Send + Sync + 'static> LocalDataSet<T> {
    pub fn new(data: T) -> Self {
        LocalDataSet::from_arc(Arc::new(data))
    }

    pub fn from_arc(data: Arc<T>) -> Self {
        LocalDataSet {
            data,
            separate_thread: hillview_config::get_separate_thread(),
        }
    }

    /// Whether computations leave the polling task for a blocking thread.
    pub fn with_separate_thread(mut self, separate_thread: bool) -> Self {
        self.separate_thread = separate_thread;
        self
    }

    pub fn data(&self) -> &Arc<T> {
        &self.data
    }

    fn derived<S>(&self, data: S) -> LocalDataSet<S> {
        LocalDataSet {
            data: Arc::new(data),
            separate_thread: self.separate_thread,
        }
    }

    /// Emits `(0, zero)` right away, then `(1, create(data))`.
    pub fn sketch<S: Sketch<T>>(&self, sketch: Arc<S>) -> PartialStream<S::Output> {
        let zero = PartialResult::new(0.0, sketch.zero());
        let data = self.data.clone();
        let separate = self.separate_thread;
        let result = async move {
            debug!("Starting sketch {}", type_name::<S>());
            let value = compute(separate, move || sketch.create(&data)).await?;
            debug!("Completed sketch {}", type_name::<S>());
            Ok(PartialResult::new(1.0, value))
        };
        Box::pin(stream::once(future::ready(Ok(zero))).chain(stream::once(result)))
    }

    pub fn map<S, M>(&self, mapper: Arc<M>) -> PartialStream<Option<DataSet<S>>>
    where
        S: Send + Sync + 'static,
        M: Map<T, S>,
    {
        let this = self.clone();
        Box::pin(stream::once(async move {
            debug!("Starting map {}", type_name::<M>());
            let data = this.data.clone();
            let mapped = compute(this.separate_thread, move || mapper.apply(&data)).await?;
            debug!("Completed map {}", type_name::<M>());
            Ok(PartialResult::new(
                1.0,
                Some(DataSet::Local(this.derived(mapped))),
            ))
        }))
    }

    /// The outputs become the local children of a new parallel dataset.
    pub fn flat_map<S, M>(&self, mapper: Arc<M>) -> PartialStream<Option<DataSet<S>>>
    where
        S: Send + Sync + 'static,
        M: Map<T, Vec<S>>,
    {
        let this = self.clone();
        Box::pin(stream::once(async move {
            debug!("Starting flatMap {}", type_name::<M>());
            let data = this.data.clone();
            let parts = compute(this.separate_thread, move || mapper.apply(&data)).await?;
            debug!("Completed flatMap {} into {} parts", type_name::<M>(), parts.len());
            let children = parts
                .into_iter()
                .map(|p| DataSet::Local(this.derived(p)))
                .collect();
            Ok(PartialResult::new(
                1.0,
                Some(DataSet::Parallel(ParallelDataSet::new(children))),
            ))
        }))
    }

    pub fn zip<S>(&self, other: &DataSet<S>) -> PartialStream<Option<DataSet<Zipped<T, S>>>>
    where
        S: Send + Sync + 'static,
    {
        let result = match other {
            DataSet::Local(o) => {
                let zipped = Zipped {
                    first: self.data.clone(),
                    second: o.data.clone(),
                };
                Ok(PartialResult::new(
                    1.0,
                    Some(DataSet::Local(self.derived(zipped))),
                ))
            }
            DataSet::Parallel(_) | DataSet::Remote(_) => Err(HillviewError::Type(format!(
                "Cannot zip a local dataset with a {} one",
                other.kind_name()
            ))),
        };
        Box::pin(stream::once(future::ready(result)))
    }

    pub fn manage(&self, message: ControlMessage) -> PartialStream<StatusList> {
        let statuses = StatusList(message.local_action().into_iter().collect());
        Box::pin(stream::once(future::ready(Ok(PartialResult::new(
            1.0, statuses,
        )))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    #[derive(Serialize, Deserialize)]
    struct SumSketch;

    impl Sketch<Vec<i64>> for SumSketch {
        type Output = i64;

        fn zero(&self) -> i64 {
            0
        }

        fn create(&self, data: &Vec<i64>) -> Result<i64> {
            Ok(data.iter().sum())
        }

        fn add(&self, left: &i64, right: &i64) -> Result<i64> {
            Ok(left + right)
        }
    }

    #[derive(Serialize, Deserialize)]
    struct Split;

    impl Map<Vec<i64>, Vec<Vec<i64>>> for Split {
        fn apply(&self, data: &Vec<i64>) -> Result<Vec<Vec<i64>>> {
            Ok(data.chunks(2).map(|c| c.to_vec()).collect())
        }
    }

    #[tokio::test]
    async fn test_sketch_emits_zero_then_result() {
        for separate in [true, false] {
            let ds = LocalDataSet::new(vec![1i64, 2, 3]).with_separate_thread(separate);
            let out: Vec<_> = ds.sketch(Arc::new(SumSketch)).collect().await;
            let out: Vec<_> = out.into_iter().map(|r| r.unwrap()).collect();
            assert_eq!(
                out,
                vec![PartialResult::new(0.0, 0), PartialResult::new(1.0, 6)]
            );
        }
    }

    #[tokio::test]
    async fn test_flat_map_builds_parallel() {
        let ds = LocalDataSet::new(vec![1i64, 2, 3, 4, 5]);
        let out: Vec<_> = ds.flat_map(Arc::new(Split)).collect().await;
        assert_eq!(out.len(), 1);
        let p = out.into_iter().next().unwrap().unwrap();
        assert_eq!(p.delta_done, 1.0);
        match p.delta_value {
            Some(DataSet::Parallel(par)) => assert_eq!(par.size(), 3),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_zip_requires_local() {
        let a = LocalDataSet::new(vec![1i64]);
        let b = DataSet::local(vec![2i64]);
        let out: Vec<_> = a.zip(&b).collect().await;
        match &out[0].as_ref().unwrap().delta_value {
            Some(DataSet::Local(z)) => {
                assert_eq!(*z.data().first, vec![1]);
                assert_eq!(*z.data().second, vec![2]);
            }
            other => panic!("unexpected {:?}", other),
        }
        let p: DataSet<Vec<i64>> = DataSet::parallel(vec![b]);
        let out: Vec<_> = a.zip(&p).collect().await;
        assert!(matches!(out[0], Err(HillviewError::Type(_))));
    }
}
