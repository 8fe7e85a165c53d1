//! Typed executors for the operations a worker accepts.
//!
//! Commands arrive as a type tag plus bincode bytes. The registry maps
//! each tag to a closure that decodes the operation, looks up its typed
//! source dataset and starts it.

use std::any::type_name;
use std::collections::HashMap;
use std::sync::Arc;

use futures::stream::StreamExt;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;

use hillview_dataset::api::{Map, Sketch};
use hillview_dataset::dataset::DataSet;
use hillview_dataset::partial::{PartialResult, PartialStream};
use hillview_dataset::remote::zip_tag;
use hillview_dataset::wire::{Command, OperationKind, PartialResponse, ResponseStream};
use hillview_types::error::{HillviewError, Result};

use crate::datasets::DatasetTable;
use crate::memo::MemoEntry;

type Summary = Box<dyn FnOnce() -> Result<MemoEntry> + Send>;

/// A started operation.
pub struct Execution {
    pub responses: ResponseStream,
    /// Produces the memo entry once `responses` completed without error.
    pub summary: Option<Summary>,
}

type Executor = Box<dyn Fn(&Command, &Arc<DatasetTable>) -> Result<Execution> + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Family {
    Map,
    FlatMap,
    Sketch,
    Zip,
}

impl Family {
    fn of(op: &OperationKind) -> Option<Family> {
        match op {
            OperationKind::Map => Some(Family::Map),
            OperationKind::FlatMap => Some(Family::FlatMap),
            OperationKind::Sketch => Some(Family::Sketch),
            OperationKind::Zip { .. } => Some(Family::Zip),
            OperationKind::Manage => None,
        }
    }
}

#[derive(Default)]
pub struct OperationRegistry {
    executors: HashMap<(Family, String), Executor>,
}

impl OperationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_sketch<T, S>(&mut self) -> &mut Self
    where
        T: Send + Sync + 'static,
        S: Sketch<T> + Serialize + DeserializeOwned,
        S::Output: Serialize + DeserializeOwned,
    {
        let executor: Executor = Box::new(|command: &Command, datasets: &Arc<DatasetTable>| {
            let sketch: Arc<S> = Arc::new(command.decode_payload()?);
            let source = datasets.get::<T>(command.handle)?;
            let total = Arc::new(Mutex::new(sketch.zero()));
            let (adder, sum) = (sketch.clone(), total.clone());
            let responses = source.sketch(sketch).map(move |item| {
                let partial = item?;
                let merged = adder.add(&sum.lock(), &partial.delta_value)?;
                *sum.lock() = merged;
                PartialResponse::encode(&partial)
            });
            let summary: Summary = Box::new(move || {
                let value = total.lock().clone();
                Ok(MemoEntry {
                    response: PartialResponse::encode(&PartialResult::new(1.0, value))?,
                    produced: None,
                })
            });
            Ok(Execution {
                responses: Box::pin(responses),
                summary: Some(summary),
            })
        });
        self.executors
            .insert((Family::Sketch, type_name::<S>().to_string()), executor);
        self
    }

    pub fn register_map<T, S, M>(&mut self) -> &mut Self
    where
        T: Send + Sync + 'static,
        S: Send + Sync + 'static,
        M: Map<T, S> + Serialize + DeserializeOwned,
    {
        let executor: Executor = Box::new(|command: &Command, datasets: &Arc<DatasetTable>| {
            let mapper: Arc<M> = Arc::new(command.decode_payload()?);
            let source = datasets.get::<T>(command.handle)?;
            Ok(publishing(source.map::<S, M>(mapper), datasets.clone()))
        });
        self.executors
            .insert((Family::Map, type_name::<M>().to_string()), executor);
        self
    }

    pub fn register_flat_map<T, S, M>(&mut self) -> &mut Self
    where
        T: Send + Sync + 'static,
        S: Send + Sync + 'static,
        M: Map<T, Vec<S>> + Serialize + DeserializeOwned,
    {
        let executor: Executor = Box::new(|command: &Command, datasets: &Arc<DatasetTable>| {
            let mapper: Arc<M> = Arc::new(command.decode_payload()?);
            let source = datasets.get::<T>(command.handle)?;
            Ok(publishing(source.flat_map::<S, M>(mapper), datasets.clone()))
        });
        self.executors
            .insert((Family::FlatMap, type_name::<M>().to_string()), executor);
        self
    }

    pub fn register_zip<T, S>(&mut self) -> &mut Self
    where
        T: Send + Sync + 'static,
        S: Send + Sync + 'static,
    {
        let executor: Executor = Box::new(|command: &Command, datasets: &Arc<DatasetTable>| {
            let other = match command.op {
                OperationKind::Zip { other } => other,
                _ => return Err(HillviewError::Format(format!("{:?} is not a zip", command.op))),
            };
            let source = datasets.get::<T>(command.handle)?;
            let other = datasets.get::<S>(other)?;
            Ok(publishing(source.zip(&other), datasets.clone()))
        });
        self.executors
            .insert((Family::Zip, zip_tag::<T, S>()), executor);
        self
    }

    pub fn start(&self, command: &Command, datasets: &Arc<DatasetTable>) -> Result<Execution> {
        let family = Family::of(&command.op).ok_or_else(|| {
            HillviewError::Format("Management commands have no executor".to_string())
        })?;
        let executor = self
            .executors
            .get(&(family, command.tag.clone()))
            .ok_or_else(|| {
                HillviewError::Config(format!(
                    "No {:?} operation registered as {}",
                    family, command.tag
                ))
            })?;
        executor(command, datasets)
    }

    pub fn len(&self) -> usize {
        self.executors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.executors.is_empty()
    }
}

/// Publish every dataset `stream` produces and answer with its handle.
fn publishing<S: Send + Sync + 'static>(
    stream: PartialStream<Option<DataSet<S>>>,
    datasets: Arc<DatasetTable>,
) -> Execution {
    let last = Arc::new(Mutex::new(None));
    let produced = last.clone();
    let responses = stream.map(move |item| {
        let partial = item?.map_value(|d| d.map(|d| datasets.insert(d)));
        if let Some(handle) = partial.delta_value {
            *produced.lock() = Some(handle);
        }
        PartialResponse::encode(&partial)
    });
    let summary: Summary = Box::new(move || {
        let handle: Option<usize> = *last.lock();
        Ok(MemoEntry {
            response: PartialResponse::encode(&PartialResult::new(1.0, handle))?,
            produced: handle,
        })
    });
    Execution {
        responses: Box::pin(responses),
        summary: Some(summary),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Serialize, Deserialize)]
    struct Len;

    impl Sketch<Vec<i64>> for Len {
        type Output = u64;

        fn zero(&self) -> u64 {
            0
        }

        fn create(&self, data: &Vec<i64>) -> Result<u64> {
            Ok(data.len() as u64)
        }

        fn add(&self, left: &u64, right: &u64) -> Result<u64> {
            Ok(left + right)
        }
    }

    #[derive(Serialize, Deserialize)]
    struct Double;

    impl Map<Vec<i64>, Vec<i64>> for Double {
        fn apply(&self, data: &Vec<i64>) -> Result<Vec<i64>> {
            Ok(data.iter().map(|x| x * 2).collect())
        }
    }

    fn datasets() -> Arc<DatasetTable> {
        let d = Arc::new(DatasetTable::new("w:1"));
        d.set_root(DataSet::local(vec![1i64, 2, 3]));
        d
    }

    #[tokio::test]
    async fn test_sketch_summary_sums_partials() {
        let mut registry = OperationRegistry::new();
        registry.register_sketch::<Vec<i64>, Len>();
        let command = Command::new(0, OperationKind::Sketch, type_name::<Len>(), &Len).unwrap();
        let execution = registry.start(&command, &datasets()).unwrap();
        let responses: Vec<_> = execution.responses.collect().await;
        assert_eq!(responses.len(), 2);
        let entry = (execution.summary.unwrap())().unwrap();
        let total: PartialResult<u64> = entry.response.decode().unwrap();
        assert_eq!(total, PartialResult::new(1.0, 3));
    }

    #[tokio::test]
    async fn test_map_publishes_handle() {
        let mut registry = OperationRegistry::new();
        registry.register_map::<Vec<i64>, Vec<i64>, Double>();
        let datasets = datasets();
        let command =
            Command::new(0, OperationKind::Map, type_name::<Double>(), &Double).unwrap();
        let execution = registry.start(&command, &datasets).unwrap();
        let responses: Vec<_> = execution.responses.collect().await;
        let p: PartialResult<Option<usize>> = responses[0].as_ref().unwrap().decode().unwrap();
        assert_eq!(p, PartialResult::new(1.0, Some(1)));
        assert_eq!(datasets.len(), 2);
        let entry = (execution.summary.unwrap())().unwrap();
        assert_eq!(entry.produced, Some(1));
    }

    #[test]
    fn test_unregistered_tag() {
        let registry = OperationRegistry::new();
        let command = Command::new(0, OperationKind::Sketch, "nope", &()).unwrap();
        assert!(matches!(
            registry.start(&command, &datasets()),
            Err(HillviewError::Config(_))
        ));
        // Registered as a sketch, not as a map.
        let mut registry = OperationRegistry::new();
        registry.register_sketch::<Vec<i64>, Len>();
        let command = Command::new(0, OperationKind::Map, type_name::<Len>(), &Len).unwrap();
        assert!(registry.start(&command, &datasets()).is_err());
    }
}
