//! Datasets held by another worker, addressed by handle.

use std::any::type_name;
use std::marker::PhantomData;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::future;
use futures::stream::{self, Stream, StreamExt};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info};
use uuid::Uuid;

use hillview_types::error::{HillviewError, Result};

use crate::api::{Map, Sketch, Zipped};
use crate::control::{ControlMessage, StatusList};
use crate::dataset::DataSet;
use crate::partial::{stop_after_error, PartialResult, PartialStream};
use crate::wire::{Command, OperationKind, ResponseStream, WorkerClient};

/// Tag under which management commands travel.
pub const MANAGE_TAG: &str = "manage";

/// Tag of the zip operation pairing `T` and `S` partitions.
pub fn zip_tag<T, S>() -> String {
    type_name::<Zipped<T, S>>().to_string()
}

pub struct RemoteDataSet<T> {
    client: Arc<dyn WorkerClient>,
    handle: usize,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Clone for RemoteDataSet<T> {
    fn clone(&self) -> Self {
        RemoteDataSet {
            client: self.client.clone(),
            handle: self.handle,
            _marker: PhantomData,
        }
    }
}

impl<T> RemoteDataSet<T> {
    pub fn new(client: Arc<dyn WorkerClient>, handle: usize) -> Self {
        RemoteDataSet {
            client,
            handle,
            _marker: PhantomData,
        }
    }

    pub fn handle(&self) -> usize {
        self.handle
    }

    pub fn address(&self) -> &str {
        self.client.address()
    }

    pub fn client(&self) -> &Arc<dyn WorkerClient> {
        &self.client
    }

    /// Send `command` and decode each response as `PartialResult<R>`.
    fn execute<R>(&self, command: Result<Command>) -> PartialStream<R>
    where
        R: DeserializeOwned + Send + 'static,
    {
        let command = match command {
            Ok(c) => c,
            Err(e) => return Box::pin(stream::once(future::ready(Err(e)))),
        };
        info!(
            "Invoking {:?} {} on {}#{} as {}",
            command.op,
            command.tag,
            self.address(),
            self.handle,
            command.id
        );
        let address = self.address().to_string();
        let responses = Unsubscribing {
            id: command.id,
            inner: self.client.execute(command),
            client: self.client.clone(),
            completed: false,
        };
        let decoded = responses.map({
            let address = address.clone();
            move |item| {
                item.and_then(|r| r.decode::<R>())
                    .map_err(|e| with_address(e, &address))
            }
        });
        stop_after_error(require_completion(Box::pin(decoded), address))
    }

    fn map_like<S, O>(
        &self,
        op: OperationKind,
        tag: String,
        operation: &O,
    ) -> PartialStream<Option<DataSet<S>>>
    where
        S: Send + Sync + 'static,
        O: Serialize,
    {
        let client = self.client.clone();
        let command = Command::new(self.handle, op, &tag, operation);
        let responses = self.execute::<Option<usize>>(command);
        Box::pin(responses.map(move |item| {
            item.map(|p| {
                p.map_value(|h| h.map(|h| DataSet::Remote(RemoteDataSet::new(client.clone(), h))))
            })
        }))
    }
}

impl<T: Send + Sync + 'static> RemoteDataSet<T> {
    pub fn sketch<S>(&self, sketch: Arc<S>) -> PartialStream<S::Output>
    where
        S: Sketch<T> + Serialize,
        S::Output: Serialize + DeserializeOwned,
    {
        self.execute(Command::new(
            self.handle,
            OperationKind::Sketch,
            type_name::<S>(),
            &*sketch,
        ))
    }

    pub fn map<S, M>(&self, mapper: Arc<M>) -> PartialStream<Option<DataSet<S>>>
    where
        S: Send + Sync + 'static,
        M: Map<T, S> + Serialize,
    {
        self.map_like(OperationKind::Map, type_name::<M>().to_string(), &*mapper)
    }

    pub fn flat_map<S, M>(&self, mapper: Arc<M>) -> PartialStream<Option<DataSet<S>>>
    where
        S: Send + Sync + 'static,
        M: Map<T, Vec<S>> + Serialize,
    {
        self.map_like(OperationKind::FlatMap, type_name::<M>().to_string(), &*mapper)
    }

    /// Both datasets must live on the same worker.
    pub fn zip<S>(&self, other: &DataSet<S>) -> PartialStream<Option<DataSet<Zipped<T, S>>>>
    where
        S: Send + Sync + 'static,
    {
        match other {
            DataSet::Remote(o) if o.address() == self.address() => self.map_like(
                OperationKind::Zip { other: o.handle },
                zip_tag::<T, S>(),
                &(),
            ),
            DataSet::Remote(o) => Box::pin(stream::once(future::ready(Err(
                HillviewError::Type(format!(
                    "Cannot zip datasets on different workers {} and {}",
                    self.address(),
                    o.address()
                )),
            )))),
            _ => Box::pin(stream::once(future::ready(Err(HillviewError::Type(
                format!("Cannot zip a remote dataset with a {} one", other.kind_name()),
            ))))),
        }
    }

    pub fn manage(&self, message: ControlMessage) -> PartialStream<StatusList> {
        self.execute(Command::new(
            self.handle,
            OperationKind::Manage,
            MANAGE_TAG,
            &message,
        ))
    }
}

/// Slack allowed when summing the `delta_done`s of a finished stream.
const COMPLETION_TOLERANCE: f64 = 1e-6;

/// Append an error if `input` ends before its progress reaches one, as
/// happens when a worker loses the task computing it.
fn require_completion<R: Send + 'static>(
    input: PartialStream<R>,
    address: String,
) -> PartialStream<R> {
    let done = Arc::new(Mutex::new(0.0f64));
    let seen = done.clone();
    let tracked = input.inspect(move |item| {
        if let Ok(p) = item {
            *seen.lock() += p.delta_done;
        }
    });
    let tail = stream::once(async move {
        let total = *done.lock();
        let missing: Option<Result<PartialResult<R>>> = if total < 1.0 - COMPLETION_TOLERANCE {
            Some(Err(HillviewError::Execution(format!(
                "{}: responses ended at {:.3} of the work",
                address, total
            ))))
        } else {
            None
        };
        missing
    })
    .filter_map(future::ready);
    Box::pin(tracked.chain(tail))
}

fn with_address(error: HillviewError, address: &str) -> HillviewError {
    match error {
        e @ (HillviewError::DatasetMissing { .. } | HillviewError::Cancelled) => e,
        e => HillviewError::Remote(format!("{}: {}", address, e)),
    }
}

/// Response stream that tells the worker to stop if dropped before the
/// worker finished.
struct Unsubscribing {
    id: Uuid,
    inner: ResponseStream,
    client: Arc<dyn WorkerClient>,
    completed: bool,
}

impl Stream for Unsubscribing {
    type Item = <ResponseStream as Stream>::Item;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let item = self.inner.as_mut().poll_next(cx);
        if let Poll::Ready(None) = item {
            self.completed = true;
        }
        item
    }
}

impl Drop for Unsubscribing {
    fn drop(&mut self) {
        if !self.completed {
            debug!("Unsubscribing {} on {}", self.id, self.client.address());
            self.client.unsubscribe(self.id);
        }
    }
}
