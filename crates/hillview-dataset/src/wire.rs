//! Commands and responses exchanged with remote workers, and the
//! transport boundary.

use std::fmt::Debug;
use std::pin::Pin;

use futures::stream::Stream;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use hillview_types::error::Result;

use crate::partial::PartialResult;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OperationKind {
    Map,
    FlatMap,
    Sketch,
    /// Zip the target dataset with the `other` handle on the same worker.
    Zip { other: usize },
    Manage,
}

/// One operation applied to the dataset `handle` on a worker.
///
/// `tag` names the concrete operation type so the worker can pick a
/// decoder; `payload` is its bincode encoding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Command {
    pub id: Uuid,
    pub handle: usize,
    pub op: OperationKind,
    pub tag: String,
    pub payload: Vec<u8>,
}

impl Command {
    pub fn new<O: Serialize>(handle: usize, op: OperationKind, tag: &str, operation: &O) -> Result<Self> {
        Ok(Command {
            id: Uuid::new_v4(),
            handle,
            op,
            tag: tag.to_string(),
            payload: bincode::serialize(operation)?,
        })
    }

    /// Bytes identifying the operation independent of its id and target.
    pub fn memo_key(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(&(&self.op, &self.tag, &self.payload))?)
    }

    pub fn decode_payload<O: DeserializeOwned>(&self) -> Result<O> {
        Ok(bincode::deserialize(&self.payload)?)
    }
}

/// One encoded [`PartialResult`]. Map-like operations carry
/// `Option<usize>` handles; sketches carry their output type; manage
/// carries a `StatusList`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartialResponse {
    pub payload: Vec<u8>,
}

impl PartialResponse {
    pub fn encode<R: Serialize>(partial: &PartialResult<R>) -> Result<Self> {
        Ok(PartialResponse {
            payload: bincode::serialize(partial)?,
        })
    }

    pub fn decode<R: DeserializeOwned>(&self) -> Result<PartialResult<R>> {
        Ok(bincode::deserialize(&self.payload)?)
    }
}

pub type ResponseStream = Pin<Box<dyn Stream<Item = Result<PartialResponse>> + Send>>;

/// Connection to one worker.
pub trait WorkerClient: Send + Sync + Debug {
    fn address(&self) -> &str;

    fn execute(&self, command: Command) -> ResponseStream;

    /// Ask the worker to stop computing `id`. Unknown ids are ignored.
    fn unsubscribe(&self, id: Uuid);
}
