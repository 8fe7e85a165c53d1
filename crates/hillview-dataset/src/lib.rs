//! Distributed datasets and the streaming partial-result protocol.
//!
//! A [`DataSet`] is a tree whose leaves hold data partitions, either in
//! this process or on remote workers. Operations fan out over the tree
//! and come back as streams of [`PartialResult`]s, so callers can render
//! progressively refined answers and cancel by dropping the stream.

pub mod api;
pub mod control;
pub mod dataset;
pub mod local;
pub mod parallel;
pub mod partial;
pub mod remote;
pub mod wire;

pub use api::{Map, Monoid, Sketch, Zipped};
pub use control::{ControlMessage, ServerControl, Status, StatusList};
pub use dataset::DataSet;
pub use local::LocalDataSet;
pub use parallel::ParallelDataSet;
pub use partial::{PartialResult, PartialStream};
pub use remote::RemoteDataSet;
pub use wire::{Command, OperationKind, PartialResponse, WorkerClient};
