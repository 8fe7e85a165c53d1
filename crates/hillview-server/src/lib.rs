//! Worker side of the distributed dataset protocol.
//!
//! A [`HillviewServer`] owns the datasets of one worker, addressed by
//! integer handles, and executes the commands that
//! [`RemoteDataSet`](hillview_dataset::RemoteDataSet)s send it. Operations
//! are decoded through an [`OperationRegistry`] and completed results
//! can be replayed from a memoization cache.

pub mod client;
pub mod datasets;
pub mod logging;
pub mod memo;
pub mod registry;
pub mod server;

pub use client::LocalWorkerClient;
pub use datasets::{DatasetTable, ROOT_HANDLE};
pub use memo::MemoCache;
pub use registry::{Execution, OperationRegistry};
pub use server::HillviewServer;
