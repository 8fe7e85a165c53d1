//! The worker side of remote datasets.

use std::any::Any;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use dashmap::DashMap;
use futures::channel::{mpsc, oneshot};
use futures::future::{self, FutureExt};
use futures::stream::{self, StreamExt};
use tokio::task::AbortHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use hillview_dataset::control::{ControlMessage, ServerControl, StatusList};
use hillview_dataset::dataset::DataSet;
use hillview_dataset::partial::PartialResult;
use hillview_dataset::wire::{Command, OperationKind, PartialResponse, ResponseStream};
use hillview_types::error::{HillviewError, Result};

use crate::datasets::DatasetTable;
use crate::memo::{MemoCache, MemoKey};
use crate::registry::{Execution, OperationRegistry};

struct ServerState {
    datasets: Arc<DatasetTable>,
    memo: MemoCache,
    registry: OperationRegistry,
    /// Drivers of in-flight commands, by command id.
    operations: DashMap<Uuid, AbortHandle>,
}

impl ServerControl for ServerState {
    fn toggle_memoization(&self) -> Result<bool> {
        let on = self.memo.toggle();
        info!("Memoization on {} is now {}", self.datasets.address(), on);
        Ok(on)
    }

    fn purge_memoized(&self) -> Result<usize> {
        Ok(self.memo.purge())
    }

    fn delete_all_datasets(&self) -> Result<usize> {
        let removed = self.datasets.clear();
        self.memo.purge();
        Ok(removed)
    }
}

/// Executes commands against the datasets of one worker.
///
/// Each command runs on its own task and streams its partial results back
/// through a channel, so a dropped or unsubscribed caller stops the work.
/// Must be used from within a Tokio runtime.
#[derive(Clone)]
pub struct HillviewServer {
    state: Arc<ServerState>,
}

impl fmt::Debug for HillviewServer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HillviewServer")
            .field("address", &self.address())
            .field("datasets", &self.state.datasets.len())
            .field("memoized", &self.state.memo.len())
            .finish()
    }
}

impl HillviewServer {
    /// A server whose handle 0 is `root`.
    pub fn new<T: Send + Sync + 'static>(
        address: impl Into<String>,
        registry: OperationRegistry,
        root: DataSet<T>,
    ) -> Self {
        Self::with_datasets(DatasetTable::new(address), registry, root)
    }

    pub fn with_datasets<T: Send + Sync + 'static>(
        datasets: DatasetTable,
        registry: OperationRegistry,
        root: DataSet<T>,
    ) -> Self {
        datasets.set_root(root);
        info!(
            "Server {} ready with {} registered operations",
            datasets.address(),
            registry.len()
        );
        HillviewServer {
            state: Arc::new(ServerState {
                datasets: Arc::new(datasets),
                memo: MemoCache::new(hillview_config::get_memoize()),
                registry,
                operations: DashMap::new(),
            }),
        }
    }

    pub fn address(&self) -> &str {
        self.state.datasets.address()
    }

    pub fn datasets(&self) -> &DatasetTable {
        &self.state.datasets
    }

    pub fn memoization_enabled(&self) -> bool {
        self.state.memo.is_enabled()
    }

    pub fn memoized(&self) -> usize {
        self.state.memo.len()
    }

    /// Commands still being computed.
    pub fn running(&self) -> usize {
        self.state.operations.len()
    }

    pub fn execute(&self, command: Command) -> ResponseStream {
        info!(
            "Executing {:?} {} on {}#{} as {}",
            command.op,
            command.tag,
            self.address(),
            command.handle,
            command.id
        );
        if let Some(response) = self.state.memoized(&command) {
            info!("Replaying memoized result for {}", command.id);
            return Box::pin(stream::once(future::ready(Ok(response))));
        }
        let (sender, receiver) = mpsc::unbounded();
        let (start, started) = oneshot::channel::<()>();
        let id = command.id;
        let state = self.state.clone();
        let task = tokio::spawn(async move {
            // Registered in `operations` before the driver runs.
            if started.await.is_err() {
                return;
            }
            let failures = sender.clone();
            let driven = AssertUnwindSafe(state.drive(command, sender))
                .catch_unwind()
                .await;
            if let Err(panic) = driven {
                let message = panic_message(panic.as_ref());
                error!("Operation {} panicked: {}", id, message);
                let _ = failures.unbounded_send(Err(HillviewError::Execution(format!(
                    "operation panicked: {}",
                    message
                ))));
            }
            state.operations.remove(&id);
        });
        self.state.operations.insert(id, task.abort_handle());
        let _ = start.send(());
        Box::pin(receiver)
    }

    /// Stop computing `id`. Unknown or finished ids are ignored.
    pub fn unsubscribe(&self, id: Uuid) {
        match self.state.operations.remove(&id) {
            Some((_, task)) => {
                info!("Unsubscribing {} on {}", id, self.address());
                task.abort();
            }
            None => debug!("Unsubscribe of unknown operation {}", id),
        }
    }
}

impl ServerState {
    fn memo_key(command: &Command) -> Option<MemoKey> {
        if command.op == OperationKind::Manage {
            return None;
        }
        match command.memo_key() {
            Ok(bytes) => Some((bytes, command.handle)),
            Err(e) => {
                warn!("Cannot memoize {}: {}", command.id, e);
                None
            }
        }
    }

    fn memoized(&self, command: &Command) -> Option<PartialResponse> {
        let key = Self::memo_key(command)?;
        self.memo.get(&key, &self.datasets)
    }

    fn start(&self, command: &Command) -> Result<Execution> {
        match command.op {
            OperationKind::Manage => self.manage(command),
            _ => self.registry.start(command, &self.datasets),
        }
    }

    /// The server's own status first, then the dataset tree's.
    fn manage(&self, command: &Command) -> Result<Execution> {
        let message: ControlMessage = command.decode_payload()?;
        // Resolved before the action, which may delete it.
        let tree = self.datasets.manager(command.handle)?;
        let own = StatusList(message.remote_server_action(self).into_iter().collect());
        let first = stream::once(future::ready(Ok(PartialResult::new(0.0, own))));
        let responses = first
            .chain(tree(message))
            .map(|item| item.and_then(|p| PartialResponse::encode(&p)));
        Ok(Execution {
            responses: Box::pin(responses),
            summary: None,
        })
    }

    async fn drive(
        &self,
        command: Command,
        sender: mpsc::UnboundedSender<Result<PartialResponse>>,
    ) {
        let Execution {
            mut responses,
            summary,
        } = match self.start(&command) {
            Ok(execution) => execution,
            Err(e) => {
                error!("Cannot start {}: {}", command.id, e);
                let _ = sender.unbounded_send(Err(e));
                return;
            }
        };
        while let Some(item) = responses.next().await {
            let failed = match &item {
                Ok(_) => false,
                Err(e) => {
                    warn!("Operation {} failed: {}", command.id, e);
                    true
                }
            };
            if sender.unbounded_send(item).is_err() {
                debug!("Caller of {} went away", command.id);
                return;
            }
            if failed {
                return;
            }
        }
        debug!("Completed {}", command.id);
        if let (Some(key), Some(summary)) = (Self::memo_key(&command), summary) {
            if self.memo.is_enabled() {
                match summary() {
                    Ok(entry) => self.memo.insert(key, entry),
                    Err(e) => warn!("Cannot memoize {}: {}", command.id, e),
                }
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
