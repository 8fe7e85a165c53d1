//! In-process transport to a [`HillviewServer`].

use uuid::Uuid;

use hillview_dataset::wire::{Command, ResponseStream, WorkerClient};

use crate::server::HillviewServer;

/// A [`WorkerClient`] that hands commands straight to a server in the same
/// process.
#[derive(Debug, Clone)]
pub struct LocalWorkerClient {
    server: HillviewServer,
}

impl LocalWorkerClient {
    pub fn new(server: HillviewServer) -> Self {
        LocalWorkerClient { server }
    }

    pub fn server(&self) -> &HillviewServer {
        &self.server
    }
}

impl WorkerClient for LocalWorkerClient {
    fn address(&self) -> &str {
        self.server.address()
    }

    fn execute(&self, command: Command) -> ResponseStream {
        self.server.execute(command)
    }

    fn unsubscribe(&self, id: Uuid) {
        self.server.unsubscribe(id)
    }
}
