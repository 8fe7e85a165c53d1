//! Management messages broadcast through a dataset tree.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::info;

use hillview_types::error::{HillviewError, Result};

use crate::api::Monoid;
use crate::parallel::ParallelDataSet;

/// Administrative actions. Each node of a dataset tree applies the part
/// that concerns it and reports one [`Status`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ControlMessage {
    ToggleMemoization,
    PurgeMemoization,
    DeleteAllDatasets,
    /// New bundling interval for every parallel dataset, in milliseconds.
    SetBundleInterval(u64),
}

/// Operations a worker exposes to management messages.
pub trait ServerControl: Send + Sync {
    /// Flip memoization, returning the new state.
    fn toggle_memoization(&self) -> Result<bool>;

    /// Drop every memoized response, returning how many there were.
    fn purge_memoized(&self) -> Result<usize>;

    /// Forget every dataset handle, returning how many there were.
    fn delete_all_datasets(&self) -> Result<usize>;
}

/// Outcome of one node's action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Status {
    pub hostname: String,
    pub result: String,
    pub exception: Option<String>,
}

impl Status {
    pub fn ok(result: impl Into<String>) -> Self {
        Status {
            hostname: hillview_config::get_host_name().to_string(),
            result: result.into(),
            exception: None,
        }
    }

    pub fn failed(error: &HillviewError) -> Self {
        Status {
            hostname: hillview_config::get_host_name().to_string(),
            result: "Exception".to_string(),
            exception: Some(error.to_string()),
        }
    }

    fn from_result(result: Result<String>) -> Self {
        match result {
            Ok(r) => Status::ok(r),
            Err(e) => Status::failed(&e),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusList(pub Vec<Status>);

impl StatusList {
    pub fn single(status: Status) -> Self {
        StatusList(vec![status])
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(&self.0).map_err(|e| HillviewError::Serialization(e.to_string()))
    }
}

/// Concatenation.
pub struct StatusListMonoid;

impl Monoid<StatusList> for StatusListMonoid {
    fn zero(&self) -> StatusList {
        StatusList::default()
    }

    fn add(&self, left: &StatusList, right: &StatusList) -> Result<StatusList> {
        let mut all = left.0.clone();
        all.extend(right.0.iter().cloned());
        Ok(StatusList(all))
    }
}

impl ControlMessage {
    /// Local datasets hold no state that management messages touch.
    pub fn local_action(&self) -> Option<Status> {
        None
    }

    pub fn parallel_action<T>(&self, dataset: &ParallelDataSet<T>) -> Option<Status> {
        match self {
            ControlMessage::SetBundleInterval(ms) => {
                dataset.set_bundle_interval(Duration::from_millis(*ms));
                Some(Status::ok(format!("bundle interval set to {}ms", ms)))
            }
            _ => None,
        }
    }

    pub fn remote_server_action(&self, server: &dyn ServerControl) -> Option<Status> {
        let status = match self {
            ControlMessage::ToggleMemoization => Status::from_result(
                server
                    .toggle_memoization()
                    .map(|on| format!("memoization {}", if on { "on" } else { "off" })),
            ),
            ControlMessage::PurgeMemoization => Status::from_result(
                server
                    .purge_memoized()
                    .map(|n| format!("purged {} memoized results", n)),
            ),
            ControlMessage::DeleteAllDatasets => Status::from_result(
                server
                    .delete_all_datasets()
                    .map(|n| format!("deleted {} datasets", n)),
            ),
            ControlMessage::SetBundleInterval(_) => return None,
        };
        info!("Applied {:?}: {}", self, status.result);
        Some(status)
    }
}
