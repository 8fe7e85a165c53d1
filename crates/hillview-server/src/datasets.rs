//! The worker's table of addressable datasets.

use std::any::{type_name, Any};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use parking_lot::Mutex;
use tracing::{debug, info};

use hillview_dataset::control::{ControlMessage, StatusList};
use hillview_dataset::dataset::DataSet;
use hillview_dataset::partial::PartialStream;
use hillview_types::error::{HillviewError, Result};

/// Handle of the dataset a worker starts with.
pub const ROOT_HANDLE: usize = 0;

type ManageFn = Arc<dyn Fn(ControlMessage) -> PartialStream<StatusList> + Send + Sync>;

struct Entry {
    /// Always a `DataSet<T>` for the `T` named by `type_name`.
    dataset: Arc<dyn Any + Send + Sync>,
    type_name: &'static str,
    manage: ManageFn,
    last_access: Mutex<Instant>,
}

impl Entry {
    fn new<T: Send + Sync + 'static>(dataset: DataSet<T>) -> Self {
        let for_manage = dataset.clone();
        Entry {
            dataset: Arc::new(dataset),
            type_name: type_name::<T>(),
            manage: Arc::new(move |message| for_manage.manage(message)),
            last_access: Mutex::new(Instant::now()),
        }
    }
}

/// `handle -> dataset` for every dataset this worker produced.
///
/// Entries other than the root are forgotten once unused for `expiry`.
pub struct DatasetTable {
    address: String,
    entries: DashMap<usize, Entry>,
    next_handle: AtomicUsize,
    expiry: Duration,
}

impl DatasetTable {
    pub fn new(address: impl Into<String>) -> Self {
        Self::with_expiry(address, hillview_config::get_dataset_expiry())
    }

    pub fn with_expiry(address: impl Into<String>, expiry: Duration) -> Self {
        DatasetTable {
            address: address.into(),
            entries: DashMap::new(),
            next_handle: AtomicUsize::new(ROOT_HANDLE + 1),
            expiry,
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn set_root<T: Send + Sync + 'static>(&self, dataset: DataSet<T>) {
        self.entries.insert(ROOT_HANDLE, Entry::new(dataset));
    }

    /// Publish `dataset` under a fresh handle.
    pub fn insert<T: Send + Sync + 'static>(&self, dataset: DataSet<T>) -> usize {
        let handle = self.next_handle.fetch_add(1, Ordering::Relaxed);
        debug!("Inserting {:?} as {}#{}", dataset, self.address, handle);
        self.entries.insert(handle, Entry::new(dataset));
        handle
    }

    fn missing(&self, handle: usize) -> HillviewError {
        HillviewError::DatasetMissing {
            index: handle,
            address: self.address.clone(),
        }
    }

    /// Touch `handle`, dropping it instead when it has expired.
    fn live<R>(&self, handle: usize, f: impl FnOnce(&Entry) -> R) -> Result<R> {
        {
            let entry = self.entries.get(&handle).ok_or_else(|| self.missing(handle))?;
            let mut last = entry.last_access.lock();
            if handle == ROOT_HANDLE || last.elapsed() <= self.expiry {
                *last = Instant::now();
                return Ok(f(entry.value()));
            }
        }
        // The shard guard must be released before removing.
        info!("Dataset {}#{} expired", self.address, handle);
        self.entries.remove(&handle);
        Err(self.missing(handle))
    }

    pub fn get<T: Send + Sync + 'static>(&self, handle: usize) -> Result<DataSet<T>> {
        self.live(handle, |entry| {
            entry
                .dataset
                .downcast_ref::<DataSet<T>>()
                .cloned()
                .ok_or_else(|| {
                    HillviewError::Type(format!(
                        "Dataset {} holds {}, not {}",
                        handle,
                        entry.type_name,
                        type_name::<T>()
                    ))
                })
        })?
    }

    pub(crate) fn manager(&self, handle: usize) -> Result<ManageFn> {
        self.live(handle, |entry| entry.manage.clone())
    }

    pub fn contains(&self, handle: usize) -> bool {
        self.live(handle, |_| ()).is_ok()
    }

    pub fn remove(&self, handle: usize) -> bool {
        let removed = self.entries.remove(&handle).is_some();
        if removed {
            info!("Removed dataset {}#{}", self.address, handle);
        }
        removed
    }

    /// Forget every dataset except the root; returns how many went.
    pub fn clear(&self) -> usize {
        let before = self.entries.len();
        self.entries.retain(|handle, _| *handle == ROOT_HANDLE);
        let removed = before - self.entries.len();
        info!("Deleted {} datasets on {}", removed, self.address);
        removed
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
