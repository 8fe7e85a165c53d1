//! Dataset trees that reach workers through `LocalWorkerClient`.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use pretty_assertions::assert_eq;
use serde::{Deserialize, Serialize};

use hillview_dataset::api::{Map, Sketch, Zipped};
use hillview_dataset::control::{ControlMessage, StatusList};
use hillview_dataset::dataset::DataSet;
use hillview_dataset::partial::{fold_stream, last_value, PartialResult};
use hillview_dataset::remote::RemoteDataSet;
use hillview_server::{HillviewServer, LocalWorkerClient, OperationRegistry};
use hillview_sketch::{Buckets, Histogram, HistogramSketch, LinearProjectionMap, NumericBuckets};
use hillview_table::column::{ArrayColumn, Column};
use hillview_table::table::Table;
use hillview_types::error::{HillviewError, Result};

/// Splits a partition into its even and odd rows.
#[derive(Serialize, Deserialize)]
struct Halves;

impl Map<Table, Vec<Table>> for Halves {
    fn apply(&self, data: &Table) -> Result<Vec<Table>> {
        Ok(vec![data.filter(|r| r % 2 == 0), data.filter(|r| r % 2 == 1)])
    }
}

/// Rows on both sides of a zipped partition.
#[derive(Serialize, Deserialize)]
struct PairedRows;

impl Sketch<Zipped<Table, Table>> for PairedRows {
    type Output = (u64, u64);

    fn zero(&self) -> (u64, u64) {
        (0, 0)
    }

    fn create(&self, data: &Zipped<Table, Table>) -> Result<(u64, u64)> {
        Ok((data.first.num_rows() as u64, data.second.num_rows() as u64))
    }

    fn add(&self, left: &(u64, u64), right: &(u64, u64)) -> Result<(u64, u64)> {
        Ok((left.0 + right.0, left.1 + right.1))
    }
}

/// Row count that takes its time.
#[derive(Serialize, Deserialize)]
struct SlowCount;

impl Sketch<Table> for SlowCount {
    type Output = u64;

    fn zero(&self) -> u64 {
        0
    }

    fn create(&self, data: &Table) -> Result<u64> {
        std::thread::sleep(Duration::from_millis(1000));
        Ok(data.num_rows() as u64)
    }

    fn add(&self, left: &u64, right: &u64) -> Result<u64> {
        Ok(left + right)
    }
}

fn registry() -> OperationRegistry {
    let mut registry = OperationRegistry::new();
    registry
        .register_sketch::<Table, HistogramSketch>()
        .register_sketch::<Table, SlowCount>()
        .register_sketch::<Zipped<Table, Table>, PairedRows>()
        .register_map::<Table, Table, LinearProjectionMap>()
        .register_flat_map::<Table, Table, Halves>()
        .register_zip::<Table, Table>();
    registry
}

fn partition(start: i32, len: i32) -> Table {
    let column = ArrayColumn::from_ints("x", (start..start + len).collect());
    Table::from_columns(vec![Arc::new(column) as Arc<dyn Column>]).unwrap()
}

/// A worker holding `parts` partitions of 250 rows each.
fn worker(address: &str, first: i32, parts: i32) -> (HillviewServer, DataSet<Table>) {
    let root = DataSet::parallel(
        (0..parts)
            .map(|p| DataSet::local(partition(first + p * 250, 250)))
            .collect(),
    );
    let server = HillviewServer::new(address, registry(), root);
    let client = Arc::new(LocalWorkerClient::new(server.clone()));
    (server, DataSet::Remote(RemoteDataSet::new(client, 0)))
}

fn histogram(column: &str) -> Arc<HistogramSketch> {
    let buckets = NumericBuckets::new(0.0, 4000.0, 4).unwrap();
    Arc::new(HistogramSketch::new(column, Buckets::Numeric(buckets)))
}

async fn manage(ds: &DataSet<Table>, message: ControlMessage) -> Vec<String> {
    let statuses: Vec<StatusList> = ds
        .manage(message)
        .map(|item| item.unwrap().delta_value)
        .collect()
        .await;
    statuses.into_iter().flat_map(|l| l.0).map(|s| s.result).collect()
}

async fn ensure_memoizing(server: &HillviewServer, ds: &DataSet<Table>) {
    if !server.memoization_enabled() {
        manage(ds, ControlMessage::ToggleMemoization).await;
    }
    assert!(server.memoization_enabled());
}

fn remote_handle<T>(ds: &DataSet<T>) -> usize {
    match ds {
        DataSet::Remote(r) => r.handle(),
        other => panic!("expected a remote dataset, got {:?}", other),
    }
}

#[tokio::test]
async fn test_sketch_across_two_workers() {
    let (_, a) = worker("worker-a:3569", 0, 4);
    let (_, b) = worker("worker-b:3569", 1000, 4);
    let tree = DataSet::parallel(vec![a, b]);

    let h: Histogram = tree.blocking_sketch(histogram("x")).await.unwrap();
    assert_eq!(h.buckets, vec![1000, 1000, 0, 0]);
    assert_eq!(h.missing, 0);

    // Progress of the whole tree adds up to one.
    let done: f64 = tree
        .sketch(histogram("x"))
        .map(|item| item.unwrap().delta_done)
        .collect::<Vec<_>>()
        .await
        .iter()
        .sum();
    assert!((done - 1.0).abs() < 1e-9);
}

#[tokio::test]
async fn test_map_returns_handles_and_is_memoized() {
    let (server, root) = worker("worker-m:3569", 0, 2);
    ensure_memoizing(&server, &root).await;
    let projection = Arc::new(
        LinearProjectionMap::new(vec!["x".to_string()], vec![vec![2.0]], "twice").unwrap(),
    );

    let mapped = root
        .blocking_map::<Table, _>(projection.clone())
        .await
        .unwrap()
        .unwrap();
    let handle = remote_handle(&mapped);
    assert_ne!(handle, 0);
    let h = mapped.blocking_sketch(histogram("twice0")).await.unwrap();
    assert_eq!(h.buckets, vec![500, 0, 0, 0]);

    let datasets = server.datasets().len();
    let again = root
        .blocking_map::<Table, _>(projection)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(remote_handle(&again), handle);
    assert_eq!(server.datasets().len(), datasets);

    // A memoized sketch comes back as a single complete result.
    let first = mapped.blocking_sketch(histogram("twice0")).await.unwrap();
    let replay: Vec<PartialResult<Histogram>> = mapped
        .sketch(histogram("twice0"))
        .map(|item| item.unwrap())
        .collect()
        .await;
    assert_eq!(replay, vec![PartialResult::new(1.0, first)]);
}

#[tokio::test]
async fn test_flat_map_and_zip_on_worker() {
    let (_, root) = worker("worker-z:3569", 0, 2);
    let halves = last_value(root.flat_map::<Table, _>(Arc::new(Halves)))
        .await
        .unwrap()
        .unwrap();
    let h = halves.blocking_sketch(histogram("x")).await.unwrap();
    assert_eq!(h.total(), 500);

    let zipped = last_value(root.zip(&root)).await.unwrap().unwrap();
    let rows = zipped.blocking_sketch(Arc::new(PairedRows)).await.unwrap();
    assert_eq!(rows, (500, 500));
}

#[tokio::test]
async fn test_delete_all_datasets() {
    let (server, root) = worker("worker-d:3569", 0, 2);
    let projection = Arc::new(
        LinearProjectionMap::new(vec!["x".to_string()], vec![vec![1.0]], "p").unwrap(),
    );
    let mapped = root
        .blocking_map::<Table, _>(projection)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(server.datasets().len(), 2);

    let results = manage(&root, ControlMessage::DeleteAllDatasets).await;
    assert_eq!(results, vec!["deleted 1 datasets".to_string()]);
    assert_eq!(server.datasets().len(), 1);
    assert_eq!(server.memoized(), 0);

    let sketch = histogram("p0");
    let result = fold_stream(mapped.sketch(sketch.clone()), sketch.zero(), |a, b| {
        sketch.add(a, b)
    })
    .await;
    assert!(matches!(
        result,
        Err(HillviewError::DatasetMissing { index, .. }) if index == remote_handle(&mapped)
    ));

    // The root survives.
    assert_eq!(root.blocking_sketch(histogram("x")).await.unwrap().total(), 500);
}

#[tokio::test]
async fn test_dropping_the_stream_unsubscribes() {
    let (server, root) = worker("worker-u:3569", 0, 2);
    let mut stream = root.sketch(Arc::new(SlowCount));
    let first = stream.next().await.unwrap().unwrap();
    assert_eq!(first.delta_value, 0);
    assert_eq!(server.running(), 1);
    drop(stream);
    assert_eq!(server.running(), 0);

    tokio::time::sleep(Duration::from_millis(1200)).await;
    assert_eq!(server.memoized(), 0);
}

#[tokio::test]
async fn test_unregistered_operation_is_reported() {
    #[derive(Serialize, Deserialize)]
    struct Unknown;

    impl Sketch<Table> for Unknown {
        type Output = u64;

        fn zero(&self) -> u64 {
            0
        }

        fn create(&self, _: &Table) -> Result<u64> {
            Ok(1)
        }

        fn add(&self, left: &u64, right: &u64) -> Result<u64> {
            Ok(left + right)
        }
    }

    let (_, root) = worker("worker-x:3569", 0, 1);
    let err = root.blocking_sketch(Arc::new(Unknown)).await.unwrap_err();
    match err {
        HillviewError::Remote(message) => {
            assert!(message.starts_with("worker-x:3569"));
            assert!(message.contains("registered"));
        }
        other => panic!("unexpected error {:?}", other),
    }
}

/// Sum that panics when asked to merge two non-empty totals.
#[derive(Serialize, Deserialize)]
struct PanickingSum;

impl Sketch<Vec<i64>> for PanickingSum {
    type Output = i64;

    fn zero(&self) -> i64 {
        0
    }

    fn create(&self, data: &Vec<i64>) -> Result<i64> {
        Ok(data.iter().sum())
    }

    fn add(&self, left: &i64, right: &i64) -> Result<i64> {
        if *left != 0 && *right != 0 {
            panic!("refusing to add {} and {}", left, right);
        }
        Ok(left + right)
    }
}

#[tokio::test]
async fn test_worker_panic_is_an_error() {
    let mut registry = OperationRegistry::new();
    registry.register_sketch::<Vec<i64>, PanickingSum>();
    let root = DataSet::parallel(vec![DataSet::local(vec![1i64, 2]), DataSet::local(vec![10i64])]);
    let server = HillviewServer::new("worker-p:3569", registry, root);
    let client = Arc::new(LocalWorkerClient::new(server.clone()));
    let remote: DataSet<Vec<i64>> = DataSet::Remote(RemoteDataSet::new(client, 0));

    let err = remote.blocking_sketch(Arc::new(PanickingSum)).await.unwrap_err();
    match err {
        HillviewError::Remote(message) => {
            assert!(message.starts_with("worker-p:3569"));
            assert!(message.contains("panicked"));
        }
        other => panic!("unexpected error {:?}", other),
    }
    assert_eq!(server.running(), 0);
    assert_eq!(server.memoized(), 0);
}
