//! Principal components of a partitioned 10000 × 30 table driven by three
//! hidden factors.

use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use hillview_dataset::dataset::DataSet;
use hillview_sketch::{
    Buckets, FullCorrelationSketch, HistogramSketch, NumericBuckets,
};
use hillview_table::column::{ArrayColumn, Column};
use hillview_table::table::Table;

const ROWS: usize = 10_000;
const COLUMNS: usize = 30;
const FACTORS: usize = 3;
const PARTITIONS: usize = 4;

fn column_names() -> Vec<String> {
    (0..COLUMNS).map(|c| format!("c{}", c)).collect()
}

fn partitions() -> Vec<Table> {
    let mut rng = StdRng::seed_from_u64(2017);
    let mut columns = vec![Vec::with_capacity(ROWS); COLUMNS];
    for _ in 0..ROWS {
        let factors: Vec<f64> = (0..FACTORS).map(|_| rng.gen_range(-1.0..1.0)).collect();
        for (c, column) in columns.iter_mut().enumerate() {
            let noise: f64 = rng.gen_range(-0.1..0.1);
            column.push(factors[c % FACTORS] + noise);
        }
    }
    let per_partition = ROWS / PARTITIONS;
    (0..PARTITIONS)
        .map(|p| {
            let range = p * per_partition..(p + 1) * per_partition;
            let cols = columns
                .iter()
                .zip(column_names())
                .map(|(values, name)| {
                    Arc::new(ArrayColumn::from_doubles(&name, values[range.clone()].to_vec()))
                        as Arc<dyn Column>
                })
                .collect();
            Table::from_columns(cols).unwrap()
        })
        .collect()
}

fn dataset() -> DataSet<Table> {
    DataSet::parallel(partitions().into_iter().map(DataSet::local).collect())
}

#[tokio::test]
async fn test_three_factors_dominate() {
    let ds = dataset();
    let corr = ds
        .blocking_sketch(Arc::new(FullCorrelationSketch::new(column_names())))
        .await
        .unwrap();
    assert_eq!(corr.count, ROWS as u64);

    // Columns sharing a factor are almost perfectly correlated.
    assert!(corr.correlation("c0", "c3").unwrap() > 0.95);
    assert!(corr.correlation("c0", "c1").unwrap().abs() < 0.1);

    let (values, _) = corr.eigen();
    let top: f64 = values[..FACTORS].iter().sum();
    assert!(top / COLUMNS as f64 > 0.95, "top eigenvalues {:?}", &values[..4]);
    assert!(values[FACTORS] < 0.5);
}

#[tokio::test]
async fn test_projection_adds_uncorrelated_components() {
    let ds = dataset();
    let corr = ds
        .blocking_sketch(Arc::new(FullCorrelationSketch::new(column_names())))
        .await
        .unwrap();
    let projection = corr.eigen_vector_projection(FACTORS).unwrap();
    assert_eq!(projection.new_names(), ["PCA0", "PCA1", "PCA2"]);

    let projected = ds
        .blocking_map::<Table, _>(Arc::new(projection))
        .await
        .unwrap()
        .unwrap();

    let components: Vec<String> = (0..FACTORS).map(|i| format!("PCA{}", i)).collect();
    let pc = projected
        .blocking_sketch(Arc::new(FullCorrelationSketch::new(components)))
        .await
        .unwrap();
    assert!(pc.correlation("PCA0", "PCA1").unwrap().abs() < 0.1);
    assert!(pc.correlation("PCA1", "PCA2").unwrap().abs() < 0.1);

    let buckets = Buckets::Numeric(NumericBuckets::new(-100.0, 100.0, 10).unwrap());
    let h = projected
        .blocking_sketch(Arc::new(HistogramSketch::new("PCA0", buckets)))
        .await
        .unwrap();
    assert_eq!(h.total(), ROWS as u64);
    assert_eq!(h.missing, 0);
}

#[tokio::test]
async fn test_principal_vector_follows_linear_pair() {
    // c1 is almost a multiple of c0; every other column is independent.
    let mut rng = StdRng::seed_from_u64(11);
    let mut columns = vec![Vec::with_capacity(ROWS); COLUMNS];
    for _ in 0..ROWS {
        let base: f64 = rng.gen_range(-1.0..1.0);
        columns[0].push(base);
        columns[1].push(2.0 * base + rng.gen_range(-0.05..0.05));
        for column in columns.iter_mut().skip(2) {
            column.push(rng.gen_range(-1.0..1.0));
        }
    }
    let names = column_names();
    let table = Table::from_columns(
        columns
            .into_iter()
            .zip(&names)
            .map(|(values, name)| Arc::new(ArrayColumn::from_doubles(name, values)) as Arc<dyn Column>)
            .collect(),
    )
    .unwrap();
    let ds = DataSet::parallel(
        (0..PARTITIONS)
            .map(|p| DataSet::local(table.filter(|r| r % PARTITIONS == p)))
            .collect(),
    );
    let corr = ds
        .blocking_sketch(Arc::new(FullCorrelationSketch::new(names)))
        .await
        .unwrap();
    let principal = &corr.eigen_vectors(1).unwrap()[0];
    let others = principal[2..].iter().fold(0.0f64, |m, v| m.max(v.abs()));
    assert!(principal[0].abs() > 3.0 * others, "{:?}", principal);
    assert!(principal[1].abs() > 3.0 * others, "{:?}", principal);
}
