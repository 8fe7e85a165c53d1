//! Mergeable summaries of tables: every sketch here is computed per
//! partition and combined with an associative, commutative `add`.

pub mod corr_matrix;
pub mod correlation;
pub mod decomposition;
pub mod exact_freq;
pub mod freq_k;
pub mod histogram;
pub mod hll;
pub mod jl;
pub mod laplace;
pub mod private_histogram;
pub mod projection;
pub mod sample_quantile;

pub use corr_matrix::CorrMatrix;
pub use correlation::{FullCorrelationSketch, SampleCorrelationSketch};
pub use decomposition::{
    dyadic_decomposition, kadic_decomposition, IntervalDecomposition,
    NumericIntervalDecomposition,
};
pub use exact_freq::{ExactFreqList, ExactFreqSketch};
pub use freq_k::{FreqKList, FreqKSketch};
pub use histogram::{Buckets, Histogram, HistogramSketch, NumericBuckets, StringBuckets};
pub use hll::{HLogLog, HLogLogSketch};
pub use jl::{JLProjection, JLSketch};
pub use laplace::SecureLaplace;
pub use private_histogram::PrivateHistogram;
pub use projection::LinearProjectionMap;
pub use sample_quantile::{SampleList, SampleQuantileSketch};
