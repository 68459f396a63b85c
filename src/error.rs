//! Error kinds callers branch on.
//!
//! Everything else travels as `anyhow::Error` with context attached at the
//! I/O boundary.

use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("min_breadth must be a percentage within 0..=100, got {0}")]
    Breadth(f64),
    #[error("min_median_coverage must be positive and finite, got {0}")]
    MedianCoverage(f64),
    #[error("thread count must be at least 1")]
    Threads,
    #[error("sort buffer must hold at least 1 record")]
    SortBuffer,
}

/// Inconsistent alignment data for one sample
#[derive(Debug, Error, PartialEq)]
pub enum SampleError {
    #[error("record {record}: contig '{contig}' is not part of the reference set")]
    UnknownContig { record: String, contig: String },

    #[error("record {record}: range {start}..{end} lies outside contig '{contig}' of length {length}")]
    OutOfRange {
        record: String,
        contig: String,
        start: u64,
        end: u64,
        length: u64,
    },

    #[error("header declares contig '{contig}' with length {declared}, reference has {actual}")]
    HeaderLength {
        contig: String,
        declared: u64,
        actual: u64,
    },
}

/// Failures that abort a whole reference-set invocation
#[derive(Debug, Error, PartialEq)]
pub enum EngineError {
    #[error("reference set {reference_id}: sample {sample} declares a contig list that differs from sample {first}")]
    InconsistentContigs {
        reference_id: String,
        sample: String,
        first: String,
    },

    #[error("reference set {reference_id}: invocation cancelled")]
    Cancelled { reference_id: String },

    #[error("reference set {reference_id}: sample id {sample} is given more than once")]
    DuplicateSample { reference_id: String, sample: String },

    #[error("reference set {reference_id}: samples mix alignment formats ({first} and {other})")]
    MixedFormats {
        reference_id: String,
        first: String,
        other: String,
    },
}
