// Library exports for pancov
pub mod alignment_io;
pub mod bam;
pub mod cigar;
pub mod config;
pub mod contigs;
pub mod coverage;
pub mod depth;
pub mod downsample;
pub mod engine;
pub mod error;
pub mod filter;
pub mod merge;
pub mod planner;
pub mod record;
pub mod reference;
pub mod report;
pub mod resources;
pub mod sam;

pub use config::EngineConfig;
pub use engine::{CancelToken, Engine, EngineRun, Evaluation, RunOutcome, SampleInput};
pub use error::{ConfigError, EngineError, SampleError};
pub use merge::{MergedResult, OutputSpec};
pub use reference::{ReferenceKind, ReferenceSet};
