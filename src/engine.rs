//! Per-reference-set orchestration.
//!
//! Samples are profiled independently on a bounded thread pool, planned
//! together once every profile is done, downsampled independently again,
//! and merged once every accepted sample has been reduced.

use anyhow::{anyhow, Context, Result};
use rayon::prelude::*;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::alignment_io::{AlignmentFormat, AlignmentReader};
use crate::config::EngineConfig;
use crate::contigs::{select_contigs, QualifyingContigs};
use crate::coverage::{evaluate, SampleCoverageStats};
use crate::depth::DepthProfiler;
use crate::downsample::{Downsampler, ReducedAlignment, RunWriter};
use crate::error::EngineError;
use crate::filter::AlignmentFilter;
use crate::merge::{write_merged, MergedResult, OutputSpec};
use crate::planner::{plan_batch, DownsamplePlan, RejectReason};
use crate::reference::ReferenceSet;
use crate::report::SampleReport;
use crate::resources::{available_memory_bytes, concurrency_limit};

/// Records between cancellation checks while streaming a sample
const CANCEL_CHECK_INTERVAL: u64 = 4096;

/// One sample's alignment file
#[derive(Debug, Clone, PartialEq)]
pub struct SampleInput {
    pub sample_id: String,
    pub path: PathBuf,
}

impl SampleInput {
    pub fn new(sample_id: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        SampleInput {
            sample_id: sample_id.into(),
            path: path.into(),
        }
    }

    /// `ID=PATH`, or a bare path whose file name without alignment
    /// extensions becomes the id (`reads/S1.sam.gz` -> `S1`)
    pub fn parse(arg: &str) -> Self {
        if let Some((id, path)) = arg.split_once('=') {
            if !id.is_empty() && !id.contains('/') {
                return SampleInput::new(id, path);
            }
        }

        let path = PathBuf::from(arg);
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or(arg)
            .to_string();
        let name = name
            .strip_suffix(".gz")
            .or_else(|| name.strip_suffix(".bgz"))
            .unwrap_or(&name);
        let id = name
            .strip_suffix(".sam")
            .or_else(|| name.strip_suffix(".bam"))
            .unwrap_or(name);

        SampleInput::new(id, path.clone())
    }
}

/// An accepted sample scheduled for downsampling
struct DownsampleJob<'a> {
    /// Position among the invocation's samples
    index: usize,
    sample: &'a SampleInput,
    fraction: f64,
}

/// Shared flag to abandon an invocation from another thread
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// A sample excluded because its alignment data could not be used
#[derive(Debug, Clone, PartialEq)]
pub struct SampleWarning {
    pub sample_id: String,
    pub message: String,
}

/// Result of profiling and planning every sample of a reference set
#[derive(Debug, Clone)]
pub struct Evaluation {
    pub reference_id: String,
    pub format: Option<AlignmentFormat>,
    pub qualifying: QualifyingContigs,
    /// Stats for every sample that could be read, in input order
    pub stats: Vec<SampleCoverageStats>,
    /// One plan per input sample, in input order
    pub plans: Vec<DownsamplePlan>,
    pub warnings: Vec<SampleWarning>,
}

impl Evaluation {
    pub fn accepted(&self) -> impl Iterator<Item = &DownsamplePlan> {
        self.plans.iter().filter(|p| p.accepted())
    }

    /// Rows in input order. Sample ids are unique within an evaluation.
    pub fn report_rows(&self) -> Vec<SampleReport> {
        self.plans
            .iter()
            .map(|plan| SampleReport {
                sample_id: plan.sample_id.clone(),
                stats: self
                    .stats
                    .iter()
                    .find(|s| s.sample_id == plan.sample_id)
                    .cloned(),
                plan: plan.clone(),
                warning: self
                    .warnings
                    .iter()
                    .find(|w| w.sample_id == plan.sample_id)
                    .map(|w| w.message.clone()),
            })
            .collect()
    }
}

/// Terminal state of a reference set
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    Merged(MergedResult),
    /// No sample qualified; downstream stages skip this reference set
    Skipped,
}

impl RunOutcome {
    pub fn status(&self) -> &'static str {
        match self {
            RunOutcome::Merged(_) => "merged",
            RunOutcome::Skipped => "skipped",
        }
    }

    pub fn merged(&self) -> Option<&MergedResult> {
        match self {
            RunOutcome::Merged(result) => Some(result),
            RunOutcome::Skipped => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct EngineRun {
    pub evaluation: Evaluation,
    pub outcome: RunOutcome,
}

pub struct Engine {
    config: EngineConfig,
    cancel: CancelToken,
}

impl Engine {
    pub fn new(config: EngineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Engine {
            config,
            cancel: CancelToken::new(),
        })
    }

    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Profile, evaluate and plan every sample without downsampling
    pub fn evaluate(&self, reference: &ReferenceSet, samples: &[SampleInput]) -> Result<Evaluation> {
        let qualifying = select_contigs(reference, self.config.min_contig_length);
        let pool = self.thread_pool(&qualifying)?;
        self.evaluate_in(&pool, reference, qualifying, samples)
    }

    /// Full invocation: evaluate, downsample accepted samples and merge them
    pub fn run(
        &self,
        reference: &ReferenceSet,
        samples: &[SampleInput],
        output: &OutputSpec,
    ) -> Result<EngineRun> {
        let qualifying = select_contigs(reference, self.config.min_contig_length);
        let pool = self.thread_pool(&qualifying)?;
        let evaluation = self.evaluate_in(&pool, reference, qualifying, samples)?;

        let accepted: Vec<DownsampleJob> = samples
            .iter()
            .zip(&evaluation.plans)
            .enumerate()
            .filter_map(|(index, (sample, plan))| {
                plan.fraction.map(|fraction| DownsampleJob {
                    index,
                    sample,
                    fraction,
                })
            })
            .collect();

        let Some(format) = evaluation.format.filter(|_| !accepted.is_empty()) else {
            log::info!(
                "Reference {}: no sample met breadth >= {}% and median >= {}; skipping",
                reference.id,
                self.config.min_breadth,
                self.config.min_median_coverage
            );
            return Ok(EngineRun {
                evaluation,
                outcome: RunOutcome::Skipped,
            });
        };

        log::info!(
            "Reference {}: downsampling {} accepted samples",
            reference.id,
            accepted.len()
        );

        std::fs::create_dir_all(&output.dir)
            .with_context(|| format!("Failed to create {}", output.dir.display()))?;
        // Sorted runs live here until the merge; removed on drop
        let scratch = tempfile::Builder::new()
            .prefix(".pancov-")
            .tempdir_in(&output.dir)
            .with_context(|| format!("Failed to create scratch directory in {}", output.dir.display()))?;

        let results: Vec<Result<ReducedAlignment>> = pool.install(|| {
            accepted
                .par_iter()
                .map(|job| {
                    self.downsample_sample(reference, &evaluation.qualifying, format, scratch.path(), job)
                })
                .collect()
        });
        self.ensure_active(reference)?;

        let reduced = results
            .into_iter()
            .collect::<Result<Vec<_>>>()
            .with_context(|| format!("Reference {}: downsampling failed", reference.id))?;
        self.ensure_active(reference)?;

        let outcome = match write_merged(reference, &evaluation.qualifying, &reduced, output)? {
            Some(result) => RunOutcome::Merged(result),
            None => RunOutcome::Skipped,
        };

        Ok(EngineRun {
            evaluation,
            outcome,
        })
    }

    fn thread_pool(&self, qualifying: &QualifyingContigs) -> Result<rayon::ThreadPool> {
        let threads = concurrency_limit(
            self.config.threads,
            qualifying.total_length(),
            available_memory_bytes(),
        );
        if threads < self.config.threads {
            log::info!(
                "Limiting to {threads} concurrent samples (of {} requested) to fit depth profiles in memory",
                self.config.threads
            );
        }
        rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build()
            .context("Failed to build thread pool")
    }

    fn ensure_active(&self, reference: &ReferenceSet) -> Result<(), EngineError> {
        if self.cancel.is_cancelled() {
            return Err(EngineError::Cancelled {
                reference_id: reference.id.clone(),
            });
        }
        Ok(())
    }

    fn evaluate_in(
        &self,
        pool: &rayon::ThreadPool,
        reference: &ReferenceSet,
        qualifying: QualifyingContigs,
        samples: &[SampleInput],
    ) -> Result<Evaluation> {
        self.ensure_active(reference)?;
        check_unique_ids(&reference.id, samples)?;
        let detected: Vec<Result<AlignmentFormat>> = samples
            .iter()
            .map(|sample| AlignmentFormat::from_path(&sample.path))
            .collect();
        let format = common_format(&reference.id, &detected)?;

        let results: Vec<Result<SampleCoverageStats>> = pool.install(|| {
            samples
                .par_iter()
                .zip(detected.par_iter())
                .map(|(sample, detected)| match detected {
                    Ok(format) => self.profile_sample(reference, &qualifying, sample, *format),
                    Err(err) => Err(anyhow!("{err:#}")),
                })
                .collect()
        });
        self.ensure_active(reference)?;

        let mut stats = Vec::with_capacity(samples.len());
        let mut warnings = Vec::new();
        for (sample, result) in samples.iter().zip(results) {
            match result {
                Ok(sample_stats) => stats.push(sample_stats),
                Err(err) => {
                    let message = format!("{err:#}");
                    log::warn!(
                        "Reference {}: excluding sample {}: {}",
                        reference.id,
                        sample.sample_id,
                        message
                    );
                    warnings.push(SampleWarning {
                        sample_id: sample.sample_id.clone(),
                        message,
                    });
                }
            }
        }

        // Barrier: every profile is in, plan the batch together
        let mut batch = plan_batch(&stats, &self.config).into_iter();
        let excluded: HashSet<&str> = warnings.iter().map(|w| w.sample_id.as_str()).collect();
        let mut plans = Vec::with_capacity(samples.len());
        for sample in samples {
            let plan = if excluded.contains(sample.sample_id.as_str()) {
                DownsamplePlan::reject(&sample.sample_id, RejectReason::Malformed)
            } else {
                batch
                    .next()
                    .with_context(|| format!("No plan for sample {}", sample.sample_id))?
            };
            plans.push(plan);
        }

        log::info!(
            "Reference {}: {} of {} samples accepted",
            reference.id,
            plans.iter().filter(|p| p.accepted()).count(),
            samples.len()
        );

        Ok(Evaluation {
            reference_id: reference.id.clone(),
            format,
            qualifying,
            stats,
            plans,
            warnings,
        })
    }

    fn profile_sample(
        &self,
        reference: &ReferenceSet,
        qualifying: &QualifyingContigs,
        sample: &SampleInput,
        format: AlignmentFormat,
    ) -> Result<SampleCoverageStats> {
        let mut reader = AlignmentReader::open(&sample.path, format)?;
        let mut filter = AlignmentFilter::new(reference, qualifying, self.config.min_mapping_quality);
        filter
            .check_header(reader.header())
            .with_context(|| format!("{}", sample.path.display()))?;

        let mut profiler = DepthProfiler::new(qualifying);
        while let Some(record) = reader
            .read_record()
            .with_context(|| format!("{}", sample.path.display()))?
        {
            if filter.counts().seen % CANCEL_CHECK_INTERVAL == 0 {
                self.ensure_active(reference)?;
            }
            if filter
                .accept(&record)
                .with_context(|| format!("{}", sample.path.display()))?
            {
                profiler.add(&record);
            }
        }

        let profile = profiler.finish();
        let stats = evaluate(
            &sample.sample_id,
            &profile,
            qualifying.total_length(),
            filter.counts(),
        );
        log::debug!(
            "Sample {}: {} of {} records kept, median {:?}, breadth {:?}",
            sample.sample_id,
            stats.records_kept,
            stats.records_seen,
            stats.median_depth,
            stats.breadth
        );

        Ok(stats)
    }

    fn downsample_sample(
        &self,
        reference: &ReferenceSet,
        qualifying: &QualifyingContigs,
        format: AlignmentFormat,
        scratch: &Path,
        job: &DownsampleJob,
    ) -> Result<ReducedAlignment> {
        let sample = job.sample;
        let sampler = Downsampler::new(job.fraction, self.config.seed);
        let mut reader = AlignmentReader::open(&sample.path, format)?;
        let header = reader.header().clone();
        let order = qualifying.ordered_by(&header.contigs);
        let mut filter = AlignmentFilter::new(reference, qualifying, self.config.min_mapping_quality);
        let mut runs = RunWriter::new(
            scratch,
            job.index,
            &sample.sample_id,
            format,
            header,
            &order,
            self.config.sort_buffer_records,
        );

        while let Some(record) = reader
            .read_record()
            .with_context(|| format!("{}", sample.path.display()))?
        {
            if filter.counts().seen % CANCEL_CHECK_INTERVAL == 0 {
                self.ensure_active(reference)?;
            }
            if filter.accept(&record)? && sampler.keep(&record) {
                runs.push(record)?;
            }
        }
        let reduced = runs.finish()?;

        log::info!(
            "Sample {}: retained {} of {} filtered records in {} sorted runs (fraction {:.4})",
            sample.sample_id,
            reduced.records(),
            filter.counts().kept,
            reduced.runs.len(),
            job.fraction.min(1.0)
        );

        Ok(reduced)
    }
}

/// Sample ids key report rows and read groups, so they must be unique
fn check_unique_ids(reference_id: &str, samples: &[SampleInput]) -> Result<(), EngineError> {
    let mut seen = HashSet::with_capacity(samples.len());
    for sample in samples {
        if !seen.insert(sample.sample_id.as_str()) {
            return Err(EngineError::DuplicateSample {
                reference_id: reference_id.to_string(),
                sample: sample.sample_id.clone(),
            });
        }
    }
    Ok(())
}

/// Every recognised sample of an invocation must share one alignment format.
///
/// Samples whose format could not be detected are skipped here; they are
/// excluded individually with a warning.
fn common_format(
    reference_id: &str,
    detected: &[Result<AlignmentFormat>],
) -> Result<Option<AlignmentFormat>, EngineError> {
    let mut format: Option<AlignmentFormat> = None;

    for this in detected.iter().filter_map(|d| d.as_ref().ok()) {
        match format {
            None => format = Some(*this),
            Some(first) if first != *this => {
                return Err(EngineError::MixedFormats {
                    reference_id: reference_id.to_string(),
                    first: first.to_string(),
                    other: this.to_string(),
                })
            }
            Some(_) => {}
        }
    }

    Ok(format)
}
