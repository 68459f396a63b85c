/// Sample selection and downsampling fractions
use std::fmt;

use crate::config::EngineConfig;
use crate::coverage::SampleCoverageStats;

/// Added to the target/median ratio before downsampling.
///
/// Empirical margin for records lost to pair and quality filtering during
/// downsampling. Not capped: fractions of 1 or more retain everything.
pub const DOWNSAMPLE_OVERSHOOT: f64 = 0.10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    NoQualifyingContigs,
    NoCoveredPositions,
    LowBreadth,
    LowMedianCoverage,
    Malformed,
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            RejectReason::NoQualifyingContigs => "no_qualifying_contigs",
            RejectReason::NoCoveredPositions => "no_covered_positions",
            RejectReason::LowBreadth => "low_breadth",
            RejectReason::LowMedianCoverage => "low_median_coverage",
            RejectReason::Malformed => "malformed",
        };
        f.write_str(text)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DownsamplePlan {
    pub sample_id: String,
    /// Fraction to retain, defined only for accepted samples; may exceed 1
    pub fraction: Option<f64>,
    pub rejection: Option<RejectReason>,
}

impl DownsamplePlan {
    pub fn accept(sample_id: &str, fraction: f64) -> Self {
        DownsamplePlan {
            sample_id: sample_id.to_string(),
            fraction: Some(fraction),
            rejection: None,
        }
    }

    pub fn reject(sample_id: &str, reason: RejectReason) -> Self {
        DownsamplePlan {
            sample_id: sample_id.to_string(),
            fraction: None,
            rejection: Some(reason),
        }
    }

    pub fn accepted(&self) -> bool {
        self.fraction.is_some()
    }
}

pub fn downsample_fraction(median_depth: f64, target_coverage: f64) -> f64 {
    target_coverage / median_depth + DOWNSAMPLE_OVERSHOOT
}

/// Both thresholds are inclusive lower bounds
pub fn plan_sample(stats: &SampleCoverageStats, config: &EngineConfig) -> DownsamplePlan {
    let Some(breadth) = stats.breadth else {
        return DownsamplePlan::reject(&stats.sample_id, RejectReason::NoQualifyingContigs);
    };
    let Some(median) = stats.median_depth else {
        return DownsamplePlan::reject(&stats.sample_id, RejectReason::NoCoveredPositions);
    };

    if breadth < config.min_breadth {
        return DownsamplePlan::reject(&stats.sample_id, RejectReason::LowBreadth);
    }
    if median < config.min_median_coverage {
        return DownsamplePlan::reject(&stats.sample_id, RejectReason::LowMedianCoverage);
    }

    let fraction = downsample_fraction(median, config.min_median_coverage);
    log::debug!(
        "Sample {}: median {:.2}, breadth {:.2}% -> fraction {:.4}",
        stats.sample_id,
        median,
        breadth,
        fraction
    );
    DownsamplePlan::accept(&stats.sample_id, fraction)
}

/// Plans for every profiled sample of a batch, in the order of `stats`
pub fn plan_batch(stats: &[SampleCoverageStats], config: &EngineConfig) -> Vec<DownsamplePlan> {
    stats.iter().map(|s| plan_sample(s, config)).collect()
}
