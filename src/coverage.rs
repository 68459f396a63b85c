/// Median depth and breadth of a depth profile
use crate::depth::DepthProfile;
use crate::filter::FilterCounts;

#[derive(Debug, Clone, PartialEq)]
pub struct SampleCoverageStats {
    pub sample_id: String,
    /// Median over positions with depth > 0; `None` when nothing is covered
    pub median_depth: Option<f64>,
    /// Covered share of the qualifying length in percent; `None` when that length is 0
    pub breadth: Option<f64>,
    pub covered_positions: u64,
    pub total_positions: u64,
    pub records_seen: u64,
    pub records_kept: u64,
}

/// Median of the non-zero values.
///
/// Uses selection rather than a full sort; for an even count the two
/// middle values are averaged.
pub fn median_of_covered<I>(depths: I) -> Option<f64>
where
    I: IntoIterator<Item = u32>,
{
    let mut covered: Vec<u32> = depths.into_iter().filter(|&d| d > 0).collect();
    let n = covered.len();
    if n == 0 {
        return None;
    }

    let mid = n / 2;
    let (lower, upper, _) = covered.select_nth_unstable(mid);
    let upper = *upper as f64;

    if n % 2 == 1 {
        Some(upper)
    } else {
        // Everything left of `mid` is <= upper, so its maximum is the lower middle
        let lower = lower.iter().copied().max().unwrap_or_default() as f64;
        Some((lower + upper) / 2.0)
    }
}

pub fn breadth_percent(covered: u64, total: u64) -> Option<f64> {
    if total == 0 {
        None
    } else {
        Some(covered as f64 / total as f64 * 100.0)
    }
}

pub fn evaluate(
    sample_id: &str,
    profile: &DepthProfile,
    total_qualifying_length: u64,
    counts: FilterCounts,
) -> SampleCoverageStats {
    let covered_positions = profile.covered_positions();

    SampleCoverageStats {
        sample_id: sample_id.to_string(),
        median_depth: median_of_covered(profile.depths()),
        breadth: breadth_percent(covered_positions, total_qualifying_length),
        covered_positions,
        total_positions: total_qualifying_length,
        records_seen: counts.seen,
        records_kept: counts.kept,
    }
}
