/// Per-sample coverage and selection report (TSV)
use anyhow::Result;
use std::io::Write;

use crate::coverage::SampleCoverageStats;
use crate::planner::DownsamplePlan;

/// One report row; `stats` is absent for samples excluded as malformed
#[derive(Debug, Clone)]
pub struct SampleReport {
    pub sample_id: String,
    pub stats: Option<SampleCoverageStats>,
    pub plan: DownsamplePlan,
    pub warning: Option<String>,
}

const COLUMNS: [&str; 11] = [
    "sample",
    "records_seen",
    "records_kept",
    "covered_positions",
    "total_positions",
    "median_depth",
    "breadth_pct",
    "accepted",
    "fraction",
    "reason",
    "warning",
];

fn optional(value: Option<f64>, precision: usize) -> String {
    value.map_or_else(|| "NA".to_string(), |v| format!("{v:.precision$}"))
}

fn count<F>(stats: Option<&SampleCoverageStats>, field: F) -> String
where
    F: Fn(&SampleCoverageStats) -> u64,
{
    stats.map_or_else(|| "NA".to_string(), |s| field(s).to_string())
}

pub fn write_report<W: Write>(writer: &mut W, reference_id: &str, rows: &[SampleReport]) -> Result<()> {
    writeln!(
        writer,
        "# {} coverage report for {} ({})",
        env!("CARGO_PKG_NAME"),
        reference_id,
        chrono::Local::now().to_rfc3339()
    )?;
    writeln!(writer, "{}", COLUMNS.join("\t"))?;

    for row in rows {
        let stats = row.stats.as_ref();

        writeln!(
            writer,
            "{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}",
            row.sample_id,
            count(stats, |s| s.records_seen),
            count(stats, |s| s.records_kept),
            count(stats, |s| s.covered_positions),
            count(stats, |s| s.total_positions),
            optional(stats.and_then(|s| s.median_depth), 2),
            optional(stats.and_then(|s| s.breadth), 4),
            if row.plan.accepted() { "yes" } else { "no" },
            optional(row.plan.fraction, 6),
            row.plan
                .rejection
                .map_or_else(|| "-".to_string(), |r| r.to_string()),
            row.warning.as_deref().unwrap_or("-").replace(['\t', '\n'], " "),
        )?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::planner::RejectReason;

    #[test]
    fn test_report_rows() {
        let stats = SampleCoverageStats {
            sample_id: "S1".to_string(),
            median_depth: Some(40.0),
            breadth: Some(97.5),
            covered_positions: 1950,
            total_positions: 2000,
            records_seen: 900,
            records_kept: 800,
        };
        let rows = vec![
            SampleReport {
                sample_id: "S1".to_string(),
                stats: Some(stats),
                plan: DownsamplePlan::accept("S1", 0.6),
                warning: None,
            },
            SampleReport {
                sample_id: "S2".to_string(),
                stats: None,
                plan: DownsamplePlan::reject("S2", RejectReason::Malformed),
                warning: Some("contig 'x'\tmissing".to_string()),
            },
        ];

        let mut out = Vec::new();
        write_report(&mut out, "pg1", &rows).unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();

        assert!(lines[0].starts_with("# pancov coverage report for pg1"));
        assert_eq!(lines[1], COLUMNS.join("\t"));
        assert_eq!(
            lines[2],
            "S1\t900\t800\t1950\t2000\t40.00\t97.5000\tyes\t0.600000\t-\t-"
        );
        assert_eq!(
            lines[3],
            "S2\tNA\tNA\tNA\tNA\tNA\tNA\tno\tNA\tmalformed\tcontig 'x' missing"
        );
    }
}
