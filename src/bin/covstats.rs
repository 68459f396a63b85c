/// covstats - Coverage statistics for sample alignments against a reference set
///
/// Profiles every sample like `pancov` does and reports depth, breadth and
/// the downsampling decision, without writing any merged output.
use anyhow::{Context, Result};
use clap::Parser;
use ordered_float::OrderedFloat;
use std::io::{BufWriter, Write};

use pancov::config::{
    parse_metric_number, EngineConfig, DEFAULT_MIN_BREADTH, DEFAULT_MIN_CONTIG_LENGTH,
    DEFAULT_MIN_MAPPING_QUALITY, DEFAULT_MIN_MEDIAN_COVERAGE,
};
use pancov::coverage::SampleCoverageStats;
use pancov::engine::{Engine, Evaluation, SampleInput};
use pancov::reference::{read_core_tags, ReferenceKind, ReferenceSet};
use pancov::report::write_report;

#[derive(Parser)]
#[clap(
    name = "covstats",
    about = "Coverage statistics for sample alignments (SAM, BAM)"
)]
struct Args {
    /// Reference set FASTA
    reference: String,

    /// Sample alignments; `ID=PATH` sets the sample id
    #[clap(required = true)]
    samples: Vec<String>,

    /// Reference set kind: core or single-or-consensus
    #[clap(short = 'k', long = "kind", default_value = "single-or-consensus")]
    kind: ReferenceKind,

    /// File listing core-tagged contig names
    #[clap(long = "core-contigs")]
    core_contigs: Option<String>,

    /// Minimum contig length; accepts k/M/G suffixes
    #[clap(short = 'l', long = "min-contig-length", default_value_t = DEFAULT_MIN_CONTIG_LENGTH, value_parser = parse_metric_number)]
    min_contig_length: u64,

    #[clap(short = 'b', long = "min-breadth", default_value_t = DEFAULT_MIN_BREADTH)]
    min_breadth: f64,

    #[clap(short = 'c', long = "min-median-coverage", default_value_t = DEFAULT_MIN_MEDIAN_COVERAGE)]
    min_median_coverage: f64,

    #[clap(short = 'q', long = "min-mapq", default_value_t = DEFAULT_MIN_MAPPING_QUALITY)]
    min_mapq: u8,

    /// Write the per-sample table as TSV to this file instead of a summary
    #[clap(long = "tsv")]
    tsv: Option<String>,

    /// Show per-sample statistics ranked by median depth
    #[clap(short = 'd', long)]
    detailed: bool,
}

fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::new();
    for (i, c) in s.chars().rev().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(c);
    }
    result.chars().rev().collect()
}

fn format_optional(value: Option<f64>, suffix: &str) -> String {
    value.map_or_else(|| "NA".to_string(), |v| format!("{v:.1}{suffix}"))
}

/// Samples with a median first, deepest first; ties keep input order
fn rank_by_median(stats: &[SampleCoverageStats]) -> Vec<&SampleCoverageStats> {
    let mut ranked: Vec<&SampleCoverageStats> = stats.iter().collect();
    ranked.sort_by_key(|s| std::cmp::Reverse(s.median_depth.map(OrderedFloat)));
    ranked
}

fn print_summary(reference: &ReferenceSet, evaluation: &Evaluation, detailed: bool) {
    let accepted = evaluation.accepted().count();

    println!("\nCoverage for reference set {} ({}):", reference.id, reference.kind);
    println!("{}", "=".repeat(60));
    println!(
        "Qualifying contigs:    {:>12}",
        format_number(evaluation.qualifying.len() as u64)
    );
    println!(
        "Qualifying length:     {:>12}",
        format_number(evaluation.qualifying.total_length())
    );
    println!("Samples:               {:>12}", evaluation.plans.len());
    println!("Accepted:              {:>12}", accepted);
    println!("Excluded (malformed):  {:>12}", evaluation.warnings.len());

    if detailed && !evaluation.stats.is_empty() {
        println!("\nPer-sample statistics:");
        println!("{}", "-".repeat(60));

        for stats in rank_by_median(&evaluation.stats) {
            let decision = evaluation
                .plans
                .iter()
                .find(|p| p.sample_id == stats.sample_id)
                .map(|p| match (p.fraction, p.rejection) {
                    (Some(fraction), _) => format!("keep {:.3}", fraction.min(1.0)),
                    (None, Some(reason)) => reason.to_string(),
                    (None, None) => "-".to_string(),
                })
                .unwrap_or_default();

            println!(
                "{:20} {:>8} median, {:>7} breadth, {:>12} reads  {}",
                stats.sample_id,
                format_optional(stats.median_depth, "x"),
                format_optional(stats.breadth, "%"),
                format_number(stats.records_kept),
                decision
            );
        }
    }

    for warning in &evaluation.warnings {
        println!("\n{}: {}", warning.sample_id, warning.message);
    }
}

fn main() -> Result<()> {
    let args = Args::parse();
    env_logger::Builder::new()
        .filter_level(log::LevelFilter::Warn)
        .parse_default_env()
        .init();

    let config = EngineConfig {
        min_contig_length: args.min_contig_length,
        min_breadth: args.min_breadth,
        min_median_coverage: args.min_median_coverage,
        min_mapping_quality: args.min_mapq,
        ..EngineConfig::default()
    };
    let engine = Engine::new(config)?;

    let core_tags = args
        .core_contigs
        .as_deref()
        .map(read_core_tags)
        .transpose()?;
    let reference = ReferenceSet::from_fasta(&args.reference, args.reference.as_str(), args.kind, core_tags.as_ref())
        .context(format!("Failed to load {}", args.reference))?;

    let samples: Vec<SampleInput> = args.samples.iter().map(|s| SampleInput::parse(s)).collect();
    let evaluation = engine.evaluate(&reference, &samples)?;

    if let Some(path) = args.tsv {
        let file = std::fs::File::create(&path).context(format!("Failed to create {path}"))?;
        let mut writer = BufWriter::new(file);
        write_report(&mut writer, &reference.id, &evaluation.report_rows())?;
        writer.flush()?;
    } else {
        print_summary(&reference, &evaluation, args.detailed);
    }

    Ok(())
}
