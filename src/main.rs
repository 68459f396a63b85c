use anyhow::{Context, Result};
use clap::Parser;
use std::io::{BufWriter, Write};
use std::path::Path;

use pancov::config::{
    parse_metric_number, EngineConfig, DEFAULT_MIN_BREADTH, DEFAULT_MIN_CONTIG_LENGTH,
    DEFAULT_MIN_MAPPING_QUALITY, DEFAULT_MIN_MEDIAN_COVERAGE, DEFAULT_SEED,
    DEFAULT_SORT_BUFFER_RECORDS,
};
use pancov::engine::{Engine, RunOutcome, SampleInput};
use pancov::merge::OutputSpec;
use pancov::reference::{read_core_tags, ReferenceKind, ReferenceSet};
use pancov::report::write_report;

/// Reference set id from a FASTA path: `refs/pg1.fa.gz` -> `pg1`
fn reference_id_from_path(path: &Path) -> String {
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("reference");
    let name = name
        .strip_suffix(".gz")
        .or_else(|| name.strip_suffix(".bgz"))
        .unwrap_or(name);
    [".fasta", ".fna", ".fa"]
        .iter()
        .find_map(|ext| name.strip_suffix(ext))
        .unwrap_or(name)
        .to_string()
}

/// pancov - coverage-gated downsampling and merging of pangenome alignments
///
/// Profiles every sample's alignment against one reference set, keeps samples
/// with enough breadth and median depth, downsamples them to a common coverage
/// and merges them into a single sorted alignment next to a FASTA of the
/// qualifying contigs.
#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Args {
    /// Sample alignments (SAM, SAM.gz or BAM); `ID=PATH` sets the sample id
    #[clap(value_name = "ALIGNMENT", required = true)]
    samples: Vec<String>,

    /// Reference set FASTA the samples were aligned against
    #[clap(short = 'r', long = "reference")]
    reference: String,

    /// Reference set kind: core or single-or-consensus
    #[clap(short = 'k', long = "kind", default_value = "single-or-consensus")]
    kind: ReferenceKind,

    /// File listing core-tagged contig names, one per line
    #[clap(long = "core-contigs")]
    core_contigs: Option<String>,

    /// Reference set id (defaults to the FASTA file name)
    #[clap(long = "id")]
    id: Option<String>,

    /// Output directory
    #[clap(short = 'o', long = "output-dir", default_value = ".")]
    output_dir: String,

    /// Output file prefix (defaults to the reference set id)
    #[clap(short = 'p', long = "prefix")]
    prefix: Option<String>,

    /// Minimum contig length considered for coverage
    #[clap(short = 'l', long = "min-contig-length", default_value_t = DEFAULT_MIN_CONTIG_LENGTH, value_parser = parse_metric_number)]
    min_contig_length: u64,

    /// Minimum breadth of coverage, percent of qualifying length
    #[clap(short = 'b', long = "min-breadth", default_value_t = DEFAULT_MIN_BREADTH)]
    min_breadth: f64,

    /// Minimum median depth; accepted samples are downsampled towards it
    #[clap(short = 'c', long = "min-median-coverage", default_value_t = DEFAULT_MIN_MEDIAN_COVERAGE)]
    min_median_coverage: f64,

    /// Minimum mapping quality
    #[clap(short = 'q', long = "min-mapq", default_value_t = DEFAULT_MIN_MAPPING_QUALITY)]
    min_mapq: u8,

    /// Random seed for downsampling
    #[clap(long = "seed", default_value_t = DEFAULT_SEED)]
    seed: u64,

    /// Number of samples processed concurrently (defaults to available CPUs)
    #[clap(short = 't', long = "threads")]
    threads: Option<usize>,

    /// Retained records per sample sorted in memory before spilling to disk
    #[clap(long = "sort-buffer", default_value_t = DEFAULT_SORT_BUFFER_RECORDS as u64, value_parser = parse_metric_number)]
    sort_buffer: u64,

    /// Write a per-sample coverage report to <prefix>.coverage.tsv
    #[clap(long = "report")]
    report: bool,

    /// Only log warnings and errors
    #[clap(long = "quiet", conflicts_with = "verbose")]
    quiet: bool,

    /// Log per-sample details
    #[clap(short = 'v', long = "verbose")]
    verbose: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let level = if args.quiet {
        log::LevelFilter::Warn
    } else if args.verbose {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .format_timestamp_secs()
        .init();

    let defaults = EngineConfig::default();
    let config = EngineConfig {
        min_contig_length: args.min_contig_length,
        min_breadth: args.min_breadth,
        min_median_coverage: args.min_median_coverage,
        min_mapping_quality: args.min_mapq,
        seed: args.seed,
        threads: args.threads.unwrap_or(defaults.threads),
        sort_buffer_records: usize::try_from(args.sort_buffer)
            .context("--sort-buffer does not fit in memory")?,
    };
    let engine = Engine::new(config)?;

    let core_tags = args
        .core_contigs
        .as_deref()
        .map(read_core_tags)
        .transpose()?;
    let reference_path = Path::new(&args.reference);
    let reference_id = args
        .id
        .clone()
        .unwrap_or_else(|| reference_id_from_path(reference_path));
    let reference =
        ReferenceSet::from_fasta(reference_path, &reference_id, args.kind, core_tags.as_ref())?;
    log::info!(
        "Loaded reference set {} ({}, {} contigs, {} bp)",
        reference.id,
        reference.kind,
        reference.contigs().len(),
        reference.total_length()
    );

    let samples: Vec<SampleInput> = args.samples.iter().map(|s| SampleInput::parse(s)).collect();
    let output = OutputSpec::new(
        &args.output_dir,
        args.prefix.clone().unwrap_or_else(|| reference.id.clone()),
    );

    let run = engine.run(&reference, &samples, &output)?;

    if args.report {
        std::fs::create_dir_all(&output.dir)
            .with_context(|| format!("Failed to create {}", output.dir.display()))?;
        let path = output.report_path();
        let file = std::fs::File::create(&path)
            .with_context(|| format!("Failed to create {}", path.display()))?;
        let mut writer = BufWriter::new(file);
        write_report(&mut writer, &reference.id, &run.evaluation.report_rows())?;
        writer.flush()?;
    }

    let stdout = std::io::stdout();
    let mut handle = stdout.lock();
    match &run.outcome {
        RunOutcome::Merged(result) => {
            writeln!(handle, "{}\t{}", run.outcome.status(), result.alignment_path.display())?;
        }
        RunOutcome::Skipped => writeln!(handle, "{}", run.outcome.status())?,
    }

    Ok(())
}
