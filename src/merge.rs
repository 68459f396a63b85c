/// Merge per-sample reduced alignments into one alignment per reference set
///
/// Outputs go to temporary files next to their destination and are only
/// renamed into place once both the FASTA and the alignment are complete.
use anyhow::{Context, Result};
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashSet};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

use crate::alignment_io::{AlignmentFormat, AlignmentReader, AlignmentWriter};
use crate::contigs::QualifyingContigs;
use crate::downsample::{contig_rank, ReducedAlignment};
use crate::error::EngineError;
use crate::record::AlignmentRecord;
use crate::reference::{write_fasta, ReferenceSet};

const FASTA_LINE_WIDTH: usize = 80;

/// Files produced for a reference set with at least one accepted sample
#[derive(Debug, Clone, PartialEq)]
pub struct MergedResult {
    pub fasta_path: PathBuf,
    pub alignment_path: PathBuf,
    pub samples: Vec<String>,
    pub records: usize,
}

/// Where merged outputs go: `<dir>/<prefix>.fasta` and `<dir>/<prefix>.<sam|bam>`
#[derive(Debug, Clone)]
pub struct OutputSpec {
    pub dir: PathBuf,
    pub prefix: String,
}

impl OutputSpec {
    pub fn new(dir: impl Into<PathBuf>, prefix: impl Into<String>) -> Self {
        OutputSpec {
            dir: dir.into(),
            prefix: prefix.into(),
        }
    }

    pub fn fasta_path(&self) -> PathBuf {
        self.dir.join(format!("{}.fasta", self.prefix))
    }

    pub fn alignment_path(&self, format: AlignmentFormat) -> PathBuf {
        self.dir
            .join(format!("{}.{}", self.prefix, format.extension()))
    }

    pub fn report_path(&self) -> PathBuf {
        self.dir.join(format!("{}.coverage.tsv", self.prefix))
    }
}

/// Every accepted sample must declare the same header contigs as the first one
pub fn check_consistent(reference_id: &str, alignments: &[ReducedAlignment]) -> Result<(), EngineError> {
    let Some(first) = alignments.first() else {
        return Ok(());
    };

    for other in &alignments[1..] {
        if other.header.contigs != first.header.contigs {
            return Err(EngineError::InconsistentContigs {
                reference_id: reference_id.to_string(),
                sample: other.sample_id.clone(),
                first: first.sample_id.clone(),
            });
        }
        if other.format != first.format {
            return Err(EngineError::MixedFormats {
                reference_id: reference_id.to_string(),
                first: first.format.to_string(),
                other: other.format.to_string(),
            });
        }
    }

    Ok(())
}

/// Streaming k-way merge over every sorted run of every sample.
///
/// `order` ranks contigs. Ties keep sample order, then run order, then
/// order within a run. Returns the number of records emitted.
pub fn merge_runs<F>(alignments: &[ReducedAlignment], order: &QualifyingContigs, mut emit: F) -> Result<usize>
where
    F: FnMut(&AlignmentRecord) -> Result<()>,
{
    // Reader index encodes (sample, run), so it doubles as the tie-breaker
    let mut readers = Vec::new();
    for alignment in alignments {
        for run in &alignment.runs {
            let reader = AlignmentReader::open(&run.path, alignment.format)
                .with_context(|| format!("Sample {}: failed to reopen sorted run", alignment.sample_id))?;
            readers.push(reader);
        }
    }

    let mut heads: Vec<Option<AlignmentRecord>> = Vec::with_capacity(readers.len());
    let mut heap = BinaryHeap::with_capacity(readers.len());
    for (idx, reader) in readers.iter_mut().enumerate() {
        let head = reader.read_record()?;
        if let Some(record) = &head {
            heap.push(Reverse((contig_rank(record, order), record.start, idx)));
        }
        heads.push(head);
    }

    let mut written = 0;
    while let Some(Reverse((_, _, idx))) = heap.pop() {
        if let Some(record) = heads[idx].take() {
            emit(&record)?;
            written += 1;
        }
        let next = readers[idx].read_record()?;
        if let Some(record) = &next {
            heap.push(Reverse((contig_rank(record, order), record.start, idx)));
        }
        heads[idx] = next;
    }

    Ok(written)
}

/// SAM header text for the merged alignment.
///
/// Declares the qualifying contigs in `order`, the union of read groups and
/// a program line.
pub fn merged_header_text(alignments: &[ReducedAlignment], order: &QualifyingContigs) -> String {
    let mut text = String::from("@HD\tVN:1.6\tSO:coordinate\n");

    for (name, length) in order.iter() {
        text.push_str(&format!("@SQ\tSN:{name}\tLN:{length}\n"));
    }

    let mut seen = HashSet::new();
    for alignment in alignments {
        for rg in &alignment.header.read_groups {
            if seen.insert(rg.as_str()) {
                text.push_str(rg);
                text.push('\n');
            }
        }
    }

    let samples: Vec<&str> = alignments.iter().map(|a| a.sample_id.as_str()).collect();
    text.push_str(&format!(
        "@PG\tID:{}\tPN:{}\tVN:{}\tCL:merge {}\n",
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION"),
        samples.join(",")
    ));

    text
}

/// Write the qualifying-contig FASTA and the merged alignment.
///
/// Both list the qualifying contigs in the shared header order. Returns
/// `None` for an empty input: no files are created.
pub fn write_merged(
    reference: &ReferenceSet,
    qualifying: &QualifyingContigs,
    alignments: &[ReducedAlignment],
    output: &OutputSpec,
) -> Result<Option<MergedResult>> {
    let Some(first) = alignments.first() else {
        return Ok(None);
    };
    check_consistent(&reference.id, alignments)?;

    let format = first.format;
    let order = qualifying.ordered_by(&first.header.contigs);
    let fasta_path = output.fasta_path();
    let alignment_path = output.alignment_path(format);

    let fasta_tmp = temp_beside(&fasta_path)?;
    {
        let mut writer = BufWriter::new(fasta_tmp.as_file());
        let contigs = order.iter().filter_map(|(name, _)| reference.get(name));
        write_fasta(&mut writer, contigs, FASTA_LINE_WIDTH)?;
        writer.flush()?;
    }

    let header = merged_header_text(alignments, &order);
    let alignment_tmp = temp_beside(&alignment_path)?;
    let mut writer = AlignmentWriter::create(alignment_tmp.path(), format, &header)?;
    let written = merge_runs(alignments, &order, |record| writer.write(record))?;
    writer
        .finish()
        .with_context(|| format!("Failed to write {}", alignment_path.display()))?;

    fasta_tmp
        .persist(&fasta_path)
        .with_context(|| format!("Failed to write {}", fasta_path.display()))?;
    alignment_tmp
        .persist(&alignment_path)
        .with_context(|| format!("Failed to write {}", alignment_path.display()))?;

    log::info!(
        "Reference {}: merged {} records from {} samples into {}",
        reference.id,
        written,
        alignments.len(),
        alignment_path.display()
    );

    Ok(Some(MergedResult {
        fasta_path,
        alignment_path,
        samples: alignments.iter().map(|a| a.sample_id.clone()).collect(),
        records: written,
    }))
}

fn temp_beside(path: &Path) -> Result<NamedTempFile> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    NamedTempFile::new_in(dir)
        .with_context(|| format!("Failed to create temporary file in {}", dir.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alignment_io::AlignmentHeader;
    use crate::contigs::select_contigs;
    use crate::downsample::RunWriter;
    use crate::reference::{Contig, ReferenceKind};
    use crate::sam::parse_sam_line;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn reference() -> ReferenceSet {
        ReferenceSet::new(
            "pg1",
            ReferenceKind::SingleOrConsensus,
            vec![
                Contig::new("a", vec![b'A'; 100], false),
                Contig::new("b", vec![b'C'; 100], false),
                Contig::new("tiny", vec![b'G'; 5], false),
            ],
        )
        .unwrap()
    }

    fn header(contigs: &[&str]) -> AlignmentHeader {
        AlignmentHeader {
            contigs: contigs
                .iter()
                .map(|&n| (n.to_string(), if n == "tiny" { 5 } else { 100 }))
                .collect(),
            read_groups: Vec::new(),
        }
    }

    fn record(name: &str, contig: &str, start: u64) -> AlignmentRecord {
        parse_sam_line(&format!(
            "{name}\t1\t{contig}\t{}\t60\t10M\t*\t0\t0\t*\t*",
            start + 1
        ))
        .unwrap()
    }

    /// Spill `records` as sorted runs of two records each
    fn reduced(
        dir: &Path,
        index: usize,
        sample: &str,
        header: AlignmentHeader,
        records: Vec<AlignmentRecord>,
    ) -> ReducedAlignment {
        let order = select_contigs(&reference(), 50).ordered_by(&header.contigs);
        let mut runs = RunWriter::new(dir, index, sample, AlignmentFormat::Sam, header, &order, 2);
        for record in records {
            runs.push(record).unwrap();
        }
        runs.finish().unwrap()
    }

    fn merged_names(alignments: &[ReducedAlignment]) -> Vec<String> {
        let order = select_contigs(&reference(), 50).ordered_by(&alignments[0].header.contigs);
        let mut names = Vec::new();
        let written = merge_runs(alignments, &order, |r| {
            names.push(r.name.clone());
            Ok(())
        })
        .unwrap();
        assert_eq!(written, names.len());
        names
    }

    #[test]
    fn test_merge_interleaves_samples() {
        let dir = TempDir::new().unwrap();
        let h = header(&["a", "b", "tiny"]);
        let alignments = vec![
            reduced(dir.path(), 0, "S1", h.clone(), vec![record("x1", "a", 10), record("x2", "b", 5)]),
            reduced(dir.path(), 1, "S2", h, vec![record("y1", "a", 10), record("y2", "a", 50)]),
        ];
        assert_eq!(merged_names(&alignments), vec!["x1", "y1", "y2", "x2"]);
    }

    #[test]
    fn test_merge_of_one_is_stable_across_runs() {
        let dir = TempDir::new().unwrap();
        let alignments = vec![reduced(
            dir.path(),
            0,
            "S1",
            header(&["a", "b", "tiny"]),
            vec![record("x1", "a", 1), record("x2", "b", 0), record("x3", "a", 1)],
        )];
        assert_eq!(alignments[0].runs.len(), 2);
        assert_eq!(merged_names(&alignments), vec!["x1", "x3", "x2"]);
    }

    #[test]
    fn test_merge_of_sorted_sample_is_identity() {
        let dir = TempDir::new().unwrap();
        let names = ["x1", "x2", "x3", "x4", "x5"];
        let records = vec![
            record("x1", "a", 1),
            record("x2", "a", 1),
            record("x3", "a", 40),
            record("x4", "b", 0),
            record("x5", "b", 7),
        ];
        let alignments = vec![reduced(dir.path(), 0, "S1", header(&["a", "b", "tiny"]), records)];
        assert_eq!(merged_names(&alignments), names);
    }

    #[test]
    fn test_inconsistent_contigs_is_fatal() {
        let empty = |sample: &str, contigs: &[&str]| ReducedAlignment {
            sample_id: sample.to_string(),
            format: AlignmentFormat::Sam,
            header: header(contigs),
            runs: Vec::new(),
        };
        let alignments = vec![empty("S1", &["a", "b", "tiny"]), empty("S2", &["a", "b"])];
        let err = check_consistent("pg1", &alignments).unwrap_err();
        assert_eq!(
            err,
            EngineError::InconsistentContigs {
                reference_id: "pg1".to_string(),
                sample: "S2".to_string(),
                first: "S1".to_string(),
            }
        );
        assert!(err.to_string().contains("pg1"));
    }

    #[test]
    fn test_write_merged_outputs() {
        let dir = TempDir::new().unwrap();
        let scratch = TempDir::new().unwrap();
        let reference = reference();
        let qualifying = select_contigs(&reference, 50);
        let output = OutputSpec::new(dir.path(), "pg1");

        let mut h1 = header(&["a", "b", "tiny"]);
        h1.read_groups.push("@RG\tID:S1".to_string());
        let mate_on_tiny = parse_sam_line("y1\t1\ta\t8\t60\t10M\ttiny\t1\t0\t*\t*").unwrap();
        let alignments = vec![
            reduced(scratch.path(), 0, "S1", h1, vec![record("x1", "b", 3)]),
            reduced(scratch.path(), 1, "S2", header(&["a", "b", "tiny"]), vec![mate_on_tiny]),
        ];

        let result = write_merged(&reference, &qualifying, &alignments, &output)
            .unwrap()
            .unwrap();
        assert_eq!(result.records, 2);
        assert_eq!(result.samples, vec!["S1".to_string(), "S2".to_string()]);

        let fasta = std::fs::read_to_string(&result.fasta_path).unwrap();
        assert!(fasta.starts_with(">a\n"));
        assert!(fasta.contains(">b\n"));
        assert!(!fasta.contains(">tiny"));

        let sam = std::fs::read_to_string(&result.alignment_path).unwrap();
        let body: Vec<&str> = sam.lines().filter(|l| !l.starts_with('@')).collect();
        assert_eq!(body, vec![
            "y1\t1\ta\t8\t60\t10M\t*\t0\t0\t*\t*",
            "x1\t1\tb\t4\t60\t10M\t*\t0\t0\t*\t*",
        ]);
        assert!(sam.contains("@RG\tID:S1\n"));
        assert!(!sam.contains("SN:tiny"));
    }

    #[test]
    fn test_output_follows_header_contig_order() {
        let dir = TempDir::new().unwrap();
        let scratch = TempDir::new().unwrap();
        let reference = reference();
        let qualifying = select_contigs(&reference, 50);
        let output = OutputSpec::new(dir.path(), "pg1");

        let h = header(&["tiny", "b", "a"]);
        let alignments = vec![
            reduced(scratch.path(), 0, "S1", h.clone(), vec![record("x1", "a", 3), record("x2", "b", 50)]),
            reduced(scratch.path(), 1, "S2", h, vec![record("y1", "a", 1)]),
        ];
        let result = write_merged(&reference, &qualifying, &alignments, &output)
            .unwrap()
            .unwrap();

        let sam = std::fs::read_to_string(&result.alignment_path).unwrap();
        let sq: Vec<&str> = sam.lines().filter(|l| l.starts_with("@SQ")).collect();
        assert_eq!(sq, vec!["@SQ\tSN:b\tLN:100", "@SQ\tSN:a\tLN:100"]);
        let names: Vec<&str> = sam
            .lines()
            .filter(|l| !l.starts_with('@'))
            .map(|l| l.split('\t').next().unwrap())
            .collect();
        assert_eq!(names, vec!["x2", "y1", "x1"]);

        let fasta = std::fs::read_to_string(&result.fasta_path).unwrap();
        let contigs: Vec<&str> = fasta.lines().filter(|l| l.starts_with('>')).collect();
        assert_eq!(contigs, vec![">b", ">a"]);
    }

    #[test]
    fn test_empty_merge_writes_nothing() {
        let dir = TempDir::new().unwrap();
        let reference = reference();
        let qualifying = select_contigs(&reference, 50);
        let output = OutputSpec::new(dir.path(), "pg1");

        let result = write_merged(&reference, &qualifying, &[], &output).unwrap();
        assert!(result.is_none());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}
