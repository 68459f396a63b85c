/// Seeded, template-consistent subsampling of filtered records
use anyhow::{Context, Result};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::path::{Path, PathBuf};

use crate::alignment_io::{AlignmentFormat, AlignmentHeader, AlignmentWriter};
use crate::contigs::QualifyingContigs;
use crate::record::AlignmentRecord;

/// Keeps roughly `fraction` of the read templates it is shown.
///
/// The decision for a record depends only on the seed and the read name,
/// so mates agree and reruns select the same reads.
#[derive(Debug, Clone, Copy)]
pub struct Downsampler {
    /// `None` retains everything
    threshold: Option<f64>,
    seed: u64,
}

impl Downsampler {
    pub fn new(fraction_applied: f64, seed: u64) -> Self {
        let threshold = if fraction_applied >= 1.0 {
            None
        } else {
            Some(fraction_applied.max(0.0))
        };
        Downsampler { threshold, seed }
    }

    pub fn retains_all(&self) -> bool {
        self.threshold.is_none()
    }

    pub fn keep(&self, record: &AlignmentRecord) -> bool {
        match self.threshold {
            None => true,
            Some(threshold) => {
                let template = fxhash::hash64(record.name.as_bytes());
                let mut rng = StdRng::seed_from_u64(self.seed ^ template);
                rng.gen::<f64>() < threshold
            }
        }
    }
}

/// A sorted chunk of one sample's retained records, on disk
#[derive(Debug, Clone, PartialEq)]
pub struct SortedRun {
    pub path: PathBuf,
    pub records: usize,
}

/// One accepted sample's downsampled records as sorted runs.
///
/// Runs are in input order, so merging them with ties broken by run index
/// gives a stable sort of the whole sample.
#[derive(Debug, Clone)]
pub struct ReducedAlignment {
    pub sample_id: String,
    pub format: AlignmentFormat,
    pub header: AlignmentHeader,
    pub runs: Vec<SortedRun>,
}

impl ReducedAlignment {
    pub fn records(&self) -> usize {
        self.runs.iter().map(|run| run.records).sum()
    }
}

/// Buffers retained records and spills them as sorted runs of at most
/// `capacity` records, written in the sample's own format and header.
pub struct RunWriter<'a> {
    dir: PathBuf,
    index: usize,
    sample_id: String,
    format: AlignmentFormat,
    header: AlignmentHeader,
    header_text: String,
    order: &'a QualifyingContigs,
    capacity: usize,
    buffer: Vec<AlignmentRecord>,
    runs: Vec<SortedRun>,
}

impl<'a> RunWriter<'a> {
    /// `index` keeps run file names of different samples apart within `dir`
    pub fn new(
        dir: &Path,
        index: usize,
        sample_id: &str,
        format: AlignmentFormat,
        header: AlignmentHeader,
        order: &'a QualifyingContigs,
        capacity: usize,
    ) -> Self {
        let capacity = capacity.max(1);
        RunWriter {
            dir: dir.to_path_buf(),
            index,
            sample_id: sample_id.to_string(),
            format,
            header_text: header.to_sam_text(),
            header,
            order,
            capacity,
            buffer: Vec::with_capacity(capacity.min(1 << 16)),
            runs: Vec::new(),
        }
    }

    pub fn push(&mut self, record: AlignmentRecord) -> Result<()> {
        self.buffer.push(record);
        if self.buffer.len() >= self.capacity {
            self.spill()?;
        }
        Ok(())
    }

    pub fn finish(mut self) -> Result<ReducedAlignment> {
        self.spill()?;
        Ok(ReducedAlignment {
            sample_id: self.sample_id,
            format: self.format,
            header: self.header,
            runs: self.runs,
        })
    }

    fn spill(&mut self) -> Result<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }
        sort_records(&mut self.buffer, self.order);

        let path = self.dir.join(format!(
            "sample{}.run{}.{}",
            self.index,
            self.runs.len(),
            self.format.extension()
        ));
        let records = self.buffer.len();
        let mut writer = AlignmentWriter::create(&path, self.format, &self.header_text)?;
        for record in self.buffer.drain(..) {
            writer.write(&record)?;
        }
        writer
            .finish()
            .with_context(|| format!("Failed to write {}", path.display()))?;

        log::debug!(
            "Sample {}: spilled {} sorted records to {}",
            self.sample_id,
            records,
            path.display()
        );
        self.runs.push(SortedRun { path, records });
        Ok(())
    }
}

/// Stable sort by contig order, then start. Records on contigs outside
/// `order` go last.
pub fn sort_records(records: &mut [AlignmentRecord], order: &QualifyingContigs) {
    records.sort_by_key(|r| (contig_rank(r, order), r.start));
}

pub(crate) fn contig_rank(record: &AlignmentRecord, order: &QualifyingContigs) -> usize {
    record
        .contig
        .as_deref()
        .and_then(|name| order.index_of(name))
        .unwrap_or(usize::MAX)
}
