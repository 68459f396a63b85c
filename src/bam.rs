/// BAM adapter on top of rust-htslib
use anyhow::{bail, Context, Result};
use rust_htslib::bam::{self, Read as _};
use std::path::Path;

use crate::alignment_io::AlignmentHeader;
use crate::cigar::CigarOp;
use crate::record::{alignment_end, AlignmentRecord, RecordBody};

pub struct BamReader {
    reader: bam::Reader,
    header: AlignmentHeader,
    target_names: Vec<String>,
    record: bam::Record,
}

impl BamReader {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let reader = bam::Reader::from_path(path)
            .with_context(|| format!("Failed to open BAM {}", path.display()))?;

        let view = reader.header();
        let text = String::from_utf8_lossy(view.as_bytes()).into_owned();
        let mut header = AlignmentHeader::from_sam_text(&text)
            .with_context(|| format!("Invalid BAM header in {}", path.display()))?;

        let target_names: Vec<String> = (0..view.target_count())
            .map(|tid| String::from_utf8_lossy(view.tid2name(tid)).into_owned())
            .collect();

        // The binary target list is authoritative when the text header omits @SQ lines
        if header.contigs.is_empty() {
            header.contigs = (0..view.target_count())
                .map(|tid| {
                    (
                        target_names[tid as usize].clone(),
                        view.target_len(tid).unwrap_or(0),
                    )
                })
                .collect();
        }

        Ok(BamReader {
            reader,
            header,
            target_names,
            record: bam::Record::new(),
        })
    }

    pub fn header(&self) -> &AlignmentHeader {
        &self.header
    }

    pub fn read_record(&mut self) -> Result<Option<AlignmentRecord>> {
        match self.reader.read(&mut self.record) {
            None => Ok(None),
            Some(result) => {
                result.context("Failed to decode BAM record")?;
                convert_record(&self.record, &self.target_names).map(Some)
            }
        }
    }
}

fn convert_record(record: &bam::Record, target_names: &[String]) -> Result<AlignmentRecord> {
    let name = String::from_utf8_lossy(record.qname()).into_owned();

    let contig = match record.tid() {
        tid if tid < 0 => None,
        tid => Some(
            target_names
                .get(tid as usize)
                .cloned()
                .with_context(|| format!("Record {name}: reference id {tid} not in header"))?,
        ),
    };

    let mate_contig = match record.mtid() {
        mtid if mtid < 0 => None,
        mtid => target_names.get(mtid as usize).cloned(),
    };

    let cigar: Vec<CigarOp> = record
        .cigar()
        .iter()
        .map(|op| CigarOp::new(op.len(), op.char() as u8))
        .collect();

    let start = record.pos().max(0) as u64;
    let end = alignment_end(start, &cigar, record.seq_len());

    Ok(AlignmentRecord {
        name,
        flags: record.flags(),
        contig,
        mate_contig,
        start,
        end,
        mapping_quality: record.mapq(),
        cigar,
        body: RecordBody::Bam(Box::new(record.clone())),
    })
}

/// BAM writer whose header is built from SAM header text.
///
/// Reference ids are resolved by contig name against that header, so records
/// read under a wider header can be written under a narrower one. Mates on
/// contigs the header does not declare lose their mate position.
pub struct BamWriter {
    writer: bam::Writer,
    view: bam::HeaderView,
}

impl BamWriter {
    pub fn create<P: AsRef<Path>>(path: P, header_text: &str) -> Result<Self> {
        let path = path.as_ref();
        let view = bam::HeaderView::from_bytes(header_text.as_bytes());
        let header = bam::Header::from_template(&view);
        let writer = bam::Writer::from_path(path, &header, bam::Format::Bam)
            .with_context(|| format!("Failed to create BAM {}", path.display()))?;
        Ok(BamWriter { writer, view })
    }

    pub fn write(&mut self, record: &AlignmentRecord) -> Result<()> {
        let RecordBody::Bam(inner) = &record.body else {
            bail!("Record {} has a SAM body and cannot be written as BAM", record.name);
        };

        let mut out = inner.as_ref().clone();
        let tid = match record.contig.as_deref() {
            None => -1,
            Some(name) => self.tid(name).with_context(|| {
                format!(
                    "Record {}: contig '{name}' is not declared in the output header",
                    record.name
                )
            })?,
        };
        out.set_tid(tid);

        match record.mate_contig.as_deref().and_then(|name| self.tid(name)) {
            Some(mtid) => out.set_mtid(mtid),
            None => {
                out.set_mtid(-1);
                out.set_mpos(-1);
            }
        }

        self.writer
            .write(&out)
            .with_context(|| format!("Failed to write record {}", record.name))
    }

    /// Closes the file, flushing the last BGZF block
    pub fn finish(self) -> Result<()> {
        drop(self.writer);
        Ok(())
    }

    fn tid(&self, name: &str) -> Option<i32> {
        self.view.tid(name.as_bytes()).map(|tid| tid as i32)
    }
}
