/// Unified I/O for SAM and BAM alignments
///
/// Both formats are read into the common `AlignmentRecord` representation;
/// each record keeps its original body so it can be written back unchanged.
use anyhow::{bail, Context, Result};
use std::fmt;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter};
use std::path::Path;

use crate::bam::{BamReader, BamWriter};
use crate::record::AlignmentRecord;
use crate::sam::{SamReader, SamWriter};

/// Open a text file, decompressing `.gz` (gzip or bgzip) and `.bgz` inputs
pub fn open_text_input<P: AsRef<Path>>(path: P) -> Result<Box<dyn BufRead + Send>> {
    let path = path.as_ref();
    let file = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;

    match path.extension().and_then(|ext| ext.to_str()) {
        Some("bgz") => Ok(Box::new(BufReader::new(
            noodles::bgzf::io::reader::Reader::new(file),
        ))),
        // MultiGzDecoder also reads bgzip, which is a series of gzip members
        Some("gz") => Ok(Box::new(BufReader::new(flate2::read::MultiGzDecoder::new(
            file,
        )))),
        _ => Ok(Box::new(BufReader::new(file))),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlignmentFormat {
    Sam,
    Bam,
}

impl AlignmentFormat {
    /// Detect the format from the file name (`.sam`, `.sam.gz`, `.sam.bgz`, `.bam`)
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
            .to_lowercase();

        let stem = name
            .strip_suffix(".gz")
            .or_else(|| name.strip_suffix(".bgz"))
            .unwrap_or(&name);

        if stem.ends_with(".sam") {
            Ok(AlignmentFormat::Sam)
        } else if name.ends_with(".bam") {
            Ok(AlignmentFormat::Bam)
        } else {
            bail!(
                "Cannot determine alignment format of {} (expected .sam, .sam.gz or .bam)",
                path.display()
            )
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            AlignmentFormat::Sam => "sam",
            AlignmentFormat::Bam => "bam",
        }
    }
}

impl fmt::Display for AlignmentFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// The parts of an alignment header the engine relies on
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AlignmentHeader {
    /// `@SQ` entries in header order
    pub contigs: Vec<(String, u64)>,
    /// Raw `@RG` lines
    pub read_groups: Vec<String>,
}

impl AlignmentHeader {
    /// Parse the `@SQ` and `@RG` lines of a SAM header text
    pub fn from_sam_text(text: &str) -> Result<Self> {
        let mut header = AlignmentHeader::default();
        for line in text.lines() {
            header.add_line(line)?;
        }
        Ok(header)
    }

    /// Minimal SAM header text declaring these contigs and read groups
    pub fn to_sam_text(&self) -> String {
        let mut text = String::from("@HD\tVN:1.6\n");
        for (name, length) in &self.contigs {
            text.push_str(&format!("@SQ\tSN:{name}\tLN:{length}\n"));
        }
        for rg in &self.read_groups {
            text.push_str(rg);
            text.push('\n');
        }
        text
    }

    pub(crate) fn add_line(&mut self, line: &str) -> Result<()> {
        let line = line.trim_end_matches(['\r', '\n']);

        if line.starts_with("@SQ") {
            let mut name = None;
            let mut length = None;
            for field in line.split('\t').skip(1) {
                if let Some(value) = field.strip_prefix("SN:") {
                    name = Some(value.to_string());
                } else if let Some(value) = field.strip_prefix("LN:") {
                    length = Some(
                        value
                            .parse::<u64>()
                            .with_context(|| format!("Invalid @SQ length in '{line}'"))?,
                    );
                }
            }
            match (name, length) {
                (Some(name), Some(length)) => self.contigs.push((name, length)),
                _ => bail!("@SQ line without SN or LN: '{line}'"),
            }
        } else if line.starts_with("@RG") {
            self.read_groups.push(line.to_string());
        }

        Ok(())
    }
}

/// Format-agnostic streaming reader
pub enum AlignmentReader {
    Sam(SamReader<Box<dyn BufRead + Send>>),
    Bam(BamReader),
}

impl AlignmentReader {
    pub fn open<P: AsRef<Path>>(path: P, format: AlignmentFormat) -> Result<Self> {
        let path = path.as_ref();
        match format {
            AlignmentFormat::Sam => {
                let input = open_text_input(path)?;
                let reader = SamReader::new(input)
                    .with_context(|| format!("Failed to read SAM header of {}", path.display()))?;
                Ok(AlignmentReader::Sam(reader))
            }
            AlignmentFormat::Bam => Ok(AlignmentReader::Bam(BamReader::open(path)?)),
        }
    }

    pub fn header(&self) -> &AlignmentHeader {
        match self {
            AlignmentReader::Sam(reader) => reader.header(),
            AlignmentReader::Bam(reader) => reader.header(),
        }
    }

    pub fn read_record(&mut self) -> Result<Option<AlignmentRecord>> {
        match self {
            AlignmentReader::Sam(reader) => reader.read_record(),
            AlignmentReader::Bam(reader) => reader.read_record(),
        }
    }
}

/// Format-agnostic streaming writer; the header is written on creation
pub enum AlignmentWriter {
    Sam(SamWriter<BufWriter<File>>),
    Bam(BamWriter),
}

impl AlignmentWriter {
    pub fn create<P: AsRef<Path>>(path: P, format: AlignmentFormat, header_text: &str) -> Result<Self> {
        let path = path.as_ref();
        match format {
            AlignmentFormat::Sam => {
                let file = File::create(path)
                    .with_context(|| format!("Failed to create {}", path.display()))?;
                Ok(AlignmentWriter::Sam(SamWriter::new(BufWriter::new(file), header_text)?))
            }
            AlignmentFormat::Bam => Ok(AlignmentWriter::Bam(BamWriter::create(path, header_text)?)),
        }
    }

    pub fn write(&mut self, record: &AlignmentRecord) -> Result<()> {
        match self {
            AlignmentWriter::Sam(writer) => writer.write(record),
            AlignmentWriter::Bam(writer) => writer.write(record),
        }
    }

    pub fn finish(self) -> Result<()> {
        match self {
            AlignmentWriter::Sam(writer) => writer.finish().map(drop),
            AlignmentWriter::Bam(writer) => writer.finish(),
        }
    }
}
