use anyhow::{bail, Context, Result};
use std::collections::HashSet;
use std::io::{BufRead, Write};

use crate::alignment_io::AlignmentHeader;
use crate::cigar::parse_cigar;
use crate::record::{alignment_end, AlignmentRecord, RecordBody};

/// Streaming SAM reader. The header is consumed on construction.
pub struct SamReader<R: BufRead> {
    reader: R,
    header: AlignmentHeader,
    pending: Option<String>,
    line_number: usize,
}

impl<R: BufRead> SamReader<R> {
    pub fn new(mut reader: R) -> Result<Self> {
        let mut header = AlignmentHeader::default();
        let mut pending = None;
        let mut line_number = 0;

        loop {
            let mut line = String::new();
            if reader.read_line(&mut line)? == 0 {
                break;
            }
            line_number += 1;
            if line.starts_with('@') {
                header
                    .add_line(&line)
                    .with_context(|| format!("SAM header line {line_number}"))?;
            } else {
                pending = Some(line);
                break;
            }
        }

        Ok(SamReader {
            reader,
            header,
            pending,
            line_number,
        })
    }

    pub fn header(&self) -> &AlignmentHeader {
        &self.header
    }

    pub fn read_record(&mut self) -> Result<Option<AlignmentRecord>> {
        loop {
            let line = match self.pending.take() {
                Some(line) => line,
                None => {
                    let mut line = String::new();
                    if self.reader.read_line(&mut line)? == 0 {
                        return Ok(None);
                    }
                    self.line_number += 1;
                    line
                }
            };

            let line = line.trim_end_matches(['\r', '\n']);
            if line.is_empty() {
                continue;
            }

            return parse_sam_line(line)
                .map(Some)
                .with_context(|| format!("SAM line {}", self.line_number));
        }
    }
}

/// Parse the mandatory SAM columns of one alignment line
pub fn parse_sam_line(line: &str) -> Result<AlignmentRecord> {
    let fields: Vec<&str> = line.split('\t').collect();

    if fields.len() < 11 {
        bail!("SAM line has {} fields, expected at least 11", fields.len());
    }

    let name = fields[0].to_string();
    let flags: u16 = fields[1]
        .parse()
        .with_context(|| format!("Invalid FLAG '{}'", fields[1]))?;
    let contig = match fields[2] {
        "*" => None,
        other => Some(other.to_string()),
    };
    let pos: u64 = fields[3]
        .parse()
        .with_context(|| format!("Invalid POS '{}'", fields[3]))?;
    let mapping_quality: u8 = fields[4]
        .parse()
        .with_context(|| format!("Invalid MAPQ '{}'", fields[4]))?;
    let cigar = parse_cigar(fields[5])?;
    let mate_contig = match fields[6] {
        "*" => None,
        "=" => contig.clone(),
        other => Some(other.to_string()),
    };

    let read_len = if fields[9] == "*" { 0 } else { fields[9].len() };
    // POS is 1-based; 0 means no position
    let start = pos.saturating_sub(1);
    let end = alignment_end(start, &cigar, read_len);

    Ok(AlignmentRecord {
        name,
        flags,
        contig,
        mate_contig,
        start,
        end,
        mapping_quality,
        cigar,
        body: RecordBody::Sam(line.to_string()),
    })
}

/// Streaming SAM writer. The header text is written on construction.
///
/// When the header declares contigs, mate references to any other contig are
/// cleared (`RNEXT` `*`, `PNEXT` 0) so each line stays valid against it.
pub struct SamWriter<W: Write> {
    writer: W,
    declared: Option<HashSet<String>>,
}

impl<W: Write> SamWriter<W> {
    pub fn new(mut writer: W, header_text: &str) -> Result<Self> {
        let header = AlignmentHeader::from_sam_text(header_text)?;
        writer.write_all(header_text.as_bytes())?;

        let declared = if header.contigs.is_empty() {
            None
        } else {
            Some(header.contigs.into_iter().map(|(name, _)| name).collect())
        };

        Ok(SamWriter { writer, declared })
    }

    pub fn write(&mut self, record: &AlignmentRecord) -> Result<()> {
        let RecordBody::Sam(line) = &record.body else {
            bail!("Record {} has a BAM body and cannot be written as SAM", record.name);
        };

        let undeclared_mate = match (&self.declared, record.mate_contig.as_deref()) {
            (Some(declared), Some(mate)) => !declared.contains(mate),
            _ => false,
        };
        if undeclared_mate {
            writeln!(self.writer, "{}", clear_mate(line))?;
        } else {
            writeln!(self.writer, "{line}")?;
        }
        Ok(())
    }

    pub fn finish(mut self) -> Result<W> {
        self.writer.flush()?;
        Ok(self.writer)
    }
}

fn clear_mate(line: &str) -> String {
    line.split('\t')
        .enumerate()
        .map(|(i, field)| match i {
            6 => "*",
            7 => "0",
            _ => field,
        })
        .collect::<Vec<_>>()
        .join("\t")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    const SAM: &str = "@HD\tVN:1.6\tSO:coordinate\n\
@SQ\tSN:ctg1\tLN:2000\n\
@RG\tID:S1\tSM:S1\n\
r1\t99\tctg1\t101\t60\t50M\t=\t151\t100\tACGT\tIIII\tRG:Z:S1\n\
\n\
r2\t4\t*\t0\t0\t*\t*\t0\t0\tACGTAC\t*\n";

    #[test]
    fn test_reader_streams_records() {
        let mut reader = SamReader::new(Cursor::new(SAM)).unwrap();
        assert_eq!(reader.header().contigs, vec![("ctg1".to_string(), 2000)]);
        assert_eq!(reader.header().read_groups.len(), 1);

        let r1 = reader.read_record().unwrap().unwrap();
        assert_eq!(r1.name, "r1");
        assert_eq!(r1.contig.as_deref(), Some("ctg1"));
        assert_eq!(r1.position_range(), 100..150);
        assert_eq!(r1.mapping_quality, 60);
        assert!(r1.is_paired());

        let r2 = reader.read_record().unwrap().unwrap();
        assert!(r2.is_unmapped());
        assert!(reader.read_record().unwrap().is_none());
    }

    #[test]
    fn test_malformed_lines() {
        assert!(parse_sam_line("r1\t99\tctg1").is_err());
        assert!(parse_sam_line("r1\tX\tctg1\t1\t60\t10M\t*\t0\t0\t*\t*").is_err());
        assert!(parse_sam_line("r1\t99\tctg1\t1\t300\t10M\t*\t0\t0\t*\t*").is_err());
        assert!(parse_sam_line("r1\t99\tctg1\t1\t60\t10Z\t*\t0\t0\t*\t*").is_err());
    }

    #[test]
    fn test_mate_contig_resolution() {
        let mut reader = SamReader::new(Cursor::new(SAM)).unwrap();
        let r1 = reader.read_record().unwrap().unwrap();
        assert_eq!(r1.mate_contig.as_deref(), Some("ctg1"));
        let r2 = reader.read_record().unwrap().unwrap();
        assert_eq!(r2.mate_contig, None);

        let other = parse_sam_line("r3\t99\tctg1\t1\t60\t4M\tctg9\t7\t0\t*\t*").unwrap();
        assert_eq!(other.mate_contig.as_deref(), Some("ctg9"));
    }

    #[test]
    fn test_writer_keeps_lines() {
        let mut reader = SamReader::new(Cursor::new(SAM)).unwrap();
        let record = reader.read_record().unwrap().unwrap();

        let mut writer = SamWriter::new(Vec::new(), "@HD\tVN:1.6\n").unwrap();
        writer.write(&record).unwrap();
        assert_eq!(
            String::from_utf8(writer.finish().unwrap()).unwrap(),
            "@HD\tVN:1.6\nr1\t99\tctg1\t101\t60\t50M\t=\t151\t100\tACGT\tIIII\tRG:Z:S1\n"
        );
    }

    #[test]
    fn test_writer_clears_undeclared_mates() {
        let header = "@SQ\tSN:ctg1\tLN:2000\n";
        let kept = parse_sam_line("r1\t99\tctg1\t101\t60\t4M\t=\t151\t54\tACGT\t*").unwrap();
        let cleared =
            parse_sam_line("r2\t65\tctg1\t101\t60\t4M\tctg9\t7\t0\tACGT\t*\tRG:Z:S1").unwrap();

        let mut writer = SamWriter::new(Vec::new(), header).unwrap();
        writer.write(&kept).unwrap();
        writer.write(&cleared).unwrap();
        let text = String::from_utf8(writer.finish().unwrap()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[1], "r1\t99\tctg1\t101\t60\t4M\t=\t151\t54\tACGT\t*");
        assert_eq!(lines[2], "r2\t65\tctg1\t101\t60\t4M\t*\t0\t0\tACGT\t*\tRG:Z:S1");
    }
}
