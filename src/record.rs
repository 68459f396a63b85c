/// Alignment record model shared by the SAM and BAM adapters
use std::ops::Range;

use rust_htslib::bam;

use crate::cigar::{self, CigarOp};

/// SAM flag bits consulted by the engine
pub mod flags {
    pub const PAIRED: u16 = 0x1;
    pub const UNMAPPED: u16 = 0x4;
    pub const DUPLICATE: u16 = 0x400;
}

/// Original representation of a record, written back untouched
#[derive(Debug, Clone)]
pub enum RecordBody {
    /// The SAM line without its trailing newline
    Sam(String),
    Bam(Box<bam::Record>),
}

/// One read alignment against a reference contig.
///
/// Positions are 0-based and `end` is exclusive. `contig` is `None` for
/// records placed on no reference sequence (`*`).
#[derive(Debug, Clone)]
pub struct AlignmentRecord {
    pub name: String,
    pub flags: u16,
    pub contig: Option<String>,
    /// Contig of the mate (`RNEXT`, with `=` resolved); `None` when unset
    pub mate_contig: Option<String>,
    pub start: u64,
    pub end: u64,
    pub mapping_quality: u8,
    pub cigar: Vec<CigarOp>,
    pub body: RecordBody,
}

impl AlignmentRecord {
    pub fn is_paired(&self) -> bool {
        self.flags & flags::PAIRED != 0
    }

    pub fn is_duplicate(&self) -> bool {
        self.flags & flags::DUPLICATE != 0
    }

    pub fn is_unmapped(&self) -> bool {
        self.flags & flags::UNMAPPED != 0 || self.contig.is_none()
    }

    pub fn position_range(&self) -> Range<u64> {
        self.start..self.end
    }

    /// Reference intervals that receive depth from this record
    pub fn aligned_blocks(&self) -> Vec<(u64, u64)> {
        if self.cigar.is_empty() {
            vec![(self.start, self.end)]
        } else {
            cigar::aligned_blocks(self.start, &self.cigar)
        }
    }
}

/// End coordinate from the CIGAR, or from the read length when the CIGAR is absent
pub fn alignment_end(start: u64, ops: &[CigarOp], read_len: usize) -> u64 {
    let span = if ops.is_empty() {
        read_len.max(1) as u64
    } else {
        cigar::reference_length(ops)
    };
    start + span
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cigar::parse_cigar;

    fn record(flags: u16, cigar: &str) -> AlignmentRecord {
        let ops = parse_cigar(cigar).unwrap();
        AlignmentRecord {
            name: "r1".to_string(),
            flags,
            contig: Some("ctg1".to_string()),
            mate_contig: None,
            start: 10,
            end: alignment_end(10, &ops, 50),
            mapping_quality: 60,
            cigar: ops,
            body: RecordBody::Sam(String::new()),
        }
    }

    #[test]
    fn test_flag_accessors() {
        let rec = record(flags::PAIRED | flags::DUPLICATE, "50M");
        assert!(rec.is_paired());
        assert!(rec.is_duplicate());
        assert!(!rec.is_unmapped());
        assert_eq!(rec.position_range(), 10..60);
    }

    #[test]
    fn test_missing_cigar_uses_read_length() {
        let rec = record(flags::PAIRED, "*");
        assert_eq!(rec.end, 60);
        assert_eq!(rec.aligned_blocks(), vec![(10, 60)]);
    }
}
