/// Per-sample alignment filtering
///
/// Records are validated against the full reference set first; a record
/// that cannot belong to it makes the whole sample unusable. Valid records
/// are then kept only if they are paired, not duplicates, of sufficient
/// mapping quality, and placed on a qualifying contig.
use crate::alignment_io::AlignmentHeader;
use crate::contigs::QualifyingContigs;
use crate::error::SampleError;
use crate::record::AlignmentRecord;
use crate::reference::ReferenceSet;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FilterCounts {
    pub seen: u64,
    pub kept: u64,
}

pub struct AlignmentFilter<'a> {
    reference: &'a ReferenceSet,
    qualifying: &'a QualifyingContigs,
    min_mapping_quality: u8,
    counts: FilterCounts,
}

impl<'a> AlignmentFilter<'a> {
    pub fn new(
        reference: &'a ReferenceSet,
        qualifying: &'a QualifyingContigs,
        min_mapping_quality: u8,
    ) -> Self {
        AlignmentFilter {
            reference,
            qualifying,
            min_mapping_quality,
            counts: FilterCounts::default(),
        }
    }

    /// Header contigs that exist in the reference must agree on length
    pub fn check_header(&self, header: &AlignmentHeader) -> Result<(), SampleError> {
        for (name, declared) in &header.contigs {
            if let Some(contig) = self.reference.get(name) {
                if contig.length != *declared {
                    return Err(SampleError::HeaderLength {
                        contig: name.clone(),
                        declared: *declared,
                        actual: contig.length,
                    });
                }
            }
        }
        Ok(())
    }

    /// Validate then filter one record. `Ok(true)` means keep.
    pub fn accept(&mut self, record: &AlignmentRecord) -> Result<bool, SampleError> {
        self.counts.seen += 1;

        if record.is_unmapped() {
            return Ok(false);
        }
        validate_record(record, self.reference)?;

        let keep = passes_filter(record, self.qualifying, self.min_mapping_quality);
        if keep {
            self.counts.kept += 1;
        }
        Ok(keep)
    }

    pub fn counts(&self) -> FilterCounts {
        self.counts
    }
}

/// A mapped record must name a reference contig and lie within it
pub fn validate_record(record: &AlignmentRecord, reference: &ReferenceSet) -> Result<(), SampleError> {
    let Some(name) = record.contig.as_deref() else {
        return Ok(());
    };

    let contig = reference
        .get(name)
        .ok_or_else(|| SampleError::UnknownContig {
            record: record.name.clone(),
            contig: name.to_string(),
        })?;

    if record.start >= contig.length || record.end > contig.length || record.end <= record.start {
        return Err(SampleError::OutOfRange {
            record: record.name.clone(),
            contig: name.to_string(),
            start: record.start,
            end: record.end,
            length: contig.length,
        });
    }

    Ok(())
}

pub fn passes_filter(
    record: &AlignmentRecord,
    qualifying: &QualifyingContigs,
    min_mapping_quality: u8,
) -> bool {
    record.is_paired()
        && !record.is_duplicate()
        && !record.is_unmapped()
        && record.mapping_quality >= min_mapping_quality
        && record
            .contig
            .as_deref()
            .is_some_and(|name| qualifying.contains(name))
}
