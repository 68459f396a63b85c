/// Selection of the contigs that take part in coverage evaluation
use indexmap::IndexMap;

use crate::reference::{ReferenceKind, ReferenceSet};

/// Qualifying contigs with their lengths, in reference order unless reordered
/// by [`QualifyingContigs::ordered_by`]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QualifyingContigs {
    contigs: IndexMap<String, u64>,
    total_length: u64,
}

impl QualifyingContigs {
    pub fn contains(&self, name: &str) -> bool {
        self.contigs.contains_key(name)
    }

    pub fn length(&self, name: &str) -> Option<u64> {
        self.contigs.get(name).copied()
    }

    /// Position of the contig in this ordering
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.contigs.get_index_of(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, u64)> + '_ {
        self.contigs.iter().map(|(name, &len)| (name.as_str(), len))
    }

    pub fn len(&self) -> usize {
        self.contigs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contigs.is_empty()
    }

    /// Sum of qualifying contig lengths; the breadth denominator
    pub fn total_length(&self) -> u64 {
        self.total_length
    }

    /// The same contigs in the order of an alignment header's `@SQ` list.
    ///
    /// Contigs the header does not declare follow in their current order.
    /// Merged outputs are sorted and declared in this order.
    pub fn ordered_by(&self, header_contigs: &[(String, u64)]) -> QualifyingContigs {
        let mut contigs = IndexMap::with_capacity(self.contigs.len());
        for (name, _) in header_contigs {
            if let Some(&length) = self.contigs.get(name) {
                contigs.insert(name.clone(), length);
            }
        }
        for (name, &length) in &self.contigs {
            if !contigs.contains_key(name) {
                contigs.insert(name.clone(), length);
            }
        }

        QualifyingContigs {
            contigs,
            total_length: self.total_length,
        }
    }
}

/// Keep contigs of at least `min_contig_length`; for core references also
/// require the core tag.
pub fn select_contigs(reference: &ReferenceSet, min_contig_length: u64) -> QualifyingContigs {
    let require_core = reference.kind == ReferenceKind::Core;
    let mut selected = QualifyingContigs::default();

    for contig in reference.contigs() {
        if contig.length < min_contig_length {
            continue;
        }
        if require_core && !contig.is_core_tagged {
            continue;
        }
        selected.total_length += contig.length;
        selected.contigs.insert(contig.name.clone(), contig.length);
    }

    if selected.is_empty() {
        log::warn!(
            "Reference {}: no qualifying contigs (kind {}, min length {}); every sample will fail",
            reference.id,
            reference.kind,
            min_contig_length
        );
    } else {
        log::info!(
            "Reference {}: {} of {} contigs qualify ({} bp)",
            reference.id,
            selected.len(),
            reference.contigs().len(),
            selected.total_length
        );
    }

    selected
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reference::Contig;

    fn mixed_reference(kind: ReferenceKind) -> ReferenceSet {
        let contigs = vec![
            Contig::new("long_core", vec![b'A'; 1500], true),
            Contig::new("long_plain", vec![b'C'; 2000], false),
            Contig::new("short_core", vec![b'G'; 999], true),
            Contig::new("short_plain", vec![b'T'; 10], false),
            Contig::new("exact_core", vec![b'A'; 1000], true),
        ];
        ReferenceSet::new("pg1", kind, contigs).unwrap()
    }

    #[test]
    fn test_single_reference_uses_length_only() {
        let selected = select_contigs(&mixed_reference(ReferenceKind::SingleOrConsensus), 1000);
        let names: Vec<&str> = selected.iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["long_core", "long_plain", "exact_core"]);
        assert_eq!(selected.total_length(), 4500);
    }

    #[test]
    fn test_core_reference_requires_tag() {
        let selected = select_contigs(&mixed_reference(ReferenceKind::Core), 1000);
        let names: Vec<&str> = selected.iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["long_core", "exact_core"]);
        assert_eq!(selected.total_length(), 2500);
        assert_eq!(selected.index_of("exact_core"), Some(1));
        assert!(!selected.contains("long_plain"));
    }

    #[test]
    fn test_header_order_overrides_reference_order() {
        let selected = select_contigs(&mixed_reference(ReferenceKind::SingleOrConsensus), 1000);
        let header = vec![
            ("exact_core".to_string(), 1000),
            ("short_plain".to_string(), 10),
            ("long_core".to_string(), 1500),
        ];
        let ordered = selected.ordered_by(&header);
        let names: Vec<&str> = ordered.iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["exact_core", "long_core", "long_plain"]);
        assert_eq!(ordered.index_of("long_core"), Some(1));
        assert_eq!(ordered.total_length(), selected.total_length());
        assert!(!ordered.contains("short_plain"));
    }

    #[test]
    fn test_nothing_qualifies() {
        let selected = select_contigs(&mixed_reference(ReferenceKind::Core), 1_000_000);
        assert!(selected.is_empty());
        assert_eq!(selected.total_length(), 0);
    }
}
