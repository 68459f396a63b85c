/// Property tests for depth, median and breadth
use pancov::contigs::select_contigs;
use pancov::coverage::{breadth_percent, median_of_covered};
use pancov::depth::DepthProfiler;
use pancov::record::{flags, AlignmentRecord, RecordBody};
use pancov::reference::{Contig, ReferenceKind, ReferenceSet};
use proptest::prelude::*;

fn record(start: u64, len: u64) -> AlignmentRecord {
    AlignmentRecord {
        name: format!("r{start}"),
        flags: flags::PAIRED,
        contig: Some("ctg".to_string()),
        mate_contig: None,
        start,
        end: start + len,
        mapping_quality: 60,
        cigar: Vec::new(),
        body: RecordBody::Sam(String::new()),
    }
}

proptest! {
    #[test]
    fn median_matches_sorted_definition(depths in proptest::collection::vec(0u32..200, 0..300)) {
        let mut covered: Vec<u32> = depths.iter().copied().filter(|&d| d > 0).collect();
        covered.sort_unstable();

        let expected = match covered.len() {
            0 => None,
            n if n % 2 == 1 => Some(covered[n / 2] as f64),
            n => Some((covered[n / 2 - 1] as f64 + covered[n / 2] as f64) / 2.0),
        };
        prop_assert_eq!(median_of_covered(depths), expected);
    }

    #[test]
    fn median_ignores_uncovered_positions(depths in proptest::collection::vec(1u32..50, 1..100), zeros in 0usize..100) {
        let mut padded = depths.clone();
        padded.extend(std::iter::repeat(0).take(zeros));
        prop_assert_eq!(median_of_covered(depths), median_of_covered(padded));
    }

    #[test]
    fn breadth_is_a_percentage(total in 1u64..1_000_000, covered_share in 0.0f64..=1.0) {
        let covered = (total as f64 * covered_share) as u64;
        let breadth = breadth_percent(covered, total).unwrap();
        prop_assert!((0.0..=100.0).contains(&breadth));
    }

    #[test]
    fn breadth_grows_with_covered_positions(total in 1u64..100_000, a in 0u64..100_000, b in 0u64..100_000) {
        let (low, high) = (a.min(b).min(total), a.max(b).min(total));
        let low_breadth = breadth_percent(low, total).unwrap();
        let high_breadth = breadth_percent(high, total).unwrap();
        prop_assert!(low_breadth <= high_breadth);
    }

    #[test]
    fn depth_sums_aligned_bases(reads in proptest::collection::vec((0u64..900, 1u64..150), 0..60)) {
        let reference = ReferenceSet::new(
            "pg",
            ReferenceKind::SingleOrConsensus,
            vec![Contig::new("ctg", vec![b'A'; 1000], false)],
        ).unwrap();
        let qualifying = select_contigs(&reference, 1);
        let mut profiler = DepthProfiler::new(&qualifying);

        let mut expected = 0u64;
        for (start, len) in &reads {
            let end = (start + len).min(1000);
            expected += end - start;
            profiler.add(&record(*start, end - start));
        }

        let profile = profiler.finish();
        let total: u64 = profile.depths().map(u64::from).sum();
        prop_assert_eq!(total, expected);
        prop_assert_eq!(profile.total_positions(), 1000);
    }
}

#[test]
fn breadth_undefined_without_positions() {
    assert_eq!(breadth_percent(0, 0), None);
}
