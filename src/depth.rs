/// Per-position read depth over qualifying contigs
use crate::contigs::QualifyingContigs;
use crate::record::AlignmentRecord;

/// Dense depth values for every qualifying contig; zero-depth positions are stored
#[derive(Debug, Clone, PartialEq)]
pub struct DepthProfile {
    contigs: Vec<(String, Vec<u32>)>,
}

impl DepthProfile {
    pub fn from_depths(contigs: Vec<(String, Vec<u32>)>) -> Self {
        DepthProfile { contigs }
    }

    pub fn contig(&self, name: &str) -> Option<&[u32]> {
        self.contigs
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, d)| d.as_slice())
    }

    /// Every position of every contig, in reference order
    pub fn depths(&self) -> impl Iterator<Item = u32> + '_ {
        self.contigs.iter().flat_map(|(_, d)| d.iter().copied())
    }

    pub fn total_positions(&self) -> u64 {
        self.contigs.iter().map(|(_, d)| d.len() as u64).sum()
    }

    pub fn covered_positions(&self) -> u64 {
        self.depths().filter(|&d| d > 0).count() as u64
    }
}

/// Accumulates filtered records into per-contig difference arrays
pub struct DepthProfiler<'a> {
    qualifying: &'a QualifyingContigs,
    diffs: Vec<Vec<i32>>,
}

impl<'a> DepthProfiler<'a> {
    pub fn new(qualifying: &'a QualifyingContigs) -> Self {
        let diffs = qualifying
            .iter()
            .map(|(_, len)| vec![0i32; len as usize + 1])
            .collect();
        DepthProfiler { qualifying, diffs }
    }

    /// Count a record's aligned blocks. Records on other contigs are ignored.
    pub fn add(&mut self, record: &AlignmentRecord) {
        let Some(idx) = record
            .contig
            .as_deref()
            .and_then(|name| self.qualifying.index_of(name))
        else {
            return;
        };

        let diff = &mut self.diffs[idx];
        let len = (diff.len() - 1) as u64;
        for (start, end) in record.aligned_blocks() {
            let (start, end) = (start.min(len), end.min(len));
            if start < end {
                diff[start as usize] += 1;
                diff[end as usize] -= 1;
            }
        }
    }

    pub fn finish(self) -> DepthProfile {
        let contigs = self
            .qualifying
            .iter()
            .zip(self.diffs)
            .map(|((name, len), diff)| {
                let mut depths = Vec::with_capacity(len as usize);
                let mut running: i64 = 0;
                for delta in &diff[..len as usize] {
                    running += *delta as i64;
                    depths.push(running as u32);
                }
                (name.to_string(), depths)
            })
            .collect();

        DepthProfile { contigs }
    }
}
