/// Reference sequence sets (pangenomes or single/consensus genomes)
use anyhow::{bail, Context, Result};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::io::{BufRead, Write};
use std::path::Path;
use std::str::FromStr;

use crate::alignment_io::open_text_input;

/// Whether the reference is a core pangenome or a single/consensus genome.
/// An undetermined kind is treated as `SingleOrConsensus`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReferenceKind {
    Core,
    #[default]
    SingleOrConsensus,
}

impl FromStr for ReferenceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "core" => Ok(ReferenceKind::Core),
            "single" | "consensus" | "single-or-consensus" => Ok(ReferenceKind::SingleOrConsensus),
            other => Err(format!(
                "Unknown reference kind '{other}'. Use 'core', 'single' or 'consensus'"
            )),
        }
    }
}

impl fmt::Display for ReferenceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReferenceKind::Core => write!(f, "core"),
            ReferenceKind::SingleOrConsensus => write!(f, "single-or-consensus"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Contig {
    pub name: String,
    pub length: u64,
    pub sequence: Vec<u8>,
    pub is_core_tagged: bool,
}

impl Contig {
    pub fn new(name: impl Into<String>, sequence: Vec<u8>, is_core_tagged: bool) -> Self {
        Contig {
            name: name.into(),
            length: sequence.len() as u64,
            sequence,
            is_core_tagged,
        }
    }
}

/// An identified, ordered collection of contigs
#[derive(Debug, Clone)]
pub struct ReferenceSet {
    pub id: String,
    pub kind: ReferenceKind,
    contigs: Vec<Contig>,
    index: HashMap<String, usize>,
}

impl ReferenceSet {
    /// Build a reference set, rejecting duplicate names and contigs whose
    /// recorded length disagrees with their sequence
    pub fn new(id: impl Into<String>, kind: ReferenceKind, contigs: Vec<Contig>) -> Result<Self> {
        let id = id.into();
        let mut index = HashMap::with_capacity(contigs.len());

        for (i, contig) in contigs.iter().enumerate() {
            if contig.length != contig.sequence.len() as u64 {
                bail!(
                    "Reference {id}: contig '{}' declares length {} but has {} bases",
                    contig.name,
                    contig.length,
                    contig.sequence.len()
                );
            }
            if index.insert(contig.name.clone(), i).is_some() {
                bail!("Reference {id}: duplicate contig name '{}'", contig.name);
            }
        }

        Ok(ReferenceSet {
            id,
            kind,
            contigs,
            index,
        })
    }

    /// Load contigs from a FASTA file. Contigs listed in `core_tags` are
    /// marked as core sequence.
    pub fn from_fasta<P: AsRef<Path>>(
        path: P,
        id: impl Into<String>,
        kind: ReferenceKind,
        core_tags: Option<&HashSet<String>>,
    ) -> Result<Self> {
        let path = path.as_ref();
        let reader = open_text_input(path)?;
        let records =
            read_fasta(reader).with_context(|| format!("Failed to read FASTA {}", path.display()))?;

        let contigs = records
            .into_iter()
            .map(|(name, sequence)| {
                let tagged = core_tags.is_some_and(|tags| tags.contains(&name));
                Contig::new(name, sequence, tagged)
            })
            .collect();

        Self::new(id, kind, contigs)
    }

    pub fn contigs(&self) -> &[Contig] {
        &self.contigs
    }

    pub fn get(&self, name: &str) -> Option<&Contig> {
        self.index.get(name).map(|&i| &self.contigs[i])
    }

    pub fn total_length(&self) -> u64 {
        self.contigs.iter().map(|c| c.length).sum()
    }
}

/// Parse FASTA records. Names stop at the first whitespace.
pub fn read_fasta<R: BufRead>(reader: R) -> Result<Vec<(String, Vec<u8>)>> {
    let mut records = Vec::new();
    let mut current: Option<(String, Vec<u8>)> = None;

    for line in reader.lines() {
        let line = line?;
        let trimmed = line.trim_end();

        if let Some(header) = trimmed.strip_prefix('>') {
            if let Some(done) = current.take() {
                records.push(done);
            }
            let name = header.split_whitespace().next().unwrap_or("");
            if name.is_empty() {
                bail!("FASTA header without a sequence name");
            }
            current = Some((name.to_string(), Vec::new()));
        } else if !trimmed.is_empty() {
            match current.as_mut() {
                Some((_, seq)) => seq.extend_from_slice(trimmed.as_bytes()),
                None => bail!("FASTA sequence data before the first header"),
            }
        }
    }

    if let Some(done) = current {
        records.push(done);
    }

    Ok(records)
}

/// Write contigs as FASTA, wrapping sequence lines at `line_width`
pub fn write_fasta<'a, W, I>(writer: &mut W, contigs: I, line_width: usize) -> Result<()>
where
    W: Write,
    I: IntoIterator<Item = &'a Contig>,
{
    for contig in contigs {
        writeln!(writer, ">{}", contig.name)?;
        for chunk in contig.sequence.chunks(line_width.max(1)) {
            writer.write_all(chunk)?;
            writer.write_all(b"\n")?;
        }
    }
    Ok(())
}

/// Read a list of core-tagged contig names, one per line. `#` starts a comment.
pub fn read_core_tags<P: AsRef<Path>>(path: P) -> Result<HashSet<String>> {
    let path = path.as_ref();
    let reader = open_text_input(path)?;
    let mut tags = HashSet::new();

    for line in reader.lines() {
        let line = line.with_context(|| format!("Failed to read {}", path.display()))?;
        let name = line.split('#').next().unwrap_or("").trim();
        if !name.is_empty() {
            tags.insert(name.to_string());
        }
    }

    Ok(tags)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_read_fasta() {
        let input = ">ctg1 some description\nACGT\nAC\n\n>ctg2\nGG\n";
        let records = read_fasta(Cursor::new(input)).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].0, "ctg1");
        assert_eq!(records[0].1, b"ACGTAC".to_vec());
        assert_eq!(records[1].1, b"GG".to_vec());
    }

    #[test]
    fn test_read_fasta_rejects_orphan_sequence() {
        assert!(read_fasta(Cursor::new("ACGT\n>ctg1\nA\n")).is_err());
    }

    #[test]
    fn test_write_fasta_wraps_lines() {
        let contig = Contig::new("ctg1", b"ACGTACGTAC".to_vec(), false);
        let mut out = Vec::new();
        write_fasta(&mut out, [&contig], 4).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), ">ctg1\nACGT\nACGT\nAC\n");
    }

    #[test]
    fn test_length_invariant() {
        let mut contig = Contig::new("ctg1", b"ACGT".to_vec(), false);
        contig.length = 10;
        assert!(ReferenceSet::new("ref", ReferenceKind::Core, vec![contig]).is_err());

        let dup = vec![
            Contig::new("a", b"A".to_vec(), false),
            Contig::new("a", b"C".to_vec(), false),
        ];
        assert!(ReferenceSet::new("ref", ReferenceKind::Core, dup).is_err());
    }

    #[test]
    fn test_kind_parsing() {
        assert_eq!("core".parse::<ReferenceKind>(), Ok(ReferenceKind::Core));
        assert_eq!(
            "Consensus".parse::<ReferenceKind>(),
            Ok(ReferenceKind::SingleOrConsensus)
        );
        assert!("pan".parse::<ReferenceKind>().is_err());
        assert_eq!(ReferenceKind::default(), ReferenceKind::SingleOrConsensus);
    }
}
