/// CIGAR parsing and reference-span helpers
use anyhow::{anyhow, Result};
use nom::{
    character::complete::{digit1, one_of},
    combinator::{all_consuming, map_res},
    multi::many1,
    sequence::pair,
    IResult,
};

/// One CIGAR operation, stored as its SAM operation character
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CigarOp {
    pub len: u32,
    pub kind: u8,
}

impl CigarOp {
    pub fn new(len: u32, kind: u8) -> Self {
        CigarOp { len, kind }
    }

    /// M, D, N, = and X advance along the reference
    pub fn consumes_reference(&self) -> bool {
        matches!(self.kind, b'M' | b'D' | b'N' | b'=' | b'X')
    }

    /// Operations that place a read base on a reference base
    pub fn is_aligned(&self) -> bool {
        matches!(self.kind, b'M' | b'=' | b'X')
    }
}

fn cigar_op(input: &str) -> IResult<&str, CigarOp> {
    let (rest, (len, kind)) = pair(
        map_res(digit1, |digits: &str| digits.parse::<u32>()),
        one_of("MIDNSHP=X"),
    )(input)?;
    Ok((rest, CigarOp::new(len, kind as u8)))
}

/// Parse a SAM CIGAR string. `*` is the empty CIGAR.
pub fn parse_cigar(cigar: &str) -> Result<Vec<CigarOp>> {
    if cigar == "*" {
        return Ok(Vec::new());
    }

    let (_, ops) = all_consuming(many1(cigar_op))(cigar)
        .map_err(|e| anyhow!("Invalid CIGAR '{cigar}': {e}"))?;
    Ok(ops)
}

/// Number of reference bases spanned by the operations
pub fn reference_length(ops: &[CigarOp]) -> u64 {
    ops.iter()
        .filter(|op| op.consumes_reference())
        .map(|op| op.len as u64)
        .sum()
}

/// Half-open reference intervals covered by aligned bases, starting at `start`
pub fn aligned_blocks(start: u64, ops: &[CigarOp]) -> Vec<(u64, u64)> {
    let mut blocks = Vec::new();
    let mut pos = start;

    for op in ops {
        if !op.consumes_reference() {
            continue;
        }
        let next = pos + op.len as u64;
        if op.is_aligned() {
            // Adjacent M/=/X runs collapse into one block
            match blocks.last_mut() {
                Some((_, end)) if *end == pos => *end = next,
                _ => blocks.push((pos, next)),
            }
        }
        pos = next;
    }

    blocks
}
