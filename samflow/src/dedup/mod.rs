//! The duplicate-marking engine: classifies fragments and pairs by their
//! adapted (unclipped) position and keeps only the highest-scoring candidate
//! per group, marking the rest as duplicates.
//!
//! Grounded on `mark_duplicates.cpp`. The original races worker threads
//! through a handful of TBB concurrent hash maps, each slot holding an
//! atomically-swappable "current best" pointer; here each map is a
//! [`dashmap::DashMap`] keyed by the group's logical fields, with a
//! [`slot::Slot`] playing the role of the atomic handle.

mod fragment;
mod pair;
mod slot;

use std::sync::Arc;

use indexmap::IndexMap;
use once_cell::sync::Lazy;

use crate::{
    error::{Error, ParseError, Result},
    filters::{AlignmentFilter, HeaderFilter},
    header::Header,
    record::{Alignment, Flags},
    slice::Slice,
    value::Value,
};

static PHRED_TABLE: Lazy<[u8; 512]> = Lazy::new(|| {
    let mut table = [0u8; 512];
    for c in 0..256usize {
        let pos = c << 1;
        if c < 33 || c > 126 {
            table[pos] = 0;
            table[pos + 1] = 1;
        } else {
            let qual = (c - 33) as u8;
            table[pos] = if qual >= 15 { qual } else { 0 };
            table[pos + 1] = 0;
        }
    }
    table
});

/// Sums the Phred-scaled quality of every base above quality 15.
///
/// # Errors
///
/// Returns [`ParseError::InvalidQual`] if `QUAL` contains a byte outside the
/// printable range `[33, 126]`.
fn compute_phred_score(aln: &Alignment) -> Result<i32> {
    let mut score: i32 = 0;
    let mut error: u8 = 0;
    for b in aln.qual.as_str().bytes() {
        let pos = (b as usize) << 1;
        score += PHRED_TABLE[pos] as i32;
        error |= PHRED_TABLE[pos + 1];
    }
    if error != 0 {
        return Err(Error::Parse(ParseError::InvalidQual));
    }
    Ok(score)
}

/// Computes the position the alignment would start at if its soft/hard clips
/// were extended to cover the whole clipped run — the position duplicates of
/// the same fragment are expected to agree on, regardless of how much of the
/// read each individual alignment happened to clip.
fn compute_unclipped_position(aln: &Alignment) -> Result<i32> {
    let cigar = crate::cigar::scan_cigar_string(&aln.cigar)?;
    if cigar.is_empty() {
        return Ok(aln.pos);
    }

    if aln.flag.contains(Flags::REVERSED) {
        let mut clipped: i32 = 1;
        let mut result = aln.pos - 1;
        for op in cigar.iter().rev() {
            let c = matches!(op.op, 'S' | 'H') as i32;
            let r = matches!(op.op, 'M' | 'D' | 'N' | '=' | 'X') as i32;
            clipped *= c;
            result += (r | clipped) * op.length;
        }
        Ok(result)
    } else {
        let mut result = aln.pos;
        for op in cigar.iter() {
            if !matches!(op.op, 'S' | 'H') {
                break;
            }
            result -= op.length;
        }
        Ok(result)
    }
}

/// Resolves the library id from `lb_table` and stamps the adapted position
/// and Phred score as temporary fields, all consumed by [`classify_fragment`]
/// and [`classify_pair`].
fn adapt_alignment(aln: &mut Alignment, lb_table: &IndexMap<String, String>) -> Result<()> {
    if let Some(rg) = aln.read_group() {
        if let Some(lb) = lb_table.get(rg.as_str()) {
            aln.set_libid(Slice::from(lb.as_str()));
        }
    }
    let pos = compute_unclipped_position(aln)?;
    aln.set_temp("ADAPTED_POS", Value::Int(pos));
    let score = compute_phred_score(aln)?;
    aln.set_temp("ADAPTED_SCORE", Value::Int(score));
    Ok(())
}

fn adapted_pos(aln: &Alignment) -> i32 {
    match aln.temp("ADAPTED_POS") {
        Some(Value::Int(v)) => *v,
        _ => aln.pos,
    }
}

fn adapted_score(aln: &Alignment) -> i32 {
    match aln.temp("ADAPTED_SCORE") {
        Some(Value::Int(v)) => *v,
        _ => 0,
    }
}

/// `true` for a read whose mate (if any) is known to be mapped — a fragment
/// classified alone rather than as part of a pair.
fn is_true_fragment(aln: &Alignment) -> bool {
    (aln.flag & (Flags::MULTIPLE | Flags::NEXT_UNMAPPED)) != Flags::MULTIPLE
}

/// `true` for a read that is one half of a properly paired, both-mapped
/// template.
fn is_true_pair(aln: &Alignment) -> bool {
    (aln.flag & (Flags::MULTIPLE | Flags::NEXT_UNMAPPED)) == Flags::MULTIPLE
}

/// Builds the duplicate-marking filter. Every eligible primary, non-duplicate
/// alignment is adapted and classified (as a lone fragment or as half of a
/// pair, depending on its flags); the losing candidate(s) in each group are
/// marked a duplicate via [`Alignment::mark_duplicate`]. Never drops a
/// record outright — pair with [`crate::filters::simple::filter_duplicate_reads`]
/// to actually remove them.
///
/// If `deterministic`, ties are broken by `QNAME` so repeated runs over the
/// same input mark the same candidate, instead of whichever one happened to
/// win the race.
pub fn mark_duplicates(deterministic: bool) -> HeaderFilter {
    Box::new(move |header: &mut Header| {
        let mut lb_table = IndexMap::new();
        for rg in &header.rg {
            if let Some(lb) = rg.get("LB") {
                let id = rg
                    .get("ID")
                    .cloned()
                    .ok_or(Error::Parse(ParseError::MissingReadGroupId))?;
                lb_table.insert(id, lb.clone());
            }
        }

        let fragments = Arc::new(fragment::FragmentMap::default());
        let pair_fragments = Arc::new(pair::PairFragmentMap::default());
        let pairs = Arc::new(pair::PairMap::default());

        Ok(Some(Arc::new(move |aln: &mut Alignment| {
            if aln.flag_not_any(
                Flags::UNMAPPED | Flags::SECONDARY | Flags::DUPLICATE | Flags::SUPPLEMENTARY,
            ) {
                if adapt_alignment(aln, &lb_table).is_ok() {
                    fragment::classify_fragment(aln, &fragments, deterministic);
                    pair::classify_pair(aln, &pair_fragments, &pairs, deterministic);
                }
            }
            true
        }) as AlignmentFilter))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::slice::Slice;

    fn rec(line: &str) -> Alignment {
        Alignment::parse(Slice::from(line)).unwrap()
    }

    #[test]
    fn test_compute_phred_score_counts_bases_above_threshold() {
        let aln = rec("r1\t0\tchr1\t1\t0\t3M\t*\t0\t0\tACG\tIII");
        assert_eq!(compute_phred_score(&aln).unwrap(), (b'I' - 33) as i32 * 3);
    }

    #[test]
    fn test_compute_unclipped_position_forward_strand() {
        let aln = rec("r1\t0\tchr1\t10\t0\t3S5M\t*\t0\t0\tACGTACGT\tIIIIIIII");
        assert_eq!(compute_unclipped_position(&aln).unwrap(), 7);
    }

    #[test]
    fn test_compute_unclipped_position_reverse_strand() {
        let aln = rec("r1\t16\tchr1\t10\t0\t5M3S\t*\t0\t0\tACGTACGT\tIIIIIIII");
        assert_eq!(compute_unclipped_position(&aln).unwrap(), 9 + 5 + 3);
    }

    #[test]
    fn test_is_true_fragment_and_pair_are_exclusive() {
        let unpaired = rec("r1\t0\tchr1\t1\t0\t*\t*\t0\t0\t*\t*");
        assert!(is_true_fragment(&unpaired));
        assert!(!is_true_pair(&unpaired));

        let paired_mate_mapped = rec("r1\t1\tchr1\t1\t0\t*\t*\t0\t0\t*\t*");
        assert!(!is_true_fragment(&paired_mate_mapped));
        assert!(is_true_pair(&paired_mate_mapped));

        let paired_mate_unmapped = rec("r1\t9\tchr1\t1\t0\t*\t*\t0\t0\t*\t*");
        assert!(is_true_fragment(&paired_mate_unmapped));
        assert!(!is_true_pair(&paired_mate_unmapped));
    }
}
