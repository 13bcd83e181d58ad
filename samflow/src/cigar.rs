//! CIGAR string parsing, with a process-wide cache since the same string
//! recurs across enormous numbers of alignments (most reads share a handful of
//! distinct CIGARs).
//!
//! Grounded on `sam_types.cpp`'s `cigar_operations`/`make_cigar_operation`/
//! `scan_cigar_string`/`cigar_cache`. The original uses a TBB
//! `concurrent_unordered_map` that is never evicted for the lifetime of the
//! process; `dashmap` plus a `once_cell::sync::Lazy` static plays the same role
//! here.

use std::sync::Arc;

use dashmap::DashMap;
use once_cell::sync::Lazy;

use crate::{
    error::{Error, ParseError, Result},
    scanner::parse_i32,
    slice::Slice,
};

/// One `<length><op>` unit of a CIGAR string, with case-folded operation code
/// (e.g. `m` and `M` are both recorded as `M`).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CigarOp {
    /// The run length.
    pub length: i32,
    /// The canonical (uppercase) operation character.
    pub op: char,
}

fn canonical_op(c: char) -> Option<char> {
    match c {
        'M' | 'm' => Some('M'),
        'I' | 'i' => Some('I'),
        'D' | 'd' => Some('D'),
        'N' | 'n' => Some('N'),
        'S' | 's' => Some('S'),
        'H' | 'h' => Some('H'),
        'P' | 'p' => Some('P'),
        'X' | 'x' => Some('X'),
        '=' => Some('='),
        _ => None,
    }
}

fn parse_cigar_string(cigar: &str) -> Result<Vec<CigarOp>> {
    let mut result = Vec::with_capacity(8);
    let bytes = cigar.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        let start = i;
        while i < bytes.len() && bytes[i].is_ascii_digit() {
            i += 1;
        }
        if i >= bytes.len() {
            return Err(Error::Parse(ParseError::UnknownCigarOp('\0')));
        }
        let length = parse_i32(std::str::from_utf8(&bytes[start..i]).unwrap_or(""))?;
        let raw = bytes[i] as char;
        let op = canonical_op(raw).ok_or(Error::Parse(ParseError::UnknownCigarOp(raw)))?;
        i += 1;
        result.push(CigarOp { length, op });
    }
    Ok(result)
}

static CIGAR_CACHE: Lazy<DashMap<Slice, Arc<Vec<CigarOp>>>> = Lazy::new(DashMap::new);

/// Returns the parsed operations of `cigar`, reusing a cached parse if this
/// exact string has been seen by any thread before.
///
/// # Errors
///
/// Returns an error if `cigar` uses an unrecognized operation character or a
/// malformed run length.
pub fn scan_cigar_string(cigar: &Slice) -> Result<Arc<Vec<CigarOp>>> {
    if cigar.as_str() == "*" {
        return Ok(Arc::new(Vec::new()));
    }
    if let Some(cached) = CIGAR_CACHE.get(cigar) {
        return Ok(Arc::clone(cached.value()));
    }
    let parsed = Arc::new(parse_cigar_string(cigar.as_str())?);
    CIGAR_CACHE.insert(cigar.clone(), Arc::clone(&parsed));
    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scan_cigar_string() {
        let ops = scan_cigar_string(&Slice::from("10M2I3D")).unwrap();
        assert_eq!(
            ops.as_slice(),
            &[
                CigarOp { length: 10, op: 'M' },
                CigarOp { length: 2, op: 'I' },
                CigarOp { length: 3, op: 'D' },
            ]
        );
    }

    #[test]
    fn test_star_is_empty() {
        let ops = scan_cigar_string(&Slice::from("*")).unwrap();
        assert!(ops.is_empty());
    }

    #[test]
    fn test_lowercase_op_is_canonicalized() {
        let ops = scan_cigar_string(&Slice::from("5m")).unwrap();
        assert_eq!(ops[0].op, 'M');
    }

    #[test]
    fn test_unknown_op_is_error() {
        assert!(scan_cigar_string(&Slice::from("5Q")).is_err());
    }

    #[test]
    fn test_cache_reuses_same_string() {
        let a = scan_cigar_string(&Slice::from("10M")).unwrap();
        let b = scan_cigar_string(&Slice::from("10M")).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }
}
