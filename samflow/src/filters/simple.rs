//! Individually simple filters: unmapped/duplicate/optional-read dropping,
//! read-group stamping, `@PG` chain extension, and reference-id resolution.
//!
//! Grounded on `simple_filters.cpp`.

use std::sync::Arc;

use indexmap::IndexMap;

use crate::{
    error::{Error, ParseError, Result},
    header::{Header, Record},
    record::{Alignment, Flags},
    slice::Slice,
    value::Value,
};

use super::{AlignmentFilter, HeaderFilter};

/// Drops reads with the `UNMAPPED` flag set.
pub fn filter_unmapped_reads() -> HeaderFilter {
    Box::new(|_header: &mut Header| {
        Ok(Some(
            Arc::new(|aln: &mut Alignment| !aln.flag.contains(Flags::UNMAPPED)) as AlignmentFilter
        ))
    })
}

/// Drops reads with the `UNMAPPED` flag set, or with `POS == 0`, or with
/// `RNAME == "*"` (a stricter notion of "mapped" than the flag alone).
pub fn filter_unmapped_reads_strict() -> HeaderFilter {
    Box::new(|_header: &mut Header| {
        Ok(Some(Arc::new(|aln: &mut Alignment| {
            !aln.flag.contains(Flags::UNMAPPED) && aln.pos != 0 && aln.rname.as_str() != "*"
        }) as AlignmentFilter))
    })
}

/// Drops reads already marked a duplicate (on input or by the mark-duplicates
/// engine, if it ran earlier in the same chain).
pub fn filter_duplicate_reads() -> HeaderFilter {
    Box::new(|_header: &mut Header| {
        Ok(Some(Arc::new(|aln: &mut Alignment| !aln.is_duplicate()) as AlignmentFilter))
    })
}

/// Drops reads carrying an `sr` optional tag, but only if the header declares
/// an `@sr` user record (which is then consumed/removed).
pub fn filter_optional_reads() -> HeaderFilter {
    Box::new(|header: &mut Header| {
        if header.user_records.shift_remove("@sr").is_none() {
            return Ok(None);
        }
        Ok(Some(
            Arc::new(|aln: &mut Alignment| aln.tag("sr").is_none()) as AlignmentFilter
        ))
    })
}

/// Replaces every alignment's `@RG` read group with `read_group`'s `ID`, and
/// replaces the header's `@RG` list with just that one record.
pub fn add_or_replace_read_group(read_group: Record) -> HeaderFilter {
    Box::new(move |header: &mut Header| {
        let id = read_group
            .get("ID")
            .cloned()
            .ok_or(Error::Parse(ParseError::MissingId))?;
        header.rg = vec![read_group.clone()];
        Ok(Some(Arc::new(move |aln: &mut Alignment| {
            aln.set_tag("RG", Value::Str(Slice::from(id.as_str())));
            true
        }) as AlignmentFilter))
    })
}

/// Extends the header's `@PG` chain with `new_pg`, resolving an `ID` clash by
/// appending a random hex suffix, and linking `PP` to whichever existing
/// `@PG` record nothing else already points to.
pub fn add_pg_line(mut new_pg: Record) -> HeaderFilter {
    Box::new(move |header: &mut Header| {
        let mut id = new_pg
            .get("ID")
            .cloned()
            .ok_or(Error::Parse(ParseError::MissingId))?;

        if header.pg.iter().any(|pg| pg.get("ID") == Some(&id)) {
            let mut rng_state: u64 = 0x9E37_79B9_7F4A_7C15;
            loop {
                rng_state = rng_state.wrapping_mul(6364136223846793005).wrapping_add(1);
                let suffix = (rng_state >> 33) & 0xFFFF;
                let candidate = format!("{id}{suffix:x}");
                if !header.pg.iter().any(|pg| pg.get("ID") == Some(&candidate)) {
                    id = candidate;
                    break;
                }
            }
        }
        new_pg.insert("ID".to_owned(), id.clone());

        for pg in &header.pg {
            let next_id = pg
                .get("ID")
                .cloned()
                .ok_or(Error::Parse(ParseError::MissingId))?;
            let already_linked = header.pg.iter().any(|p| p.get("PP") == Some(&next_id));
            if !already_linked {
                new_pg.insert("PP".to_owned(), next_id);
                break;
            }
        }

        header.pg.push(new_pg.clone());
        Ok(None)
    })
}

/// Resolves each alignment's `RNAME` against the header's `@SQ` order,
/// recording the 0-based index (or `-1` if not found) as the temporary
/// `REFID` field later stages and the coordinate comparator rely on.
pub fn add_refid() -> HeaderFilter {
    Box::new(|header: &mut Header| {
        let mut dict: IndexMap<String, i32> = IndexMap::with_capacity(header.sq.len());
        for (index, sq) in header.sq.iter().enumerate() {
            let sn = sq.get("SN").cloned().ok_or(Error::Parse(ParseError::MissingSn))?;
            dict.insert(sn, index as i32);
        }
        Ok(Some(Arc::new(move |aln: &mut Alignment| {
            let refid = dict.get(aln.rname.as_str()).copied().unwrap_or(-1);
            aln.set_refid(refid);
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
    fn test_filter_unmapped_reads() {
        let mut header = Header::default();
        let filter = filter_unmapped_reads()(&mut header).unwrap().unwrap();
        assert!(filter(&mut rec("r1\t0\tchr1\t1\t0\t*\t*\t0\t0\t*\t*")));
        assert!(!filter(&mut rec("r1\t4\t*\t0\t0\t*\t*\t0\t0\t*\t*")));
    }

    #[test]
    fn test_filter_optional_reads_only_if_declared() {
        let mut header = Header::default();
        assert!(filter_optional_reads()(&mut header).unwrap().is_none());

        header.add_user_record("@sr", Record::new());
        let filter = filter_optional_reads()(&mut header).unwrap().unwrap();
        assert!(!filter(&mut rec("r1\t0\tchr1\t1\t0\t*\t*\t0\t0\t*\t*\tsr:i:1")));
        assert!(filter(&mut rec("r1\t0\tchr1\t1\t0\t*\t*\t0\t0\t*\t*")));
        assert!(header.user_records.get("@sr").is_none());
    }

    #[test]
    fn test_add_or_replace_read_group_stamps_tag() {
        let mut header = Header::default();
        let mut rg = Record::new();
        rg.insert("ID".to_owned(), "rg1".to_owned());
        let filter = add_or_replace_read_group(rg)(&mut header).unwrap().unwrap();

        let mut aln = rec("r1\t0\tchr1\t1\t0\t*\t*\t0\t0\t*\t*");
        assert!(filter(&mut aln));
        assert_eq!(aln.read_group().map(Slice::as_str), Some("rg1"));
        assert_eq!(header.rg.len(), 1);
    }

    #[test]
    fn test_add_refid_resolves_known_and_unknown_names() {
        let mut header = Header::default();
        let mut sq = Record::new();
        sq.insert("SN".to_owned(), "chr1".to_owned());
        header.sq.push(sq);
        let filter = add_refid()(&mut header).unwrap().unwrap();

        let mut known = rec("r1\t0\tchr1\t1\t0\t*\t*\t0\t0\t*\t*");
        assert!(filter(&mut known));
        assert_eq!(known.refid(), Some(0));

        let mut unknown = rec("r2\t0\tchr9\t1\t0\t*\t*\t0\t0\t*\t*");
        assert!(filter(&mut unknown));
        assert_eq!(unknown.refid(), Some(-1));
    }

    #[test]
    fn test_add_pg_line_resolves_id_clash() {
        let mut header = Header::default();
        let mut first = Record::new();
        first.insert("ID".to_owned(), "samflow".to_owned());
        header.pg.push(first);

        let mut new_pg = Record::new();
        new_pg.insert("ID".to_owned(), "samflow".to_owned());
        add_pg_line(new_pg)(&mut header).unwrap();

        assert_eq!(header.pg.len(), 2);
        assert_ne!(header.pg[0].get("ID"), header.pg[1].get("ID"));
        assert_eq!(header.pg[1].get("PP").map(String::as_str), Some("samflow"));
    }
}
