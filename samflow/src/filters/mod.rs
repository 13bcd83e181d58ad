//! The filter library: per-header setup that produces a per-alignment
//! predicate, composed and applied in batches.
//!
//! Grounded on `filters.cpp`/`filter_pipeline.cpp`'s `compose_filters`. Every
//! filter here is a two-stage closure, matching the original's
//! `header_filter`/`alignment_filter` split: header-level state (a
//! resolved reference dictionary, a read group id) is computed once, and the
//! returned per-alignment predicate closes over it. The predicate takes
//! `&mut Alignment`, not `&Alignment`: a handful of filters (read-group
//! stamping, reference-id resolution) rewrite the record as they decide
//! whether to keep it, exactly as the original's `alignment_filter` does by
//! calling `aln->set_rg(...)`/`aln->set_refid(...)` before returning `true`.

pub mod refdict;
pub mod simple;

use std::sync::Arc;

use crate::{
    error::Result,
    header::Header,
    pipeline::{node::Stage, Batch},
    record::Alignment,
};

/// A per-alignment predicate: `true` keeps the record, `false` drops it. May
/// rewrite the record in place before deciding.
pub type AlignmentFilter = Arc<dyn Fn(&mut Alignment) -> bool + Send + Sync>;

/// A filter's header-level setup step. Returns `Ok(None)` when this filter
/// needs no per-alignment predicate (e.g. `add_pg_line`, which only mutates
/// the header).
pub type HeaderFilter = Box<dyn Fn(&mut Header) -> Result<Option<AlignmentFilter>> + Send + Sync>;

/// Runs every header filter against `header` in order, composing the
/// resulting per-alignment predicates into one.
///
/// Returns `None` if no filter produced a predicate (the common case when the
/// whole filter chain is header-only, e.g. just `add-or-replace-read-group`).
pub fn compose_header_filters(
    header: &mut Header,
    filters: &[HeaderFilter],
) -> Result<Option<AlignmentFilter>> {
    let mut aln_filters = Vec::with_capacity(filters.len());
    for filter in filters {
        if let Some(aln_filter) = filter(header)? {
            aln_filters.push(aln_filter);
        }
    }
    if aln_filters.is_empty() {
        return Ok(None);
    }
    Ok(Some(Arc::new(move |aln: &mut Alignment| {
        aln_filters.iter().all(|f| f(aln))
    })))
}

/// Retains only the records for which `filter` returns `true`, preserving
/// relative order, after letting `filter` rewrite each surviving record.
pub fn apply_filter(records: &mut Vec<Alignment>, filter: &AlignmentFilter) {
    records.retain_mut(|aln| filter(aln));
}

/// Wraps a composed alignment filter as a pipeline stage over
/// [`Batch::Records`].
pub fn filter_stage(filter: AlignmentFilter) -> Stage {
    Arc::new(move |batch: Batch| {
        let mut records = batch.into_records()?;
        apply_filter(&mut records, &filter);
        Ok(Batch::Records(records))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::slice::Slice;

    fn rec(qname: &str, flag: u16) -> Alignment {
        Alignment::parse(Slice::from(format!(
            "{qname}\t{flag}\tchr1\t1\t0\t*\t*\t0\t0\t*\t*"
        )))
        .unwrap()
    }

    #[test]
    fn test_compose_header_filters_combines_predicates() {
        let mut header = Header::default();
        let filters: Vec<HeaderFilter> = vec![
            Box::new(|_h: &mut Header| {
                Ok(Some(
                    Arc::new(|a: &mut Alignment| a.qname.len() > 1) as AlignmentFilter
                ))
            }),
            Box::new(|_h: &mut Header| {
                Ok(Some(
                    Arc::new(|a: &mut Alignment| a.flag.bits() == 0) as AlignmentFilter
                ))
            }),
        ];
        let combined = compose_header_filters(&mut header, &filters).unwrap().unwrap();
        assert!(combined(&mut rec("r1", 0)));
        assert!(!combined(&mut rec("r1", 4)));
        assert!(!combined(&mut rec("r", 0)));
    }

    #[test]
    fn test_apply_filter_retains_order() {
        let mut records = vec![rec("a", 0), rec("b", 4), rec("c", 0)];
        let filter: AlignmentFilter = Arc::new(|a: &mut Alignment| a.flag.bits() == 0);
        apply_filter(&mut records, &filter);
        let names: Vec<_> = records.iter().map(|r| r.qname.as_str()).collect();
        assert_eq!(names, vec!["a", "c"]);
    }
}
