//! Classifies lone fragments (reads whose mate is unmapped or absent) by
//! library, reference, adapted position, and strand, keeping the
//! highest-Phred-score candidate per group.
//!
//! Grounded on `mark_duplicates.cpp`'s `fragment_hash`/`fragment_equal`/
//! `classify_fragment`.

use std::sync::Arc;

use dashmap::{mapref::entry::Entry, DashMap};

use crate::record::{Alignment, Flags};

use super::{adapted_pos, adapted_score, is_true_fragment, is_true_pair, slot::Slot};

#[derive(Clone, PartialEq, Eq, Hash)]
pub(crate) struct FragmentKey {
    libid: Option<String>,
    refid: i32,
    pos: i32,
    reversed: bool,
}

impl FragmentKey {
    fn of(aln: &Alignment) -> Self {
        Self {
            libid: aln.libid().map(|s| s.as_str().to_owned()),
            refid: aln.refid().unwrap_or(-1),
            pos: adapted_pos(aln),
            reversed: aln.flag.contains(Flags::REVERSED),
        }
    }
}

/// A map from fragment group to the current best candidate for that group.
pub type FragmentMap = DashMap<FragmentKey, Arc<Slot<Alignment>>>;

/// Classifies `aln` against `fragments`, marking whichever of `aln` and the
/// group's current best candidate loses as a duplicate.
pub fn classify_fragment(aln: &Alignment, fragments: &FragmentMap, deterministic: bool) {
    let key = FragmentKey::of(aln);

    let newly_inserted;
    let slot = match fragments.entry(key) {
        Entry::Occupied(e) => {
            newly_inserted = false;
            Arc::clone(e.get())
        }
        Entry::Vacant(e) => {
            newly_inserted = true;
            let slot = Arc::new(Slot::new(Arc::new(aln.clone())));
            e.insert(Arc::clone(&slot));
            slot
        }
    };
    if newly_inserted {
        return;
    }

    if is_true_fragment(aln) {
        let aln_score = adapted_score(aln);
        let mut best = slot.load();
        loop {
            if is_true_pair(&best) {
                aln.mark_duplicate();
                break;
            }
            let best_score = adapted_score(&best);
            if best_score > aln_score {
                aln.mark_duplicate();
                break;
            } else if best_score == aln_score {
                if deterministic {
                    if aln.qname > best.qname {
                        aln.mark_duplicate();
                        break;
                    }
                    match slot.compare_exchange(&best, Arc::new(aln.clone())) {
                        Ok(()) => {
                            best.mark_duplicate();
                            break;
                        }
                        Err(actual) => {
                            best = actual;
                            continue;
                        }
                    }
                } else {
                    aln.mark_duplicate();
                    break;
                }
            } else {
                match slot.compare_exchange(&best, Arc::new(aln.clone())) {
                    Ok(()) => {
                        best.mark_duplicate();
                        break;
                    }
                    Err(actual) => {
                        best = actual;
                        continue;
                    }
                }
            }
        }
    } else {
        let mut best = slot.load();
        loop {
            if is_true_pair(&best) {
                break;
            }
            match slot.compare_exchange(&best, Arc::new(aln.clone())) {
                Ok(()) => {
                    best.mark_duplicate();
                    break;
                }
                Err(actual) => {
                    best = actual;
                    continue;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::slice::Slice;
    use crate::value::Value;

    fn rec(line: &str, score: i32) -> Alignment {
        let mut aln = Alignment::parse(Slice::from(line)).unwrap();
        aln.set_temp("ADAPTED_POS", Value::Int(100));
        aln.set_temp("ADAPTED_SCORE", Value::Int(score));
        aln
    }

    #[test]
    fn test_classify_fragment_keeps_higher_score() {
        let fragments = FragmentMap::default();
        let a = rec("r1\t0\tchr1\t100\t0\t*\t*\t0\t0\t*\t*", 10);
        let b = rec("r2\t0\tchr1\t100\t0\t*\t*\t0\t0\t*\t*", 20);

        classify_fragment(&a, &fragments, true);
        classify_fragment(&b, &fragments, true);

        assert!(a.is_duplicate());
        assert!(!b.is_duplicate());
    }

    #[test]
    fn test_classify_fragment_different_groups_dont_collide() {
        let fragments = FragmentMap::default();
        let a = rec("r1\t0\tchr1\t100\t0\t*\t*\t0\t0\t*\t*", 10);
        let mut b = rec("r2\t0\tchr1\t100\t0\t*\t*\t0\t0\t*\t*", 20);
        b.set_refid(1);

        classify_fragment(&a, &fragments, true);
        classify_fragment(&b, &fragments, true);

        assert!(!a.is_duplicate());
        assert!(!b.is_duplicate());
    }
}
