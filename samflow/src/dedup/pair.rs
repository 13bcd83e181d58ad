//! Classifies paired reads (both mates mapped) by library, both mates'
//! reference/position/strand, keeping the highest-combined-score pair.
//!
//! Grounded on `mark_duplicates.cpp`'s `alignment_pair_hash`/`pair_hash`/
//! `pair_equal`/`classify_pair`.

use std::sync::Arc;

use dashmap::{mapref::entry::Entry, DashMap};

use crate::record::{Alignment, Flags};

use super::{adapted_pos, adapted_score, is_true_pair, slot::Slot};

#[derive(Clone, PartialEq, Eq, Hash)]
pub(crate) struct PairFragmentKey {
    libid: Option<String>,
    qname: String,
}

impl PairFragmentKey {
    fn of(aln: &Alignment) -> Self {
        Self {
            libid: aln.libid().map(|s| s.as_str().to_owned()),
            qname: aln.qname.as_str().to_owned(),
        }
    }
}

/// Matches up the two mates of a pair: the first arrival registers itself and
/// waits, the second claims and removes the registration, returning the mate.
pub type PairFragmentMap = DashMap<PairFragmentKey, Alignment>;

fn find_or_register_mate(aln: &Alignment, fragments: &PairFragmentMap) -> Option<Alignment> {
    let key = PairFragmentKey::of(aln);
    match fragments.entry(key) {
        Entry::Occupied(e) => Some(e.remove()),
        Entry::Vacant(e) => {
            e.insert(aln.clone());
            None
        }
    }
}

#[derive(Clone, PartialEq, Eq, Hash)]
pub(crate) struct PairKey {
    libid: Option<String>,
    refid1: i32,
    pos1: i32,
    reversed1: bool,
    refid2: i32,
    pos2: i32,
    reversed2: bool,
}

#[derive(Clone)]
pub(crate) struct PairHandle {
    score: i32,
    aln1: Alignment,
    aln2: Alignment,
}

/// A map from pair group to the current best-scoring pair for that group.
pub type PairMap = DashMap<PairKey, Arc<Slot<PairHandle>>>;

/// Classifies `aln`'s pair (once its mate has also arrived) against `pairs`,
/// marking the losing pair's both records as duplicates.
pub fn classify_pair(
    aln: &Alignment,
    fragments: &PairFragmentMap,
    pairs: &PairMap,
    deterministic: bool,
) {
    if !is_true_pair(aln) {
        return;
    }

    let mate = match find_or_register_mate(aln, fragments) {
        Some(mate) => mate,
        None => return,
    };

    let (mut aln1, mut aln2) = (aln.clone(), mate);
    let score = adapted_score(&aln1) + adapted_score(&aln2);
    let mut pos1 = adapted_pos(&aln1);
    let mut pos2 = adapted_pos(&aln2);
    if pos1 > pos2 {
        std::mem::swap(&mut aln1, &mut aln2);
        std::mem::swap(&mut pos1, &mut pos2);
    }

    let key = PairKey {
        libid: aln1.libid().map(|s| s.as_str().to_owned()),
        refid1: aln1.refid().unwrap_or(-1),
        pos1,
        reversed1: aln1.flag.contains(Flags::REVERSED),
        refid2: aln2.refid().unwrap_or(-1),
        pos2,
        reversed2: aln2.flag.contains(Flags::REVERSED),
    };

    let newly_inserted;
    let slot = match pairs.entry(key) {
        Entry::Occupied(e) => {
            newly_inserted = false;
            Arc::clone(e.get())
        }
        Entry::Vacant(e) => {
            newly_inserted = true;
            let handle = Arc::new(PairHandle {
                score,
                aln1: aln1.clone(),
                aln2: aln2.clone(),
            });
            let slot = Arc::new(Slot::new(handle));
            e.insert(Arc::clone(&slot));
            slot
        }
    };
    if newly_inserted {
        return;
    }

    let mut best = slot.load();
    loop {
        if best.score > score {
            aln1.mark_duplicate();
            aln2.mark_duplicate();
            break;
        } else if best.score == score {
            if deterministic {
                if aln1.qname > best.aln1.qname {
                    aln1.mark_duplicate();
                    aln2.mark_duplicate();
                    break;
                }
                let candidate = Arc::new(PairHandle {
                    score,
                    aln1: aln1.clone(),
                    aln2: aln2.clone(),
                });
                match slot.compare_exchange(&best, candidate) {
                    Ok(()) => {
                        best.aln1.mark_duplicate();
                        best.aln2.mark_duplicate();
                        break;
                    }
                    Err(actual) => {
                        best = actual;
                        continue;
                    }
                }
            } else {
                aln1.mark_duplicate();
                aln2.mark_duplicate();
                break;
            }
        } else {
            let candidate = Arc::new(PairHandle {
                score,
                aln1: aln1.clone(),
                aln2: aln2.clone(),
            });
            match slot.compare_exchange(&best, candidate) {
                Ok(()) => {
                    best.aln1.mark_duplicate();
                    best.aln2.mark_duplicate();
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

    fn rec(line: &str, pos: i32, score: i32) -> Alignment {
        let mut aln = Alignment::parse(Slice::from(line)).unwrap();
        aln.set_temp("ADAPTED_POS", Value::Int(pos));
        aln.set_temp("ADAPTED_SCORE", Value::Int(score));
        aln
    }

    #[test]
    fn test_classify_pair_waits_for_both_mates() {
        let fragments = PairFragmentMap::default();
        let pairs = PairMap::default();
        let a = rec("r1\t1\tchr1\t100\t0\t*\t*\t0\t0\t*\t*", 100, 10);
        classify_pair(&a, &fragments, &pairs, true);
        assert!(!a.is_duplicate());
        assert_eq!(fragments.len(), 1);
    }

    #[test]
    fn test_classify_pair_marks_lower_scoring_pair() {
        let fragments = PairFragmentMap::default();
        let pairs = PairMap::default();

        let a1 = rec("r1\t1\tchr1\t100\t0\t*\t*\t0\t0\t*\t*", 100, 5);
        let a2 = rec("r1\t1\tchr1\t200\t0\t*\t*\t0\t0\t*\t*", 200, 5);
        classify_pair(&a1, &fragments, &pairs, true);
        classify_pair(&a2, &fragments, &pairs, true);

        let b1 = rec("r2\t1\tchr1\t100\t0\t*\t*\t0\t0\t*\t*", 100, 50);
        let b2 = rec("r2\t1\tchr1\t200\t0\t*\t*\t0\t0\t*\t*", 200, 50);
        classify_pair(&b1, &fragments, &pairs, true);
        classify_pair(&b2, &fragments, &pairs, true);

        assert!(a1.is_duplicate());
        assert!(a2.is_duplicate());
        assert!(!b1.is_duplicate());
        assert!(!b2.is_duplicate());
    }
}
