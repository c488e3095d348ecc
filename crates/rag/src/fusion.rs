//! Reciprocal Rank Fusion
//!
//! Combines ranked candidate lists from several sources into one ranking:
//! `score(d) = Σ weight_s / (k + rank_s(d) + 1)` with zero-based ranks.
//! Absent candidates contribute nothing for that list.

use std::cmp::Ordering;
use std::collections::HashMap;

use multi_rag_core::Candidate;

/// Default RRF constant
pub const DEFAULT_RRF_K: f32 = 60.0;

/// A ranked list with its source weight
#[derive(Debug, Clone)]
pub struct RankedList {
    pub candidates: Vec<Candidate>,
    pub weight: f32,
}

impl RankedList {
    pub fn new(candidates: Vec<Candidate>, weight: f32) -> Self {
        Self { candidates, weight }
    }
}

/// Deduplicate by id, keeping the highest-scoring copy
///
/// First-seen order is preserved.
pub fn dedup_max_score(candidates: Vec<Candidate>) -> Vec<Candidate> {
    let mut index: HashMap<String, usize> = HashMap::with_capacity(candidates.len());
    let mut out: Vec<Candidate> = Vec::with_capacity(candidates.len());

    for candidate in candidates {
        match index.get(&candidate.id) {
            Some(&pos) => {
                if candidate.clamped_score() > out[pos].clamped_score() {
                    out[pos] = candidate;
                }
            }
            None => {
                index.insert(candidate.id.clone(), out.len());
                out.push(candidate);
            }
        }
    }

    out
}

/// Sort descending by score; ties keep their relative order
pub fn sort_by_score(candidates: &mut [Candidate]) {
    candidates.sort_by(|a, b| {
        b.clamped_score()
            .partial_cmp(&a.clamped_score())
            .unwrap_or(Ordering::Equal)
    });
}

struct Fused {
    raw: f32,
    /// Rank per list, ordered by descending list weight (`usize::MAX` if absent)
    ranks: Vec<usize>,
    candidate: Candidate,
}

/// Fuse ranked lists with weighted RRF
///
/// The returned candidates carry the fused score normalized by the best
/// achievable score (`Σ weight / (k + 1)`), so it stays in [0, 1] without
/// changing the order. The raw sum is kept in `metadata["rrf_score"]`.
///
/// Ordering is deterministic: fused score, then rank in the highest-weighted
/// list, then the next list, then id.
pub fn rrf_fuse(lists: &[RankedList], k: f32) -> Vec<Candidate> {
    // Lists in descending weight order; stable so equal weights keep input order
    let mut order: Vec<usize> = (0..lists.len()).collect();
    order.sort_by(|&a, &b| {
        lists[b]
            .weight
            .partial_cmp(&lists[a].weight)
            .unwrap_or(Ordering::Equal)
    });

    let mut fused: HashMap<String, Fused> = HashMap::new();

    for (slot, &list_idx) in order.iter().enumerate() {
        let list = &lists[list_idx];
        let mut rank = 0usize;
        for candidate in &list.candidates {
            let entry = fused.entry(candidate.id.clone()).or_insert_with(|| Fused {
                raw: 0.0,
                ranks: vec![usize::MAX; order.len()],
                candidate: candidate.clone(),
            });
            // A repeated id within one list only counts at its best rank
            if entry.ranks[slot] != usize::MAX {
                continue;
            }
            entry.ranks[slot] = rank;
            entry.raw += list.weight / (k + rank as f32 + 1.0);
            rank += 1;
        }
    }

    let max_raw: f32 = lists.iter().map(|l| l.weight / (k + 1.0)).sum();

    let mut entries: Vec<Fused> = fused.into_values().collect();
    entries.sort_by(|a, b| {
        b.raw
            .partial_cmp(&a.raw)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.ranks.cmp(&b.ranks))
            .then_with(|| a.candidate.id.cmp(&b.candidate.id))
    });

    entries
        .into_iter()
        .map(|entry| {
            let mut candidate = entry.candidate;
            candidate.score = if max_raw > 0.0 {
                (entry.raw / max_raw).clamp(0.0, 1.0)
            } else {
                0.0
            };
            candidate.with_metadata("rrf_score", entry.raw as f64)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use multi_rag_core::SourceTag;

    fn c(id: &str, score: f32) -> Candidate {
        Candidate::new(id, format!("text {}", id), score, SourceTag::Vector)
    }

    fn ids(candidates: &[Candidate]) -> Vec<&str> {
        candidates.iter().map(|c| c.id.as_str()).collect()
    }

    #[test]
    fn test_dedup_keeps_max_score() {
        let deduped = dedup_max_score(vec![c("a", 0.4), c("b", 0.5), c("a", 0.9)]);
        assert_eq!(ids(&deduped), vec!["a", "b"]);
        assert_eq!(deduped[0].score, 0.9);
    }

    #[test]
    fn test_rrf_basic_ordering() {
        let dense = RankedList::new(vec![c("1", 0.9), c("2", 0.8)], 0.7);
        let sparse = RankedList::new(vec![c("2", 0.85), c("3", 0.7)], 0.3);

        let fused = rrf_fuse(&[dense, sparse], DEFAULT_RRF_K);

        assert_eq!(fused.len(), 3);
        // "2" appears in both lists
        assert_eq!(fused[0].id, "2");
        assert!(fused.iter().all(|c| (0.0..=1.0).contains(&c.score)));
    }

    #[test]
    fn test_rrf_score_formula() {
        let dense = RankedList::new(vec![c("a", 0.9)], 0.7);
        let sparse = RankedList::new(vec![c("x", 0.1), c("a", 0.5)], 0.3);
        let fused = rrf_fuse(&[dense, sparse], 60.0);

        let a = fused.iter().find(|c| c.id == "a").unwrap();
        let expected = 0.7 / 61.0 + 0.3 / 62.0;
        let raw = a.metadata["rrf_score"].as_f64().unwrap() as f32;
        assert!((raw - expected).abs() < 1e-6);
    }

    #[test]
    fn test_rrf_deterministic() {
        let build = || {
            vec![
                RankedList::new(vec![c("a", 0.9), c("b", 0.8), c("c", 0.7)], 0.7),
                RankedList::new(vec![c("c", 0.9), c("d", 0.8), c("a", 0.2)], 0.3),
            ]
        };
        let first = rrf_fuse(&build(), DEFAULT_RRF_K);
        for _ in 0..20 {
            let again = rrf_fuse(&build(), DEFAULT_RRF_K);
            assert_eq!(ids(&first), ids(&again));
        }
    }

    #[test]
    fn test_rrf_tie_broken_by_highest_weight_rank() {
        // Equal weights: "a" and "b" tie on fused score
        let l1 = RankedList::new(vec![c("a", 0.5), c("b", 0.5)], 0.5);
        let l2 = RankedList::new(vec![c("b", 0.5), c("a", 0.5)], 0.5);
        let fused = rrf_fuse(&[l1, l2], DEFAULT_RRF_K);
        assert_eq!(ids(&fused), vec!["a", "b"]);
    }

    #[test]
    fn test_rrf_monotonicity() {
        // Candidate "m" at every rank in the higher-weighted list, with and
        // without an additional appearance in the lower-weighted list
        for rank in 0..5 {
            let mut high: Vec<Candidate> = (0..5).map(|i| c(&format!("h{}", i), 0.5)).collect();
            high.insert(rank, c("m", 0.5));

            let alone = rrf_fuse(&[RankedList::new(high.clone(), 0.7)], DEFAULT_RRF_K);
            let both = rrf_fuse(
                &[
                    RankedList::new(high, 0.7),
                    RankedList::new(vec![c("x", 0.5), c("m", 0.5)], 0.3),
                ],
                DEFAULT_RRF_K,
            );

            let raw = |list: &[Candidate]| {
                list.iter().find(|c| c.id == "m").unwrap().metadata["rrf_score"]
                    .as_f64()
                    .unwrap()
            };
            assert!(raw(&both) >= raw(&alone));
        }
    }

    #[test]
    fn test_rrf_duplicate_within_list_counts_once() {
        let list = RankedList::new(vec![c("a", 0.9), c("a", 0.8), c("b", 0.7)], 1.0);
        let fused = rrf_fuse(&[list], DEFAULT_RRF_K);
        assert_eq!(fused.len(), 2);
        let b = fused.iter().find(|c| c.id == "b").unwrap();
        // "b" is rank 1 once the duplicate is skipped
        let raw = b.metadata["rrf_score"].as_f64().unwrap() as f32;
        assert!((raw - 1.0 / 62.0).abs() < 1e-6);
    }

    #[test]
    fn test_rrf_empty() {
        assert!(rrf_fuse(&[], DEFAULT_RRF_K).is_empty());
        assert!(rrf_fuse(&[RankedList::new(vec![], 0.7)], DEFAULT_RRF_K).is_empty());
    }
}
