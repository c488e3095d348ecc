//! Retrieval evaluation metrics
//!
//! Precision@K, Recall@K and MRR over retrieved IDs against a ground-truth
//! relevant set, with aggregation across a query set.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

/// Precision@K = relevant in top-K / K
pub fn precision_at_k(retrieved: &[String], relevant: &HashSet<String>, k: usize) -> f32 {
    if retrieved.is_empty() || k == 0 {
        return 0.0;
    }
    let hits = retrieved.iter().take(k).filter(|id| relevant.contains(*id)).count();
    hits as f32 / k as f32
}

/// Recall@K = relevant in top-K / total relevant
pub fn recall_at_k(retrieved: &[String], relevant: &HashSet<String>, k: usize) -> f32 {
    if relevant.is_empty() {
        return 0.0;
    }
    let hits = retrieved.iter().take(k).filter(|id| relevant.contains(*id)).count();
    hits as f32 / relevant.len() as f32
}

/// Reciprocal rank of the first relevant ID (0 if none)
pub fn reciprocal_rank(retrieved: &[String], relevant: &HashSet<String>) -> f32 {
    retrieved
        .iter()
        .position(|id| relevant.contains(id))
        .map(|pos| 1.0 / (pos + 1) as f32)
        .unwrap_or(0.0)
}

/// One evaluated query
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationCase {
    pub query: String,
    pub retrieved_ids: Vec<String>,
    pub relevant_ids: HashSet<String>,
}

/// Metrics for a single query
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct RetrievalMetrics {
    pub precision_at_k: f32,
    pub recall_at_k: f32,
    pub reciprocal_rank: f32,
}

impl RetrievalMetrics {
    pub fn compute(case: &EvaluationCase, k: usize) -> Self {
        Self {
            precision_at_k: precision_at_k(&case.retrieved_ids, &case.relevant_ids, k),
            recall_at_k: recall_at_k(&case.retrieved_ids, &case.relevant_ids, k),
            reciprocal_rank: reciprocal_rank(&case.retrieved_ids, &case.relevant_ids),
        }
    }
}

/// Aggregate report across a query set
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EvaluationReport {
    pub k: usize,
    pub num_cases: usize,
    pub avg_precision_at_k: f32,
    pub avg_recall_at_k: f32,
    /// Mean reciprocal rank
    pub mrr: f32,
    pub per_case: Vec<RetrievalMetrics>,
}

/// Evaluate a query set
pub fn evaluate(cases: &[EvaluationCase], k: usize) -> EvaluationReport {
    let per_case: Vec<RetrievalMetrics> = cases.iter().map(|c| RetrievalMetrics::compute(c, k)).collect();
    let n = per_case.len();
    if n == 0 {
        return EvaluationReport {
            k,
            ..Default::default()
        };
    }

    let mean = |f: fn(&RetrievalMetrics) -> f32| per_case.iter().map(f).sum::<f32>() / n as f32;

    EvaluationReport {
        k,
        num_cases: n,
        avg_precision_at_k: mean(|m| m.precision_at_k),
        avg_recall_at_k: mean(|m| m.recall_at_k),
        mrr: mean(|m| m.reciprocal_rank),
        per_case,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn set(list: &[&str]) -> HashSet<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_precision_and_recall() {
        let retrieved = ids(&["a", "x", "b", "y", "c"]);
        let relevant = set(&["a", "b", "z"]);

        assert!((precision_at_k(&retrieved, &relevant, 5) - 0.4).abs() < 1e-6);
        assert!((precision_at_k(&retrieved, &relevant, 2) - 0.5).abs() < 1e-6);
        assert!((recall_at_k(&retrieved, &relevant, 5) - 2.0 / 3.0).abs() < 1e-6);
        assert_eq!(recall_at_k(&retrieved, &set(&[]), 5), 0.0);
        assert_eq!(precision_at_k(&[], &relevant, 5), 0.0);
    }

    #[test]
    fn test_reciprocal_rank() {
        let relevant = set(&["b"]);
        assert_eq!(reciprocal_rank(&ids(&["a", "b"]), &relevant), 0.5);
        assert_eq!(reciprocal_rank(&ids(&["b"]), &relevant), 1.0);
        assert_eq!(reciprocal_rank(&ids(&["a"]), &relevant), 0.0);
    }

    #[test]
    fn test_evaluate_aggregates() {
        let cases = vec![
            EvaluationCase {
                query: "q1".into(),
                retrieved_ids: ids(&["a", "b"]),
                relevant_ids: set(&["a"]),
            },
            EvaluationCase {
                query: "q2".into(),
                retrieved_ids: ids(&["x", "y"]),
                relevant_ids: set(&["y"]),
            },
        ];
        let report = evaluate(&cases, 2);
        assert_eq!(report.num_cases, 2);
        assert!((report.mrr - 0.75).abs() < 1e-6);
        assert!((report.avg_precision_at_k - 0.5).abs() < 1e-6);
        assert!((report.avg_recall_at_k - 1.0).abs() < 1e-6);

        assert_eq!(evaluate(&[], 5).num_cases, 0);
    }
}
