//! Parallel multi-strategy retriever
//!
//! Fans a query out to the selected strategies concurrently, each under its
//! own timeout. A failing or slow strategy is recorded and skipped; the
//! survivors are merged, deduplicated by ID (max score wins), sorted and
//! capped.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::stream::{FuturesUnordered, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::UnboundedSender;

use multi_rag_config::RetrievalConfig;
use multi_rag_core::{AnalysisResult, Candidate, PipelineEvent, RetrievalStrategy};

use crate::fusion::{dedup_max_score, sort_by_score};
use crate::strategy::StrategyExecutor;
use crate::RagError;

/// Why a strategy contributed nothing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Error,
    Timeout,
    NotConfigured,
}

/// A strategy that failed during fan-out
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyFailure {
    pub strategy: RetrievalStrategy,
    pub kind: FailureKind,
    pub message: String,
}

/// Merged result of a fan-out
#[derive(Debug, Clone, Default)]
pub struct RetrievalOutcome {
    /// Deduplicated, sorted, capped candidates
    pub candidates: Vec<Candidate>,
    pub failures: Vec<StrategyFailure>,
    /// Raw candidate count per successful strategy
    pub counts: HashMap<RetrievalStrategy, usize>,
    /// Strategies actually dispatched, in order
    pub executed: Vec<RetrievalStrategy>,
}

impl RetrievalOutcome {
    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }
}

/// Registry of strategies with concurrent dispatch
pub struct ParallelRetriever {
    executors: HashMap<RetrievalStrategy, Arc<dyn StrategyExecutor>>,
    strategy_timeout: Duration,
    candidate_cap: usize,
}

impl ParallelRetriever {
    pub fn new(config: &RetrievalConfig) -> Self {
        Self {
            executors: HashMap::new(),
            strategy_timeout: Duration::from_millis(config.strategy_timeout_ms),
            candidate_cap: config.candidate_cap,
        }
    }

    /// Register an executor under its own strategy
    pub fn with_strategy(mut self, executor: Arc<dyn StrategyExecutor>) -> Self {
        self.register(executor);
        self
    }

    pub fn register(&mut self, executor: Arc<dyn StrategyExecutor>) {
        self.executors.insert(executor.strategy(), executor);
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.strategy_timeout = timeout;
        self
    }

    pub fn has_strategy(&self, strategy: RetrievalStrategy) -> bool {
        self.executors.contains_key(&strategy)
    }

    /// Registered strategies
    pub fn available(&self) -> Vec<RetrievalStrategy> {
        [RetrievalStrategy::Vector, RetrievalStrategy::Graph, RetrievalStrategy::Web]
            .into_iter()
            .filter(|s| self.has_strategy(*s))
            .collect()
    }

    /// Selected strategies, deduplicated, with vector always included
    fn plan(strategies: &[RetrievalStrategy]) -> Vec<RetrievalStrategy> {
        let mut plan: Vec<RetrievalStrategy> = Vec::with_capacity(strategies.len() + 1);
        for strategy in strategies {
            if !plan.contains(strategy) {
                plan.push(*strategy);
            }
        }
        if !plan.contains(&RetrievalStrategy::Vector) {
            plan.push(RetrievalStrategy::Vector);
        }
        plan
    }

    fn emit(progress: Option<&UnboundedSender<PipelineEvent>>, event: PipelineEvent) {
        if let Some(tx) = progress {
            // Receiver may have gone away; progress is best effort
            let _ = tx.send(event);
        }
    }

    /// Run the selected strategies concurrently and merge their results
    pub async fn retrieve(
        &self,
        query: &str,
        analysis: &AnalysisResult,
        strategies: &[RetrievalStrategy],
        progress: Option<&UnboundedSender<PipelineEvent>>,
    ) -> RetrievalOutcome {
        let start = Instant::now();
        let plan = Self::plan(strategies);
        let mut outcome = RetrievalOutcome::default();

        let mut tasks = FuturesUnordered::new();
        for (index, strategy) in plan.iter().copied().enumerate() {
            let Some(executor) = self.executors.get(&strategy).cloned() else {
                tracing::debug!(strategy = %strategy, "Strategy selected but not configured");
                outcome.failures.push(StrategyFailure {
                    strategy,
                    kind: FailureKind::NotConfigured,
                    message: format!("{} retrieval is not configured", strategy),
                });
                continue;
            };

            Self::emit(
                progress,
                PipelineEvent::RetrievalProgress {
                    strategy,
                    status: "started".to_string(),
                    count: None,
                },
            );

            let timeout = self.strategy_timeout;
            tasks.push(async move {
                let result = match tokio::time::timeout(timeout, executor.execute(query, analysis)).await {
                    Ok(result) => result,
                    Err(_) => Err(RagError::Timeout(timeout.as_millis() as u64)),
                };
                (index, strategy, result)
            });
            outcome.executed.push(strategy);
        }

        let mut per_strategy: Vec<Option<Vec<Candidate>>> = vec![None; plan.len()];

        while let Some((index, strategy, result)) = tasks.next().await {
            match result {
                Ok(candidates) => {
                    tracing::debug!(strategy = %strategy, count = candidates.len(), "Strategy completed");
                    Self::emit(
                        progress,
                        PipelineEvent::RetrievalProgress {
                            strategy,
                            status: "completed".to_string(),
                            count: Some(candidates.len()),
                        },
                    );
                    outcome.counts.insert(strategy, candidates.len());
                    per_strategy[index] = Some(candidates);
                }
                Err(e) => {
                    let kind = if matches!(e, RagError::Timeout(_)) {
                        FailureKind::Timeout
                    } else {
                        FailureKind::Error
                    };
                    tracing::warn!(strategy = %strategy, error = %e, "Retrieval strategy failed");
                    metrics::counter!("multi_rag_strategy_failures_total", "strategy" => strategy.as_str())
                        .increment(1);
                    Self::emit(
                        progress,
                        PipelineEvent::RetrievalProgress {
                            strategy,
                            status: "failed".to_string(),
                            count: None,
                        },
                    );
                    outcome.failures.push(StrategyFailure {
                        strategy,
                        kind,
                        message: e.to_string(),
                    });
                }
            }
        }
        drop(tasks);

        // Merge in plan order so dedup ties are deterministic
        let merged: Vec<Candidate> = per_strategy.into_iter().flatten().flatten().collect();
        let mut candidates = dedup_max_score(merged);
        sort_by_score(&mut candidates);
        candidates.truncate(self.candidate_cap);

        tracing::info!(
            strategies = ?outcome.executed,
            failures = outcome.failures.len(),
            candidates = candidates.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Parallel retrieval complete"
        );

        outcome.candidates = candidates;
        outcome
    }
}
