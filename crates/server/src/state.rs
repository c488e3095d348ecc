//! Application State
//!
//! Shared state across all handlers, wired once from [`Settings`].

use std::sync::Arc;

use metrics_exporter_prometheus::PrometheusHandle;

use multi_rag_agent::{DocumentIngestor, InMemoryConversationStore, Orchestrator};
use multi_rag_config::Settings;
use multi_rag_core::{Embedder, RelevanceScorer, TextGenerator, WebSearch};
use multi_rag_llm::{LlmConfig, OllamaBackend};
use multi_rag_rag::{
    build_web_search, GraphStrategy, HybridReranker, InMemoryGraphStore, LlmScorer,
    ParallelRetriever, SemanticChunker, SimpleScorer, SparseIndex, VectorStore, VectorStrategy,
    WebStrategy,
};

use crate::ServerError;

/// Application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Settings>,
    pub orchestrator: Arc<Orchestrator>,
    pub retriever: Arc<ParallelRetriever>,
    pub ingestor: Arc<DocumentIngestor>,
    pub graph: Arc<InMemoryGraphStore>,
    pub memory: Arc<InMemoryConversationStore>,
    /// Prometheus handle when the recorder is installed
    pub metrics: Option<PrometheusHandle>,
}

impl AppState {
    /// Wire state against the configured Ollama-compatible endpoint
    pub fn from_settings(config: Settings) -> Result<Self, ServerError> {
        let backend = Arc::new(
            OllamaBackend::new(LlmConfig::from(&config.llm))
                .map_err(|e| ServerError::Internal(e.to_string()))?,
        );
        let web = build_web_search(&config.web).map_err(|e| ServerError::Internal(e.to_string()))?;
        Ok(Self::with_capabilities(config, backend.clone(), backend, web))
    }

    /// Wire state over explicit capabilities
    pub fn with_capabilities(
        config: Settings,
        llm: Arc<dyn TextGenerator>,
        embedder: Arc<dyn Embedder>,
        web: Option<Arc<dyn WebSearch>>,
    ) -> Self {
        let vector_store = Arc::new(VectorStore::new(embedder.clone()));
        let sparse_index = Arc::new(SparseIndex::default());
        let graph = Arc::new(InMemoryGraphStore::new());
        let memory = Arc::new(InMemoryConversationStore::new(&config.memory));

        let mut retriever = ParallelRetriever::new(&config.retrieval);
        retriever.register(Arc::new(
            VectorStrategy::new(vector_store.clone(), config.retrieval.clone())
                .with_sparse_index(sparse_index.clone()),
        ));
        if config.graph.enabled {
            retriever.register(Arc::new(
                GraphStrategy::new(graph.clone(), config.graph.clone()).with_llm(llm.clone()),
            ));
        }
        match web {
            Some(web) => retriever.register(Arc::new(WebStrategy::new(web, config.web.max_results))),
            None => tracing::info!("Web search not configured"),
        }
        let retriever = Arc::new(retriever);

        let scorer: Arc<dyn RelevanceScorer> = if config.reranker.llm_scorer {
            Arc::new(LlmScorer::new(llm.clone()))
        } else {
            Arc::new(SimpleScorer)
        };
        let reranker = Arc::new(HybridReranker::new(scorer, config.reranker.clone()));

        let orchestrator = Orchestrator::builder(llm, retriever.clone())
            .config(config.orchestrator.clone())
            .reranker(reranker)
            .memory(memory.clone())
            .rerank_top_k(config.retrieval.rerank_top_k)
            .window_tokens(config.memory.window_tokens)
            .temperatures(config.llm.judge_temperature, config.llm.temperature)
            .build();

        let ingestor = DocumentIngestor::new(
            SemanticChunker::new(embedder, config.chunker.clone()),
            vector_store,
            sparse_index,
        );

        tracing::info!(
            strategies = ?retriever.available(),
            llm_scorer = config.reranker.llm_scorer,
            "Initialized application state"
        );

        Self {
            config: Arc::new(config),
            orchestrator: Arc::new(orchestrator),
            retriever,
            ingestor: Arc::new(ingestor),
            graph,
            memory,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, handle: Option<PrometheusHandle>) -> Self {
        self.metrics = handle;
        self
    }
}
