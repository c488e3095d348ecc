//! Document ingestion
//!
//! Semantic chunking followed by indexing into the dense store and the BM25
//! index. Re-ingesting a document replaces its previous chunks.

use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;
use serde::Serialize;

use multi_rag_rag::{SemanticChunker, SparseIndex, VectorStore};

use crate::AgentError;

/// Result of ingesting one document
#[derive(Debug, Clone, Serialize)]
pub struct IngestReport {
    pub doc_id: String,
    pub chunks: usize,
    pub chunk_ids: Vec<String>,
}

pub struct DocumentIngestor {
    chunker: SemanticChunker,
    vector_store: Arc<VectorStore>,
    sparse_index: Arc<SparseIndex>,
    /// Chunk IDs per document, for replacement
    documents: DashMap<String, Vec<String>>,
}

impl DocumentIngestor {
    pub fn new(chunker: SemanticChunker, vector_store: Arc<VectorStore>, sparse_index: Arc<SparseIndex>) -> Self {
        Self {
            chunker,
            vector_store,
            sparse_index,
            documents: DashMap::new(),
        }
    }

    pub async fn ingest(
        &self,
        doc_id: &str,
        text: &str,
        metadata: &HashMap<String, serde_json::Value>,
    ) -> Result<IngestReport, AgentError> {
        if text.trim().is_empty() {
            return Err(AgentError::InvalidInput("document text is empty".to_string()));
        }

        let chunks = self.chunker.chunk_document(text, doc_id, metadata).await?;
        let chunk_ids: Vec<String> = chunks.iter().map(|c| c.id.clone()).collect();

        // Previous version stays searchable until the new chunks are stored
        self.vector_store.add_documents(&chunks).await?;
        self.sparse_index.index_documents(&chunks);

        if let Some(previous) = self.documents.insert(doc_id.to_string(), chunk_ids.clone()) {
            let stale: Vec<String> = previous.into_iter().filter(|id| !chunk_ids.contains(id)).collect();
            if !stale.is_empty() {
                self.vector_store.delete(&stale);
                self.sparse_index.delete(&stale);
            }
        }

        tracing::info!(doc_id, chunks = chunks.len(), "Document ingested");
        Ok(IngestReport {
            doc_id: doc_id.to_string(),
            chunks: chunks.len(),
            chunk_ids,
        })
    }

    pub fn document_count(&self) -> usize {
        self.documents.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::KeywordEmbedder;
    use multi_rag_config::ChunkerConfig;
    use std::sync::atomic::{AtomicBool, Ordering};

    use async_trait::async_trait;
    use multi_rag_core::{Embedder, Error, RetrieveOptions, VectorSearch};

    fn ingestor() -> (DocumentIngestor, Arc<VectorStore>, Arc<SparseIndex>) {
        let embedder = Arc::new(KeywordEmbedder::default());
        let store = Arc::new(VectorStore::new(embedder.clone()));
        let sparse = Arc::new(SparseIndex::default());
        let config = ChunkerConfig {
            min_chunk_size: 10,
            max_chunk_size: 120,
            ..Default::default()
        };
        let ingestor = DocumentIngestor::new(SemanticChunker::new(embedder, config), store.clone(), sparse.clone());
        (ingestor, store, sparse)
    }

    const TEXT: &str = "Reciprocal rank fusion merges ranked lists. Fusion uses reciprocal ranks with a constant. \
        Graph databases store nodes and edges. Graph traversal follows edges between nodes.";

    #[tokio::test]
    async fn test_ingest_indexes_both_stores() {
        let (ingestor, store, sparse) = ingestor();
        let report = ingestor.ingest("doc1", TEXT, &HashMap::new()).await.unwrap();

        assert!(report.chunks >= 1);
        assert_eq!(store.len(), report.chunks);
        assert_eq!(sparse.doc_count(), report.chunks);
        assert!(report.chunk_ids[0].starts_with("doc1_chunk_"));

        let hits = store.search("graph traversal edges", &RetrieveOptions::default()).await.unwrap();
        assert!(hits[0].text.contains("Graph"));
    }

    #[tokio::test]
    async fn test_reingest_replaces_chunks() {
        let (ingestor, store, _) = ingestor();
        ingestor.ingest("doc1", TEXT, &HashMap::new()).await.unwrap();
        let report = ingestor
            .ingest("doc1", "A single short sentence about BM25 scoring.", &HashMap::new())
            .await
            .unwrap();
        assert_eq!(report.chunks, 1);
        assert_eq!(store.len(), 1);
        assert_eq!(ingestor.document_count(), 1);
    }

    /// Embeds like [`KeywordEmbedder`] until switched off
    struct SwitchableEmbedder {
        inner: KeywordEmbedder,
        down: AtomicBool,
    }

    #[async_trait]
    impl Embedder for SwitchableEmbedder {
        async fn embed(&self, text: &str) -> multi_rag_core::Result<Vec<f32>> {
            if self.down.load(Ordering::SeqCst) {
                return Err(Error::Embedding("embedding service unavailable".to_string()));
            }
            self.inner.embed(text).await
        }

        fn dimension(&self) -> Option<usize> {
            self.inner.dimension()
        }
    }

    #[tokio::test]
    async fn test_failed_reingest_keeps_previous_version() {
        let chunk_embedder = Arc::new(KeywordEmbedder::default());
        let store_embedder = Arc::new(SwitchableEmbedder {
            inner: KeywordEmbedder::default(),
            down: AtomicBool::new(false),
        });
        let store = Arc::new(VectorStore::new(store_embedder.clone()));
        let sparse = Arc::new(SparseIndex::default());
        let config = ChunkerConfig {
            min_chunk_size: 10,
            max_chunk_size: 120,
            ..Default::default()
        };
        let ingestor = DocumentIngestor::new(
            SemanticChunker::new(chunk_embedder, config),
            store.clone(),
            sparse.clone(),
        );

        let report = ingestor.ingest("doc1", TEXT, &HashMap::new()).await.unwrap();
        store_embedder.down.store(true, Ordering::SeqCst);

        let result = ingestor
            .ingest("doc1", "A single short sentence about BM25 scoring.", &HashMap::new())
            .await;

        assert!(result.is_err());
        assert_eq!(store.len(), report.chunks);
        assert_eq!(sparse.doc_count(), report.chunks);
        assert_eq!(ingestor.document_count(), 1);
    }

    #[tokio::test]
    async fn test_reingest_drops_stale_chunks_from_sparse_index() {
        let (ingestor, _, sparse) = ingestor();
        let first = ingestor.ingest("doc1", TEXT, &HashMap::new()).await.unwrap();
        assert!(first.chunks > 1);

        ingestor
            .ingest("doc1", "A single short sentence about BM25 scoring.", &HashMap::new())
            .await
            .unwrap();
        assert_eq!(sparse.doc_count(), 1);
        assert!(sparse.search("graph traversal", None).is_empty());
    }

    #[tokio::test]
    async fn test_empty_text_rejected() {
        let (ingestor, _, _) = ingestor();
        assert!(matches!(
            ingestor.ingest("doc1", "   ", &HashMap::new()).await,
            Err(AgentError::InvalidInput(_))
        ));
    }
}
