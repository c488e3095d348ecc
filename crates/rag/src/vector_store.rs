//! In-memory vector store
//!
//! Brute-force cosine search over embedded documents. Implements the
//! [`VectorSearch`] capability by embedding the query with the configured
//! [`Embedder`].

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use multi_rag_core::{Candidate, Embedder, RetrieveOptions, SourceTag, VectorSearch};

use crate::reranker::cosine_similarity;
use crate::RagError;

/// Document to be indexed
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    /// Unique ID
    pub id: String,
    /// Document content
    pub content: String,
    /// Metadata
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl Document {
    pub fn new(id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            content: content.into(),
            metadata: HashMap::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

struct Entry {
    document: Document,
    embedding: Vec<f32>,
}

/// In-memory vector store
pub struct VectorStore {
    embedder: Arc<dyn Embedder>,
    entries: RwLock<Vec<Entry>>,
    index: RwLock<HashMap<String, usize>>,
}

impl VectorStore {
    pub fn new(embedder: Arc<dyn Embedder>) -> Self {
        Self {
            embedder,
            entries: RwLock::new(Vec::new()),
            index: RwLock::new(HashMap::new()),
        }
    }

    /// Insert or replace documents with precomputed embeddings
    pub fn upsert(&self, documents: &[Document], embeddings: &[Vec<f32>]) -> Result<(), RagError> {
        if documents.len() != embeddings.len() {
            return Err(RagError::VectorStore(format!(
                "Document count ({}) doesn't match embedding count ({})",
                documents.len(),
                embeddings.len()
            )));
        }

        let mut entries = self.entries.write();
        let mut index = self.index.write();

        for (doc, embedding) in documents.iter().zip(embeddings.iter()) {
            let entry = Entry {
                document: doc.clone(),
                embedding: embedding.clone(),
            };
            match index.get(&doc.id) {
                Some(&pos) => entries[pos] = entry,
                None => {
                    index.insert(doc.id.clone(), entries.len());
                    entries.push(entry);
                }
            }
        }

        tracing::debug!(count = documents.len(), total = entries.len(), "Upserted documents");
        Ok(())
    }

    /// Embed and insert documents
    pub async fn add_documents(&self, documents: &[Document]) -> Result<(), RagError> {
        let texts: Vec<String> = documents.iter().map(|d| d.content.clone()).collect();
        let embeddings = self
            .embedder
            .embed_batch(&texts)
            .await
            .map_err(|e| RagError::Embedding(e.to_string()))?;
        self.upsert(documents, &embeddings)
    }

    /// Search by a precomputed query embedding
    pub fn search_by_embedding(
        &self,
        query_embedding: &[f32],
        options: &RetrieveOptions,
    ) -> Vec<Candidate> {
        let entries = self.entries.read();

        let mut scored: Vec<(f32, &Entry)> = entries
            .iter()
            .filter(|e| options.accepts(&e.document.metadata))
            .map(|e| (cosine_similarity(query_embedding, &e.embedding), e))
            .filter(|(score, _)| *score >= options.min_score)
            .collect();

        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(Ordering::Equal));
        scored.truncate(options.top_k);

        scored
            .into_iter()
            .map(|(score, entry)| {
                let mut candidate = Candidate::new(
                    entry.document.id.clone(),
                    entry.document.content.clone(),
                    score.clamp(0.0, 1.0),
                    SourceTag::Vector,
                );
                candidate.metadata = entry.document.metadata.clone();
                candidate
            })
            .collect()
    }

    /// Delete documents by ID
    pub fn delete(&self, ids: &[String]) {
        let mut entries = self.entries.write();
        let mut index = self.index.write();

        entries.retain(|e| !ids.contains(&e.document.id));
        *index = entries
            .iter()
            .enumerate()
            .map(|(i, e)| (e.document.id.clone(), i))
            .collect();
    }

    /// Number of indexed documents
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl VectorSearch for VectorStore {
    async fn search(
        &self,
        query: &str,
        options: &RetrieveOptions,
    ) -> multi_rag_core::Result<Vec<Candidate>> {
        if self.is_empty() {
            return Ok(Vec::new());
        }
        let embedding = self.embedder.embed(query).await?;
        Ok(self.search_by_embedding(&embedding, options))
    }

    fn name(&self) -> &str {
        "in_memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::KeywordEmbedder;
    use multi_rag_core::MetadataFilter;

    fn store() -> VectorStore {
        VectorStore::new(Arc::new(KeywordEmbedder::default()))
    }

    #[tokio::test]
    async fn test_add_and_search() {
        let store = store();
        store
            .add_documents(&[
                Document::new("1", "graph databases store nodes and edges"),
                Document::new("2", "vector search uses embeddings"),
            ])
            .await
            .unwrap();
        assert_eq!(store.len(), 2);

        let results = store
            .search("vector embeddings", &RetrieveOptions::default())
            .await
            .unwrap();
        assert_eq!(results[0].id, "2");
        assert_eq!(results[0].source, SourceTag::Vector);
    }

    #[tokio::test]
    async fn test_filters_and_min_score() {
        let store = store();
        store
            .add_documents(&[
                Document::new("1", "vector search").with_metadata("lang", "en"),
                Document::new("2", "vector search").with_metadata("lang", "de"),
            ])
            .await
            .unwrap();

        let options = RetrieveOptions::default().with_filter(MetadataFilter::eq("lang", "de"));
        let results = store.search("vector", &options).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, "2");

        let strict = RetrieveOptions::default().with_min_score(1.0);
        assert!(store.search("unrelated words", &strict).await.unwrap().is_empty());
    }

    #[test]
    fn test_upsert_replaces_and_delete() {
        let store = store();
        store
            .upsert(&[Document::new("a", "one")], &[vec![1.0, 0.0]])
            .unwrap();
        store
            .upsert(&[Document::new("a", "two")], &[vec![0.0, 1.0]])
            .unwrap();
        assert_eq!(store.len(), 1);

        let hits = store.search_by_embedding(&[0.0, 1.0], &RetrieveOptions::default());
        assert_eq!(hits[0].text, "two");

        store.delete(&["a".to_string()]);
        assert!(store.is_empty());
    }

    #[test]
    fn test_upsert_length_mismatch() {
        let store = store();
        let result = store.upsert(&[Document::new("a", "x")], &[]);
        assert!(matches!(result, Err(RagError::VectorStore(_))));
    }
}
