//! Sparse Search (BM25)
//!
//! Keyword-based search for hybrid retrieval. Okapi BM25 over lowercased
//! unicode word tokens.

use parking_lot::RwLock;
use std::cmp::Ordering;
use std::collections::HashMap;
use unicode_segmentation::UnicodeSegmentation;

use crate::vector_store::Document;

/// Sparse search configuration
#[derive(Debug, Clone)]
pub struct SparseConfig {
    /// Term frequency saturation
    pub k1: f32,
    /// Length normalization
    pub b: f32,
    /// Number of results to retrieve
    pub top_k: usize,
}

impl Default for SparseConfig {
    fn default() -> Self {
        Self {
            k1: 1.2,
            b: 0.75,
            top_k: 50,
        }
    }
}

/// Sparse search result
#[derive(Debug, Clone)]
pub struct SparseResult {
    /// Document ID
    pub id: String,
    /// BM25 score
    pub score: f32,
    /// Document content
    pub content: String,
    /// Metadata
    pub metadata: HashMap<String, serde_json::Value>,
}

struct IndexedDoc {
    document: Document,
    term_freqs: HashMap<String, u32>,
    length: usize,
}

#[derive(Default)]
struct Inner {
    docs: Vec<IndexedDoc>,
    /// Number of documents containing each term
    doc_freqs: HashMap<String, u32>,
    total_length: usize,
}

impl Inner {
    fn remove_at(&mut self, pos: usize) {
        let old = self.docs.remove(pos);
        self.total_length -= old.length;
        for term in old.term_freqs.keys() {
            if let Some(df) = self.doc_freqs.get_mut(term) {
                *df -= 1;
                if *df == 0 {
                    self.doc_freqs.remove(term);
                }
            }
        }
    }
}

/// Sparse index for BM25 search
pub struct SparseIndex {
    inner: RwLock<Inner>,
    config: SparseConfig,
}

/// Lowercased word tokens
pub fn tokenize(text: &str) -> Vec<String> {
    text.unicode_words().map(|w| w.to_lowercase()).collect()
}

impl SparseIndex {
    pub fn new(config: SparseConfig) -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
            config,
        }
    }

    /// Index documents, replacing any with the same ID
    pub fn index_documents(&self, documents: &[Document]) {
        let mut inner = self.inner.write();

        for doc in documents {
            if let Some(pos) = inner.docs.iter().position(|d| d.document.id == doc.id) {
                inner.remove_at(pos);
            }

            let tokens = tokenize(&doc.content);
            let mut term_freqs: HashMap<String, u32> = HashMap::new();
            for token in &tokens {
                *term_freqs.entry(token.clone()).or_insert(0) += 1;
            }
            for term in term_freqs.keys() {
                *inner.doc_freqs.entry(term.clone()).or_insert(0) += 1;
            }

            inner.total_length += tokens.len();
            inner.docs.push(IndexedDoc {
                document: doc.clone(),
                term_freqs,
                length: tokens.len(),
            });
        }
    }

    /// Search using BM25
    ///
    /// Only documents with a positive score are returned.
    pub fn search(&self, query: &str, top_k: Option<usize>) -> Vec<SparseResult> {
        let k = top_k.unwrap_or(self.config.top_k);
        let inner = self.inner.read();

        if inner.docs.is_empty() {
            return Vec::new();
        }

        let mut query_terms = tokenize(query);
        query_terms.sort();
        query_terms.dedup();

        let n = inner.docs.len() as f32;
        let avg_len = inner.total_length as f32 / n;
        let (k1, b) = (self.config.k1, self.config.b);

        let mut scored: Vec<(f32, &IndexedDoc)> = inner
            .docs
            .iter()
            .map(|doc| {
                let score: f32 = query_terms
                    .iter()
                    .filter_map(|term| {
                        let tf = *doc.term_freqs.get(term)? as f32;
                        let df = *inner.doc_freqs.get(term)? as f32;
                        let idf = ((n - df + 0.5) / (df + 0.5) + 1.0).ln();
                        let norm = if avg_len > 0.0 {
                            1.0 - b + b * doc.length as f32 / avg_len
                        } else {
                            1.0
                        };
                        Some(idf * tf * (k1 + 1.0) / (tf + k1 * norm))
                    })
                    .sum();
                (score, doc)
            })
            .filter(|(score, _)| *score > 0.0)
            .collect();

        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(Ordering::Equal));
        scored.truncate(k);

        scored
            .into_iter()
            .map(|(score, doc)| SparseResult {
                id: doc.document.id.clone(),
                score,
                content: doc.document.content.clone(),
                metadata: doc.document.metadata.clone(),
            })
            .collect()
    }

    /// Delete documents by ID
    pub fn delete(&self, ids: &[String]) {
        let mut inner = self.inner.write();
        while let Some(pos) = inner.docs.iter().position(|d| ids.contains(&d.document.id)) {
            inner.remove_at(pos);
        }
    }

    /// Get document count
    pub fn doc_count(&self) -> usize {
        self.inner.read().docs.len()
    }
}

impl Default for SparseIndex {
    fn default() -> Self {
        Self::new(SparseConfig::default())
    }
}
