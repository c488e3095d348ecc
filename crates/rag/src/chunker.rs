//! Semantic Text Chunking
//!
//! Max-Min semantic chunking for document ingestion. Sentences are embedded,
//! then grouped left to right: a sentence joins the open chunk when its best
//! similarity to any sentence already in the chunk reaches the threshold and
//! the chunk stays within `max_chunk_size`.
//!
//! Size rules override similarity: a chunk below `min_chunk_size` always
//! absorbs the next sentence, and a sentence that would push the chunk past
//! `max_chunk_size` always starts a new one. Sizes are in characters and
//! include the single spaces used to join sentences.
//!
//! # Usage
//!
//! ```ignore
//! use multi_rag_rag::chunker::SemanticChunker;
//!
//! let chunker = SemanticChunker::new(embedder, ChunkerConfig::default());
//! let output = chunker.chunk("First sentence. Second sentence.").await?;
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use multi_rag_config::ChunkerConfig;
use multi_rag_core::Embedder;

use crate::reranker::cosine_similarity;
use crate::vector_store::Document;
use crate::RagError;

/// A semantically coherent run of sentences
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SemanticChunk {
    /// Sentences joined by single spaces
    pub text: String,
    /// First sentence index (inclusive)
    pub start_sentence: usize,
    /// Last sentence index (inclusive)
    pub end_sentence: usize,
    /// Mean pairwise sentence similarity (1.0 for a single sentence)
    pub cohesion_score: f32,
    /// Size in characters
    pub size: usize,
}

impl SemanticChunk {
    pub fn sentence_count(&self) -> usize {
        self.end_sentence - self.start_sentence + 1
    }
}

/// Chunking result
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChunkedText {
    pub sentences: Vec<String>,
    pub chunks: Vec<SemanticChunk>,
    /// Similarity threshold at the configured percentile, if there were
    /// at least two sentences
    pub breakpoint_threshold: Option<f32>,
    /// Sentence indices that start a new topic (adjacent similarity below
    /// the breakpoint threshold)
    pub breakpoints: Vec<usize>,
}

/// Split on `.`, `!` or `?` followed by whitespace and an uppercase letter
pub fn split_sentences(text: &str) -> Vec<String> {
    let chars: Vec<(usize, char)> = text.char_indices().collect();
    let mut sentences = Vec::new();
    let mut start = 0;
    let mut i = 0;

    while i < chars.len() {
        let (pos, c) = chars[i];
        if matches!(c, '.' | '!' | '?') {
            let mut j = i + 1;
            while j < chars.len() && chars[j].1.is_whitespace() {
                j += 1;
            }
            if j > i + 1 && j < chars.len() && chars[j].1.is_ascii_uppercase() {
                push_trimmed(&mut sentences, &text[start..pos + c.len_utf8()]);
                start = chars[j].0;
                i = j;
                continue;
            }
        }
        i += 1;
    }
    push_trimmed(&mut sentences, &text[start..]);

    sentences
}

fn push_trimmed(out: &mut Vec<String>, s: &str) {
    let trimmed = s.trim();
    if !trimmed.is_empty() {
        out.push(trimmed.to_string());
    }
}

/// Linear-interpolated percentile (`p` in 0..=100)
pub fn percentile(values: &[f32], p: f32) -> Option<f32> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

    let rank = (p.clamp(0.0, 100.0) / 100.0) * (sorted.len() - 1) as f32;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    let frac = rank - lower as f32;
    Some(sorted[lower] + (sorted[upper] - sorted[lower]) * frac)
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

/// Max-Min semantic chunker
pub struct SemanticChunker {
    embedder: Arc<dyn Embedder>,
    config: ChunkerConfig,
}

impl SemanticChunker {
    pub fn new(embedder: Arc<dyn Embedder>, config: ChunkerConfig) -> Self {
        Self { embedder, config }
    }

    pub fn config(&self) -> &ChunkerConfig {
        &self.config
    }

    async fn embed_sentences(&self, sentences: &[String]) -> Result<Vec<Vec<f32>>, RagError> {
        let batch_size = self.config.embed_batch_size.max(1);
        let mut embeddings = Vec::with_capacity(sentences.len());

        for batch in sentences.chunks(batch_size) {
            let batch_embeddings = self
                .embedder
                .embed_batch(batch)
                .await
                .map_err(|e| RagError::Embedding(e.to_string()))?;
            if batch_embeddings.len() != batch.len() {
                return Err(RagError::Embedding(format!(
                    "Embedder returned {} vectors for {} sentences",
                    batch_embeddings.len(),
                    batch.len()
                )));
            }
            embeddings.extend(batch_embeddings);
        }

        Ok(embeddings)
    }

    /// Threshold and breakpoints from adjacent-sentence similarities
    fn breakpoints(&self, embeddings: &[Vec<f32>]) -> (Option<f32>, Vec<usize>) {
        let similarities: Vec<f32> = embeddings
            .windows(2)
            .map(|w| cosine_similarity(&w[0], &w[1]))
            .collect();

        let Some(threshold) = percentile(&similarities, 100.0 - self.config.breakpoint_percentile)
        else {
            return (None, Vec::new());
        };

        let breakpoints = similarities
            .iter()
            .enumerate()
            .filter(|(_, sim)| **sim < threshold)
            .map(|(i, _)| i + 1)
            .collect();

        (Some(threshold), breakpoints)
    }

    /// Max-Min grouping into inclusive sentence ranges
    fn group(&self, sentences: &[String], embeddings: &[Vec<f32>]) -> Vec<(usize, usize)> {
        if sentences.is_empty() {
            return Vec::new();
        }

        let mut ranges = Vec::new();
        let mut start = 0;
        let mut current_len = char_len(&sentences[0]);

        for i in 1..sentences.len() {
            let max_sim = (start..i)
                .map(|j| cosine_similarity(&embeddings[i], &embeddings[j]))
                .fold(f32::MIN, f32::max);

            // +1 for the joining space
            let merged_len = current_len + 1 + char_len(&sentences[i]);
            let fits = merged_len <= self.config.max_chunk_size;

            let mut merge = max_sim >= self.config.similarity_threshold && fits;
            if current_len < self.config.min_chunk_size {
                merge = true;
            }
            if !fits {
                merge = false;
            }

            if merge {
                current_len = merged_len;
            } else {
                ranges.push((start, i - 1));
                start = i;
                current_len = char_len(&sentences[i]);
            }
        }
        ranges.push((start, sentences.len() - 1));

        ranges
    }

    fn cohesion(embeddings: &[Vec<f32>]) -> f32 {
        if embeddings.len() < 2 {
            return 1.0;
        }
        let mut total = 0.0;
        let mut pairs = 0usize;
        for i in 0..embeddings.len() {
            for j in (i + 1)..embeddings.len() {
                total += cosine_similarity(&embeddings[i], &embeddings[j]);
                pairs += 1;
            }
        }
        total / pairs as f32
    }

    /// Split text into semantic chunks
    pub async fn chunk(&self, text: &str) -> Result<ChunkedText, RagError> {
        let sentences = split_sentences(text);

        if sentences.is_empty() {
            return Ok(ChunkedText::default());
        }

        if sentences.len() == 1 {
            let size = char_len(&sentences[0]);
            return Ok(ChunkedText {
                chunks: vec![SemanticChunk {
                    text: sentences[0].clone(),
                    start_sentence: 0,
                    end_sentence: 0,
                    cohesion_score: 1.0,
                    size,
                }],
                sentences,
                breakpoint_threshold: None,
                breakpoints: Vec::new(),
            });
        }

        let embeddings = self.embed_sentences(&sentences).await?;
        let (breakpoint_threshold, breakpoints) = self.breakpoints(&embeddings);

        let chunks: Vec<SemanticChunk> = self
            .group(&sentences, &embeddings)
            .into_iter()
            .map(|(start, end)| {
                let text = sentences[start..=end].join(" ");
                SemanticChunk {
                    size: char_len(&text),
                    text,
                    start_sentence: start,
                    end_sentence: end,
                    cohesion_score: Self::cohesion(&embeddings[start..=end]),
                }
            })
            .collect();

        tracing::debug!(
            sentences = sentences.len(),
            chunks = chunks.len(),
            breakpoints = breakpoints.len(),
            "Chunked text"
        );

        Ok(ChunkedText {
            sentences,
            chunks,
            breakpoint_threshold,
            breakpoints,
        })
    }

    /// Chunk a document into indexable documents
    ///
    /// Chunk IDs are `{doc_id}_chunk_{i}`; the caller's metadata is copied
    /// onto every chunk.
    pub async fn chunk_document(
        &self,
        text: &str,
        doc_id: &str,
        metadata: &HashMap<String, serde_json::Value>,
    ) -> Result<Vec<Document>, RagError> {
        let output = self.chunk(text).await?;
        let total = output.chunks.len();

        Ok(output
            .chunks
            .into_iter()
            .enumerate()
            .map(|(i, chunk)| {
                let mut doc = Document::new(format!("{}_chunk_{}", doc_id, i), chunk.text.clone());
                doc.metadata = metadata.clone();
                doc.with_metadata("doc_id", doc_id)
                    .with_metadata("chunk_method", "maxmin_semantic")
                    .with_metadata("chunk_index", i)
                    .with_metadata("total_chunks", total)
                    .with_metadata("cohesion_score", chunk.cohesion_score as f64)
                    .with_metadata("sentence_count", chunk.sentence_count())
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::KeywordEmbedder;

    fn chunker(config: ChunkerConfig) -> SemanticChunker {
        SemanticChunker::new(Arc::new(KeywordEmbedder::default()), config)
    }

    fn small_config() -> ChunkerConfig {
        ChunkerConfig {
            min_chunk_size: 10,
            max_chunk_size: 80,
            ..Default::default()
        }
    }

    const DOC: &str = "Rust ownership prevents data races. Rust ownership moves values between owners. \
        Borrowing lets code read values without ownership. Tokio schedules async tasks on worker threads. \
        Tokio tasks yield at await points. Graph databases store nodes. Graph edges carry relationship types.";

    fn normalize(s: &str) -> String {
        s.split_whitespace().collect()
    }

    #[test]
    fn test_split_sentences() {
        let sentences = split_sentences("Hello world. This is Rust! Is it? yes it is. Done");
        assert_eq!(
            sentences,
            vec!["Hello world.", "This is Rust!", "Is it? yes it is.", "Done"]
        );
    }

    #[test]
    fn test_split_requires_whitespace() {
        assert_eq!(split_sentences("Version 1.2.Next"), vec!["Version 1.2.Next"]);
        assert!(split_sentences("   ").is_empty());
    }

    #[test]
    fn test_percentile() {
        let values = [0.1, 0.2, 0.3, 0.4, 0.5];
        assert_eq!(percentile(&values, 0.0), Some(0.1));
        assert_eq!(percentile(&values, 100.0), Some(0.5));
        assert!((percentile(&values, 10.0).unwrap() - 0.14).abs() < 1e-6);
        assert_eq!(percentile(&[], 50.0), None);
    }

    #[tokio::test]
    async fn test_chunk_coverage() {
        let output = chunker(small_config()).chunk(DOC).await.unwrap();

        let joined: String = output.chunks.iter().map(|c| c.text.as_str()).collect::<Vec<_>>().join(" ");
        assert_eq!(normalize(&joined), normalize(&output.sentences.join(" ")));

        // Every sentence in exactly one chunk, in order
        let mut expected = 0;
        for chunk in &output.chunks {
            assert_eq!(chunk.start_sentence, expected);
            expected = chunk.end_sentence + 1;
        }
        assert_eq!(expected, output.sentences.len());
    }

    #[tokio::test]
    async fn test_chunk_size_bound() {
        let config = small_config();
        let max = config.max_chunk_size;
        let output = chunker(config).chunk(DOC).await.unwrap();

        assert!(output.chunks.len() > 1);
        for chunk in &output.chunks {
            assert!(chunk.size <= max || chunk.sentence_count() == 1);
            assert_eq!(chunk.size, chunk.text.chars().count());
        }
    }

    #[tokio::test]
    async fn test_oversized_sentence_is_forced_alone() {
        let long = format!("{} end.", "word ".repeat(40).trim());
        let text = format!("Short one. {} Another short.", long.replace("word", "Word"));
        let config = ChunkerConfig {
            min_chunk_size: 5,
            max_chunk_size: 50,
            ..Default::default()
        };
        let output = chunker(config).chunk(&text).await.unwrap();

        let oversized: Vec<_> = output.chunks.iter().filter(|c| c.size > 50).collect();
        assert_eq!(oversized.len(), 1);
        assert_eq!(oversized[0].sentence_count(), 1);
    }

    #[tokio::test]
    async fn test_min_size_forces_merge() {
        // Unrelated sentences still merge while the chunk is under min size
        let config = ChunkerConfig {
            min_chunk_size: 1000,
            max_chunk_size: 2000,
            similarity_threshold: 0.99,
            ..Default::default()
        };
        let output = chunker(config).chunk(DOC).await.unwrap();
        assert_eq!(output.chunks.len(), 1);
        assert!(output.chunks[0].cohesion_score < 1.0);
    }

    #[tokio::test]
    async fn test_single_sentence() {
        let output = chunker(small_config()).chunk("Only one sentence here").await.unwrap();
        assert_eq!(output.chunks.len(), 1);
        assert_eq!(output.chunks[0].cohesion_score, 1.0);
        assert!(output.breakpoint_threshold.is_none());
    }

    #[tokio::test]
    async fn test_breakpoints_reported() {
        let output = chunker(small_config()).chunk(DOC).await.unwrap();
        let threshold = output.breakpoint_threshold.unwrap();
        assert!((-1.0..=1.0).contains(&threshold));
        assert!(output.breakpoints.iter().all(|&b| b > 0 && b < output.sentences.len()));
    }

    #[tokio::test]
    async fn test_chunk_document_metadata() {
        let mut metadata = HashMap::new();
        metadata.insert("source".to_string(), serde_json::json!("guide.md"));

        let docs = chunker(small_config())
            .chunk_document(DOC, "guide", &metadata)
            .await
            .unwrap();

        assert!(docs.len() > 1);
        assert_eq!(docs[0].id, "guide_chunk_0");
        assert_eq!(docs[1].metadata["chunk_index"], 1);
        assert_eq!(docs[0].metadata["total_chunks"], docs.len());
        assert_eq!(docs[0].metadata["source"], "guide.md");
        assert!(docs[0].metadata.contains_key("cohesion_score"));
        assert!(docs[0].metadata.contains_key("sentence_count"));
    }

    #[tokio::test]
    async fn test_empty_text() {
        let output = chunker(small_config()).chunk("").await.unwrap();
        assert!(output.chunks.is_empty());
    }
}
