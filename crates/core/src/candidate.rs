//! Retrieved candidates and their provenance

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Which retrieval source produced a candidate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceTag {
    Vector,
    Graph,
    Web,
}

impl SourceTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceTag::Vector => "vector",
            SourceTag::Graph => "graph",
            SourceTag::Web => "web",
        }
    }
}

impl fmt::Display for SourceTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A retrieved content unit
///
/// Identity is `id`. The score is unnormalized straight out of a source and
/// lies in `[0, 1]` once it has been through fusion or reranking.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candidate {
    /// Candidate ID
    pub id: String,
    /// Candidate text
    pub text: String,
    /// Relevance score
    pub score: f32,
    /// Source that produced this candidate
    pub source: SourceTag,
    /// Candidate metadata
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl Candidate {
    /// Create a new candidate
    pub fn new(id: impl Into<String>, text: impl Into<String>, score: f32, source: SourceTag) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            score,
            source,
            metadata: HashMap::new(),
        }
    }

    /// Add metadata
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Score clamped to `[0, 1]`
    pub fn clamped_score(&self) -> f32 {
        if self.score.is_nan() {
            0.0
        } else {
            self.score.clamp(0.0, 1.0)
        }
    }

    /// First `max_chars` characters of the text, with a trailing ellipsis
    pub fn preview(&self, max_chars: usize) -> String {
        let head: String = self.text.chars().take(max_chars).collect();
        format!("{}...", head)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_candidate_builder() {
        let c = Candidate::new("doc-1", "Retrieval augmented generation", 0.92, SourceTag::Vector)
            .with_metadata("source_file", "rag.md");

        assert_eq!(c.id, "doc-1");
        assert_eq!(c.source, SourceTag::Vector);
        assert!(c.metadata.contains_key("source_file"));
    }

    #[test]
    fn test_preview_is_char_safe() {
        let c = Candidate::new("d", "héllo wörld", 0.5, SourceTag::Web);
        assert_eq!(c.preview(5), "héllo...");
        assert_eq!(c.preview(100), "héllo wörld...");
    }

    #[test]
    fn test_clamped_score() {
        assert_eq!(Candidate::new("a", "", 1.7, SourceTag::Graph).clamped_score(), 1.0);
        assert_eq!(Candidate::new("a", "", -0.2, SourceTag::Graph).clamped_score(), 0.0);
        assert_eq!(Candidate::new("a", "", f32::NAN, SourceTag::Graph).clamped_score(), 0.0);
    }

    #[test]
    fn test_source_tag_serde() {
        let json = serde_json::to_string(&SourceTag::Graph).unwrap();
        assert_eq!(json, "\"graph\"");
    }
}
