//! Prompt Building and Management
//!
//! Prompt templates for every generation stage of the retrieval pipeline,
//! plus tolerant extraction of JSON objects from model output.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::de::DeserializeOwned;

use multi_rag_core::{ConversationMessage, GenerateRequest, Message, MessageRole};

use crate::LlmError;

/// System prompts per stage
pub mod system {
    pub const ANALYZER: &str =
        "You are a query analysis expert. Respond only with valid JSON.";
    pub const GRADER: &str =
        "You are a relevance grading expert. Be strict: only pass if the documents clearly answer the query. Respond only with valid JSON.";
    pub const REWRITER: &str =
        "You are a search query optimization expert. Return only the improved query.";
    pub const VALIDATOR: &str =
        "You are a fact-checking expert. Evaluate source quality objectively. Respond only with valid JSON.";
    pub const SYNTHESIZER: &str =
        "You are a helpful technical assistant. Answer accurately from the given context and cite sources as [Source N].";
    pub const GRAPH_QUERY: &str =
        "You are a graph query expert. Generate a single read-only query. Respond only with valid JSON.";
    pub const CONVERSATIONAL: &str =
        "You are a friendly technical assistant. Reply briefly to small talk and offer to help with technical questions.";
}

/// Prompt builder for chat-style requests
pub struct PromptBuilder {
    messages: Vec<Message>,
    temperature: Option<f32>,
    json_mode: bool,
}

impl PromptBuilder {
    /// Create a new prompt builder
    pub fn new() -> Self {
        Self {
            messages: Vec::new(),
            temperature: None,
            json_mode: false,
        }
    }

    /// Set the system prompt
    pub fn system_prompt(mut self, prompt: &str) -> Self {
        self.messages.push(Message::system(prompt));
        self
    }

    /// Add retrieved context
    pub fn with_context(mut self, context: &str) -> Self {
        if !context.is_empty() {
            self.messages.push(Message::system(format!(
                "## Retrieved Context\n{}\n\nAnswer only from this context when it is relevant.",
                context
            )));
        }
        self
    }

    /// Add conversation history (system messages are dropped)
    pub fn with_history(mut self, history: &[ConversationMessage]) -> Self {
        for msg in history {
            match msg.role {
                MessageRole::User => self.messages.push(Message::user(msg.content.clone())),
                MessageRole::Assistant => self.messages.push(Message::assistant(msg.content.clone())),
                MessageRole::System => {}
            }
        }
        self
    }

    /// Add current user message
    pub fn user_message(mut self, message: &str) -> Self {
        self.messages.push(Message::user(message));
        self
    }

    pub fn temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn json(mut self) -> Self {
        self.json_mode = true;
        self
    }

    /// Build the final request
    pub fn build(self) -> GenerateRequest {
        let mut request = GenerateRequest {
            messages: self.messages,
            ..Default::default()
        };
        if let Some(t) = self.temperature {
            request = request.with_temperature(t);
        }
        if self.json_mode {
            request = request.with_json_mode();
        }
        request
    }

    /// Get message count
    pub fn message_count(&self) -> usize {
        self.messages.len()
    }

    /// Estimate token count
    pub fn estimate_tokens(&self) -> usize {
        self.messages.iter().map(|m| m.content.len() / 4).sum()
    }
}

impl Default for PromptBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Stage prompt templates
pub struct PromptTemplates;

impl PromptTemplates {
    pub fn analysis(query: &str) -> String {
        format!(
            r#"Analyze this user query and extract its characteristics.

User Query: "{query}"

Respond with a JSON object containing:
- "intent": one of factual_qa, comparison, explanation, how_to, code_example, greeting
- "entities": list of key entities mentioned (classes, functions, APIs, products, technical terms)
- "complexity": one of simple, moderate, multi_hop
- "time_sensitive": true if the query asks about latest/recent/current information
- "requires_code_examples": true if the user likely wants code
- "ambiguity_score": 0.0 (clear) to 1.0 (very ambiguous)

Return ONLY the JSON object."#
        )
    }

    pub fn grading(query: &str, digest: &str) -> String {
        format!(
            r#"Grade these retrieved documents for relevance to the query.

Query: "{query}"

Retrieved Documents:
{digest}

Respond with a JSON object:
{{
  "grade": "pass" or "fail",
  "relevance_score": 0.0-1.0,
  "reasoning": "brief explanation",
  "needs_rewrite": true or false
}}

Return ONLY the JSON object."#
        )
    }

    pub fn rewrite(original_query: &str, failure_reason: &str, attempt: u32) -> String {
        let reason = if failure_reason.is_empty() {
            String::new()
        } else {
            format!("Previous results were poor: {}\n", failure_reason)
        };
        format!(
            r#"Rewrite this query to improve document retrieval.

Original Query: "{original_query}"
Attempt: {attempt}
{reason}
Apply where useful:
- add synonyms for key terms
- make the query more specific
- focus a complex query on its core information need
- replace ambiguous pronouns

Return ONLY the rewritten query."#
        )
    }

    pub fn validation(query: &str, sources: &str) -> String {
        format!(
            r#"Assess the quality and consistency of these retrieved sources for answering the question.

Question: "{query}"

Sources:
{sources}

Respond with a JSON object:
{{
  "relevance_score": 0.0-1.0,
  "consistency_score": 0.0-1.0,
  "coverage_score": 0.0-1.0,
  "potential_issues": ["..."]
}}

Return ONLY the JSON object."#
        )
    }

    pub fn synthesis(query: &str, caveats: &[String]) -> String {
        let caveats = if caveats.is_empty() {
            String::new()
        } else {
            format!(
                "\nThe sources have these known issues; mention them where they matter:\n- {}\n",
                caveats.join("\n- ")
            )
        };
        format!(
            r#"Answer the user's question using the retrieved context.

Question: "{query}"
{caveats}
Give a direct answer first, then supporting detail and code if relevant. Format in markdown and cite sources as [Source N]."#
        )
    }

    pub fn graph_query(question: &str, labels: &[String]) -> String {
        format!(
            r#"Write a graph query that finds entities relevant to this question.

Question: "{question}"

Node labels: {labels}
Supported form: MATCH (n:Label) WHERE n.name CONTAINS 'term' RETURN n LIMIT k

Respond with a JSON object: {{"query": "MATCH ...", "explanation": "..."}}"#,
            labels = labels.join(", ")
        )
    }
}

static FENCE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)```(?:json|JSON)?\s*(.*?)```").expect("valid fence regex"));

/// Extract the first JSON object from model output
///
/// Accepts bare JSON, fenced code blocks, and objects surrounded by prose.
pub fn extract_json(text: &str) -> Result<serde_json::Value, LlmError> {
    let trimmed = text.trim();
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(trimmed) {
        return Ok(value);
    }

    if let Some(caps) = FENCE_RE.captures(trimmed) {
        if let Some(inner) = caps.get(1) {
            if let Ok(value) = serde_json::from_str(inner.as_str().trim()) {
                return Ok(value);
            }
        }
    }

    match (trimmed.find('{'), trimmed.rfind('}')) {
        (Some(start), Some(end)) if end > start => serde_json::from_str(&trimmed[start..=end])
            .map_err(|e| LlmError::InvalidResponse(format!("malformed JSON: {}", e))),
        _ => Err(LlmError::InvalidResponse(format!(
            "no JSON object in output: {}",
            trimmed.chars().take(80).collect::<String>()
        ))),
    }
}

/// Extract and deserialize a JSON object from model output
pub fn parse_json<T: DeserializeOwned>(text: &str) -> Result<T, LlmError> {
    let value = extract_json(text)?;
    serde_json::from_value(value).map_err(|e| LlmError::InvalidResponse(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use multi_rag_core::Role;

    #[test]
    fn test_prompt_builder() {
        let request = PromptBuilder::new()
            .system_prompt(system::SYNTHESIZER)
            .with_context("[Source 1] RRF sums reciprocal ranks")
            .with_history(&[
                ConversationMessage::user("hi"),
                ConversationMessage::assistant("hello"),
            ])
            .user_message("What is RRF?")
            .temperature(0.2)
            .build();

        assert_eq!(request.messages.len(), 5);
        assert_eq!(request.messages[0].role, Role::System);
        assert_eq!(request.messages[4].role, Role::User);
        assert_eq!(request.temperature, Some(0.2));
        assert!(!request.json_mode);
    }

    #[test]
    fn test_empty_context_skipped() {
        let builder = PromptBuilder::new().system_prompt("s").with_context("");
        assert_eq!(builder.message_count(), 1);
    }

    #[test]
    fn test_templates_embed_inputs() {
        assert!(PromptTemplates::analysis("what is BM25").contains("\"what is BM25\""));
        let rewrite = PromptTemplates::rewrite("q", "too vague", 2);
        assert!(rewrite.contains("Attempt: 2"));
        assert!(rewrite.contains("too vague"));
        let graph = PromptTemplates::graph_query("q", &["Class".to_string(), "Function".to_string()]);
        assert!(graph.contains("Class, Function"));
    }

    #[test]
    fn test_extract_json_variants() {
        let bare = extract_json(r#"{"grade": "pass"}"#).unwrap();
        assert_eq!(bare["grade"], "pass");

        let fenced = extract_json("```json\n{\"grade\": \"fail\"}\n```").unwrap();
        assert_eq!(fenced["grade"], "fail");

        let prose = extract_json("Sure! Here you go: {\"score\": 0.4} Hope that helps").unwrap();
        assert_eq!(prose["score"], 0.4);
    }

    #[test]
    fn test_extract_json_failure() {
        assert!(matches!(
            extract_json("no json here"),
            Err(LlmError::InvalidResponse(_))
        ));
        assert!(extract_json("{ broken").is_err());
    }

    #[test]
    fn test_parse_json_typed() {
        #[derive(serde::Deserialize)]
        struct Grade {
            grade: String,
        }
        let grade: Grade = parse_json("```\n{\"grade\": \"pass\"}\n```").unwrap();
        assert_eq!(grade.grade, "pass");
    }
}
