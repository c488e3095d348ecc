//! Text generation and embedding traits

use async_trait::async_trait;
use crate::{GenerateRequest, GenerateResponse, Result};

/// Text generation interface
///
/// Implementations:
/// - `OllamaBackend` - Local Ollama inference
/// - canned generators in tests
///
/// # Example
///
/// ```ignore
/// let llm: Arc<dyn TextGenerator> = Arc::new(OllamaBackend::new(config)?);
/// let request = GenerateRequest::new("You are a query analyzer")
///     .with_user_message("Compare Neo4j and Postgres")
///     .with_temperature(0.0);
/// let response = llm.generate(request).await?;
/// println!("{}", response.text);
/// ```
#[async_trait]
pub trait TextGenerator: Send + Sync + 'static {
    /// Generate a completion
    ///
    /// Fails with `Error::Llm` on provider fault.
    async fn generate(&self, request: GenerateRequest) -> Result<GenerateResponse>;

    /// Convenience wrapper for a single system + user prompt
    async fn generate_text(
        &self,
        prompt: &str,
        system_prompt: &str,
        temperature: f32,
    ) -> Result<String> {
        let request = GenerateRequest::new(system_prompt)
            .with_user_message(prompt)
            .with_temperature(temperature);
        Ok(self.generate(request).await?.text)
    }

    /// Check if the backend is reachable
    async fn is_available(&self) -> bool {
        true
    }

    /// Get model name for logging
    fn model_name(&self) -> &str;
}

/// Embedding interface
#[async_trait]
pub trait Embedder: Send + Sync + 'static {
    /// Embed a single text
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Embed a batch of texts, preserving order
    ///
    /// The default calls [`Embedder::embed`] sequentially.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            out.push(self.embed(text).await?);
        }
        Ok(out)
    }

    /// Embedding dimension, if known
    fn dimension(&self) -> Option<usize> {
        None
    }
}
