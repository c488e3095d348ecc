//! Web search providers and source credibility
//!
//! Tavily and SerpAPI clients implementing [`WebSearch`], plus the static
//! credibility table used to score web candidates.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use url::Url;

use multi_rag_config::WebConfig;
use multi_rag_core::{WebResult, WebSearch};

use crate::RagError;

/// Official documentation and major platforms
const HIGH_CREDIBILITY: &[&str] = &[
    "docs.python.org",
    "aws.amazon.com",
    "langchain.com",
    "microsoft.com",
    "github.com",
    "stackoverflow.com",
    "developer.mozilla.org",
];

/// Community publishing platforms
const MEDIUM_CREDIBILITY: &[&str] = &[
    "medium.com",
    "dev.to",
    "towardsdatascience.com",
    "realpython.com",
];

pub const HIGH_TIER: f32 = 0.9;
pub const ANSWER_TIER: f32 = 0.85;
pub const MEDIUM_TIER: f32 = 0.7;
pub const DEFAULT_TIER: f32 = 0.5;

/// Host part of a URL, lowercased, without `www.`
fn host_of(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let host = parsed.host_str()?.to_lowercase();
    Some(host.trim_start_matches("www.").to_string())
}

fn matches_domain(host: &str, domain: &str) -> bool {
    host == domain || host.ends_with(&format!(".{}", domain))
}

/// Credibility tier for a URL; subdomains inherit their parent's tier
pub fn credibility(url: &str) -> f32 {
    let Some(host) = host_of(url) else {
        return DEFAULT_TIER;
    };
    if HIGH_CREDIBILITY.iter().any(|d| matches_domain(&host, d)) {
        HIGH_TIER
    } else if MEDIUM_CREDIBILITY.iter().any(|d| matches_domain(&host, d)) {
        MEDIUM_TIER
    } else {
        DEFAULT_TIER
    }
}

/// Credibility of a web result, treating provider answers as their own tier
pub fn result_credibility(result: &WebResult) -> f32 {
    if result.is_answer {
        ANSWER_TIER
    } else {
        credibility(&result.url)
    }
}

/// Build the configured provider, if web search is enabled and keyed
pub fn build_web_search(config: &WebConfig) -> Result<Option<Arc<dyn WebSearch>>, RagError> {
    if !config.enabled {
        return Ok(None);
    }
    let Some(api_key) = config.api_key.clone() else {
        tracing::warn!(provider = %config.provider, "Web search enabled but no API key configured");
        return Ok(None);
    };
    let timeout = Duration::from_secs(config.timeout_secs);

    let provider: Arc<dyn WebSearch> = match config.provider.to_lowercase().as_str() {
        "tavily" => Arc::new(TavilyClient::new(&config.endpoint, api_key, timeout)?),
        "serpapi" => {
            let endpoint = if config.endpoint.contains("tavily") {
                SerpApiClient::DEFAULT_ENDPOINT
            } else {
                config.endpoint.as_str()
            };
            Arc::new(SerpApiClient::new(endpoint, api_key, timeout)?)
        }
        other => {
            return Err(RagError::Configuration(format!(
                "Unknown web search provider: {}",
                other
            )))
        }
    };
    Ok(Some(provider))
}

fn http_client(timeout: Duration) -> Result<Client, RagError> {
    Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| RagError::Configuration(format!("Failed to create HTTP client: {}", e)))
}

/// Tavily search client
pub struct TavilyClient {
    client: Client,
    endpoint: String,
    api_key: String,
}

impl TavilyClient {
    pub fn new(endpoint: &str, api_key: String, timeout: Duration) -> Result<Self, RagError> {
        Ok(Self {
            client: http_client(timeout)?,
            endpoint: endpoint.to_string(),
            api_key,
        })
    }
}

#[derive(Debug, Deserialize)]
struct TavilyResponse {
    #[serde(default)]
    answer: Option<String>,
    #[serde(default)]
    results: Vec<TavilyItem>,
}

#[derive(Debug, Deserialize)]
struct TavilyItem {
    #[serde(default)]
    title: String,
    #[serde(default)]
    url: String,
    #[serde(default)]
    content: String,
    #[serde(default)]
    score: Option<f32>,
}

impl TavilyResponse {
    fn into_results(self) -> Vec<WebResult> {
        let mut out = Vec::with_capacity(self.results.len() + 1);
        if let Some(answer) = self.answer.filter(|a| !a.trim().is_empty()) {
            out.push(WebResult {
                title: "Tavily Summary".to_string(),
                url: "tavily://summary".to_string(),
                content: answer,
                provider_score: None,
                is_answer: true,
            });
        }
        out.extend(self.results.into_iter().map(|item| WebResult {
            title: item.title,
            url: item.url,
            content: item.content,
            provider_score: item.score,
            is_answer: false,
        }));
        out
    }
}

#[async_trait]
impl WebSearch for TavilyClient {
    async fn search(&self, query: &str, max_results: usize) -> multi_rag_core::Result<Vec<WebResult>> {
        let body = serde_json::json!({
            "api_key": self.api_key,
            "query": query,
            "search_depth": "advanced",
            "include_answer": true,
            "include_raw_content": false,
            "max_results": max_results,
        });

        let response = self
            .client
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await
            .map_err(|e| RagError::WebSearch(e.to_string()))?;

        if !response.status().is_success() {
            return Err(RagError::WebSearch(format!("Tavily returned {}", response.status())).into());
        }

        let parsed: TavilyResponse = response
            .json()
            .await
            .map_err(|e| RagError::WebSearch(format!("Invalid Tavily response: {}", e)))?;
        Ok(parsed.into_results())
    }

    fn name(&self) -> &str {
        "tavily"
    }
}

/// SerpAPI (Google) search client
pub struct SerpApiClient {
    client: Client,
    endpoint: String,
    api_key: String,
}

impl SerpApiClient {
    pub const DEFAULT_ENDPOINT: &'static str = "https://serpapi.com/search";

    pub fn new(endpoint: &str, api_key: String, timeout: Duration) -> Result<Self, RagError> {
        Ok(Self {
            client: http_client(timeout)?,
            endpoint: endpoint.to_string(),
            api_key,
        })
    }
}

#[derive(Debug, Deserialize)]
struct SerpApiResponse {
    #[serde(default)]
    organic_results: Vec<SerpApiItem>,
}

#[derive(Debug, Deserialize)]
struct SerpApiItem {
    #[serde(default)]
    title: String,
    #[serde(default)]
    link: String,
    #[serde(default)]
    snippet: String,
}

#[async_trait]
impl WebSearch for SerpApiClient {
    async fn search(&self, query: &str, max_results: usize) -> multi_rag_core::Result<Vec<WebResult>> {
        let num = max_results.to_string();
        let response = self
            .client
            .get(&self.endpoint)
            .query(&[
                ("api_key", self.api_key.as_str()),
                ("q", query),
                ("engine", "google"),
                ("num", num.as_str()),
            ])
            .send()
            .await
            .map_err(|e| RagError::WebSearch(e.to_string()))?;

        if !response.status().is_success() {
            return Err(RagError::WebSearch(format!("SerpAPI returned {}", response.status())).into());
        }

        let parsed: SerpApiResponse = response
            .json()
            .await
            .map_err(|e| RagError::WebSearch(format!("Invalid SerpAPI response: {}", e)))?;

        Ok(parsed
            .organic_results
            .into_iter()
            .take(max_results)
            .map(|item| WebResult {
                title: item.title,
                url: item.link,
                content: item.snippet,
                provider_score: None,
                is_answer: false,
            })
            .collect())
    }

    fn name(&self) -> &str {
        "serpapi"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_credibility_tiers() {
        assert_eq!(credibility("https://docs.python.org/3/library/asyncio.html"), 0.9);
        assert_eq!(credibility("https://github.com/tokio-rs/tokio"), 0.9);
        assert_eq!(credibility("https://dev.to/someone/post"), 0.7);
        assert_eq!(credibility("https://example.com/blog"), 0.5);
        assert_eq!(credibility("not a url"), 0.5);
    }

    #[test]
    fn test_subdomains_inherit_tier() {
        assert_eq!(credibility("https://learn.microsoft.com/en-us/azure"), 0.9);
        assert_eq!(credibility("https://www.medium.com/@a/b"), 0.7);
        assert_eq!(credibility("https://blog.medium.com"), 0.7);
        // Suffix without a dot boundary is not a subdomain
        assert_eq!(credibility("https://notgithub.com/x"), 0.5);
    }

    #[test]
    fn test_host_parsing() {
        assert_eq!(host_of("https://user@Docs.Python.org:443/x").as_deref(), Some("docs.python.org"));
        assert_eq!(host_of("mailto:someone@github.com"), None);
        assert_eq!(host_of("github.com/tokio-rs"), None);
    }

    #[test]
    fn test_backslash_authority_uses_real_host() {
        assert_eq!(host_of("https://evil.example\\@github.com/repo").as_deref(), Some("evil.example"));
        assert_eq!(credibility("https://evil.example\\@github.com/repo"), DEFAULT_TIER);
    }

    #[test]
    fn test_answer_tier() {
        let answer = WebResult {
            title: "Tavily Summary".into(),
            url: "tavily://summary".into(),
            content: "answer".into(),
            provider_score: None,
            is_answer: true,
        };
        assert_eq!(result_credibility(&answer), 0.85);
    }

    #[test]
    fn test_tavily_response_mapping() {
        let raw = r#"{
            "answer": "Tokio is an async runtime",
            "results": [{"title": "Tokio", "url": "https://tokio.rs", "content": "docs", "score": 0.9}]
        }"#;
        let parsed: TavilyResponse = serde_json::from_str(raw).unwrap();
        let results = parsed.into_results();
        assert_eq!(results.len(), 2);
        assert!(results[0].is_answer);
        assert_eq!(results[1].provider_score, Some(0.9));
    }

    #[test]
    fn test_build_without_key_disables() {
        let config = WebConfig::default();
        assert!(build_web_search(&config).unwrap().is_none());

        let config = WebConfig {
            api_key: Some("k".into()),
            provider: "bing".into(),
            ..Default::default()
        };
        assert!(build_web_search(&config).is_err());

        let config = WebConfig {
            api_key: Some("k".into()),
            ..Default::default()
        };
        assert_eq!(build_web_search(&config).unwrap().unwrap().name(), "tavily");
    }
}
