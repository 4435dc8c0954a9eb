use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

use crate::config::SearchConfig;
use crate::error::{ConfigError, SearchError};
use crate::planner::ResearchQuery;

/// One raw result from the search provider.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub url: Option<String>,
    pub title: Option<String>,
    /// Page content as markdown.
    pub content: Option<String>,
}

#[derive(Debug, Clone)]
pub struct SearchOptions {
    pub timeout: Duration,
    pub limit: usize,
    pub formats: Vec<String>,
}

impl SearchOptions {
    pub fn markdown(timeout: Duration, limit: usize) -> Self {
        SearchOptions {
            timeout,
            limit,
            formats: vec!["markdown".to_string()],
        }
    }
}

#[async_trait]
pub trait SearchProvider: Send + Sync {
    async fn search(
        &self,
        query: &str,
        options: &SearchOptions,
    ) -> Result<Vec<SearchHit>, SearchError>;
}

/// Runs one search per sub-query. Concurrency is bounded by the caller.
#[derive(Clone)]
pub struct SearchExecutor {
    provider: Arc<dyn SearchProvider>,
}

impl SearchExecutor {
    pub fn new(provider: Arc<dyn SearchProvider>) -> Self {
        SearchExecutor { provider }
    }

    pub async fn search(
        &self,
        query: &ResearchQuery,
        timeout: Duration,
        result_limit: usize,
    ) -> Result<Vec<SearchHit>, SearchError> {
        let options = SearchOptions::markdown(timeout, result_limit);
        match tokio::time::timeout(timeout, self.provider.search(&query.text, &options)).await {
            Ok(result) => result,
            Err(_) => Err(SearchError::Timeout {
                timeout_ms: timeout.as_millis() as u64,
            }),
        }
    }
}

#[derive(Debug, Deserialize)]
struct FirecrawlSearchResponse {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    data: Vec<FirecrawlDocument>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FirecrawlDocument {
    url: Option<String>,
    title: Option<String>,
    markdown: Option<String>,
}

impl From<FirecrawlDocument> for SearchHit {
    fn from(doc: FirecrawlDocument) -> Self {
        SearchHit {
            url: doc.url,
            title: doc.title,
            content: doc.markdown,
        }
    }
}

/// Client for a Firecrawl (self-hosted or cloud) `/v1/search` endpoint.
pub struct FirecrawlClient {
    base_url: String,
    api_key: Option<String>,
    http_client: reqwest::Client,
}

impl FirecrawlClient {
    pub fn with_config(config: &SearchConfig) -> Result<Self, ConfigError> {
        if config.base_url.trim().is_empty() {
            return Err(ConfigError::MissingCredential { name: "search.base_url" });
        }
        Ok(FirecrawlClient {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone().filter(|k| !k.is_empty()),
            http_client: reqwest::Client::new(),
        })
    }

    fn request_body(query: &str, options: &SearchOptions) -> serde_json::Value {
        json!({
            "query": query,
            "limit": options.limit,
            "timeout": options.timeout.as_millis() as u64,
            "scrapeOptions": { "formats": options.formats },
        })
    }
}

#[async_trait]
impl SearchProvider for FirecrawlClient {
    async fn search(
        &self,
        query: &str,
        options: &SearchOptions,
    ) -> Result<Vec<SearchHit>, SearchError> {
        let endpoint = format!("{}/v1/search", self.base_url);
        tracing::debug!(%endpoint, query, limit = options.limit, "search request");

        let mut request = self
            .http_client
            .post(&endpoint)
            .timeout(options.timeout)
            .json(&Self::request_body(query, options));
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                SearchError::Timeout {
                    timeout_ms: options.timeout.as_millis() as u64,
                }
            } else {
                SearchError::Request { message: e.to_string() }
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Could not read error response".to_string());
            tracing::warn!(status = status.as_u16(), %body, "search API error");
            return Err(SearchError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: FirecrawlSearchResponse =
            response.json().await.map_err(|e| SearchError::ResponseParse {
                message: e.to_string(),
            })?;
        if !parsed.success {
            return Err(SearchError::Provider {
                message: parsed.error.unwrap_or_else(|| "unknown error".to_string()),
            });
        }

        tracing::debug!(query, hits = parsed.data.len(), "search complete");
        Ok(parsed.data.into_iter().map(SearchHit::from).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeSearch;

    fn query(text: &str) -> ResearchQuery {
        ResearchQuery {
            text: text.to_string(),
            research_goal: String::new(),
        }
    }

    #[tokio::test]
    async fn test_executor_passes_options() {
        let search = FakeSearch::new(|q, options| {
            assert_eq!(options.limit, 3);
            assert_eq!(options.formats, vec!["markdown".to_string()]);
            Ok(vec![SearchHit {
                url: Some(format!("https://example.com/{}", q)),
                ..Default::default()
            }])
        });
        let executor = SearchExecutor::new(Arc::new(search));
        let hits = executor
            .search(&query("rust"), Duration::from_secs(1), 3)
            .await
            .unwrap();
        assert_eq!(hits[0].url.as_deref(), Some("https://example.com/rust"));
    }

    #[tokio::test]
    async fn test_executor_times_out() {
        let search = FakeSearch::new(|_, _| Ok(Vec::new())).with_delay(Duration::from_millis(200));
        let executor = SearchExecutor::new(Arc::new(search));
        let err = executor
            .search(&query("slow"), Duration::from_millis(20), 5)
            .await
            .unwrap_err();
        assert!(err.is_timeout());
    }

    #[tokio::test]
    async fn test_executor_surfaces_provider_errors() {
        let search = FakeSearch::new(|_, _| {
            Err(SearchError::Status {
                status: 502,
                body: "bad gateway".to_string(),
            })
        });
        let executor = SearchExecutor::new(Arc::new(search));
        let err = executor
            .search(&query("down"), Duration::from_secs(1), 5)
            .await
            .unwrap_err();
        assert!(matches!(err, SearchError::Status { status: 502, .. }));
    }

    #[test]
    fn test_firecrawl_body_and_response() {
        let options = SearchOptions::markdown(Duration::from_millis(15_000), 5);
        let body = FirecrawlClient::request_body("rust async", &options);
        assert_eq!(body["query"], "rust async");
        assert_eq!(body["limit"], 5);
        assert_eq!(body["timeout"], 15_000);
        assert_eq!(body["scrapeOptions"]["formats"][0], "markdown");

        let raw = r##"{"success": true, "data": [
            {"url": "https://a.example", "title": "A", "markdown": "# A"},
            {"url": "https://b.example", "description": "no markdown"}
        ]}"##;
        let parsed: FirecrawlSearchResponse = serde_json::from_str(raw).unwrap();
        let hits: Vec<SearchHit> = parsed.data.into_iter().map(SearchHit::from).collect();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].content.as_deref(), Some("# A"));
        assert_eq!(hits[1].content, None);
    }

    #[test]
    fn test_firecrawl_requires_base_url() {
        let config = SearchConfig {
            base_url: " ".to_string(),
            ..SearchConfig::default()
        };
        assert!(FirecrawlClient::with_config(&config).is_err());
    }
}
