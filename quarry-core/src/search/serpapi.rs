//! SerpAPI Google search backend.

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use super::{SearchProvider, classify_status, classify_transport};
use crate::error::SearchError;
use crate::types::SearchHit;

const DEFAULT_ENDPOINT: &str = "https://serpapi.com/search.json";

/// Google results through SerpAPI (`organic_results`).
pub struct SerpApiSearch {
    client: reqwest::Client,
    api_key: Option<String>,
    key_env: String,
    endpoint: String,
    timeout: Duration,
}

#[derive(Debug, Deserialize)]
struct SerpResponse {
    #[serde(default)]
    organic_results: Vec<OrganicResult>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OrganicResult {
    #[serde(default)]
    title: String,
    #[serde(default)]
    link: String,
    #[serde(default)]
    snippet: String,
}

impl SerpApiSearch {
    pub fn new(
        api_key: Option<String>,
        key_env: &str,
        endpoint: Option<String>,
        timeout: Duration,
    ) -> Result<Self, SearchError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("quarry/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| SearchError::Request {
                message: format!("Failed to create HTTP client: {}", e),
            })?;
        Ok(Self {
            client,
            api_key,
            key_env: key_env.to_string(),
            endpoint: endpoint.unwrap_or_else(|| DEFAULT_ENDPOINT.to_string()),
            timeout,
        })
    }

    fn to_hits(response: SerpResponse, limit: usize) -> Vec<SearchHit> {
        response
            .organic_results
            .into_iter()
            .filter(|r| !r.link.is_empty())
            .take(limit)
            .map(|r| SearchHit::web(r.title, r.link).with_snippet(r.snippet))
            .collect()
    }
}

#[async_trait]
impl SearchProvider for SerpApiSearch {
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchHit>, SearchError> {
        let api_key = self.api_key.as_deref().ok_or_else(|| SearchError::NotConfigured {
            provider: "serpapi".into(),
            reason: format!("{} is not set", self.key_env),
        })?;

        let url = format!(
            "{}?engine=google&q={}&api_key={}",
            self.endpoint,
            urlencoding::encode(query),
            urlencoding::encode(api_key)
        );
        debug!(query, limit, "SerpAPI search");

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| classify_transport(e, self.timeout))?;

        let status = response.status();
        if !status.is_success() {
            return Err(classify_status("serpapi", status));
        }

        let body: SerpResponse = response
            .json()
            .await
            .map_err(|e| SearchError::ResponseParse {
                message: e.to_string(),
            })?;

        if let Some(error) = &body.error {
            // SerpAPI reports "no results" through the error field.
            if error.to_ascii_lowercase().contains("hasn't returned any results") {
                return Ok(Vec::new());
            }
            if error.to_ascii_lowercase().contains("invalid api key") {
                return Err(SearchError::AuthFailed {
                    provider: "serpapi".into(),
                });
            }
            return Err(SearchError::Request {
                message: error.clone(),
            });
        }

        Ok(Self::to_hits(body, limit))
    }

    fn name(&self) -> &str {
        "serpapi"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_hits_skips_missing_links_and_limits() {
        let response: SerpResponse = serde_json::from_value(serde_json::json!({
            "organic_results": [
                {"title": "A", "link": "https://a.example", "snippet": "about a"},
                {"title": "No link"},
                {"title": "B", "link": "https://b.example"},
                {"title": "C", "link": "https://c.example"}
            ]
        }))
        .unwrap();
        let hits = SerpApiSearch::to_hits(response, 2);
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].snippet, "about a");
        assert_eq!(hits[0].kind, "web");
        assert_eq!(hits[1].location, "https://b.example");
    }

    #[tokio::test]
    async fn test_missing_key_is_provider_fatal() {
        let search =
            SerpApiSearch::new(None, "SERPAPI_KEY", None, Duration::from_secs(5)).unwrap();
        let err = search.search("anything", 5).await.unwrap_err();
        assert!(err.is_provider_fatal());
        assert!(err.to_string().contains("SERPAPI_KEY"));
    }
}
