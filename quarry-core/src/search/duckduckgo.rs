//! DuckDuckGo instant-answer search backend.
//!
//! Needs no API key. Results come from the abstract, `Results` and
//! `RelatedTopics` sections, in that order.

use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;

use super::{SearchProvider, classify_status, classify_transport};
use crate::error::SearchError;
use crate::types::SearchHit;

const DEFAULT_ENDPOINT: &str = "https://api.duckduckgo.com/";

pub struct DuckDuckGoSearch {
    client: reqwest::Client,
    endpoint: String,
    timeout: Duration,
}

impl DuckDuckGoSearch {
    pub fn new(endpoint: Option<String>, timeout: Duration) -> Result<Self, SearchError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("quarry/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| SearchError::Request {
                message: format!("Failed to create HTTP client: {}", e),
            })?;
        Ok(Self {
            client,
            endpoint: endpoint.unwrap_or_else(|| DEFAULT_ENDPOINT.to_string()),
            timeout,
        })
    }

    fn extract_hits(body: &Value, limit: usize) -> Vec<SearchHit> {
        let mut hits = Vec::new();

        if let Some(abstract_text) = body.get("AbstractText").and_then(|v| v.as_str()) {
            let url = body.get("AbstractURL").and_then(|v| v.as_str()).unwrap_or("");
            if !abstract_text.is_empty() && !url.is_empty() {
                let title = body
                    .get("Heading")
                    .and_then(|v| v.as_str())
                    .filter(|h| !h.is_empty())
                    .or_else(|| body.get("AbstractSource").and_then(|v| v.as_str()))
                    .unwrap_or("DuckDuckGo abstract");
                hits.push(SearchHit::web(title, url).with_snippet(abstract_text));
            }
        }

        for section in ["Results", "RelatedTopics"] {
            let Some(items) = body.get(section).and_then(|v| v.as_array()) else {
                continue;
            };
            for item in items {
                // Grouped related topics nest their entries under "Topics".
                let nested = item.get("Topics").and_then(|v| v.as_array());
                let entries: Vec<&Value> = match nested {
                    Some(topics) => topics.iter().collect(),
                    None => vec![item],
                };
                for entry in entries {
                    let text = entry.get("Text").and_then(|v| v.as_str()).unwrap_or("");
                    let url = entry.get("FirstURL").and_then(|v| v.as_str()).unwrap_or("");
                    if text.is_empty() || url.is_empty() {
                        continue;
                    }
                    let title = text.split(" - ").next().unwrap_or(text);
                    hits.push(SearchHit::web(title, url).with_snippet(text));
                }
            }
        }

        hits.truncate(limit);
        hits
    }
}

#[async_trait]
impl SearchProvider for DuckDuckGoSearch {
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchHit>, SearchError> {
        let url = format!(
            "{}?q={}&format=json&no_html=1&skip_disambig=1",
            self.endpoint,
            urlencoding::encode(query)
        );

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| classify_transport(e, self.timeout))?;

        let status = response.status();
        if !status.is_success() {
            return Err(classify_status("duckduckgo", status));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| SearchError::ResponseParse {
                message: format!("Failed to parse search response: {}", e),
            })?;

        Ok(Self::extract_hits(&body, limit))
    }

    fn name(&self) -> &str {
        "duckduckgo"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_extract_hits_orders_sections() {
        let body = json!({
            "Heading": "Rust",
            "AbstractText": "Rust is a systems language.",
            "AbstractURL": "https://en.wikipedia.org/wiki/Rust",
            "Results": [
                {"Text": "Official site - rust-lang.org", "FirstURL": "https://www.rust-lang.org"}
            ],
            "RelatedTopics": [
                {"Text": "Cargo - package manager", "FirstURL": "https://doc.rust-lang.org/cargo"},
                {"Name": "See also", "Topics": [
                    {"Text": "Ferris - mascot", "FirstURL": "https://rustacean.net"}
                ]},
                {"Text": "", "FirstURL": "https://empty.example"}
            ]
        });
        let hits = DuckDuckGoSearch::extract_hits(&body, 10);
        let titles: Vec<&str> = hits.iter().map(|h| h.title.as_str()).collect();
        assert_eq!(titles, vec!["Rust", "Official site", "Cargo", "Ferris"]);
        assert_eq!(hits[0].snippet, "Rust is a systems language.");
    }

    #[test]
    fn test_extract_hits_respects_limit() {
        let body = json!({
            "RelatedTopics": [
                {"Text": "A", "FirstURL": "https://a.example"},
                {"Text": "B", "FirstURL": "https://b.example"}
            ]
        });
        assert_eq!(DuckDuckGoSearch::extract_hits(&body, 1).len(), 1);
    }

    #[test]
    fn test_extract_hits_empty_body() {
        assert!(DuckDuckGoSearch::extract_hits(&json!({}), 5).is_empty());
    }
}
