//! Web-search provider abstraction.
//!
//! Concrete backends live in submodules; `build_providers` turns the
//! configured fallback list into provider handles in order.

pub mod duckduckgo;
pub mod serpapi;

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use crate::config::{SearchConfig, SearchProviderConfig};
use crate::error::{ConfigError, SearchError};
use crate::types::SearchHit;

pub use duckduckgo::DuckDuckGoSearch;
pub use serpapi::SerpApiSearch;

/// A web-search backend.
#[async_trait]
pub trait SearchProvider: Send + Sync {
    /// Run `query`, returning at most `limit` ordered hits.
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchHit>, SearchError>;

    /// Short provider name used in logs and error records.
    fn name(&self) -> &str;
}

/// Build provider handles from configuration, preserving order.
pub fn build_providers(config: &SearchConfig) -> Result<Vec<Arc<dyn SearchProvider>>, ConfigError> {
    config.providers.iter().map(build_provider).collect()
}

fn build_provider(config: &SearchProviderConfig) -> Result<Arc<dyn SearchProvider>, ConfigError> {
    let timeout = Duration::from_secs(config.timeout_secs.max(1));
    match config.provider.to_ascii_lowercase().as_str() {
        "serpapi" => {
            let key_env = config.api_key_env.as_deref().unwrap_or("SERPAPI_KEY");
            let api_key = std::env::var(key_env).ok().filter(|k| !k.trim().is_empty());
            let provider = SerpApiSearch::new(api_key, key_env, config.base_url.clone(), timeout)
                .map_err(|e| ConfigError::Invalid {
                    message: e.to_string(),
                })?;
            Ok(Arc::new(provider))
        }
        "duckduckgo" | "ddg" => {
            let provider = DuckDuckGoSearch::new(config.base_url.clone(), timeout).map_err(|e| {
                ConfigError::Invalid {
                    message: e.to_string(),
                }
            })?;
            Ok(Arc::new(provider))
        }
        other => Err(ConfigError::Invalid {
            message: format!("unknown search provider '{}'", other),
        }),
    }
}

/// Map an HTTP status to the search error taxonomy.
pub(crate) fn classify_status(provider: &str, status: reqwest::StatusCode) -> SearchError {
    match status.as_u16() {
        401 | 403 => SearchError::AuthFailed {
            provider: provider.to_string(),
        },
        429 => SearchError::RateLimited {
            retry_after_secs: 1,
        },
        s if s >= 500 => SearchError::Request {
            message: format!("{} returned HTTP {}", provider, s),
        },
        s => SearchError::Rejected { status: s },
    }
}

/// Map a transport error to the search error taxonomy.
pub(crate) fn classify_transport(error: reqwest::Error, timeout: Duration) -> SearchError {
    if error.is_timeout() {
        SearchError::Timeout {
            timeout_secs: timeout.as_secs(),
        }
    } else if error.is_decode() {
        SearchError::ResponseParse {
            message: error.to_string(),
        }
    } else {
        SearchError::Request {
            message: error.to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// MockSearchProvider
// ---------------------------------------------------------------------------

/// A scripted search provider for testing.
///
/// Replies are keyed by query text so concurrent dispatch stays deterministic.
/// Queries without a scripted reply get the default reply, which is
/// `default_hits` generated hits unless a default failure is set.
pub struct MockSearchProvider {
    name: String,
    scripted: Mutex<HashMap<String, VecDeque<Result<Vec<SearchHit>, SearchError>>>>,
    default_hits: usize,
    default_failure: Option<SearchError>,
    calls: Mutex<Vec<String>>,
}

impl MockSearchProvider {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            scripted: Mutex::new(HashMap::new()),
            default_hits: 3,
            default_failure: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Number of generated hits for unscripted queries.
    pub fn with_default_hits(mut self, count: usize) -> Self {
        self.default_hits = count;
        self
    }

    /// Fail every unscripted query with `error`.
    pub fn failing_with(mut self, error: SearchError) -> Self {
        self.default_failure = Some(error);
        self
    }

    /// Queue hits for the next call with `query`.
    pub fn script_hits(self, query: &str, hits: Vec<SearchHit>) -> Self {
        self.push(query, Ok(hits));
        self
    }

    /// Queue a failure for the next call with `query`.
    pub fn script_error(self, query: &str, error: SearchError) -> Self {
        self.push(query, Err(error));
        self
    }

    fn push(&self, query: &str, reply: Result<Vec<SearchHit>, SearchError>) {
        if let Ok(mut scripted) = self.scripted.lock() {
            scripted.entry(query.to_string()).or_default().push_back(reply);
        }
    }

    /// Queries received, in call order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().map(|c| c.len()).unwrap_or(0)
    }

    /// Deterministic hits for `query`.
    pub fn generated_hits(query: &str, count: usize) -> Vec<SearchHit> {
        let slug: String = query
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '-' })
            .collect();
        (1..=count)
            .map(|i| {
                SearchHit::web(
                    format!("{} result {}", query, i),
                    format!("https://example.com/{}/{}", slug, i),
                )
                .with_snippet(format!("Snippet {} about {}.", i, query))
            })
            .collect()
    }
}

#[async_trait]
impl SearchProvider for MockSearchProvider {
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchHit>, SearchError> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(query.to_string());
        }
        let scripted = self
            .scripted
            .lock()
            .ok()
            .and_then(|mut s| s.get_mut(query).and_then(|q| q.pop_front()));
        let reply = match scripted {
            Some(reply) => reply,
            None => match &self.default_failure {
                Some(error) => Err(error.clone()),
                None => Ok(Self::generated_hits(query, self.default_hits)),
            },
        };
        reply.map(|mut hits| {
            hits.truncate(limit);
            hits
        })
    }

    fn name(&self) -> &str {
        &self.name
    }
}
