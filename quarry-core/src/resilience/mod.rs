//! Resilience layer wrapped around every collaborator call.
//!
//! - Retry with exponential backoff for transient failures
//! - Reformulation signal for queries with too few results
//! - Run-wide circuit breaker that enters degraded mode
//! - Ordered search provider fallback
//! - One schema-reminder retry for malformed model output

pub mod breaker;
pub mod fallback;
pub mod retry;

pub use breaker::{BreakerState, SearchCircuitBreaker, TripReason};
pub use fallback::ProviderChain;
pub use retry::{Delay, Jitter, RecordingDelay, RetryPolicy, RetryState, RetryStep, TokioDelay};

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::brain::{CompletionRequest, CompletionResponse, LlmProvider};
use crate::config::ResearchConfig;
use crate::error::{LlmError, SearchError};
use crate::schema::{self, Payload};
use crate::search::SearchProvider;
use crate::types::{ErrorKind, ErrorRecord, Phase, PhaseOutcome, SearchHit};

/// Outcome of one wrapped call plus the error records it produced.
#[derive(Debug)]
pub struct CallReport<T> {
    pub outcome: PhaseOutcome<T>,
    pub errors: Vec<ErrorRecord>,
    /// Model tokens consumed, zero for searches.
    pub tokens_used: u64,
}

impl<T> CallReport<T> {
    fn new(outcome: PhaseOutcome<T>, errors: Vec<ErrorRecord>, tokens_used: u64) -> Self {
        Self {
            outcome,
            errors,
            tokens_used,
        }
    }
}

/// How a finished search counts toward the breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryVerdict {
    /// At least the minimum number of results.
    Healthy,
    /// Some results, but fewer than the minimum: flag for reformulation.
    Thin,
    /// No results or an error.
    Failed,
}

/// Per-run resilience state: retry policy, breaker and provider chain.
pub struct Resilience {
    llm: Arc<dyn LlmProvider>,
    chain: ProviderChain,
    breaker: SearchCircuitBreaker,
    policy: RetryPolicy,
    delay: Arc<dyn Delay>,
    call_timeout: Duration,
    min_results: usize,
}

impl Resilience {
    pub fn new(
        llm: Arc<dyn LlmProvider>,
        search: Vec<Arc<dyn SearchProvider>>,
        config: &ResearchConfig,
        delay: Arc<dyn Delay>,
    ) -> Self {
        Self {
            llm,
            chain: ProviderChain::new(search),
            breaker: SearchCircuitBreaker::new(&config.breaker),
            policy: RetryPolicy::from_config(&config.retry),
            delay,
            call_timeout: config.call_timeout(),
            min_results: config.min_results,
        }
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn breaker(&self) -> &SearchCircuitBreaker {
        &self.breaker
    }

    pub fn chain(&self) -> &ProviderChain {
        &self.chain
    }

    /// Whether searches may still run this run.
    pub fn search_permitted(&self) -> bool {
        self.breaker.is_call_permitted()
    }

    /// Classify a finished query.
    pub fn verdict(&self, outcome: &PhaseOutcome<Vec<SearchHit>>) -> QueryVerdict {
        match outcome {
            PhaseOutcome::Success(hits) if hits.is_empty() => QueryVerdict::Failed,
            PhaseOutcome::Success(hits) if hits.len() < self.min_results => QueryVerdict::Thin,
            PhaseOutcome::Success(_) => QueryVerdict::Healthy,
            _ => QueryVerdict::Failed,
        }
    }

    /// Feed one query verdict to the breaker, in submission order.
    ///
    /// Returns the trip reason when this verdict trips it.
    pub fn record_verdict(&mut self, verdict: QueryVerdict) -> Option<TripReason> {
        match verdict {
            QueryVerdict::Failed => self.breaker.record_failure(),
            QueryVerdict::Healthy | QueryVerdict::Thin => self.breaker.record_success(),
        }
    }

    /// Run a search through retry and provider fallback.
    pub async fn execute_query(&self, query: &str, limit: usize) -> CallReport<Vec<SearchHit>> {
        let mut errors = Vec::new();

        if !self.search_permitted() {
            return CallReport::new(PhaseOutcome::Success(Vec::new()), errors, 0);
        }

        loop {
            let Some((index, provider)) = self.chain.active() else {
                let reason = "no search provider available".to_string();
                errors.push(ErrorRecord::new(
                    Phase::Searching,
                    ErrorKind::PermanentFailure,
                    format!("{}: {}", query, reason),
                    false,
                ));
                return CallReport::new(PhaseOutcome::PermanentFailure(reason), errors, 0);
            };

            let mut retry = RetryState::new(self.policy.clone());
            loop {
                let result = match tokio::time::timeout(
                    self.call_timeout,
                    provider.search(query, limit),
                )
                .await
                {
                    Ok(result) => result,
                    Err(_) => Err(SearchError::Timeout {
                        timeout_secs: self.call_timeout.as_secs(),
                    }),
                };

                let error = match result {
                    Ok(hits) => {
                        debug!(query, provider = provider.name(), hits = hits.len(), "Search complete");
                        return CallReport::new(PhaseOutcome::Success(hits), errors, 0);
                    }
                    Err(error) => error,
                };

                if error.is_transient() {
                    match retry.on_transient_failure() {
                        RetryStep::Retry { attempt, delay } => {
                            warn!(
                                query,
                                provider = provider.name(),
                                attempt,
                                backoff_ms = delay.as_millis() as u64,
                                error = %error,
                                "Retrying search after transient error"
                            );
                            errors.push(ErrorRecord::new(
                                Phase::Searching,
                                ErrorKind::TransientToolFailure,
                                format!("{} ({}): {}", query, provider.name(), error),
                                true,
                            ));
                            self.delay.sleep(delay).await;
                            continue;
                        }
                        RetryStep::GiveUp { attempts } => {
                            errors.push(ErrorRecord::new(
                                Phase::Searching,
                                ErrorKind::ExhaustedRetries,
                                format!(
                                    "{} ({}): gave up after {} attempts: {}",
                                    query,
                                    provider.name(),
                                    attempts,
                                    error
                                ),
                                false,
                            ));
                            return CallReport::new(
                                PhaseOutcome::TransientFailure(error.to_string()),
                                errors,
                                0,
                            );
                        }
                    }
                }

                if error.is_provider_fatal() {
                    errors.push(ErrorRecord::new(
                        Phase::Searching,
                        ErrorKind::ProviderFailover,
                        format!("{}: {}", provider.name(), error),
                        false,
                    ));
                    self.chain.advance_from(index);
                    break;
                }

                errors.push(ErrorRecord::new(
                    Phase::Searching,
                    ErrorKind::PermanentFailure,
                    format!("{} ({}): {}", query, provider.name(), error),
                    false,
                ));
                return CallReport::new(PhaseOutcome::PermanentFailure(error.to_string()), errors, 0);
            }
        }
    }

    /// Call the model and validate the reply as `T`.
    ///
    /// Transient failures are retried with backoff. A malformed reply gets
    /// exactly one more attempt with a shape reminder; a second malformed
    /// reply is a permanent failure.
    pub async fn execute_model_call<T: Payload>(
        &self,
        phase: Phase,
        request: CompletionRequest,
    ) -> CallReport<T> {
        let mut errors = Vec::new();
        let mut tokens_used = 0u64;
        let mut request = request;
        let mut reminded = false;

        loop {
            let response = match self.complete_with_retry(phase, &request, &mut errors).await {
                Ok(response) => response,
                Err(outcome) => return CallReport::new(outcome, errors, tokens_used),
            };
            tokens_used += response.tokens_used(&request);

            match schema::parse::<T>(&response.text) {
                PhaseOutcome::Success(payload) => {
                    return CallReport::new(PhaseOutcome::Success(payload), errors, tokens_used);
                }
                PhaseOutcome::ParseFailure { reason, .. } => {
                    warn!(phase = %phase, reminded, %reason, "Model output failed schema validation");
                    errors.push(ErrorRecord::new(
                        phase,
                        ErrorKind::MalformedOutput,
                        reason.clone(),
                        !reminded,
                    ));
                    if reminded {
                        return CallReport::new(
                            PhaseOutcome::PermanentFailure(reason),
                            errors,
                            tokens_used,
                        );
                    }
                    reminded = true;
                    request = request.with_reminder(&T::SHAPE.reminder(&reason));
                }
                other => return CallReport::new(other, errors, tokens_used),
            }
        }
    }

    async fn complete_with_retry<T>(
        &self,
        phase: Phase,
        request: &CompletionRequest,
        errors: &mut Vec<ErrorRecord>,
    ) -> Result<CompletionResponse, PhaseOutcome<T>> {
        let mut retry = RetryState::new(self.policy.clone());
        loop {
            let result = match tokio::time::timeout(self.call_timeout, self.llm.complete(request.clone())).await {
                Ok(result) => result,
                Err(_) => Err(LlmError::Timeout {
                    timeout_secs: self.call_timeout.as_secs(),
                }),
            };

            let error = match result {
                Ok(response) => return Ok(response),
                Err(error) => error,
            };

            if !error.is_transient() {
                errors.push(ErrorRecord::new(
                    phase,
                    ErrorKind::PermanentFailure,
                    error.to_string(),
                    false,
                ));
                return Err(PhaseOutcome::PermanentFailure(error.to_string()));
            }

            match retry.on_transient_failure() {
                RetryStep::Retry { attempt, delay } => {
                    warn!(
                        phase = %phase,
                        attempt,
                        backoff_ms = delay.as_millis() as u64,
                        error = %error,
                        "Retrying model call after transient error"
                    );
                    errors.push(ErrorRecord::new(
                        phase,
                        ErrorKind::TransientToolFailure,
                        error.to_string(),
                        true,
                    ));
                    self.delay.sleep(delay).await;
                }
                RetryStep::GiveUp { attempts } => {
                    errors.push(ErrorRecord::new(
                        phase,
                        ErrorKind::ExhaustedRetries,
                        format!("gave up after {} attempts: {}", attempts, error),
                        false,
                    ));
                    return Err(PhaseOutcome::TransientFailure(error.to_string()));
                }
            }
        }
    }
}
