//! Research loop controller.
//!
//! Owns one [`ResearchState`] per run and drives it through
//! `planning -> searching -> reflecting -> (planning | synthesizing) -> done`.
//! Every collaborator call goes through [`Resilience`]; evidence passes
//! through [`CompactionPolicy`] before reaching the model, and the final
//! answer through [`CitationVerifier`].

use futures::future::join_all;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::brain::{CompletionRequest, LlmProvider};
use crate::citation::{CitationVerifier, ClaimVerifier, LlmClaimVerifier};
use crate::compaction::{CompactionPolicy, CompactionTrigger, EvidenceView};
use crate::config::{QuarryConfig, ResearchConfig, ResearchOptions};
use crate::error::ConfigError;
use crate::events::{EventSink, ResearchEvent, TracingEventSink};
use crate::prompts;
use crate::resilience::{Delay, QueryVerdict, Resilience, RetryPolicy, TokioDelay};
use crate::schema::{PlanResponse, ReflectionResponse, SynthesisResponse};
use crate::search::{self, SearchProvider};
use crate::state::{ResearchState, ResearchTrace};
use crate::types::{
    ErrorKind, ErrorRecord, FinalResult, PendingQuery, Phase, PhaseOutcome, ResearchFailure,
    SearchHit, StopReason,
};

pub const NOTE_SEARCH_DEGRADED: &str = "Search degraded; answer may be based on partial information.";
pub const NOTE_SOURCES_OMITTED: &str = "Some sources were omitted due to context budget limits.";
pub const NOTE_INVALID_CITATIONS: &str = "Some citations were invalid and were omitted.";
pub const NOTE_INSUFFICIENT: &str = "Research stopped before the evidence was judged sufficient.";

/// Result of a run together with the final state snapshot.
#[derive(Debug)]
pub struct RunOutcome {
    pub result: Result<FinalResult, ResearchFailure>,
    /// `None` when the run was rejected before any phase.
    pub trace: Option<ResearchTrace>,
}

/// Drives bounded research runs against a model and search providers.
pub struct ResearchController {
    llm: Arc<dyn LlmProvider>,
    search: Vec<Arc<dyn SearchProvider>>,
    config: ResearchConfig,
    temperature: f32,
    max_tokens: usize,
    sink: Arc<dyn EventSink>,
    claim_verifier: Option<Arc<dyn ClaimVerifier>>,
    delay: Arc<dyn Delay>,
    retry_policy: Option<RetryPolicy>,
}

impl ResearchController {
    pub fn new(llm: Arc<dyn LlmProvider>, search: Vec<Arc<dyn SearchProvider>>) -> Self {
        Self {
            llm,
            search,
            config: ResearchConfig::default(),
            temperature: 0.0,
            max_tokens: 800,
            sink: Arc::new(TracingEventSink),
            claim_verifier: None,
            delay: Arc::new(TokioDelay),
            retry_policy: None,
        }
    }

    /// Build a controller with the configured model and search providers.
    pub fn from_config(config: &QuarryConfig) -> Result<Self, ConfigError> {
        let llm = crate::providers::build_llm(&config.llm)?;
        let search = search::build_providers(&config.search)?;
        Ok(Self::new(llm, search)
            .with_config(config.research.clone())
            .with_sampling(config.llm.temperature, config.llm.max_tokens))
    }

    pub fn with_config(mut self, config: ResearchConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_sampling(mut self, temperature: f32, max_tokens: usize) -> Self {
        self.temperature = temperature;
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Replace the model-backed support check used when `semantic_check` is on.
    pub fn with_claim_verifier(mut self, verifier: Arc<dyn ClaimVerifier>) -> Self {
        self.claim_verifier = Some(verifier);
        self
    }

    pub fn with_delay(mut self, delay: Arc<dyn Delay>) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = Some(policy);
        self
    }

    pub fn config(&self) -> &ResearchConfig {
        &self.config
    }

    /// Search with the first configured provider chain, outside any run.
    pub async fn search_once(&self, query: &str, limit: usize) -> PhaseOutcome<Vec<SearchHit>> {
        self.resilience().execute_query(query, limit).await.outcome
    }

    /// Run research on `task` and return the final answer.
    pub async fn run(
        &self,
        task: &str,
        options: ResearchOptions,
        cancel: CancellationToken,
    ) -> Result<FinalResult, ResearchFailure> {
        self.run_traced(task, options, cancel).await.result
    }

    /// Like [`run`](Self::run), also returning the final state snapshot.
    pub async fn run_traced(
        &self,
        task: &str,
        options: ResearchOptions,
        cancel: CancellationToken,
    ) -> RunOutcome {
        let mut options = options;
        options.overrides = self.config.limits.merged_with(&options.overrides);
        let limits = options.limits();

        let task = task.trim();
        if task.is_empty() {
            return RunOutcome {
                result: Err(ResearchFailure::configuration("task must not be empty")),
                trace: None,
            };
        }
        if let Err(e) = limits.validate() {
            return RunOutcome {
                result: Err(ResearchFailure::configuration(e.to_string())),
                trace: None,
            };
        }

        let mut state = ResearchState::new(task, limits).with_persona(options.persona);
        info!(
            run_id = %state.run_id(),
            tier = %options.tier,
            persona = state.persona().is_some(),
            "Starting research run"
        );
        let result = self.drive(&mut state, &cancel).await;
        match &result {
            Ok(r) => info!(
                run_id = %state.run_id(),
                iterations = r.iterations,
                citations = r.citations.len(),
                degraded = r.degraded,
                "Research run finished"
            ),
            Err(e) => warn!(run_id = %state.run_id(), error = %e, "Research run failed"),
        }
        RunOutcome {
            result,
            trace: Some(state.trace()),
        }
    }

    fn resilience(&self) -> Resilience {
        let resilience = Resilience::new(
            Arc::clone(&self.llm),
            self.search.clone(),
            &self.config,
            Arc::clone(&self.delay),
        );
        match &self.retry_policy {
            Some(policy) => resilience.with_policy(policy.clone()),
            None => resilience,
        }
    }

    fn verifier(&self) -> CitationVerifier {
        let verifier = CitationVerifier::new().strict(self.config.strict_citations);
        match &self.claim_verifier {
            Some(claims) => verifier.with_claim_verifier(Arc::clone(claims)),
            None if self.config.semantic_check => {
                verifier.with_claim_verifier(Arc::new(LlmClaimVerifier::new(self.resilience())))
            }
            None => verifier,
        }
    }

    fn request(&self, prompt: String) -> CompletionRequest {
        CompletionRequest::new(prompts::SYSTEM_PROMPT, prompt)
            .with_sampling(self.temperature, self.max_tokens)
    }

    async fn drive(
        &self,
        state: &mut ResearchState,
        cancel: &CancellationToken,
    ) -> Result<FinalResult, ResearchFailure> {
        let mut run = RunContext {
            resilience: self.resilience(),
            compaction: CompactionPolicy::from_config(&self.config),
            trigger: None,
        };

        let stop = loop {
            self.enter(state, Phase::Planning, cancel)?;
            self.plan(state, &run).await;
            if let Some(stop) = wall_clock_exceeded(state) {
                break stop;
            }

            self.enter(state, Phase::Searching, cancel)?;
            self.search(state, &mut run).await;
            if let Some(stop) = wall_clock_exceeded(state) {
                break stop;
            }

            self.enter(state, Phase::Reflecting, cancel)?;
            self.reflect(state, &run).await;
            state.complete_cycle();

            if let Some(stop) = should_stop(state) {
                break stop;
            }
        };

        debug!(?stop, iteration = state.iteration(), "Leaving research loop");
        self.enter(state, Phase::Synthesizing, cancel)?;
        let result = self.synthesize(state, &run, stop).await;
        state.set_phase(Phase::Done);
        self.emit(state);
        Ok(result)
    }

    /// Move to `phase`, or to the error state if the run was cancelled.
    fn enter(
        &self,
        state: &mut ResearchState,
        phase: Phase,
        cancel: &CancellationToken,
    ) -> Result<(), ResearchFailure> {
        if cancel.is_cancelled() {
            let failure = ResearchFailure::cancelled(state.phase());
            state.set_phase(Phase::Error);
            self.emit(state);
            return Err(failure);
        }
        state.set_phase(phase);
        self.emit(state);
        Ok(())
    }

    fn emit(&self, state: &ResearchState) {
        self.sink.emit(ResearchEvent {
            phase: state.phase(),
            iteration: state.iteration(),
            elapsed: state.elapsed(),
            source_count: state.source_count(),
            degraded: state.is_degraded(),
        });
    }

    async fn plan(&self, state: &mut ResearchState, run: &RunContext) {
        let max_queries = state.limits().max_queries;
        let carried = state.take_pending_queries();

        let proposed = if carried.is_empty() {
            let prompt = prompts::plan_prompt(&state.briefing(), max_queries, state.executed_queries());
            let report = run
                .resilience
                .execute_model_call::<PlanResponse>(Phase::Planning, self.request(prompt))
                .await;
            state.consume_tokens(report.tokens_used);
            state.record_errors(report.errors);
            match report.outcome {
                PhaseOutcome::Success(plan) => plan.queries,
                other => {
                    warn!(reason = other.failure_reason().unwrap_or(""), "Planning produced no queries");
                    Vec::new()
                }
            }
        } else {
            carried
        };

        let mut queries = prompts::normalize_queries(proposed, max_queries);
        if queries.is_empty() && state.executed_queries().is_empty() {
            // Nothing searched yet: fall back to the task itself.
            queries.push(PendingQuery::new(
                prompts::normalize_query(state.task()),
                "fallback: task text",
            ));
        }
        debug!(count = queries.len(), "Planned queries");
        state.set_pending_queries(queries);
    }

    async fn search(&self, state: &mut ResearchState, run: &mut RunContext) {
        let queries = state.take_pending_queries();
        if queries.is_empty() {
            return;
        }
        if !run.resilience.search_permitted() {
            debug!(skipped = queries.len(), "Search breaker open; skipping queries");
            return;
        }

        let limit = state.limits().max_sources;
        let reports = {
            let resilience = &run.resilience;
            join_all(queries.iter().map(|q| resilience.execute_query(&q.query, limit))).await
        };

        // Merge in submission order so the outcome does not depend on timing.
        for (query, report) in queries.iter().zip(reports) {
            state.record_executed(&query.query);
            state.record_errors(report.errors);

            let verdict = run.resilience.verdict(&report.outcome);
            if verdict != QueryVerdict::Healthy {
                state.record_failed_query(&query.query);
            }
            if let Some(reason) = run.resilience.record_verdict(verdict) {
                state.mark_degraded();
                state.record_error(ErrorRecord::new(
                    Phase::Searching,
                    ErrorKind::CircuitTripped,
                    reason.to_string(),
                    false,
                ));
            }

            if let PhaseOutcome::Success(hits) = report.outcome {
                let hits: Vec<SearchHit> = hits
                    .into_iter()
                    .filter(|h| !is_low_quality(&h.location, &self.config.low_quality_domains))
                    .collect();
                if run.trigger.is_none() {
                    run.trigger = run.compaction.should_compact(state);
                }
                let added = state.append_sources(hits);
                debug!(query = %query.query, added, total = state.source_count(), "Merged search results");
            }
        }
    }

    async fn reflect(&self, state: &mut ResearchState, run: &RunContext) {
        let view = run.view(state);
        if view.is_compacted() {
            state.mark_compacted();
        }
        let prompt = prompts::reflect_prompt(
            &state.briefing(),
            &view.render(),
            state.failed_queries(),
            state.gaps(),
            state.limits().max_queries,
        );
        let report = run
            .resilience
            .execute_model_call::<ReflectionResponse>(Phase::Reflecting, self.request(prompt))
            .await;
        state.consume_tokens(report.tokens_used);
        state.record_errors(report.errors);

        match report.outcome {
            PhaseOutcome::Success(reflection) => {
                state.apply_reflection(&reflection);
                if !reflection.sufficient {
                    let next = prompts::normalize_queries(
                        reflection.new_queries,
                        state.limits().max_queries,
                    );
                    state.set_pending_queries(next);
                }
                debug!(
                    sufficient = state.is_sufficient(),
                    confidence = state.confidence(),
                    "Reflection complete"
                );
            }
            other => {
                warn!(reason = other.failure_reason().unwrap_or(""), "Reflection unavailable");
            }
        }
    }

    async fn synthesize(
        &self,
        state: &mut ResearchState,
        run: &RunContext,
        stop: StopReason,
    ) -> FinalResult {
        let view = run.compaction.compact(state, CompactionTrigger::Synthesis);
        if view.is_compacted() {
            state.mark_compacted();
        }
        let cautious = state.is_degraded() || stop.is_limit();
        let prompt = prompts::synthesize_prompt(&state.briefing(), &view.render(), cautious);
        let report = run
            .resilience
            .execute_model_call::<SynthesisResponse>(Phase::Synthesizing, self.request(prompt))
            .await;
        state.consume_tokens(report.tokens_used);
        state.record_errors(report.errors);

        let mut invalid_citations = false;
        let mut unsupported_claims = Vec::new();
        let answer = match report.outcome {
            PhaseOutcome::Success(synthesis) => {
                let verified = self
                    .verifier()
                    .verify(&synthesis.answer, &synthesis.citations, state.sources())
                    .await;
                state.consume_tokens(verified.tokens_used);
                state.record_errors(verified.error_records());
                state.set_citations(verified.citations.clone());
                invalid_citations = verified.has_hallucinations();
                unsupported_claims = verified.unsupported_claims;
                if verified.degraded {
                    state.mark_degraded();
                }
                let cautious = cautious || !verified.failures.is_empty() || verified.degraded;
                if cautious {
                    with_uncertainty(&verified.answer)
                } else {
                    verified.answer
                }
            }
            other => {
                warn!(reason = other.failure_reason().unwrap_or(""), "Synthesis failed; using fallback answer");
                state.mark_degraded();
                state.set_citations(Vec::new());
                prompts::FALLBACK_ANSWER.to_string()
            }
        };

        let mut notes = Vec::new();
        if state.has_error_kind(ErrorKind::CircuitTripped) {
            notes.push(NOTE_SEARCH_DEGRADED.to_string());
        }
        if state.was_compacted() {
            notes.push(NOTE_SOURCES_OMITTED.to_string());
        }
        if invalid_citations {
            notes.push(NOTE_INVALID_CITATIONS.to_string());
        }
        if stop.is_limit() {
            notes.push(NOTE_INSUFFICIENT.to_string());
        }

        FinalResult {
            answer,
            citations: state.citations().to_vec(),
            degraded: state.is_degraded(),
            iterations: state.iteration(),
            insufficient_termination: stop.is_limit(),
            stop_reason: stop,
            confidence: state.confidence(),
            gaps: state.gaps().to_vec(),
            unsupported_claims,
            notes,
        }
    }
}

/// Per-run collaborators that carry state between phases.
struct RunContext {
    resilience: Resilience,
    compaction: CompactionPolicy,
    /// First compaction trigger seen before a search append.
    trigger: Option<CompactionTrigger>,
}

impl RunContext {
    fn view(&self, state: &ResearchState) -> EvidenceView {
        match self.trigger.or_else(|| self.compaction.should_compact(state)) {
            Some(trigger) => self.compaction.compact(state, trigger),
            None => EvidenceView::full(state.sources()),
        }
    }
}

/// The single termination predicate, evaluated after each completed cycle.
///
/// Sufficiency wins; between the limits the iteration limit is reported first.
pub fn should_stop(state: &ResearchState) -> Option<StopReason> {
    if state.is_sufficient() {
        Some(StopReason::Sufficient)
    } else if state.iteration() >= state.limits().max_iterations {
        Some(StopReason::IterationLimit)
    } else {
        wall_clock_exceeded(state)
    }
}

fn wall_clock_exceeded(state: &ResearchState) -> Option<StopReason> {
    (state.elapsed() >= state.limits().wall_clock()).then_some(StopReason::TimeLimit)
}

fn with_uncertainty(answer: &str) -> String {
    if answer.contains(prompts::UNCERTAINTY_STATEMENT) {
        answer.to_string()
    } else {
        format!("{} {}", prompts::UNCERTAINTY_STATEMENT, answer.trim())
    }
}

/// Whether `location` belongs to one of `domains` or a subdomain of one.
pub fn is_low_quality(location: &str, domains: &[String]) -> bool {
    let Ok(url) = url::Url::parse(location) else {
        return false;
    };
    let Some(host) = url.host_str() else {
        return false;
    };
    let host = host.to_ascii_lowercase();
    domains.iter().any(|d| {
        let d = d.trim().to_ascii_lowercase();
        !d.is_empty() && (host == d || host.ends_with(&format!(".{}", d)))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::brain::MockLlmProvider;
    use crate::config::{Tier, TierLimits};
    use crate::events::ChannelEventSink;
    use crate::resilience::{Jitter, RecordingDelay};
    use crate::search::MockSearchProvider;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn controller(llm: Arc<MockLlmProvider>, search: Arc<MockSearchProvider>) -> ResearchController {
        ResearchController::new(llm, vec![search as Arc<dyn SearchProvider>])
            .with_delay(Arc::new(RecordingDelay::new()))
            .with_retry_policy(RetryPolicy::default().with_jitter(Jitter::None))
    }

    fn one_iteration() -> ResearchOptions {
        ResearchOptions::for_tier(Tier::Simple)
    }

    #[test]
    fn test_is_low_quality() {
        let domains = vec!["pinterest.com".to_string()];
        assert!(is_low_quality("https://www.pinterest.com/pin/1", &domains));
        assert!(is_low_quality("https://pinterest.com", &domains));
        assert!(!is_low_quality("https://notpinterest.com", &domains));
        assert!(!is_low_quality("not a url", &domains));
    }

    #[test]
    fn test_with_uncertainty_is_idempotent() {
        let once = with_uncertainty("Answer.");
        assert!(once.starts_with(prompts::UNCERTAINTY_STATEMENT));
        assert_eq!(with_uncertainty(&once), once);
    }

    #[test]
    fn test_should_stop_prefers_iteration_limit() {
        let limits = TierLimits {
            max_iterations: 1,
            ..Tier::Simple.defaults()
        };
        let mut state = ResearchState::new("t", limits);
        assert_eq!(should_stop(&state), None);
        state.complete_cycle();
        assert_eq!(should_stop(&state), Some(StopReason::IterationLimit));
    }

    #[tokio::test]
    async fn test_empty_task_rejected_before_any_phase() {
        let llm = Arc::new(MockLlmProvider::new());
        let search = Arc::new(MockSearchProvider::new("mock"));
        let outcome = controller(llm.clone(), search)
            .run_traced("   ", one_iteration(), CancellationToken::new())
            .await;
        let failure = outcome.result.unwrap_err();
        assert_eq!(failure.kind, crate::types::FailureKind::ConfigurationError);
        assert!(outcome.trace.is_none());
        assert_eq!(llm.call_count(), 0);
    }

    #[tokio::test]
    async fn test_zero_limit_rejected() {
        let llm = Arc::new(MockLlmProvider::new());
        let search = Arc::new(MockSearchProvider::new("mock"));
        let options = one_iteration().with_overrides(crate::config::LimitOverrides {
            max_queries: Some(0),
            ..Default::default()
        });
        let failure = controller(llm, search)
            .run("task", options, CancellationToken::new())
            .await
            .unwrap_err();
        assert!(!failure.retryable);
        assert!(failure.message.contains("max_queries"));
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let llm = Arc::new(MockLlmProvider::new());
        let search = Arc::new(MockSearchProvider::new("mock"));
        let cancel = CancellationToken::new();
        cancel.cancel();
        let outcome = controller(llm.clone(), search)
            .run_traced("task", one_iteration(), cancel)
            .await;
        let failure = outcome.result.unwrap_err();
        assert_eq!(failure.kind, crate::types::FailureKind::Cancelled);
        assert!(failure.retryable);
        assert_eq!(outcome.trace.unwrap().final_phase, Phase::Error);
        assert_eq!(llm.call_count(), 0);
    }

    #[tokio::test]
    async fn test_single_cycle_happy_path_emits_events() {
        let llm = Arc::new(MockLlmProvider::new());
        llm.queue_json(json!({"queries": [{"query": "cloud share", "intent": "numbers"}]}))
            .queue_json(json!({"sufficient": true, "confidence": 0.8, "gaps": []}))
            .queue_json(json!({
                "answer": "AWS leads [1].",
                "citations": [{"id": "[1]", "title": "x", "type": "web", "location": "y"}]
            }));
        let search = Arc::new(MockSearchProvider::new("mock"));
        let (sink, mut rx) = ChannelEventSink::new();

        let result = controller(llm, search)
            .with_sink(Arc::new(sink))
            .run("cloud market", ResearchOptions::default(), CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(result.answer, "AWS leads [1].");
        assert_eq!(result.iterations, 1);
        assert_eq!(result.stop_reason, StopReason::Sufficient);
        assert!(!result.insufficient_termination);
        assert!(!result.degraded);
        assert!(result.notes.is_empty());
        assert_eq!(result.citations[0].title, "cloud share result 1");

        let mut phases = Vec::new();
        while let Ok(event) = rx.try_recv() {
            phases.push(event.phase);
        }
        assert_eq!(
            phases,
            vec![
                Phase::Planning,
                Phase::Searching,
                Phase::Reflecting,
                Phase::Synthesizing,
                Phase::Done
            ]
        );
    }

    #[tokio::test]
    async fn test_synthesis_failure_falls_back() {
        let llm = Arc::new(MockLlmProvider::new());
        llm.queue_json(json!({"queries": [{"query": "q", "intent": "i"}]}))
            .queue_json(json!({"sufficient": true, "confidence": 0.9}))
            .queue_text("garbage")
            .queue_text("more garbage");
        let search = Arc::new(MockSearchProvider::new("mock"));

        let result = controller(llm, search)
            .run("task", one_iteration(), CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(result.answer, prompts::FALLBACK_ANSWER);
        assert!(result.citations.is_empty());
        assert!(result.degraded);
    }

    #[tokio::test]
    async fn test_semantic_check_charges_token_budget() {
        let llm = Arc::new(MockLlmProvider::new());
        llm.queue_json(json!({"queries": [{"query": "q", "intent": "i"}]}))
            .queue_json(json!({"sufficient": true, "confidence": 0.9}))
            .queue_json(json!({"answer": "Fact [1]. Other [2].", "citations": [{"id": 1}, {"id": 2}]}))
            .queue_json(json!({"supported": true}))
            .queue_text("unparseable")
            .queue_json(json!({"supported": false}));
        let search = Arc::new(MockSearchProvider::new("mock"));
        let config = ResearchConfig {
            semantic_check: true,
            ..Default::default()
        };

        let outcome = controller(llm.clone(), search)
            .with_config(config)
            .run_traced("task", one_iteration(), CancellationToken::new())
            .await;
        let result = outcome.result.unwrap();
        let trace = outcome.trace.unwrap();

        assert_eq!(llm.call_count(), 6);
        assert_eq!(trace.limits.token_budget - trace.remaining_tokens, 6 * 150);
        assert_eq!(result.citations.len(), 1);
        assert_eq!(result.answer, format!("{} Fact [1]. Other.", prompts::UNCERTAINTY_STATEMENT));
        assert!(trace.errors.iter().any(|e| e.kind == ErrorKind::MalformedOutput));
        assert!(trace.errors.iter().any(|e| e.kind == ErrorKind::UnsupportedCitation));
    }

    #[tokio::test]
    async fn test_planning_failure_searches_task_text() {
        let llm = Arc::new(MockLlmProvider::new());
        llm.queue_text("no").queue_text("still no")
            .queue_json(json!({"sufficient": false, "confidence": 0.1}))
            .queue_json(json!({"answer": "Partial [1].", "citations": [{"id": 1}]}));
        let search = Arc::new(MockSearchProvider::new("mock"));

        let result = controller(llm, search.clone())
            .run("  what   is quarry ", one_iteration(), CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(search.calls(), vec!["what is quarry"]);
        assert!(result.insufficient_termination);
        assert!(result.answer.starts_with(prompts::UNCERTAINTY_STATEMENT));
        assert!(result.notes.contains(&NOTE_INSUFFICIENT.to_string()));
    }
}
