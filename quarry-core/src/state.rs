//! The single mutable aggregate threaded through one research run.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeSet, HashSet};
use std::time::Duration;
use tokio::time::Instant;
use uuid::Uuid;

use crate::agents;
use crate::config::TierLimits;
use crate::schema::ReflectionResponse;
use crate::types::{
    Citation, ErrorKind, ErrorRecord, PendingQuery, Phase, SearchHit, Source, SourceId,
};

/// Owned research state for one run.
///
/// Created by the controller at loop entry and mutated only through the
/// methods below; never shared across runs.
#[derive(Debug)]
pub struct ResearchState {
    run_id: Uuid,
    task: String,
    persona: Option<String>,
    limits: TierLimits,
    phase: Phase,
    iteration: u32,
    pending_queries: Vec<PendingQuery>,
    executed_queries: Vec<String>,
    sources: Vec<Source>,
    seen_locations: HashSet<String>,
    citations: Vec<Citation>,
    failed_queries: Vec<String>,
    sufficient: bool,
    confidence: f64,
    gaps: Vec<String>,
    errors: Vec<ErrorRecord>,
    degraded: bool,
    compacted: bool,
    remaining_tokens: u64,
    started_at: Instant,
    started_at_utc: DateTime<Utc>,
}

impl ResearchState {
    pub fn new(task: impl Into<String>, limits: TierLimits) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            task: task.into(),
            persona: None,
            limits,
            phase: Phase::Planning,
            iteration: 0,
            pending_queries: Vec::new(),
            executed_queries: Vec::new(),
            sources: Vec::new(),
            seen_locations: HashSet::new(),
            citations: Vec::new(),
            failed_queries: Vec::new(),
            sufficient: false,
            confidence: 0.0,
            gaps: Vec::new(),
            errors: Vec::new(),
            degraded: false,
            compacted: false,
            remaining_tokens: limits.token_budget,
            started_at: Instant::now(),
            started_at_utc: Utc::now(),
        }
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Persona prompt the run was started with.
    pub fn with_persona(mut self, persona: Option<String>) -> Self {
        self.persona = persona.filter(|p| !p.trim().is_empty());
        self
    }

    pub fn task(&self) -> &str {
        &self.task
    }

    pub fn persona(&self) -> Option<&str> {
        self.persona.as_deref()
    }

    /// The task as presented to the model, persona first.
    pub fn briefing(&self) -> String {
        agents::brief(self.persona(), &self.task)
    }

    pub fn limits(&self) -> &TierLimits {
        &self.limits
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub(crate) fn set_phase(&mut self, phase: Phase) {
        self.phase = phase;
    }

    pub fn iteration(&self) -> u32 {
        self.iteration
    }

    /// Close one PLANNING→REFLECTING cycle.
    pub(crate) fn complete_cycle(&mut self) {
        self.iteration += 1;
    }

    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at_utc
    }

    // -- queries -----------------------------------------------------------

    pub fn pending_queries(&self) -> &[PendingQuery] {
        &self.pending_queries
    }

    pub(crate) fn set_pending_queries(&mut self, queries: Vec<PendingQuery>) {
        self.pending_queries = queries;
    }

    pub(crate) fn take_pending_queries(&mut self) -> Vec<PendingQuery> {
        std::mem::take(&mut self.pending_queries)
    }

    pub fn executed_queries(&self) -> &[String] {
        &self.executed_queries
    }

    pub(crate) fn record_executed(&mut self, query: &str) {
        self.executed_queries.push(query.to_string());
    }

    pub fn failed_queries(&self) -> &[String] {
        &self.failed_queries
    }

    /// Add a query to the failed-query record; the record behaves as a set.
    pub(crate) fn record_failed_query(&mut self, query: &str) {
        if !self.failed_queries.iter().any(|q| q == query) {
            self.failed_queries.push(query.to_string());
        }
    }

    // -- sources -----------------------------------------------------------

    pub fn sources(&self) -> &[Source] {
        &self.sources
    }

    pub fn source_count(&self) -> usize {
        self.sources.len()
    }

    pub fn source_ids(&self) -> BTreeSet<SourceId> {
        self.sources.iter().map(|s| s.id).collect()
    }

    pub fn get_source(&self, id: SourceId) -> Option<&Source> {
        self.sources.iter().find(|s| s.id == id)
    }

    /// Append hits in order, skipping empty or already-seen locations.
    ///
    /// Returns the number of sources actually appended. Identifiers continue
    /// from the last assigned one and are never reused.
    pub(crate) fn append_sources(&mut self, hits: impl IntoIterator<Item = SearchHit>) -> usize {
        let mut appended = 0;
        for hit in hits {
            let key = hit.location.trim().to_string();
            if key.is_empty() || !self.seen_locations.insert(key) {
                continue;
            }
            let id = SourceId(self.sources.len() as u32 + 1);
            self.sources.push(Source::from_hit(id, hit));
            appended += 1;
        }
        appended
    }

    pub fn citations(&self) -> &[Citation] {
        &self.citations
    }

    /// Record the citations used by the final answer.
    ///
    /// Entries whose id is not a retrieved source are ignored.
    pub(crate) fn set_citations(&mut self, citations: Vec<Citation>) {
        let ids = self.source_ids();
        self.citations = citations
            .into_iter()
            .filter(|c| ids.contains(&c.id))
            .collect();
    }

    // -- reflection --------------------------------------------------------

    pub fn is_sufficient(&self) -> bool {
        self.sufficient
    }

    pub fn confidence(&self) -> f64 {
        self.confidence
    }

    pub fn gaps(&self) -> &[String] {
        &self.gaps
    }

    /// The only writer of the sufficiency flag.
    pub(crate) fn apply_reflection(&mut self, reflection: &ReflectionResponse) {
        self.sufficient = reflection.sufficient;
        self.confidence = reflection.confidence;
        self.gaps = reflection.gaps.clone();
    }

    // -- errors and degradation -------------------------------------------

    pub fn errors(&self) -> &[ErrorRecord] {
        &self.errors
    }

    pub(crate) fn record_error(&mut self, record: ErrorRecord) {
        self.errors.push(record);
    }

    pub(crate) fn record_errors(&mut self, records: impl IntoIterator<Item = ErrorRecord>) {
        self.errors.extend(records);
    }

    pub fn has_error_kind(&self, kind: ErrorKind) -> bool {
        self.errors.iter().any(|e| e.kind == kind)
    }

    pub fn is_degraded(&self) -> bool {
        self.degraded
    }

    /// Enter degraded mode. There is no way back within a run.
    pub(crate) fn mark_degraded(&mut self) {
        self.degraded = true;
    }

    pub fn was_compacted(&self) -> bool {
        self.compacted
    }

    pub(crate) fn mark_compacted(&mut self) {
        self.compacted = true;
    }

    // -- token budget ------------------------------------------------------

    pub fn remaining_tokens(&self) -> u64 {
        self.remaining_tokens
    }

    /// Fraction of the initial budget still available.
    pub fn budget_ratio(&self) -> f64 {
        if self.limits.token_budget == 0 {
            return 0.0;
        }
        self.remaining_tokens as f64 / self.limits.token_budget as f64
    }

    pub(crate) fn consume_tokens(&mut self, tokens: u64) {
        self.remaining_tokens = self.remaining_tokens.saturating_sub(tokens);
    }

    /// Serializable snapshot for run traces.
    pub fn trace(&self) -> ResearchTrace {
        ResearchTrace {
            run_id: self.run_id,
            task: self.task.clone(),
            persona: self.persona.clone(),
            started_at: self.started_at_utc,
            elapsed_ms: self.elapsed().as_millis() as u64,
            final_phase: self.phase,
            iterations: self.iteration,
            limits: self.limits,
            queries: self.executed_queries.clone(),
            failed_queries: self.failed_queries.clone(),
            sources: self.sources.clone(),
            citations: self.citations.clone(),
            errors: self.errors.clone(),
            degraded: self.degraded,
            compacted: self.compacted,
            remaining_tokens: self.remaining_tokens,
        }
    }
}

/// Persistable record of a finished run.
#[derive(Debug, Clone, Serialize)]
pub struct ResearchTrace {
    pub run_id: Uuid,
    pub task: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub persona: Option<String>,
    pub started_at: DateTime<Utc>,
    pub elapsed_ms: u64,
    pub final_phase: Phase,
    pub iterations: u32,
    pub limits: TierLimits,
    pub queries: Vec<String>,
    pub failed_queries: Vec<String>,
    pub sources: Vec<Source>,
    pub citations: Vec<Citation>,
    pub errors: Vec<ErrorRecord>,
    pub degraded: bool,
    pub compacted: bool,
    pub remaining_tokens: u64,
}
