//! Core types shared across the research loop.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable identifier of a retrieved source, assigned from 1 in retrieval order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SourceId(pub u32);

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self.0)
    }
}

/// A single hit returned by a search provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub title: String,
    pub location: String,
    #[serde(rename = "type", default = "default_kind")]
    pub kind: String,
    #[serde(default)]
    pub snippet: String,
}

fn default_kind() -> String {
    "web".to_string()
}

impl SearchHit {
    pub fn web(title: impl Into<String>, location: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            location: location.into(),
            kind: default_kind(),
            snippet: String::new(),
        }
    }

    pub fn with_snippet(mut self, snippet: impl Into<String>) -> Self {
        self.snippet = snippet.into();
        self
    }
}

/// A retrieved source held in the research state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Source {
    pub id: SourceId,
    pub title: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub location: String,
    /// Body text; only kept verbatim for sources inside the active window.
    pub snippet: String,
}

impl Source {
    pub fn from_hit(id: SourceId, hit: SearchHit) -> Self {
        Self {
            id,
            title: hit.title,
            kind: hit.kind,
            location: hit.location,
            snippet: hit.snippet,
        }
    }
}

/// A search query waiting to be executed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingQuery {
    pub query: String,
    #[serde(default)]
    pub intent: String,
}

impl PendingQuery {
    pub fn new(query: impl Into<String>, intent: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            intent: intent.into(),
        }
    }
}

/// Phase of the research state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Planning,
    Searching,
    Reflecting,
    Synthesizing,
    Done,
    Error,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Planning => "planning",
            Phase::Searching => "searching",
            Phase::Reflecting => "reflecting",
            Phase::Synthesizing => "synthesizing",
            Phase::Done => "done",
            Phase::Error => "error",
        };
        f.write_str(name)
    }
}

/// Classification of an entry in the run's error log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Network or timeout failure from a collaborator, retried.
    TransientToolFailure,
    /// Output did not match the expected payload shape.
    MalformedOutput,
    /// All retry attempts used up.
    ExhaustedRetries,
    /// Non-retryable collaborator failure.
    PermanentFailure,
    /// Search provider abandoned in favour of the next one.
    ProviderFailover,
    /// Circuit breaker tripped; degraded mode entered.
    CircuitTripped,
    /// Answer cited an identifier that was never retrieved.
    HallucinatedCitation,
    /// Cited source failed the semantic support check.
    UnsupportedCitation,
}

/// An append-only error log entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorRecord {
    pub phase: Phase,
    pub kind: ErrorKind,
    pub message: String,
    pub retryable: bool,
    pub timestamp: DateTime<Utc>,
}

impl ErrorRecord {
    pub fn new(phase: Phase, kind: ErrorKind, message: impl Into<String>, retryable: bool) -> Self {
        Self {
            phase,
            kind,
            message: message.into(),
            retryable,
            timestamp: Utc::now(),
        }
    }
}

/// Result of a single wrapped collaborator call.
#[derive(Debug, Clone, PartialEq)]
pub enum PhaseOutcome<T> {
    Success(T),
    ParseFailure { raw: String, reason: String },
    TransientFailure(String),
    PermanentFailure(String),
}

impl<T> PhaseOutcome<T> {
    pub fn is_success(&self) -> bool {
        matches!(self, PhaseOutcome::Success(_))
    }

    /// Convert into an `Option`, discarding failure detail.
    pub fn success(self) -> Option<T> {
        match self {
            PhaseOutcome::Success(value) => Some(value),
            _ => None,
        }
    }

    /// Human-readable failure reason, `None` on success.
    pub fn failure_reason(&self) -> Option<&str> {
        match self {
            PhaseOutcome::Success(_) => None,
            PhaseOutcome::ParseFailure { reason, .. } => Some(reason),
            PhaseOutcome::TransientFailure(reason) | PhaseOutcome::PermanentFailure(reason) => {
                Some(reason)
            }
        }
    }
}

/// A verified citation in the final answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Citation {
    pub id: SourceId,
    pub title: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub location: String,
}

impl From<&Source> for Citation {
    fn from(source: &Source) -> Self {
        Self {
            id: source.id,
            title: source.title.clone(),
            kind: source.kind.clone(),
            location: source.location.clone(),
        }
    }
}

/// Why the loop stopped iterating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    Sufficient,
    IterationLimit,
    TimeLimit,
}

impl StopReason {
    /// Stops caused by a limit rather than a sufficiency judgement.
    pub fn is_limit(&self) -> bool {
        !matches!(self, StopReason::Sufficient)
    }
}

/// The answer produced by a completed run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalResult {
    pub answer: String,
    pub citations: Vec<Citation>,
    pub degraded: bool,
    pub iterations: u32,
    pub insufficient_termination: bool,
    pub stop_reason: StopReason,
    pub confidence: f64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub gaps: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub unsupported_claims: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub notes: Vec<String>,
}

/// Category of a run-level failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    ConfigurationError,
    Cancelled,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::ConfigurationError => f.write_str("configuration_error"),
            FailureKind::Cancelled => f.write_str("cancelled"),
        }
    }
}

/// Structured error returned instead of a `FinalResult`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct ResearchFailure {
    #[serde(rename = "type")]
    pub kind: FailureKind,
    pub message: String,
    pub retryable: bool,
}

impl ResearchFailure {
    pub fn configuration(message: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::ConfigurationError,
            message: message.into(),
            retryable: false,
        }
    }

    pub fn cancelled(phase: Phase) -> Self {
        Self {
            kind: FailureKind::Cancelled,
            message: format!("run cancelled during {phase}"),
            retryable: true,
        }
    }
}
