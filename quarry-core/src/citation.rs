//! Citation verification for synthesized answers.
//!
//! Every citation must resolve to a retrieved source. Citations that do not
//! are dropped and their inline markers removed from the answer. An optional
//! [`ClaimVerifier`] can additionally check that a cited source supports the
//! sentence citing it.

use async_trait::async_trait;
use regex::{Captures, Regex};
use serde::Serialize;
use std::collections::{BTreeSet, HashSet};
use std::sync::{Arc, LazyLock};
use tracing::{debug, warn};

use crate::brain::CompletionRequest;
use crate::prompts;
use crate::resilience::Resilience;
use crate::schema::{CitationRef, SupportResponse};
use crate::types::{Citation, ErrorKind, ErrorRecord, Phase, PhaseOutcome, Source, SourceId};

static MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[ \t]*\[(\d+)\]").expect("valid citation marker pattern"));

/// Unlisted bracketed numbers above the highest retrieved id by more than
/// this are treated as prose (years, figures), not citations.
const MARKER_SLACK: u32 = 50;

/// Outcome of one claim-support check.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClaimCheck {
    /// `None` when the check was inconclusive.
    pub supported: Option<bool>,
    pub tokens_used: u64,
    pub errors: Vec<ErrorRecord>,
}

impl ClaimCheck {
    pub fn verdict(supported: bool) -> Self {
        Self {
            supported: Some(supported),
            ..Default::default()
        }
    }
}

/// Checks whether a source supports a claim.
#[async_trait]
pub trait ClaimVerifier: Send + Sync {
    async fn check(&self, claim: &str, source: &Source) -> ClaimCheck;
}

/// Claim verifier backed by a model call made through the run's retry and
/// schema-reminder handling.
pub struct LlmClaimVerifier {
    resilience: Resilience,
    max_tokens: usize,
}

impl LlmClaimVerifier {
    pub fn new(resilience: Resilience) -> Self {
        Self {
            resilience,
            max_tokens: 64,
        }
    }
}

#[async_trait]
impl ClaimVerifier for LlmClaimVerifier {
    async fn check(&self, claim: &str, source: &Source) -> ClaimCheck {
        let request = CompletionRequest::new(prompts::SYSTEM_PROMPT, prompts::support_prompt(claim, source))
            .with_sampling(0.0, self.max_tokens);
        let report = self
            .resilience
            .execute_model_call::<SupportResponse>(Phase::Synthesizing, request)
            .await;
        let supported = match report.outcome {
            PhaseOutcome::Success(reply) => Some(reply.supported),
            other => {
                warn!(id = %source.id, reason = other.failure_reason().unwrap_or(""), "Claim support check inconclusive");
                None
            }
        };
        ClaimCheck {
            supported,
            tokens_used: report.tokens_used,
            errors: report.errors,
        }
    }
}

/// Why a citation was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    /// Identifier missing, malformed or not retrieved.
    Hallucinated,
    /// The claim verifier rejected it.
    Unsupported,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VerificationFailure {
    /// The identifier as the model wrote it.
    pub cited: String,
    pub reason: FailureReason,
    pub message: String,
}

impl VerificationFailure {
    pub fn to_error_record(&self) -> ErrorRecord {
        let kind = match self.reason {
            FailureReason::Hallucinated => ErrorKind::HallucinatedCitation,
            FailureReason::Unsupported => ErrorKind::UnsupportedCitation,
        };
        ErrorRecord::new(Phase::Synthesizing, kind, self.message.clone(), false)
    }
}

/// Answer text and citations after verification.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VerifiedAnswer {
    pub answer: String,
    pub citations: Vec<Citation>,
    pub failures: Vec<VerificationFailure>,
    /// Claims flagged in strict mode.
    pub unsupported_claims: Vec<String>,
    /// No valid citation survived.
    pub degraded: bool,
    /// Model tokens spent on claim checks.
    pub tokens_used: u64,
    /// Retry and parse errors from claim checks.
    pub check_errors: Vec<ErrorRecord>,
}

impl VerifiedAnswer {
    pub fn has_hallucinations(&self) -> bool {
        self.failures
            .iter()
            .any(|f| f.reason == FailureReason::Hallucinated)
    }

    pub fn error_records(&self) -> Vec<ErrorRecord> {
        self.failures
            .iter()
            .map(|f| f.to_error_record())
            .chain(self.check_errors.iter().cloned())
            .collect()
    }
}

#[derive(Default)]
pub struct CitationVerifier {
    claim_verifier: Option<Arc<dyn ClaimVerifier>>,
    strict: bool,
}

impl CitationVerifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_claim_verifier(mut self, verifier: Arc<dyn ClaimVerifier>) -> Self {
        self.claim_verifier = Some(verifier);
        self
    }

    /// Also flag the claim as unsupported when a citation fails the check.
    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    pub async fn verify(
        &self,
        answer: &str,
        cited: &[CitationRef],
        retrieved: &[Source],
    ) -> VerifiedAnswer {
        let mut failures = Vec::new();
        let mut unsupported_claims = Vec::new();
        let mut citations: Vec<Citation> = Vec::new();
        let mut seen_ids = HashSet::new();
        let mut seen_locations = HashSet::new();
        let mut rejected: BTreeSet<SourceId> = BTreeSet::new();
        let mut tokens_used = 0u64;
        let mut check_errors = Vec::new();

        for reference in cited {
            let source = reference
                .source_id()
                .and_then(|id| retrieved.iter().find(|s| s.id == id));
            let Some(source) = source else {
                warn!(cited = %reference.id, "Dropping citation to unretrieved source");
                if let Some(id) = reference.source_id() {
                    rejected.insert(id);
                }
                failures.push(VerificationFailure {
                    cited: reference.id.clone(),
                    reason: FailureReason::Hallucinated,
                    message: format!("citation {} does not match any retrieved source", reference.id),
                });
                continue;
            };

            if !seen_ids.insert(source.id) || !seen_locations.insert(source.location.trim().to_string()) {
                continue;
            }

            if let Some(verifier) = &self.claim_verifier {
                let claim = claim_for(answer, source.id);
                let check = verifier.check(&claim, source).await;
                tokens_used += check.tokens_used;
                check_errors.extend(check.errors);
                match check.supported {
                    Some(true) => {}
                    Some(false) => {
                        debug!(id = %source.id, "Citation not supported by its source");
                        rejected.insert(source.id);
                        failures.push(VerificationFailure {
                            cited: reference.id.clone(),
                            reason: FailureReason::Unsupported,
                            message: format!("source {} does not support: {}", source.id, claim),
                        });
                        if self.strict && !unsupported_claims.contains(&claim) {
                            unsupported_claims.push(claim);
                        }
                        continue;
                    }
                    // Inconclusive checks keep the citation.
                    None => {}
                }
            }

            citations.push(Citation::from(source));
        }

        // Rejected citations lose their markers; so do unlisted markers close
        // enough to the retrieved range to be mistaken for citations.
        let retrieved_ids: HashSet<SourceId> = retrieved.iter().map(|s| s.id).collect();
        let ceiling = retrieved_ids
            .iter()
            .map(|id| id.0)
            .max()
            .unwrap_or(0)
            .saturating_add(MARKER_SLACK);
        let answer = MARKER
            .replace_all(answer, |caps: &Captures| {
                let keep = match caps[1].parse::<u32>() {
                    Ok(n) if rejected.contains(&SourceId(n)) => false,
                    Ok(n) if retrieved_ids.contains(&SourceId(n)) => true,
                    Ok(n) => n > ceiling,
                    Err(_) => true,
                };
                if keep {
                    caps[0].to_string()
                } else {
                    String::new()
                }
            })
            .into_owned();

        let degraded = citations.is_empty();
        VerifiedAnswer {
            answer,
            citations,
            failures,
            unsupported_claims,
            degraded,
            tokens_used,
            check_errors,
        }
    }
}

/// The sentence of `answer` that cites `id`, or the whole answer.
fn claim_for(answer: &str, id: SourceId) -> String {
    let marker = id.to_string();
    sentences(answer)
        .find(|sentence| sentence.contains(&marker))
        .unwrap_or_else(|| answer.trim())
        .to_string()
}

/// Split at `.`, `!` or `?` followed by whitespace or the end of the text,
/// so decimals and abbreviations inside a word stay whole.
fn sentences(text: &str) -> impl Iterator<Item = &str> {
    let mut rest = text;
    std::iter::from_fn(move || {
        let trimmed = rest.trim_start();
        if trimmed.is_empty() {
            return None;
        }
        let mut chars = trimmed.char_indices().peekable();
        let mut end = trimmed.len();
        while let Some((i, c)) = chars.next() {
            if matches!(c, '.' | '!' | '?')
                && chars.peek().is_none_or(|(_, next)| next.is_whitespace())
            {
                end = i + c.len_utf8();
                break;
            }
        }
        let (sentence, tail) = trimmed.split_at(end);
        rest = tail;
        Some(sentence.trim())
    })
}
