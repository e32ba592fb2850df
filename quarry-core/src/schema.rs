//! Structural validation of model payloads.
//!
//! Each phase expects one JSON shape. Raw model text is located (bare,
//! fenced, or embedded in prose), deserialized into a typed payload and
//! checked for field-level constraints. Failures come back as
//! [`PhaseOutcome::ParseFailure`] so callers can issue the single permitted
//! retry with [`Shape::reminder`].

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::SchemaError;
use crate::types::{PendingQuery, PhaseOutcome, SourceId};

/// The payload shapes the loop asks the model for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shape {
    Plan,
    Reflection,
    Synthesis,
    Support,
}

impl Shape {
    pub fn name(&self) -> &'static str {
        match self {
            Shape::Plan => "plan",
            Shape::Reflection => "reflection",
            Shape::Synthesis => "synthesis",
            Shape::Support => "support",
        }
    }

    /// JSON skeleton of the expected payload.
    pub fn skeleton(&self) -> &'static str {
        match self {
            Shape::Plan => r#"{"queries": [{"query": "...", "intent": "..."}]}"#,
            Shape::Reflection => {
                r#"{"sufficient": false, "confidence": 0.0, "gaps": ["..."], "new_queries": [{"query": "...", "intent": "..."}]}"#
            }
            Shape::Synthesis => {
                r#"{"answer": "... [1] ...", "citations": [{"id": "[1]", "title": "...", "type": "web", "location": "https://..."}]}"#
            }
            Shape::Support => r#"{"supported": true}"#,
        }
    }

    /// Text appended to a prompt after a malformed reply.
    pub fn reminder(&self, reason: &str) -> String {
        format!(
            "Your previous reply could not be used ({}). Reply with exactly one JSON object of this form and nothing else:\n{}",
            reason,
            self.skeleton()
        )
    }
}

/// A typed, validated phase payload.
pub trait Payload: DeserializeOwned + Send + 'static {
    const SHAPE: Shape;

    /// Field-level checks beyond what deserialization enforces.
    fn check(&self) -> Result<(), SchemaError> {
        Ok(())
    }
}

/// `{queries:[{query,intent}]}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanResponse {
    pub queries: Vec<PendingQuery>,
}

impl Payload for PlanResponse {
    const SHAPE: Shape = Shape::Plan;
}

/// `{sufficient, confidence, gaps, new_queries}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReflectionResponse {
    pub sufficient: bool,
    pub confidence: f64,
    #[serde(default)]
    pub gaps: Vec<String>,
    #[serde(default)]
    pub new_queries: Vec<PendingQuery>,
}

impl Payload for ReflectionResponse {
    const SHAPE: Shape = Shape::Reflection;

    fn check(&self) -> Result<(), SchemaError> {
        if !self.confidence.is_finite() || !(0.0..=1.0).contains(&self.confidence) {
            return Err(SchemaError::Field {
                field: "confidence".into(),
                reason: format!("must be between 0 and 1, got {}", self.confidence),
            });
        }
        Ok(())
    }
}

/// `{answer, citations:[{id,title,type,location}]}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SynthesisResponse {
    pub answer: String,
    #[serde(default)]
    pub citations: Vec<CitationRef>,
}

impl Payload for SynthesisResponse {
    const SHAPE: Shape = Shape::Synthesis;

    fn check(&self) -> Result<(), SchemaError> {
        if self.answer.trim().is_empty() {
            return Err(SchemaError::Field {
                field: "answer".into(),
                reason: "must not be empty".into(),
            });
        }
        Ok(())
    }
}

/// A citation as claimed by the model, before verification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CitationRef {
    #[serde(deserialize_with = "id_as_string")]
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub location: String,
}

impl CitationRef {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: String::new(),
            kind: String::new(),
            location: String::new(),
        }
    }

    /// Parse `3`, `"3"` or `"[3]"` into a source identifier.
    pub fn source_id(&self) -> Option<SourceId> {
        let trimmed = self.id.trim();
        let inner = trimmed
            .strip_prefix('[')
            .and_then(|s| s.strip_suffix(']'))
            .unwrap_or(trimmed);
        inner.trim().parse::<u32>().ok().filter(|n| *n > 0).map(SourceId)
    }
}

fn id_as_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawId {
        Number(u64),
        Text(String),
    }
    Ok(match RawId::deserialize(deserializer)? {
        RawId::Number(n) => n.to_string(),
        RawId::Text(s) => s,
    })
}

/// `{supported}` reply of the claim-support check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SupportResponse {
    pub supported: bool,
}

impl Payload for SupportResponse {
    const SHAPE: Shape = Shape::Support;
}

/// Validate raw model text as payload `T`.
pub fn parse<T: Payload>(raw: &str) -> PhaseOutcome<T> {
    match validate::<T>(raw) {
        Ok(payload) => PhaseOutcome::Success(payload),
        Err(err) => PhaseOutcome::ParseFailure {
            raw: raw.to_string(),
            reason: format!("{} payload invalid: {}", T::SHAPE.name(), err),
        },
    }
}

/// Like [`parse`] but returning the schema error directly.
pub fn validate<T: Payload>(raw: &str) -> Result<T, SchemaError> {
    let json = locate_json(raw).ok_or(SchemaError::NoJson)?;
    let payload: T = serde_json::from_str(json).map_err(|e| SchemaError::Json {
        message: e.to_string(),
    })?;
    payload.check()?;
    Ok(payload)
}

/// Find the JSON object inside a model reply.
fn locate_json(raw: &str) -> Option<&str> {
    let trimmed = raw.trim();
    if trimmed.starts_with('{') && trimmed.ends_with('}') {
        return Some(trimmed);
    }
    if let Some(fenced) = extract_fenced_json(trimmed) {
        let body = fenced.trim();
        if body.starts_with('{') {
            return Some(body);
        }
    }
    let start = trimmed.find('{')?;
    extract_balanced_json(&trimmed[start..])
}

/// Body of the first markdown code fence, tolerating trailing prose.
fn extract_fenced_json(content: &str) -> Option<&str> {
    let fence_start = content.find("```")?;
    let after_opening = &content[fence_start + 3..];
    let body_start = fence_start + 3 + after_opening.find('\n')? + 1;
    let closing = content[body_start..].find("```")?;
    let body_end = body_start + closing;
    if body_start >= body_end {
        return None;
    }
    Some(&content[body_start..body_end])
}

/// Balanced `{...}` prefix of `s`, respecting string literals.
fn extract_balanced_json(s: &str) -> Option<&str> {
    if !s.starts_with('{') {
        return None;
    }
    let mut depth = 0i32;
    let mut in_string = false;
    let mut escape_next = false;

    for (i, ch) in s.char_indices() {
        if escape_next {
            escape_next = false;
            continue;
        }
        match ch {
            '\\' if in_string => escape_next = true,
            '"' => in_string = !in_string,
            '{' if !in_string => depth += 1,
            '}' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    return Some(&s[..=i]);
                }
            }
            _ => {}
        }
    }
    None
}
