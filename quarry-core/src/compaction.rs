//! Evidence compaction.
//!
//! When accumulated sources grow past the context budget, older sources are
//! collapsed into a digest that keeps their identifiers, titles, types and
//! locations but drops their bodies. The newest sources stay verbatim.

use serde::Serialize;
use std::fmt;
use tracing::debug;

use crate::brain::estimate_tokens;
use crate::config::ResearchConfig;
use crate::state::ResearchState;
use crate::types::{Source, SourceId};

/// Why a compacted view was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CompactionTrigger {
    /// Remaining token budget fell below the floor ratio.
    BudgetLow,
    /// Serialized sources exceed the token ceiling.
    SourcesOversized,
    /// Synthesis is about to run.
    Synthesis,
}

impl fmt::Display for CompactionTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompactionTrigger::BudgetLow => write!(f, "budget_low"),
            CompactionTrigger::SourcesOversized => write!(f, "sources_oversized"),
            CompactionTrigger::Synthesis => write!(f, "synthesis"),
        }
    }
}

/// Body-less record of a digested source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceStub {
    pub id: SourceId,
    pub title: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub location: String,
}

impl From<&Source> for SourceStub {
    fn from(source: &Source) -> Self {
        Self {
            id: source.id,
            title: source.title.clone(),
            kind: source.kind.clone(),
            location: source.location.clone(),
        }
    }
}

/// Token-bounded view over the retrieved sources.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EvidenceView {
    /// Older sources, bodies dropped, in id order.
    pub digest: Vec<SourceStub>,
    /// Newest sources, verbatim, in id order.
    pub recent: Vec<Source>,
    pub trigger: Option<CompactionTrigger>,
}

impl EvidenceView {
    /// Every source verbatim.
    pub fn full(sources: &[Source]) -> Self {
        Self {
            digest: Vec::new(),
            recent: sources.to_vec(),
            trigger: None,
        }
    }

    /// Number of sources whose bodies were dropped.
    pub fn omitted(&self) -> usize {
        self.digest.len()
    }

    pub fn is_compacted(&self) -> bool {
        !self.digest.is_empty()
    }

    pub fn is_empty(&self) -> bool {
        self.digest.is_empty() && self.recent.is_empty()
    }

    /// All identifiers in the view, digest first.
    pub fn ids(&self) -> Vec<SourceId> {
        self.digest
            .iter()
            .map(|s| s.id)
            .chain(self.recent.iter().map(|s| s.id))
            .collect()
    }

    /// Prompt text for the view.
    pub fn render(&self) -> String {
        if self.is_empty() {
            return "(no sources)".to_string();
        }

        let mut out = String::new();
        if self.is_compacted() {
            out.push_str(&format!(
                "(omitted bodies of {} older sources due to context budget)\n",
                self.omitted()
            ));
            for stub in &self.digest {
                out.push_str(&format!(
                    "{} {} ({}) {}\n",
                    stub.id, stub.title, stub.kind, stub.location
                ));
            }
            out.push('\n');
        }

        let blocks: Vec<String> = self
            .recent
            .iter()
            .map(|s| {
                let mut block = format!("{} {}\n{}\n{}\n", s.id, s.title, s.kind, s.location);
                if !s.snippet.is_empty() {
                    block.push_str(&s.snippet);
                    block.push('\n');
                }
                block
            })
            .collect();
        out.push_str(&blocks.join("\n"));
        out
    }

    pub fn estimated_tokens(&self) -> usize {
        estimate_tokens(&self.render())
    }
}

/// Compaction thresholds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompactionPolicy {
    /// Sources kept verbatim.
    pub keep_recent: usize,
    /// Serialized-source ceiling in estimated tokens.
    pub source_ceiling_tokens: usize,
    /// Remaining budget fraction below which compaction starts.
    pub budget_floor_ratio: f64,
}

impl Default for CompactionPolicy {
    fn default() -> Self {
        Self::from_config(&ResearchConfig::default())
    }
}

impl CompactionPolicy {
    pub fn from_config(config: &ResearchConfig) -> Self {
        Self {
            keep_recent: config.keep_recent,
            source_ceiling_tokens: config.source_ceiling_tokens,
            budget_floor_ratio: config.budget_floor_ratio,
        }
    }

    /// Check the budget and size triggers.
    pub fn should_compact(&self, state: &ResearchState) -> Option<CompactionTrigger> {
        if state.budget_ratio() < self.budget_floor_ratio {
            return Some(CompactionTrigger::BudgetLow);
        }
        if serialized_tokens(state.sources()) > self.source_ceiling_tokens {
            return Some(CompactionTrigger::SourcesOversized);
        }
        None
    }

    /// The view reflection should see: compacted only when a trigger fires.
    pub fn view(&self, state: &ResearchState) -> EvidenceView {
        match self.should_compact(state) {
            Some(trigger) => self.compact(state, trigger),
            None => EvidenceView::full(state.sources()),
        }
    }

    pub fn compact(&self, state: &ResearchState, trigger: CompactionTrigger) -> EvidenceView {
        self.compact_sources(state.sources(), trigger)
    }

    /// Keep the newest `keep_recent` sources and digest the rest.
    pub fn compact_sources(&self, sources: &[Source], trigger: CompactionTrigger) -> EvidenceView {
        let split = sources.len().saturating_sub(self.keep_recent);
        let (older, recent) = sources.split_at(split);
        let view = EvidenceView {
            digest: older.iter().map(SourceStub::from).collect(),
            recent: recent.to_vec(),
            trigger: Some(trigger),
        };
        debug!(
            %trigger,
            digested = view.omitted(),
            kept = view.recent.len(),
            tokens = view.estimated_tokens(),
            "Compacted evidence"
        );
        view
    }
}

/// Estimated tokens of the sources serialized as JSON.
pub fn serialized_tokens(sources: &[Source]) -> usize {
    if sources.is_empty() {
        return 0;
    }
    serde_json::to_string(sources)
        .map(|json| estimate_tokens(&json))
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Tier;
    use crate::types::SearchHit;
    use pretty_assertions::assert_eq;

    fn state_with(count: usize) -> ResearchState {
        let mut state = ResearchState::new("task", Tier::Standard.defaults());
        state.append_sources((1..=count).map(|i| {
            SearchHit::web(format!("Title {}", i), format!("https://s{}.example", i))
                .with_snippet(format!("Body of source {}", i))
        }));
        state
    }

    #[test]
    fn test_no_trigger_when_budget_healthy() {
        let policy = CompactionPolicy::default();
        let state = state_with(20);
        assert_eq!(policy.should_compact(&state), None);
        let view = policy.view(&state);
        assert!(!view.is_compacted());
        assert_eq!(view.recent.len(), 20);
    }

    #[test]
    fn test_low_budget_preserves_ids_and_titles() {
        let policy = CompactionPolicy::default();
        let mut state = state_with(20);
        let budget = state.limits().token_budget;
        state.consume_tokens(budget - budget / 5);

        assert_eq!(policy.should_compact(&state), Some(CompactionTrigger::BudgetLow));
        let view = policy.view(&state);

        let ids: Vec<u32> = view.ids().iter().map(|id| id.0).collect();
        assert_eq!(ids, (1..=20).collect::<Vec<_>>());
        assert_eq!(view.omitted(), 5);
        assert_eq!(view.recent.len(), 15);

        let rendered = view.render();
        for i in 1..=20 {
            assert!(rendered.contains(&format!("Title {}", i)));
        }
        assert!(!rendered.contains("Body of source 1\n"));
        assert!(rendered.contains("Body of source 20"));
    }

    #[test]
    fn test_oversized_sources_trigger() {
        let policy = CompactionPolicy {
            source_ceiling_tokens: 50,
            ..CompactionPolicy::default()
        };
        let state = state_with(10);
        assert_eq!(
            policy.should_compact(&state),
            Some(CompactionTrigger::SourcesOversized)
        );
    }

    #[test]
    fn test_synthesis_compaction_below_keep_recent_drops_nothing() {
        let policy = CompactionPolicy::default();
        let state = state_with(4);
        let view = policy.compact(&state, CompactionTrigger::Synthesis);
        assert_eq!(view.omitted(), 0);
        assert_eq!(view.trigger, Some(CompactionTrigger::Synthesis));
    }

    #[test]
    fn test_render_empty() {
        assert_eq!(EvidenceView::full(&[]).render(), "(no sources)");
    }

    #[test]
    fn test_digest_serializes_type_field() {
        let state = state_with(2);
        let stub = SourceStub::from(&state.sources()[0]);
        let json = serde_json::to_value(&stub).unwrap();
        assert_eq!(json["type"], "web");
        assert_eq!(json["id"], 1);
    }
}
