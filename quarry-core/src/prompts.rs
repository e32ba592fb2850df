//! Prompt templates for each model-backed phase.

use std::collections::HashSet;

use crate::schema::Shape;
use crate::types::{PendingQuery, Source};

/// System prompt shared by every phase.
pub const SYSTEM_PROMPT: &str = "You are a careful research assistant. Return JSON only.";

/// Sentence prepended to answers produced under degraded or insufficient evidence.
pub const UNCERTAINTY_STATEMENT: &str =
    "Note: this answer is uncertain because the available evidence was incomplete.";

/// Answer used when synthesis produced nothing usable.
pub const FALLBACK_ANSWER: &str = "Note: this answer is uncertain because the available evidence was incomplete. \
     A reliable answer could not be assembled from the retrieved sources; consult the listed sources directly.";

pub fn plan_prompt(task: &str, max_queries: usize, executed: &[String]) -> String {
    let mut prompt = format!(
        "Task:\n{task}\n\n\
         Propose up to {max_queries} web search queries that together would answer the task. \
         Each query needs a short intent explaining what it should find.\n"
    );
    if !executed.is_empty() {
        prompt.push_str("\nAlready searched (do not repeat):\n");
        for query in executed {
            prompt.push_str(&format!("- {}\n", query));
        }
    }
    prompt.push_str(&format!("\nRespond with JSON shaped like {}", Shape::Plan.skeleton()));
    prompt
}

pub fn reflect_prompt(
    task: &str,
    evidence: &str,
    failed_queries: &[String],
    gaps: &[String],
    max_queries: usize,
) -> String {
    let mut prompt = format!(
        "Task:\n{task}\n\nEvidence gathered so far:\n{evidence}\n\n\
         Decide whether the evidence is sufficient to answer the task. \
         Give a confidence between 0 and 1 and list remaining gaps.\n"
    );
    if !failed_queries.is_empty() {
        prompt.push_str(
            "\nThese queries returned too few results; propose reformulations if they still matter:\n",
        );
        for query in failed_queries {
            prompt.push_str(&format!("- {}\n", query));
        }
    }
    if !gaps.is_empty() {
        prompt.push_str("\nGaps noted earlier:\n");
        for gap in gaps {
            prompt.push_str(&format!("- {}\n", gap));
        }
    }
    prompt.push_str(&format!(
        "\nIf not sufficient, suggest at most {} new queries.\nRespond with JSON shaped like {}",
        max_queries,
        Shape::Reflection.skeleton()
    ));
    prompt
}

/// Synthesis prompt; `cautious` adds the uncertainty instruction.
pub fn synthesize_prompt(task: &str, evidence: &str, cautious: bool) -> String {
    let mut prompt = format!(
        "Task:\n{task}\n\nSources:\n{evidence}\n\n\
         Write a concise answer to the task using only these sources. \
         Cite sources inline with their bracketed id, for example [1], \
         and list every cited source in `citations` with its id, title, type and location.\n"
    );
    if cautious {
        prompt.push_str(&format!(
            "\nThe evidence is incomplete. Begin the answer with this sentence: \"{}\"\n",
            UNCERTAINTY_STATEMENT
        ));
    }
    prompt.push_str(&format!(
        "\nRespond with JSON shaped like {}",
        Shape::Synthesis.skeleton()
    ));
    prompt
}

pub fn support_prompt(claim: &str, source: &Source) -> String {
    format!(
        "Claim:\n{claim}\n\nSource {} {}\n{}\n{}\n\n\
         Does the source support the claim? Respond with JSON shaped like {}",
        source.id,
        source.title,
        source.location,
        source.snippet,
        Shape::Support.skeleton()
    )
}

/// Collapse runs of whitespace and trim.
pub fn normalize_query(query: &str) -> String {
    query.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Normalize, drop empties and case-insensitive duplicates, keep the first `max`.
pub fn normalize_queries(queries: Vec<PendingQuery>, max: usize) -> Vec<PendingQuery> {
    let mut seen = HashSet::new();
    queries
        .into_iter()
        .filter_map(|q| {
            let query = normalize_query(&q.query);
            if query.is_empty() || !seen.insert(query.to_lowercase()) {
                return None;
            }
            Some(PendingQuery {
                query,
                intent: q.intent,
            })
        })
        .take(max)
        .collect()
}
