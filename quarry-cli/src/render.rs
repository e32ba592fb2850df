//! Plain-text rendering of research results for the terminal.

use quarry_core::{AgentStore, FinalResult, StopReason};
use std::fmt::Write;

pub fn final_result(result: &FinalResult) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{}\n", result.answer.trim());

    if !result.citations.is_empty() {
        let _ = writeln!(out, "Sources:");
        for citation in &result.citations {
            let _ = writeln!(out, "  {} {} ({})", citation.id, citation.title, citation.location);
        }
        out.push('\n');
    }

    if !result.unsupported_claims.is_empty() {
        let _ = writeln!(out, "Unsupported claims:");
        for claim in &result.unsupported_claims {
            let _ = writeln!(out, "  - {}", claim);
        }
        out.push('\n');
    }

    for note in &result.notes {
        let _ = writeln!(out, "note: {}", note);
    }

    let stop = match result.stop_reason {
        StopReason::Sufficient => "evidence sufficient",
        StopReason::IterationLimit => "iteration limit",
        StopReason::TimeLimit => "time limit",
    };
    let _ = writeln!(
        out,
        "{} iteration(s), stopped: {}, confidence {:.2}{}",
        result.iterations,
        stop,
        result.confidence,
        if result.degraded { ", degraded" } else { "" }
    );
    out
}

/// One line per persona: id, name and description.
pub fn agent_list(agents: &AgentStore) -> String {
    if agents.is_empty() {
        return "No agents configured. Add .quarry/agents.json or [[agents]] tables to config.toml.\n"
            .to_string();
    }
    let width = agents.list().iter().map(|a| a.id.len()).max().unwrap_or(0);
    let mut out = String::new();
    for agent in agents.list() {
        let _ = write!(out, "{:<width$}  {}", agent.id, agent.name, width = width);
        if !agent.description.is_empty() {
            let _ = write!(out, " - {}", agent.description);
        }
        out.push('\n');
    }
    out
}
