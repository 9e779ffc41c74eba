//! Human-readable audit report rendering for checkpoints.
//!
//! Presentation only: a markdown-like view of a stored snapshot with a header
//! block, a status-annotated hypothesis list, and an optional root-cause
//! section. No core behavior lives here.

use std::fmt::Write;

use crate::hypothesis::Hypothesis;
use crate::storage::Checkpoint;

/// Render a checkpoint as a markdown-like audit report
pub fn render_report(checkpoint: &Checkpoint) -> String {
    let mut out = String::new();

    let _ = writeln!(out, "# Investigation {}", checkpoint.investigation_id);
    let _ = writeln!(out);
    let _ = writeln!(out, "- Checkpoint: {}", checkpoint.id);
    let _ = writeln!(out, "- Created: {}", checkpoint.created_at.to_rfc3339());
    let _ = writeln!(out, "- Phase: {}", checkpoint.phase);
    let _ = writeln!(out, "- Confidence: {}/100", checkpoint.confidence);
    let _ = writeln!(out, "- Query: {}", checkpoint.query);
    if let Some(session_id) = &checkpoint.session_id {
        let _ = writeln!(out, "- Active session: {}", session_id);
    }
    let _ = writeln!(
        out,
        "- Activity: {} prompts, {} tool calls",
        checkpoint.prompt_count, checkpoint.tool_call_count
    );

    if !checkpoint.symptoms.is_empty() {
        let _ = writeln!(out);
        let _ = writeln!(out, "## Symptoms");
        let _ = writeln!(out);
        for symptom in &checkpoint.symptoms {
            let _ = writeln!(out, "- {}", symptom);
        }
    }

    let _ = writeln!(out);
    let _ = writeln!(out, "## Hypotheses");
    let _ = writeln!(out);
    if checkpoint.hypotheses.is_empty() {
        let _ = writeln!(out, "(none proposed)");
    } else {
        for hypothesis in &checkpoint.hypotheses {
            render_hypothesis(&mut out, hypothesis);
        }
    }

    if let Some(root_cause) = &checkpoint.root_cause {
        let _ = writeln!(out);
        let _ = writeln!(out, "## Root Cause");
        let _ = writeln!(out);
        let _ = writeln!(out, "{}", root_cause);
        if !checkpoint.affected_services.is_empty() {
            let _ = writeln!(
                out,
                "Affected services: {}",
                checkpoint.affected_services.join(", ")
            );
        }
    }

    out
}

fn render_hypothesis(out: &mut String, hypothesis: &Hypothesis) {
    let indent = "  ".repeat(hypothesis.depth as usize);
    let _ = writeln!(
        out,
        "{}- [{}] {} ({}, confidence {}, evidence {})",
        indent,
        hypothesis.status,
        hypothesis.statement,
        hypothesis.category,
        hypothesis.confidence,
        hypothesis.evidence_strength,
    );
    if let Some(reason) = &hypothesis.status_reason {
        let _ = writeln!(out, "{}  reason: {}", indent, reason);
    }
}
