//! Memory distillation pipeline (spec §4.4): freeze → backup → summarize →
//! compress → reset saturation → unfreeze, with rollback on failure.
//!
//! Grounded on `context_strategy.rs`'s `SelfCompressionStrategy` in the
//! teacher crate, which already performs "summarize older entries, keep
//! recent ones verbatim" — generalized into the strict six-step sequence
//! spec §4.4 requires, with an external [`crate::collaborators::Summarizer`]
//! standing in for the teacher's in-process compression call.

use crate::collaborators::{StructuredSummary, Summarizer};
use crate::context::{SessionContext, Turn, TurnRole, TurnTokenUsage};
use thiserror::Error;

/// Errors during distillation. Every variant triggers rollback by the
/// caller (spec §4.4 "Rollback": any exception during steps 3-5 restores
/// the backup exactly and unfreezes).
#[derive(Debug, Error)]
pub enum DistillationError {
    #[error("summarizer collaborator failed: {0}")]
    SummarizerFailed(String),
}

/// Run the six-step distillation sequence against `session` using
/// `summarizer` as the external collaborator (spec §6).
///
/// On success, `session.is_saturated` is false and `usage_ratio` strictly
/// decreased (spec §4.4 invariant); on failure the session is restored to
/// its pre-backup state and unfrozen, with the saturation latch left set
/// so the next turn retries (spec §7: "the saturation latch remains set
/// so the next turn triggers another attempt").
pub async fn distill(
    session: &mut SessionContext,
    summarizer: &dyn Summarizer,
    retained_turns: usize,
    target_token_budget: u64,
) -> Result<StructuredSummary, DistillationError> {
    let usage_ratio_before = session.usage_ratio();

    // Step 1: freeze.
    session.freeze();
    // Step 2: backup.
    session.backup();

    let result = run_summarize_and_compress(session, summarizer, retained_turns, target_token_budget).await;

    match result {
        Ok(summary) => {
            // Steps 5-6: reset saturation, unfreeze.
            session.commit_distillation();
            debug_assert!(
                session.usage_ratio() <= usage_ratio_before,
                "distillation must not increase usage_ratio"
            );
            Ok(summary)
        }
        Err(err) => {
            session.rollback();
            Err(err)
        }
    }
}

async fn run_summarize_and_compress(
    session: &mut SessionContext,
    summarizer: &dyn Summarizer,
    retained_turns: usize,
    target_token_budget: u64,
) -> Result<StructuredSummary, DistillationError> {
    let turns = session.short_term_buffer.turns().to_vec();
    let split_at = turns.len().saturating_sub(retained_turns);
    let (to_summarize, delta) = turns.split_at(split_at);

    // Step 3: summarize.
    let summary = summarizer
        .summarize(to_summarize, target_token_budget)
        .await
        .map_err(|e| DistillationError::SummarizerFailed(e.to_string()))?;

    // Step 4: compress — replace older turns with a single rendered
    // summary turn, keep the N most recent verbatim.
    let summary_turn = Turn {
        turn_id: format!("summary-{}", uuid::Uuid::new_v4()),
        role: TurnRole::System,
        content: summary.render(),
        tool_refs: Vec::new(),
        token_usage: TurnTokenUsage {
            prompt_tokens: 0,
            completion_tokens: summary.summary_token_count,
        },
        timestamp: chrono::Utc::now(),
    };
    session.short_term_buffer.compress_to(summary_turn, delta.to_vec());
    session.distilled_summary = Some(summary.clone());

    // Recompute totals from the post-compression buffer so usage_ratio
    // reflects only what's actually retained.
    let (prompt, completion) = session
        .short_term_buffer
        .turns()
        .iter()
        .fold((0u64, 0u64), |(p, c), t| {
            (p + t.token_usage.prompt_tokens, c + t.token_usage.completion_tokens)
        });
    session.total_prompt_tokens = prompt;
    session.total_completion_tokens = completion;

    Ok(summary)
}
