//! Hierarchical context: Global → Session → Workflow → Node (spec §3, §4.3).
//!
//! Grounded on `context_strategy.rs`'s `ContextStrategy` trait and its
//! `TrimStrategy` implementation in the teacher crate, which already
//! tracks a token budget against a buffer of entries and decides when to
//! compress — generalized here into the four-level hierarchy and the
//! saturation-latch semantics spec §4.3 requires.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Role of a turn's author (spec §3 `ShortTermBuffer`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnRole {
    User,
    Assistant,
    System,
}

/// Per-call token accounting (spec §4.3).
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct TurnTokenUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
}

/// One conversation turn (spec §3 `ShortTermBuffer`: `{turn_id, role,
/// content, tool_refs, token_usage, timestamp}`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Turn {
    pub turn_id: String,
    pub role: TurnRole,
    pub content: String,
    pub tool_refs: Vec<String>,
    pub token_usage: TurnTokenUsage,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

/// Append-only buffer of conversation turns, compressed when saturated
/// (spec §3). Appending while frozen is rejected (spec §4.4 step 1, §5).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ShortTermBuffer {
    turns: Vec<Turn>,
}

impl ShortTermBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn push(&mut self, turn: Turn) {
        self.turns.push(turn);
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Replace the buffer's contents with `delta` (the most recent N turns)
    /// prefixed by a single system-role summary turn (spec §4.4 step 4).
    pub fn compress_to(&mut self, summary_turn: Turn, delta: Vec<Turn>) {
        let mut turns = Vec::with_capacity(delta.len() + 1);
        turns.push(summary_turn);
        turns.extend(delta);
        self.turns = turns;
    }
}

/// Immutable, process-wide configuration and user identity (spec §3
/// `GlobalContext`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GlobalContext {
    pub user_id: String,
    pub system_config: serde_json::Value,
}

/// Errors raised by [`SessionContext`] mutation (spec §4.4, §5).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ContextError {
    #[error("session is frozen for distillation; retry after unfreeze")]
    FrozenRetryAfter,
}

/// Per-session state (spec §3 `SessionContext`). Exclusively owns its
/// short-term buffer and summary (spec §3 "Ownership summary").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionContext {
    pub session_id: String,
    pub global_context: GlobalContext,
    pub total_prompt_tokens: u64,
    pub total_completion_tokens: u64,
    pub context_limit: usize,
    pub short_term_buffer: ShortTermBuffer,
    pub is_saturated: bool,
    pub saturation_threshold: f64,
    pub warning_threshold: f64,
    pub distilled_summary: Option<crate::collaborators::StructuredSummary>,
    pub decision_history: Vec<String>,
    pub frozen: bool,
    backup: Option<Box<SessionContextSnapshot>>,
}

/// Deep-copy snapshot for atomic rollback during distillation (spec §4.4 step 2).
#[derive(Debug, Clone, Serialize, Deserialize)]
struct SessionContextSnapshot {
    total_prompt_tokens: u64,
    total_completion_tokens: u64,
    short_term_buffer: ShortTermBuffer,
    distilled_summary: Option<crate::collaborators::StructuredSummary>,
    is_saturated: bool,
}

impl SessionContext {
    pub fn new(
        session_id: impl Into<String>,
        global_context: GlobalContext,
        context_limit: usize,
        saturation_threshold: f64,
        warning_threshold: f64,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            global_context,
            total_prompt_tokens: 0,
            total_completion_tokens: 0,
            context_limit,
            short_term_buffer: ShortTermBuffer::new(),
            is_saturated: false,
            saturation_threshold,
            warning_threshold,
            distilled_summary: None,
            decision_history: Vec::new(),
            frozen: false,
            backup: None,
        }
    }

    pub fn total_tokens(&self) -> u64 {
        self.total_prompt_tokens + self.total_completion_tokens
    }

    /// `usage_ratio = total_tokens / context_limit` (spec §4.3). Zero
    /// `context_limit` reads as fully saturated rather than dividing by zero.
    pub fn usage_ratio(&self) -> f64 {
        if self.context_limit == 0 {
            return 1.0;
        }
        self.total_tokens() as f64 / self.context_limit as f64
    }

    /// Update token counters from an LLM call. Emits the saturation latch
    /// transition as its return value rather than publishing directly —
    /// the caller owns the event bus handle (spec §4.3 "emit saturation
    /// event first crossing threshold").
    pub fn update_token_usage(&mut self, prompt_tokens: u64, completion_tokens: u64) -> TokenUsageOutcome {
        self.total_prompt_tokens += prompt_tokens;
        self.total_completion_tokens += completion_tokens;
        self.latch_saturation()
    }

    fn latch_saturation(&mut self) -> TokenUsageOutcome {
        let ratio = self.usage_ratio();
        let crossed_saturation = !self.is_saturated && ratio >= self.saturation_threshold;
        if crossed_saturation {
            self.is_saturated = true;
        }
        TokenUsageOutcome {
            usage_ratio: ratio,
            crossed_warning_threshold: ratio >= self.warning_threshold,
            crossed_saturation,
        }
    }

    /// Append a turn, rejecting the mutation while frozen (spec §4.4 step 1).
    pub fn add_turn(&mut self, turn: Turn) -> Result<TokenUsageOutcome, ContextError> {
        if self.frozen {
            return Err(ContextError::FrozenRetryAfter);
        }
        self.total_prompt_tokens += turn.token_usage.prompt_tokens;
        self.total_completion_tokens += turn.token_usage.completion_tokens;
        self.short_term_buffer.push(turn);
        Ok(self.latch_saturation())
    }

    /// Step 1 of spec §4.4: freeze the session against further `add_turn`.
    pub fn freeze(&mut self) {
        self.frozen = true;
    }

    /// Step 2 of spec §4.4: deep-copy the pre-distillation state.
    pub fn backup(&mut self) {
        self.backup = Some(Box::new(SessionContextSnapshot {
            total_prompt_tokens: self.total_prompt_tokens,
            total_completion_tokens: self.total_completion_tokens,
            short_term_buffer: self.short_term_buffer.clone(),
            distilled_summary: self.distilled_summary.clone(),
            is_saturated: self.is_saturated,
        }));
    }

    /// Rollback to the last backup, restoring state exactly (spec §4.4
    /// "Rollback"). No-op (other than unfreezing) if no backup exists.
    pub fn rollback(&mut self) {
        if let Some(snapshot) = self.backup.take() {
            self.total_prompt_tokens = snapshot.total_prompt_tokens;
            self.total_completion_tokens = snapshot.total_completion_tokens;
            self.short_term_buffer = snapshot.short_term_buffer;
            self.distilled_summary = snapshot.distilled_summary;
            self.is_saturated = snapshot.is_saturated;
        }
        self.frozen = false;
    }

    /// Step 5-6 of spec §4.4: clear the saturation latch, drop the backup,
    /// and unfreeze on a successful distillation.
    pub fn commit_distillation(&mut self) {
        self.is_saturated = false;
        self.backup = None;
        self.frozen = false;
    }
}

/// Outcome of a token-usage update, used by the caller to decide whether
/// to log a warning or trigger distillation (spec §4.3).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TokenUsageOutcome {
    pub usage_ratio: f64,
    pub crossed_warning_threshold: bool,
    pub crossed_saturation: bool,
}

/// Per-workflow isolated context (spec §3 `WorkflowContext`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkflowContext {
    pub workflow_id: String,
    pub variables: serde_json::Value,
}

/// Ephemeral per-node-execution context (spec §3 `NodeContext`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NodeContext {
    pub node_id: String,
    pub inputs: serde_json::Value,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(limit: usize) -> SessionContext {
        SessionContext::new(
            "s1",
            GlobalContext {
                user_id: "u1".into(),
                system_config: serde_json::json!({}),
            },
            limit,
            0.92,
            0.80,
        )
    }

    fn turn(id: &str, prompt: u64, completion: u64) -> Turn {
        Turn {
            turn_id: id.into(),
            role: TurnRole::User,
            content: "hi".into(),
            tool_refs: vec![],
            token_usage: TurnTokenUsage {
                prompt_tokens: prompt,
                completion_tokens: completion,
            },
            timestamp: chrono::Utc::now(),
        }
    }

    #[test]
    fn usage_ratio_computed_from_totals() {
        let mut ctx = session(100);
        ctx.add_turn(turn("t1", 50, 0)).unwrap();
        assert!((ctx.usage_ratio() - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn saturation_latches_once() {
        let mut ctx = session(100);
        let first = ctx.add_turn(turn("t1", 95, 0)).unwrap();
        assert!(first.crossed_saturation);
        let second = ctx.add_turn(turn("t2", 1, 0)).unwrap();
        assert!(!second.crossed_saturation);
        assert!(ctx.is_saturated);
    }

    #[test]
    fn add_turn_rejected_while_frozen() {
        let mut ctx = session(100);
        ctx.freeze();
        assert_eq!(
            ctx.add_turn(turn("t1", 1, 0)).unwrap_err(),
            ContextError::FrozenRetryAfter
        );
    }

    #[test]
    fn rollback_restores_exact_pre_backup_state() {
        let mut ctx = session(100);
        ctx.add_turn(turn("t1", 10, 0)).unwrap();
        ctx.backup();
        ctx.add_turn(turn("t2", 999, 0)).ok();
        ctx.total_prompt_tokens = 99999;
        ctx.rollback();
        assert_eq!(ctx.total_prompt_tokens, 10);
        assert!(!ctx.frozen);
    }

    #[test]
    fn commit_distillation_clears_saturation_and_unfreezes() {
        let mut ctx = session(100);
        ctx.add_turn(turn("t1", 95, 0)).unwrap();
        ctx.freeze();
        ctx.backup();
        ctx.commit_distillation();
        assert!(!ctx.is_saturated);
        assert!(!ctx.frozen);
    }

    #[test]
    fn zero_context_limit_reads_as_fully_saturated() {
        let ctx = session(0);
        assert_eq!(ctx.usage_ratio(), 1.0);
    }
}
