//! Contracts for the external collaborators named in spec §6: the LLM
//! provider, the node executor, the memory summarizer, and the save
//! executor. All four are deliberately out of this crate's scope (spec §1)
//! — this module only defines the trait boundary an implementation must
//! satisfy, grounded on `client_wrapper::ClientWrapper` and
//! `tool_protocol::ToolProtocol` in the teacher crate, which use the exact
//! same "trait at the seam, `Box<dyn Error + Send + Sync>` across the async
//! boundary" shape.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::error::Error;

pub type CollabResult<T> = Result<T, Box<dyn Error + Send + Sync>>;

/// Token accounting returned by an LLM call (spec §6).
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
}

impl TokenUsage {
    pub fn total(&self) -> u64 {
        self.prompt_tokens + self.completion_tokens
    }
}

/// A single message in the conversation sent to the LLM provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmMessage {
    pub role: String,
    pub content: String,
}

/// A tool the provider may call, described in provider-agnostic form.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

/// Outcome of a single LLM round-trip (spec §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmResponse {
    pub content: String,
    pub tool_calls: Vec<serde_json::Value>,
    pub usage: Option<TokenUsage>,
}

/// The LLM provider collaborator: `invoke(messages, tools, model, stream?)`.
///
/// Implementations live outside this crate (spec §1). Absent token counts
/// must be estimated by the caller, never fabricated here (spec §4.3
/// "Failure semantics": token counting errors never block execution).
#[async_trait]
pub trait LlmProvider: Send + Sync {
    async fn invoke(
        &self,
        messages: &[LlmMessage],
        tools: &[ToolSpec],
        model: &str,
        stream: bool,
    ) -> CollabResult<LlmResponse>;
}

/// Outcome of a single node execution (spec §6 `NodeResult`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeResult {
    pub success: bool,
    pub output: serde_json::Value,
    pub error: Option<String>,
    pub error_code: Option<crate::error::ErrorCode>,
    pub execution_time_ms: u64,
    pub retryable: bool,
}

impl NodeResult {
    pub fn ok(output: serde_json::Value, execution_time_ms: u64) -> Self {
        Self {
            success: true,
            output,
            error: None,
            error_code: None,
            execution_time_ms,
            retryable: false,
        }
    }

    pub fn failed(
        error: impl Into<String>,
        error_code: crate::error::ErrorCode,
        retryable: bool,
        execution_time_ms: u64,
    ) -> Self {
        Self {
            success: false,
            output: serde_json::Value::Null,
            error: Some(error.into()),
            error_code: Some(error_code),
            execution_time_ms,
            retryable,
        }
    }
}

/// A cancellation signal threaded through a node execution (spec §5).
///
/// Implemented over `tokio::sync::watch` so a single `WorkflowAgent`-owned
/// sender can cancel every in-flight node's token cheaply.
#[derive(Debug, Clone)]
pub struct CancellationToken {
    receiver: tokio::sync::watch::Receiver<bool>,
}

impl CancellationToken {
    pub fn new() -> (CancellationTrigger, Self) {
        let (tx, rx) = tokio::sync::watch::channel(false);
        (CancellationTrigger { sender: tx }, Self { receiver: rx })
    }

    pub fn is_cancelled(&self) -> bool {
        *self.receiver.borrow()
    }
}

/// The sender half of a [`CancellationToken`], owned by whichever component
/// (Coordinator intervention, session termination) may need to cancel.
#[derive(Debug, Clone)]
pub struct CancellationTrigger {
    sender: tokio::sync::watch::Sender<bool>,
}

impl CancellationTrigger {
    pub fn cancel(&self) {
        let _ = self.sender.send(true);
    }
}

/// Progress callback shape accepted by [`NodeExecutor::execute`] (spec §6):
/// `(progress: f32 in [0,1], status: &str, metadata)`.
pub type ProgressCallback = std::sync::Arc<dyn Fn(f32, &str, serde_json::Value) + Send + Sync>;

/// The node executor collaborator: runs Python/HTTP/DB/LLM node code in a
/// sandbox outside this crate (spec §1, §6).
#[async_trait]
pub trait NodeExecutor: Send + Sync {
    async fn execute(
        &self,
        node_spec: &crate::dag::Node,
        inputs: &HashMap<String, serde_json::Value>,
        cancellation: CancellationToken,
        on_progress: ProgressCallback,
    ) -> CollabResult<NodeResult>;
}

/// The eight-section structured summary a [`Summarizer`] must produce
/// (spec §3 `StructuredSummary`, §4.4 step 3).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StructuredSummary {
    pub core_goal: String,
    pub key_decisions: Vec<String>,
    pub important_facts: Vec<String>,
    pub pending_tasks: Vec<String>,
    pub user_preferences: Vec<String>,
    pub context_clues: Vec<String>,
    pub unresolved_issues: Vec<String>,
    pub next_steps: Vec<String>,
    pub compressed_from_turns: usize,
    pub original_token_count: u64,
    pub summary_token_count: u64,
}

impl StructuredSummary {
    /// Render the eight sections as a single system-role turn's content,
    /// the representation [`crate::distillation`] substitutes for the
    /// compressed turns (spec §4.4 step 4).
    pub fn render(&self) -> String {
        format!(
            "=== DISTILLED SESSION SUMMARY ===\n\
            Core Goal: {}\n\
            Key Decisions: {}\n\
            Important Facts: {}\n\
            Pending Tasks: {}\n\
            User Preferences: {}\n\
            Context Clues: {}\n\
            Unresolved Issues: {}\n\
            Next Steps: {}\n\
            === END SUMMARY ===",
            self.core_goal,
            self.key_decisions.join("; "),
            self.important_facts.join("; "),
            self.pending_tasks.join("; "),
            self.user_preferences.join("; "),
            self.context_clues.join("; "),
            self.unresolved_issues.join("; "),
            self.next_steps.join("; "),
        )
    }
}

/// The summarizer collaborator: `summarize(turns, target_token_budget)`
/// (spec §4.4 step 3, §6).
#[async_trait]
pub trait Summarizer: Send + Sync {
    async fn summarize(
        &self,
        turns: &[crate::context::Turn],
        target_token_budget: u64,
    ) -> CollabResult<StructuredSummary>;
}

/// Outcome of a save execution (spec §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SaveExecutionResult {
    pub success: bool,
    pub bytes_written: u64,
    pub error: Option<String>,
}

/// The save executor collaborator: operates only on paths the Coordinator
/// has approved (spec §6).
#[async_trait]
pub trait SaveExecutor: Send + Sync {
    async fn execute(
        &self,
        operation_type: crate::coordinator::OperationType,
        path: &str,
        content: &str,
    ) -> CollabResult<SaveExecutionResult>;
}
