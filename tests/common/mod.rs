//! Shared mock collaborators for the integration suite, implementing the
//! traits in `agentflow_core::agentflow::collaborators` the way the crate's
//! own external dependencies (LLM provider, node sandbox, summarizer, save
//! executor) would be implemented by a real deployment.

use agentflow_core::agentflow::collaborators::{
    CancellationToken, CollabResult, LlmMessage, LlmProvider, LlmResponse, NodeExecutor,
    NodeResult, ProgressCallback, SaveExecutionResult, SaveExecutor, StructuredSummary,
    Summarizer, ToolSpec, TokenUsage,
};
use agentflow_core::agentflow::context::Turn;
use agentflow_core::agentflow::coordinator::OperationType;
use agentflow_core::agentflow::dag::Node;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

/// Replays a fixed script of responses, one per call; panics if the script
/// runs dry so a test fails loudly instead of hanging.
pub struct ScriptedLlmProvider {
    responses: Mutex<Vec<LlmResponse>>,
}

impl ScriptedLlmProvider {
    pub fn new(contents: Vec<&str>) -> Self {
        let responses = contents
            .into_iter()
            .rev()
            .map(|c| LlmResponse {
                content: c.to_string(),
                tool_calls: Vec::new(),
                usage: Some(TokenUsage {
                    prompt_tokens: 10,
                    completion_tokens: 5,
                }),
            })
            .collect();
        Self {
            responses: Mutex::new(responses),
        }
    }
}

#[async_trait]
impl LlmProvider for ScriptedLlmProvider {
    async fn invoke(
        &self,
        _messages: &[LlmMessage],
        _tools: &[ToolSpec],
        _model: &str,
        _stream: bool,
    ) -> CollabResult<LlmResponse> {
        self.responses
            .lock()
            .unwrap()
            .pop()
            .ok_or_else(|| "scripted LLM provider ran out of responses".into())
    }
}

/// Executes every node successfully, echoing its node_id in the output.
pub struct AlwaysSucceedsExecutor;

#[async_trait]
impl NodeExecutor for AlwaysSucceedsExecutor {
    async fn execute(
        &self,
        node_spec: &Node,
        _inputs: &HashMap<String, serde_json::Value>,
        _cancellation: CancellationToken,
        _on_progress: ProgressCallback,
    ) -> CollabResult<NodeResult> {
        Ok(NodeResult::ok(
            serde_json::json!({"node_id": node_spec.node_id}),
            1,
        ))
    }
}

/// Returns a canned, deterministic summary regardless of input, recording
/// how many turns it was asked to compress.
pub struct StubSummarizer;

#[async_trait]
impl Summarizer for StubSummarizer {
    async fn summarize(&self, turns: &[Turn], _target_token_budget: u64) -> CollabResult<StructuredSummary> {
        Ok(StructuredSummary {
            core_goal: "integration test goal".into(),
            key_decisions: vec!["decided to proceed".into()],
            compressed_from_turns: turns.len(),
            summary_token_count: 12,
            ..Default::default()
        })
    }
}

/// Records every save call it receives instead of touching the filesystem.
pub struct RecordingSaveExecutor {
    pub calls: Mutex<Vec<(OperationType, String, String)>>,
}

impl RecordingSaveExecutor {
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl SaveExecutor for RecordingSaveExecutor {
    async fn execute(
        &self,
        operation_type: OperationType,
        path: &str,
        content: &str,
    ) -> CollabResult<SaveExecutionResult> {
        self.calls
            .lock()
            .unwrap()
            .push((operation_type, path.to_string(), content.to_string()));
        Ok(SaveExecutionResult {
            success: true,
            bytes_written: content.len() as u64,
            error: None,
        })
    }
}

pub fn noop_progress() -> ProgressCallback {
    std::sync::Arc::new(|_, _, _| {})
}

static LOGGER_INIT: std::sync::Once = std::sync::Once::new();

/// Initializes the test harness's logger once per binary, matching how
/// `cloudllm`'s example binaries call `env_logger::Builder::...init()`
/// themselves rather than from library code.
pub fn init_test_logging() {
    LOGGER_INIT.call_once(|| {
        let _ = env_logger::Builder::from_default_env()
            .is_test(true)
            .try_init();
    });
}
