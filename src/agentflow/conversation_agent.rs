//! Conversation Agent: state machine, goal stack, intent classification,
//! and the ReAct loop (spec §4.7).
//!
//! Grounded on `agent.rs`'s `Agent`/`AgentResponse` pairing and
//! `planner.rs`'s `Planner` trait in the teacher crate — the former gives
//! the state-machine shell, the latter the "ask an LLM, get back a
//! decision, validate it" loop shape this module generalizes into the
//! five-state machine and dependency-aware planning spec §4.7 requires.

use crate::collaborators::{LlmMessage, LlmProvider, ToolSpec};
use crate::dag::{DagError, Edge, Node, NodeType, WorkflowPlan};
use crate::decision::{Decision, DecisionPayload, FieldError};
use crate::supervision::{ContextInjection, InjectionPoint};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Conversation Agent state machine (spec §4.7).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentState {
    Idle,
    Classifying,
    Processing,
    Responding,
    WaitingForSubagent,
}

/// Intent classification result (spec §4.7: five kinds with a confidence score).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    Greeting,
    SimpleQuery,
    ComplexTask,
    WorkflowRequest,
    Unknown,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntentClassification {
    pub intent: Intent,
    pub confidence: f64,
}

/// A task to accomplish, forming a LIFO stack (spec §3 `Goal`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GoalStatus {
    Pending,
    Active,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Goal {
    pub goal_id: String,
    pub description: String,
    pub parent_id: Option<String>,
    pub status: GoalStatus,
}

/// LIFO goal stack (spec §4.7 "Goal stack").
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GoalStack {
    goals: Vec<Goal>,
}

impl GoalStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_goal(&mut self, goal: Goal) {
        self.goals.push(goal);
    }

    pub fn pop_goal(&mut self) -> Option<Goal> {
        self.goals.pop()
    }

    pub fn top(&self) -> Option<&Goal> {
        self.goals.last()
    }

    pub fn is_empty(&self) -> bool {
        self.goals.is_empty()
    }

    /// Push a decomposed goal's ordered sub-goals so they process LIFO
    /// (spec §4.7: "Decomposition... each is pushed and processed LIFO").
    pub fn decompose_goal(&mut self, parent: &Goal, sub_goal_descriptions: Vec<String>) {
        for description in sub_goal_descriptions {
            self.push_goal(Goal {
                goal_id: format!("{}-{}", parent.goal_id, uuid::Uuid::new_v4()),
                description,
                parent_id: Some(parent.goal_id.clone()),
                status: GoalStatus::Pending,
            });
        }
    }
}

/// One iteration record in the ReAct log (spec §3 `ReActStep`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepType {
    Reasoning,
    Action,
    Observation,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReActStep {
    pub step_type: StepType,
    pub thought: Option<String>,
    pub action: Option<DecisionPayload>,
    pub observation: Option<String>,
}

/// Errors raised by the Conversation Agent (spec §4.7).
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("workflow plan failed dependency-aware fail-fast check: {0}")]
    Dag(#[from] DagError),
    #[error("llm collaborator failed: {0}")]
    LlmFailed(String),
    #[error("max iterations ({0}) reached without resolution")]
    MaxIterationsReached(usize),
}

/// Map an [`Intent`] to the decision kind it produces (spec §4.7):
/// greeting/simple_query -> respond; complex_task -> create_node |
/// create_workflow_plan | spawn_subagent; workflow_request ->
/// execute_workflow | create_workflow_plan; unknown -> request_clarification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoutingHint {
    Respond,
    CreateNodeOrPlanOrSubagent,
    ExecuteOrCreatePlan,
    RequestClarification,
}

pub fn route_intent(intent: Intent) -> RoutingHint {
    match intent {
        Intent::Greeting | Intent::SimpleQuery => RoutingHint::Respond,
        Intent::ComplexTask => RoutingHint::CreateNodeOrPlanOrSubagent,
        Intent::WorkflowRequest => RoutingHint::ExecuteOrCreatePlan,
        Intent::Unknown => RoutingHint::RequestClarification,
    }
}

/// State held across ReAct iterations for one user turn (spec §4.7 steps 1-6).
pub struct ReActLoop {
    pub state: AgentState,
    pub steps: Vec<ReActStep>,
    pub consecutive_rejections: u32,
    pub max_iterations: usize,
    pub max_consecutive_rejections: u32,
    pub cancelled: bool,
}

impl ReActLoop {
    pub fn new(max_iterations: usize, max_consecutive_rejections: u32) -> Self {
        Self {
            state: AgentState::Idle,
            steps: Vec::new(),
            consecutive_rejections: 0,
            max_iterations,
            max_consecutive_rejections,
            cancelled: false,
        }
    }

    /// Step 1+3 of spec §4.7: consume injections of the given point,
    /// marking them applied.
    pub fn consume_injections(injections: &mut [ContextInjection], point: InjectionPoint) -> Vec<String> {
        let mut contents = Vec::new();
        for injection in injections.iter_mut() {
            if injection.point == point && !injection.applied {
                contents.push(injection.content.clone());
                injection.applied = true;
            }
        }
        contents
    }

    /// Step 2 of spec §4.7: call the LLM with the current loop state and
    /// record a `reasoning` step.
    pub async fn think(
        &mut self,
        llm: &dyn LlmProvider,
        messages: &[LlmMessage],
        tools: &[ToolSpec],
        model: &str,
    ) -> Result<String, AgentError> {
        let response = llm
            .invoke(messages, tools, model, false)
            .await
            .map_err(|e| AgentError::LlmFailed(e.to_string()))?;
        self.steps.push(ReActStep {
            step_type: StepType::Reasoning,
            thought: Some(response.content.clone()),
            action: None,
            observation: None,
        });
        Ok(response.content)
    }

    /// Step 5 of spec §4.7: record a rejection and decide whether to force
    /// `request_clarification` after three consecutive rejections.
    pub fn record_rejection(&mut self, errors: &[FieldError]) -> bool {
        self.consecutive_rejections += 1;
        self.steps.push(ReActStep {
            step_type: StepType::Observation,
            thought: None,
            action: None,
            observation: Some(format!("rejected: {errors:?}")),
        });
        self.consecutive_rejections >= self.max_consecutive_rejections
    }

    pub fn record_validated(&mut self, decision: &Decision) {
        self.consecutive_rejections = 0;
        self.steps.push(ReActStep {
            step_type: StepType::Action,
            thought: None,
            action: Some(decision.payload.clone()),
            observation: None,
        });
    }

    /// Cancellation check at the top of each iteration (spec §4.7
    /// "Cancellation", §5 "checked at every suspension point").
    pub fn cancel(&mut self) {
        self.cancelled = true;
    }

    pub fn should_continue(&self, iteration: usize) -> bool {
        !self.cancelled && iteration < self.max_iterations
    }
}

/// Dependency-aware planning helper (spec §4.7): detect `input_mapping`
/// references and sequence dependencies, reflect them as edges, then run
/// the same Kahn check the Coordinator runs so an invalid plan fails fast
/// before publication.
pub fn infer_edges_from_input_mappings(nodes: &[Node]) -> Vec<Edge> {
    let mut edges = Vec::new();
    for node in nodes {
        let Some(mapping) = &node.input_mapping else { continue };
        for reference in mapping.values() {
            if let Some(source) = extract_referenced_node_id(reference) {
                if nodes.iter().any(|n| n.node_id == source) && source != node.node_id {
                    edges.push(Edge {
                        source,
                        target: node.node_id.clone(),
                        condition: None,
                    });
                }
            }
        }
    }
    edges
}

fn extract_referenced_node_id(reference: &str) -> Option<String> {
    let inner = reference.strip_prefix("${")?.strip_suffix('}')?;
    let node_part = inner.split('.').next()?;
    node_part.strip_prefix("node_").map(|s| s.to_string())
}

/// Run the Kahn fail-fast check the Coordinator would also run, before
/// publishing a `create_workflow_plan` decision (spec §4.7).
pub fn fail_fast_validate(plan: &WorkflowPlan, max_container_depth: usize) -> Result<(), DagError> {
    plan.validate(max_container_depth)
}

/// Encode a conditional branch expression as a CONDITION node wired
/// between `from` and the two outcome targets (spec §4.7 "(c) encode
/// conditional branches as CONDITION nodes").
pub fn condition_node(node_id: impl Into<String>, expression: impl Into<String>) -> Node {
    Node::new(
        node_id,
        NodeType::Condition,
        serde_json::json!({ "expression": expression.into() }),
    )
}
