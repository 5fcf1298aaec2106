//! Workflow Agent: owns the active plan, runs layered topological
//! execution, and streams progress (spec §4.8).
//!
//! Grounded on `orchestration.rs`'s `OrchestrationMode`/`RalphTask` in the
//! teacher crate — a flat sequential task runner — generalized into
//! layered parallel dispatch over a full DAG, bounded `max_parallel`, and
//! recursive CONTAINER node execution.

use crate::collaborators::{CancellationToken, NodeExecutor, NodeResult, ProgressCallback};
use crate::dag::{DagError, Node, NodeType, WorkflowPlan};
use crate::error::ErrorCode;
use crate::event_bus::{Event, EventBus, ProgressStatus, WorkflowStatus};
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;

/// Retry parameters for the `retry` failure strategy (spec §4.6: "Re-run
/// the failed node up to `max_retries` with configurable backoff").
/// Mirrors `EngineConfig::max_retries`/`retry_backoff`/`retry_backoff_exponential`.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_backoff: Duration,
    pub exponential: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_backoff: Duration::from_secs(1),
            exponential: false,
        }
    }
}

/// Errors raised while executing a [`WorkflowPlan`] (spec §4.8).
#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("plan failed validation: {0}")]
    Dag(#[from] DagError),
    #[error("container nesting exceeds max depth {0}")]
    NestingTooDeep(usize),
    #[error("node {0} not found in plan")]
    NodeNotFound(String),
}

/// Per-node outcome recorded after a workflow run completes (spec §4.8
/// step 5: "aggregate status succeeded iff every non-skipped node succeeded").
#[derive(Debug, Clone)]
pub struct NodeRunRecord {
    pub node_id: String,
    pub result: NodeResult,
    pub skipped: bool,
}

/// Aggregate outcome of one `execute_workflow` run.
#[derive(Debug, Clone)]
pub struct WorkflowRunOutcome {
    pub status: WorkflowStatus,
    pub records: Vec<NodeRunRecord>,
}

/// Owns the active workflow plan (spec §3 "Ownership summary": "the
/// Workflow Agent exclusively owns the active workflow plan and its node
/// states").
pub struct WorkflowAgent {
    plan: Option<WorkflowPlan>,
    max_container_depth: usize,
}

impl WorkflowAgent {
    pub fn new(max_container_depth: usize) -> Self {
        Self {
            plan: None,
            max_container_depth,
        }
    }

    pub fn active_plan(&self) -> Option<&WorkflowPlan> {
        self.plan.as_ref()
    }

    /// Mutation on `DecisionValidated(create_workflow_plan)` (spec §4.8).
    pub fn set_plan(&mut self, plan: WorkflowPlan) -> Result<(), WorkflowError> {
        plan.validate(self.max_container_depth)?;
        self.plan = Some(plan);
        Ok(())
    }

    /// Mutation on `DecisionValidated(create_node)`: append a top-level node.
    pub fn add_node(&mut self, node: Node) -> Result<(), WorkflowError> {
        let plan = self.plan.as_mut().ok_or(WorkflowError::NodeNotFound(node.node_id.clone()))?;
        plan.nodes.push(node);
        plan.validate(self.max_container_depth)?;
        Ok(())
    }

    /// Mutation on `DecisionValidated(modify_node)`: replace a top-level
    /// node's config in place.
    pub fn modify_node(&mut self, node_id: &str, updates: serde_json::Value) -> Result<(), WorkflowError> {
        let plan = self
            .plan
            .as_mut()
            .ok_or_else(|| WorkflowError::NodeNotFound(node_id.to_string()))?;
        let node = plan
            .nodes
            .iter_mut()
            .find(|n| n.node_id == node_id)
            .ok_or_else(|| WorkflowError::NodeNotFound(node_id.to_string()))?;
        node.config = updates;
        Ok(())
    }

    /// Run `execute_workflow` to completion (spec §4.8 steps 1-5): compute
    /// layers, dispatch each layer bounded by `max_parallel`, publish the
    /// progress event sequence for every node, and aggregate the final status.
    ///
    /// `on_node_failure` decides skip/retry/abort for a failed node; this
    /// function does not itself implement the Coordinator's failure
    /// strategy (spec §3 "Cross-owner access is via event messages only") —
    /// it calls back into the caller-supplied closure, which a real
    /// deployment wires to [`crate::coordinator::Coordinator::failure_strategy`].
    /// When the closure returns [`NodeFailureAction::Retry`], this function
    /// itself re-invokes the executor up to `retry_policy.max_retries` times
    /// with backoff, since the closure has no executor handle to do so.
    pub async fn execute(
        &self,
        session_id: &str,
        executor: &dyn NodeExecutor,
        bus: &EventBus,
        max_parallel: usize,
        cancellation: CancellationToken,
        on_progress: ProgressCallback,
        retry_policy: &RetryPolicy,
        mut on_node_failure: impl FnMut(&Node, &NodeResult) -> NodeFailureAction,
    ) -> Result<WorkflowRunOutcome, WorkflowError> {
        let plan = self.plan.as_ref().ok_or(WorkflowError::NodeNotFound("<no active plan>".into()))?;
        let workflow_id = plan.workflow_id.clone();

        bus.publish(Event::WorkflowExecutionStarted {
            session_id: session_id.to_string(),
            workflow_id: workflow_id.clone(),
        })
        .await;

        let layers = plan.kahn_layers()?;
        let mut records = Vec::new();
        let mut skipped: std::collections::HashSet<String> = std::collections::HashSet::new();
        let mut outputs: HashMap<String, serde_json::Value> = HashMap::new();
        let mut aborted = false;

        'layers: for layer in &layers {
            let dispatch_layer = layer.chunks(max_parallel.max(1));
            for chunk in dispatch_layer {
                for node_id in chunk {
                    if aborted {
                        break 'layers;
                    }
                    if cancellation.is_cancelled() {
                        aborted = true;
                        break 'layers;
                    }
                    let Some(node) = plan.find_node(node_id) else {
                        continue;
                    };

                    if node.node_type == NodeType::Container {
                        let record = self
                            .execute_container(node, 1, session_id, &workflow_id, executor, bus, max_parallel, &cancellation, &on_progress, retry_policy, &mut on_node_failure, &mut outputs)
                            .await;
                        let failed = !record.result.success;
                        records.push(record);
                        if failed {
                            aborted = true;
                            break 'layers;
                        }
                        continue;
                    }

                    bus.publish(Event::NodeExecutionStarted {
                        session_id: session_id.to_string(),
                        workflow_id: workflow_id.clone(),
                        node_id: node_id.clone(),
                    })
                    .await;
                    bus.publish(Event::ExecutionProgress {
                        session_id: session_id.to_string(),
                        workflow_id: workflow_id.clone(),
                        node_id: node_id.clone(),
                        status: ProgressStatus::Started,
                        progress: 0.0,
                    })
                    .await;

                    let inputs = resolve_inputs(node, &outputs);
                    let result = executor
                        .execute(node, &inputs, cancellation.clone(), on_progress.clone())
                        .await
                        .unwrap_or_else(|e| {
                            NodeResult::failed(e.to_string(), ErrorCode::Transient, true, 0)
                        });

                    outputs.insert(node_id.clone(), result.output.clone());

                    bus.publish(Event::ExecutionProgress {
                        session_id: session_id.to_string(),
                        workflow_id: workflow_id.clone(),
                        node_id: node_id.clone(),
                        status: if result.success {
                            ProgressStatus::Completed
                        } else {
                            ProgressStatus::Failed
                        },
                        progress: 1.0,
                    })
                    .await;
                    bus.publish(Event::NodeExecutionCompleted {
                        session_id: session_id.to_string(),
                        workflow_id: workflow_id.clone(),
                        node_id: node_id.clone(),
                        success: result.success,
                        error_code: result.error_code,
                    })
                    .await;

                    if !result.success {
                        match on_node_failure(node, &result) {
                            NodeFailureAction::Skip => {
                                skipped.insert(node_id.clone());
                                records.push(NodeRunRecord {
                                    node_id: node_id.clone(),
                                    result,
                                    skipped: true,
                                });
                            }
                            NodeFailureAction::Abort => {
                                records.push(NodeRunRecord {
                                    node_id: node_id.clone(),
                                    result,
                                    skipped: false,
                                });
                                aborted = true;
                                break 'layers;
                            }
                            NodeFailureAction::Retry => {
                                let retried = retry_node(
                                    executor,
                                    node,
                                    &inputs,
                                    &cancellation,
                                    &on_progress,
                                    retry_policy,
                                    bus,
                                    session_id,
                                    &workflow_id,
                                )
                                .await;
                                let retry_succeeded = retried.success;
                                outputs.insert(node_id.clone(), retried.output.clone());
                                records.push(NodeRunRecord {
                                    node_id: node_id.clone(),
                                    result: retried,
                                    skipped: false,
                                });
                                if !retry_succeeded {
                                    aborted = true;
                                    break 'layers;
                                }
                            }
                        }
                    } else {
                        records.push(NodeRunRecord {
                            node_id: node_id.clone(),
                            result,
                            skipped: false,
                        });
                    }
                }
            }
        }

        let status = if aborted {
            WorkflowStatus::Failed
        } else if records.iter().any(|r| !r.skipped && !r.result.success) {
            WorkflowStatus::Failed
        } else if records.iter().any(|r| r.skipped) {
            WorkflowStatus::PartiallySucceeded
        } else {
            WorkflowStatus::Succeeded
        };

        bus.publish(Event::WorkflowExecutionCompleted {
            session_id: session_id.to_string(),
            workflow_id,
            status,
        })
        .await;

        Ok(WorkflowRunOutcome { status, records })
    }

    /// Recursive CONTAINER node execution, bounded by `max_container_depth`
    /// (spec §4.8 "Hierarchical nodes"). Runs its children's own layering,
    /// in parallel or sequentially per `node.parallel`.
    #[allow(clippy::too_many_arguments)]
    async fn execute_container<'a>(
        &'a self,
        node: &'a Node,
        depth: usize,
        session_id: &str,
        workflow_id: &str,
        executor: &dyn NodeExecutor,
        bus: &EventBus,
        max_parallel: usize,
        cancellation: &CancellationToken,
        on_progress: &ProgressCallback,
        retry_policy: &RetryPolicy,
        on_node_failure: &mut impl FnMut(&Node, &NodeResult) -> NodeFailureAction,
        outputs: &mut HashMap<String, serde_json::Value>,
    ) -> NodeRunRecord {
        if depth > self.max_container_depth {
            return NodeRunRecord {
                node_id: node.node_id.clone(),
                result: NodeResult::failed(
                    format!("container nesting exceeds max depth {}", self.max_container_depth),
                    ErrorCode::InvalidConfig,
                    false,
                    0,
                ),
                skipped: false,
            };
        }

        let children = node.children.as_deref().unwrap_or(&[]);
        bus.publish(Event::NodeExecutionStarted {
            session_id: session_id.to_string(),
            workflow_id: workflow_id.to_string(),
            node_id: node.node_id.clone(),
        })
        .await;

        let mut all_succeeded = true;
        let effective_parallel = if node.parallel { max_parallel } else { 1 };
        for child in children.chunks(effective_parallel.max(1)) {
            for child_node in child {
                let inputs = resolve_inputs(child_node, outputs);
                let result = executor
                    .execute(child_node, &inputs, cancellation.clone(), on_progress.clone())
                    .await
                    .unwrap_or_else(|e| NodeResult::failed(e.to_string(), ErrorCode::Transient, true, 0));
                outputs.insert(child_node.node_id.clone(), result.output.clone());
                if !result.success {
                    match on_node_failure(child_node, &result) {
                        NodeFailureAction::Skip => {}
                        NodeFailureAction::Abort => {
                            all_succeeded = false;
                        }
                        NodeFailureAction::Retry => {
                            let retried = retry_node(
                                executor,
                                child_node,
                                &inputs,
                                cancellation,
                                on_progress,
                                retry_policy,
                                bus,
                                session_id,
                                workflow_id,
                            )
                            .await;
                            if !retried.success {
                                all_succeeded = false;
                            }
                            outputs.insert(child_node.node_id.clone(), retried.output.clone());
                        }
                    }
                }
            }
        }

        bus.publish(Event::NodeExecutionCompleted {
            session_id: session_id.to_string(),
            workflow_id: workflow_id.to_string(),
            node_id: node.node_id.clone(),
            success: all_succeeded,
            error_code: None,
        })
        .await;

        NodeRunRecord {
            node_id: node.node_id.clone(),
            result: if all_succeeded {
                NodeResult::ok(serde_json::Value::Null, 0)
            } else {
                NodeResult::failed("one or more child nodes failed", ErrorCode::Permanent, false, 0)
            },
            skipped: false,
        }
    }

    /// Optional post-completion assessment (spec §4.8 "Reflection").
    /// Assessment logic itself is external; this only shapes the event.
    pub async fn reflect(
        &self,
        bus: &EventBus,
        session_id: &str,
        workflow_id: &str,
        assessment: String,
        should_retry: bool,
        confidence: f64,
        recommendations: Vec<String>,
    ) {
        bus.publish(Event::WorkflowReflectionCompleted {
            session_id: session_id.to_string(),
            workflow_id: workflow_id.to_string(),
            assessment,
            should_retry,
            confidence,
            recommendations,
        })
        .await;
    }
}

/// What the caller's failure-strategy callback decided for a failed node
/// (spec §4.6 "Failure strategy", §4.8 step 4). `Retry` re-invokes the
/// executor with backoff in place, since the closure itself has no
/// executor handle.
pub enum NodeFailureAction {
    Skip,
    Abort,
    Retry,
}

/// Re-run a failed node against `retry_policy` (spec §4.6: "Re-run the
/// failed node up to `max_retries` with configurable backoff"). Publishes
/// the same start/complete event pair as a normal dispatch for every
/// attempt. Returns the last attempt's result whether it finally succeeded
/// or the retry budget ran out.
#[allow(clippy::too_many_arguments)]
async fn retry_node(
    executor: &dyn NodeExecutor,
    node: &Node,
    inputs: &HashMap<String, serde_json::Value>,
    cancellation: &CancellationToken,
    on_progress: &ProgressCallback,
    retry_policy: &RetryPolicy,
    bus: &EventBus,
    session_id: &str,
    workflow_id: &str,
) -> NodeResult {
    let mut backoff = retry_policy.base_backoff;
    let mut last = NodeResult::failed("retry budget is zero", ErrorCode::Transient, true, 0);

    for _attempt in 0..retry_policy.max_retries {
        if cancellation.is_cancelled() {
            break;
        }
        if !backoff.is_zero() {
            tokio::time::sleep(backoff).await;
        }

        bus.publish(Event::NodeExecutionStarted {
            session_id: session_id.to_string(),
            workflow_id: workflow_id.to_string(),
            node_id: node.node_id.clone(),
        })
        .await;

        last = executor
            .execute(node, inputs, cancellation.clone(), on_progress.clone())
            .await
            .unwrap_or_else(|e| NodeResult::failed(e.to_string(), ErrorCode::Transient, true, 0));

        bus.publish(Event::NodeExecutionCompleted {
            session_id: session_id.to_string(),
            workflow_id: workflow_id.to_string(),
            node_id: node.node_id.clone(),
            success: last.success,
            error_code: last.error_code,
        })
        .await;

        if last.success {
            break;
        }
        if retry_policy.exponential {
            backoff *= 2;
        }
    }

    last
}

/// Resolve `${node_X.output.field}`-style references in `node.input_mapping`
/// against already-completed node outputs (spec §3 `input_mapping`).
fn resolve_inputs(node: &Node, outputs: &HashMap<String, serde_json::Value>) -> HashMap<String, serde_json::Value> {
    let mut resolved = HashMap::new();
    if let Some(mapping) = &node.input_mapping {
        for (key, reference) in mapping {
            if let Some(value) = resolve_reference(reference, outputs) {
                resolved.insert(key.clone(), value);
            }
        }
    }
    resolved
}

fn resolve_reference(reference: &str, outputs: &HashMap<String, serde_json::Value>) -> Option<serde_json::Value> {
    let inner = reference.strip_prefix("${")?.strip_suffix('}')?;
    let mut parts = inner.splitn(3, '.');
    let node_id = parts.next()?.strip_prefix("node_").unwrap_or(parts.next().unwrap_or(""));
    let _ = parts.next();
    let field = parts.next();
    let output = outputs.get(node_id)?;
    match field {
        Some(field) => output.get(field).cloned(),
        None => Some(output.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::CollabResult;
    use crate::dag::{Edge, GlobalConfig};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct AlwaysSucceeds;

    #[async_trait]
    impl NodeExecutor for AlwaysSucceeds {
        async fn execute(
            &self,
            _node_spec: &Node,
            _inputs: &HashMap<String, serde_json::Value>,
            _cancellation: CancellationToken,
            _on_progress: ProgressCallback,
        ) -> CollabResult<NodeResult> {
            Ok(NodeResult::ok(serde_json::json!({"ok": true}), 5))
        }
    }

    struct FailsOnNode(String);

    #[async_trait]
    impl NodeExecutor for FailsOnNode {
        async fn execute(
            &self,
            node_spec: &Node,
            _inputs: &HashMap<String, serde_json::Value>,
            _cancellation: CancellationToken,
            _on_progress: ProgressCallback,
        ) -> CollabResult<NodeResult> {
            if node_spec.node_id == self.0 {
                Ok(NodeResult::failed("boom", ErrorCode::Permanent, false, 1))
            } else {
                Ok(NodeResult::ok(serde_json::json!({}), 1))
            }
        }
    }

    fn linear_plan() -> WorkflowPlan {
        WorkflowPlan {
            workflow_id: "wf-1".into(),
            name: "linear".into(),
            description: "".into(),
            nodes: vec![
                Node::new("a", NodeType::Http, serde_json::json!({"url": "x", "method": "GET"})),
                Node::new("b", NodeType::Http, serde_json::json!({"url": "x", "method": "GET"})),
            ],
            edges: vec![Edge {
                source: "a".into(),
                target: "b".into(),
                condition: None,
            }],
            global_config: GlobalConfig::default(),
        }
    }

    fn noop_progress() -> ProgressCallback {
        Arc::new(|_, _, _| {})
    }

    fn instant_retry_policy() -> RetryPolicy {
        RetryPolicy {
            max_retries: 3,
            base_backoff: Duration::from_millis(0),
            exponential: false,
        }
    }

    #[tokio::test]
    async fn successful_run_yields_matching_started_and_completed_counts() {
        let mut agent = WorkflowAgent::new(5);
        agent.set_plan(linear_plan()).unwrap();
        let bus = EventBus::new();
        let started = Arc::new(AtomicUsize::new(0));
        let completed = Arc::new(AtomicUsize::new(0));

        struct Counter {
            started: Arc<AtomicUsize>,
            completed: Arc<AtomicUsize>,
        }
        #[async_trait]
        impl crate::event_bus::Subscriber for Counter {
            async fn handle(&self, event: &Event) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
                match event {
                    Event::NodeExecutionStarted { .. } => {
                        self.started.fetch_add(1, Ordering::SeqCst);
                    }
                    Event::NodeExecutionCompleted { .. } => {
                        self.completed.fetch_add(1, Ordering::SeqCst);
                    }
                    _ => {}
                }
                Ok(())
            }
        }
        let mut bus_mut = bus;
        bus_mut.subscribe(Arc::new(Counter {
            started: started.clone(),
            completed: completed.clone(),
        }));

        let (_trigger, token) = CancellationToken::new();
        let outcome = agent
            .execute(
                "s1",
                &AlwaysSucceeds,
                &bus_mut,
                3,
                token,
                noop_progress(),
                &instant_retry_policy(),
                |_, _| NodeFailureAction::Abort,
            )
            .await
            .unwrap();

        assert_eq!(outcome.status, WorkflowStatus::Succeeded);
        assert_eq!(started.load(Ordering::SeqCst), completed.load(Ordering::SeqCst));
        assert_eq!(started.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn skip_strategy_marks_node_skipped_and_continues() {
        let mut agent = WorkflowAgent::new(5);
        agent.set_plan(linear_plan()).unwrap();
        let bus = EventBus::new();
        let (_trigger, token) = CancellationToken::new();

        let outcome = agent
            .execute(
                "s1",
                &FailsOnNode("a".into()),
                &bus,
                3,
                token,
                noop_progress(),
                &instant_retry_policy(),
                |_, _| NodeFailureAction::Skip,
            )
            .await
            .unwrap();

        assert_eq!(outcome.status, WorkflowStatus::PartiallySucceeded);
        assert!(outcome.records.iter().find(|r| r.node_id == "a").unwrap().skipped);
    }

    #[tokio::test]
    async fn abort_strategy_stops_before_downstream_nodes() {
        let mut agent = WorkflowAgent::new(5);
        agent.set_plan(linear_plan()).unwrap();
        let bus = EventBus::new();
        let (_trigger, token) = CancellationToken::new();

        let outcome = agent
            .execute(
                "s1",
                &FailsOnNode("a".into()),
                &bus,
                3,
                token,
                noop_progress(),
                &instant_retry_policy(),
                |_, _| NodeFailureAction::Abort,
            )
            .await
            .unwrap();

        assert_eq!(outcome.status, WorkflowStatus::Failed);
        assert_eq!(outcome.records.len(), 1);
    }

    struct FailsNTimesThenSucceeds {
        remaining_failures: std::sync::atomic::AtomicU32,
        attempts: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl NodeExecutor for FailsNTimesThenSucceeds {
        async fn execute(
            &self,
            _node_spec: &Node,
            _inputs: &HashMap<String, serde_json::Value>,
            _cancellation: CancellationToken,
            _on_progress: ProgressCallback,
        ) -> CollabResult<NodeResult> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            if self.remaining_failures.load(Ordering::SeqCst) > 0 {
                self.remaining_failures.fetch_sub(1, Ordering::SeqCst);
                Ok(NodeResult::failed("transient", ErrorCode::Transient, true, 1))
            } else {
                Ok(NodeResult::ok(serde_json::json!({}), 1))
            }
        }
    }

    fn single_node_plan() -> WorkflowPlan {
        WorkflowPlan {
            workflow_id: "wf-retry".into(),
            name: "single".into(),
            description: "".into(),
            nodes: vec![Node::new("a", NodeType::Http, serde_json::json!({"url": "x", "method": "GET"}))],
            edges: vec![],
            global_config: GlobalConfig::default(),
        }
    }

    #[tokio::test]
    async fn retry_strategy_re_executes_the_failed_node_up_to_max_retries_with_backoff() {
        let mut agent = WorkflowAgent::new(5);
        agent.set_plan(single_node_plan()).unwrap();
        let bus = EventBus::new();
        let (_trigger, token) = CancellationToken::new();
        let executor = FailsNTimesThenSucceeds {
            remaining_failures: std::sync::atomic::AtomicU32::new(2),
            attempts: Arc::new(AtomicUsize::new(0)),
        };
        let attempts = executor.attempts.clone();

        let outcome = agent
            .execute(
                "s1",
                &executor,
                &bus,
                3,
                token,
                noop_progress(),
                &instant_retry_policy(),
                |_, _| NodeFailureAction::Retry,
            )
            .await
            .unwrap();

        // 1 initial dispatch + 2 retries to exhaust `remaining_failures`.
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
        assert_eq!(outcome.status, WorkflowStatus::Succeeded);
        assert!(outcome.records[0].result.success);
    }

    #[tokio::test]
    async fn retry_strategy_gives_up_after_exhausting_max_retries() {
        let mut agent = WorkflowAgent::new(5);
        agent.set_plan(single_node_plan()).unwrap();
        let bus = EventBus::new();
        let (_trigger, token) = CancellationToken::new();
        let executor = FailsNTimesThenSucceeds {
            remaining_failures: std::sync::atomic::AtomicU32::new(100),
            attempts: Arc::new(AtomicUsize::new(0)),
        };
        let attempts = executor.attempts.clone();
        let policy = RetryPolicy {
            max_retries: 2,
            base_backoff: Duration::from_millis(0),
            exponential: false,
        };

        let outcome = agent
            .execute(
                "s1",
                &executor,
                &bus,
                3,
                token,
                noop_progress(),
                &policy,
                |_, _| NodeFailureAction::Retry,
            )
            .await
            .unwrap();

        // 1 initial dispatch + 2 retries, both of which also fail.
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
        assert_eq!(outcome.status, WorkflowStatus::Failed);
    }

    #[tokio::test]
    async fn modify_node_updates_config_in_place() {
        let mut agent = WorkflowAgent::new(5);
        agent.set_plan(linear_plan()).unwrap();
        agent.modify_node("a", serde_json::json!({"url": "y", "method": "POST"})).unwrap();
        let plan = agent.active_plan().unwrap();
        let node = plan.find_node("a").unwrap();
        assert_eq!(node.config["url"], "y");
    }
}
