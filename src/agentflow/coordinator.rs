//! Gatekeeper and supervisor (spec §4.6).
//!
//! Grounded on `planner.rs`'s `PolicyEngine`/`MemoryStore` pairing in the
//! teacher crate: one trait validates and one persists, both invoked from
//! a central orchestrating struct. `Coordinator` plays that orchestrating
//! role across validation, failure strategy, the save-request queue, and
//! supervision dispatch.

use crate::dag::DagError;
use crate::decision::{validate_payload, Decision, DecisionPayload, FieldError, ValidationError};
use crate::error::{ErrorClass, ErrorCode};
use crate::rules::{Action, RuleConfig};
use crate::supervision::{
    builtin_rules, evaluate_rules, governing_action, InterventionAction, SupervisionContext,
    SupervisionRule,
};
use serde::{Deserialize, Serialize};
use std::collections::{BinaryHeap, HashSet};
use thiserror::Error;

/// Kind of persistence operation a [`SaveRequest`] performs (spec §3, §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationType {
    FileWrite,
    FileAppend,
    FileDelete,
    ConfigUpdate,
}

/// Request priority (spec §3): higher sorts first in the Coordinator's queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SaveRequestPriority {
    Low,
    Normal,
    High,
    Critical,
}

/// Persistence request from the Conversation Agent (spec §3 `SaveRequest`).
/// The Conversation Agent never performs file I/O directly (spec §8 invariant 7);
/// every mutation is routed through this queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SaveRequest {
    pub request_id: String,
    pub target_path: String,
    pub content: String,
    pub operation_type: OperationType,
    pub session_id: String,
    pub reason: String,
    pub priority: SaveRequestPriority,
}

/// Queue entry ordered by `(priority, arrival_time)` — arrival order
/// breaks ties within the same priority (spec §4.6: "enqueues by
/// (priority, arrival_time)").
struct QueueEntry {
    request: SaveRequest,
    arrival_seq: u64,
}

impl PartialEq for QueueEntry {
    fn eq(&self, other: &Self) -> bool {
        self.request.priority == other.request.priority && self.arrival_seq == other.arrival_seq
    }
}
impl Eq for QueueEntry {}
impl PartialOrd for QueueEntry {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for QueueEntry {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.request
            .priority
            .cmp(&other.request.priority)
            .then_with(|| other.arrival_seq.cmp(&self.arrival_seq))
    }
}

/// Failure-recovery strategy for a failed workflow node (spec §4.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureStrategy {
    Retry,
    Skip,
    Abort,
    Replan,
}

impl FailureStrategy {
    /// Default strategy per error class when no per-node override is set
    /// (spec §4.6: "Default strategy is retry... classification... determines
    /// the effective strategy if not overridden").
    pub fn default_for(class: ErrorClass) -> Self {
        match class {
            ErrorClass::Transient => FailureStrategy::Retry,
            ErrorClass::Permanent => FailureStrategy::Abort,
            ErrorClass::Resource => FailureStrategy::Replan,
            ErrorClass::Policy => FailureStrategy::Replan,
            ErrorClass::Validation => FailureStrategy::Replan,
        }
    }
}

/// Coordinator-side errors, none of which should ever crash the engine
/// (spec §7: "a failure in one node does not propagate automatically").
#[derive(Debug, Error)]
pub enum CoordinatorError {
    #[error("decision payload rejected: {0}")]
    PayloadRejected(#[from] ValidationError),
    #[error("workflow plan failed DAG validation: {0}")]
    Dag(#[from] DagError),
    #[error("save request denied by rule {rule_id}: {message}")]
    SaveDenied { rule_id: String, message: String },
}

/// Verdict produced by [`Coordinator::validate`] for a single decision
/// (spec §4.6 steps 1-4).
pub enum ValidationOutcome {
    Validated(Decision),
    Rejected(Vec<FieldError>),
}

/// Outcome of evaluating the safety rule chain against a save request's
/// path/content/actor (spec §4.6 step 3, §4.10).
#[derive(Debug, Clone)]
pub struct SafetyVerdict {
    pub action: Action,
    pub triggering_rule_id: Option<String>,
    pub message: Option<String>,
}

/// Central supervisor: payload/DAG/safety validation, failure-strategy
/// dispatch, save-request priority queue, and supervision rule evaluation
/// (spec §4.6). Owns the rule chain, failure policy, save-request queue,
/// and supervision logs exclusively (spec §3 "Ownership summary").
pub struct Coordinator {
    max_payload_bytes: usize,
    max_container_depth: usize,
    known_node_ids: HashSet<String>,
    known_subagent_types: HashSet<String>,
    save_queue: BinaryHeap<QueueEntry>,
    next_arrival_seq: u64,
    rule_config: RuleConfig,
    supervision_rules: Vec<SupervisionRule>,
    audit_log: Vec<AuditEntry>,
}

/// A single audited Coordinator action (spec §4.5 audit shape reused here
/// for save-request decisions, since spec §4.6 says "Every decision is
/// audited" without prescribing a distinct shape).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub request_id: String,
    pub action: Action,
    pub triggering_rule_id: Option<String>,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl Coordinator {
    pub fn new(
        max_payload_bytes: usize,
        max_container_depth: usize,
        rule_config: RuleConfig,
        warning_threshold: f64,
        saturation_threshold: f64,
    ) -> Self {
        Self {
            max_payload_bytes,
            max_container_depth,
            known_node_ids: HashSet::new(),
            known_subagent_types: HashSet::new(),
            save_queue: BinaryHeap::new(),
            next_arrival_seq: 0,
            rule_config,
            supervision_rules: builtin_rules(warning_threshold, saturation_threshold),
            audit_log: Vec::new(),
        }
    }

    pub fn register_subagent_type(&mut self, subagent_type: impl Into<String>) {
        self.known_subagent_types.insert(subagent_type.into());
    }

    pub fn register_node_id(&mut self, node_id: impl Into<String>) {
        self.known_node_ids.insert(node_id.into());
    }

    pub fn forget_node_id(&mut self, node_id: &str) {
        self.known_node_ids.remove(node_id);
    }

    /// Steps 1-2 of spec §4.6: payload schema validation, then (for
    /// `create_workflow_plan`) DAG validation via [`validate_payload`]'s
    /// embedded Kahn check.
    pub fn validate(&self, decision: Decision, serialized_len: usize) -> ValidationOutcome {
        match validate_payload(
            &decision.payload,
            serialized_len,
            self.max_payload_bytes,
            &self.known_node_ids,
            &self.known_subagent_types,
            self.max_container_depth,
        ) {
            Ok(()) => {}
            Err(ValidationError::FieldErrors(errs)) => return ValidationOutcome::Rejected(errs),
            Err(ValidationError::PayloadTooLarge { max_bytes, actual_bytes }) => {
                return ValidationOutcome::Rejected(vec![FieldError::new(
                    "payload",
                    format!("exceeds max size of {max_bytes} bytes (was {actual_bytes})"),
                )]);
            }
            Err(ValidationError::Dag(dag_err)) => {
                return ValidationOutcome::Rejected(vec![FieldError::new("plan", dag_err.to_string())]);
            }
        }

        if let Some(errs) = self.safety_check(&decision.payload) {
            return ValidationOutcome::Rejected(errs);
        }

        ValidationOutcome::Validated(decision)
    }

    /// Step 3 of spec §4.6: enforce the configured rule set (path
    /// blacklist/whitelist, content patterns, user-level, command rules)
    /// against any file path embedded in a `create_node`/`modify_node`
    /// config.
    fn safety_check(&self, payload: &DecisionPayload) -> Option<Vec<FieldError>> {
        let config = match payload {
            DecisionPayload::CreateNode { config, .. } => Some(config),
            DecisionPayload::ModifyNode { updates, .. } => Some(updates),
            _ => None,
        }?;

        let path = config.get("path").and_then(|v| v.as_str())?;
        let content = config.get("content").and_then(|v| v.as_str()).unwrap_or("");
        let (action, rule_id, message) = self.rule_config.evaluate(path, content, "system", None);
        if action == Action::Allow {
            return None;
        }
        Some(vec![FieldError::new(
            "config.path",
            message.unwrap_or_else(|| {
                format!(
                    "path '{path}' rejected by rule {}",
                    rule_id.as_deref().unwrap_or("<default>")
                )
            }),
        )])
    }

    /// Resolve the effective failure strategy for a failed node, honoring
    /// a per-node override if supplied (spec §4.6 "Failure strategy").
    pub fn failure_strategy(
        &self,
        error_code: ErrorCode,
        per_node_override: Option<FailureStrategy>,
    ) -> FailureStrategy {
        per_node_override.unwrap_or_else(|| FailureStrategy::default_for(error_code.class()))
    }

    /// Enqueue a save request for later processing (spec §4.6 "Save-request queue").
    pub fn enqueue_save_request(&mut self, request: SaveRequest) {
        let entry = QueueEntry {
            request,
            arrival_seq: self.next_arrival_seq,
        };
        self.next_arrival_seq += 1;
        self.save_queue.push(entry);
    }

    /// Pop and evaluate the single highest-priority queued save request.
    /// Returns `None` if the queue is empty.
    pub fn process_next_save_request(&mut self) -> Option<(SaveRequest, SafetyVerdict)> {
        let entry = self.save_queue.pop()?;
        let verdict = self.evaluate_save_request(&entry.request);
        self.audit_log.push(AuditEntry {
            request_id: entry.request.request_id.clone(),
            action: verdict.action,
            triggering_rule_id: verdict.triggering_rule_id.clone(),
            timestamp: chrono::Utc::now(),
        });
        Some((entry.request, verdict))
    }

    fn evaluate_save_request(&self, request: &SaveRequest) -> SafetyVerdict {
        let (action, triggering_rule_id, message) =
            self.rule_config
                .evaluate(&request.target_path, &request.content, "user", None);
        SafetyVerdict {
            action,
            triggering_rule_id,
            message,
        }
    }

    /// Evaluate the supervision rule chain against the given context
    /// (spec §4.6 "Supervision", §4.10).
    pub fn supervise(&self, context: &SupervisionContext) -> Option<InterventionAction> {
        let infos = evaluate_rules(&self.supervision_rules, context);
        governing_action(&infos)
    }

    pub fn audit_log(&self) -> &[AuditEntry] {
        &self.audit_log
    }
}
