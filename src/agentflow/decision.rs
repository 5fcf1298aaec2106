//! Decision payload schemas (spec §4.2) and the decision envelope (spec §6).
//!
//! Grounded on `planner.rs`'s `PolicyDecision`/`ToolCallRequest` pair in the
//! teacher crate, which already separates "what the planner wants to do"
//! from "a validated, typed instruction" — generalized here into ten
//! payload variants instead of one, each with its own fail-closed
//! validation rule.

use crate::dag::{DagError, NodeType, WorkflowPlan};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use thiserror::Error;

/// One of the ten decision kinds the Conversation Agent may emit (spec §4.2).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "decision_type", content = "payload", rename_all = "snake_case")]
pub enum DecisionPayload {
    Respond {
        response: String,
        intent: String,
        confidence: f64,
    },
    CreateNode {
        node_type: String,
        node_name: String,
        config: serde_json::Value,
    },
    CreateWorkflowPlan {
        plan: WorkflowPlan,
    },
    ExecuteWorkflow {
        workflow_id: String,
    },
    RequestClarification {
        question: String,
        options: Option<Vec<String>>,
    },
    Continue {
        thought: String,
    },
    ModifyNode {
        node_id: String,
        updates: serde_json::Value,
    },
    ErrorRecovery {
        workflow_id: String,
        failed_node_id: String,
        failure_reason: String,
        recovery_plan: RecoveryPlan,
        execution_context: serde_json::Value,
    },
    ReplanWorkflow {
        workflow_id: String,
        reason: String,
        execution_context: serde_json::Value,
    },
    SpawnSubagent {
        subagent_type: String,
        task_payload: serde_json::Value,
    },
}

impl DecisionPayload {
    /// Discriminant name, used for logging and for matching against the
    /// registered subagent-type list without destructuring.
    pub fn kind(&self) -> &'static str {
        match self {
            DecisionPayload::Respond { .. } => "respond",
            DecisionPayload::CreateNode { .. } => "create_node",
            DecisionPayload::CreateWorkflowPlan { .. } => "create_workflow_plan",
            DecisionPayload::ExecuteWorkflow { .. } => "execute_workflow",
            DecisionPayload::RequestClarification { .. } => "request_clarification",
            DecisionPayload::Continue { .. } => "continue",
            DecisionPayload::ModifyNode { .. } => "modify_node",
            DecisionPayload::ErrorRecovery { .. } => "error_recovery",
            DecisionPayload::ReplanWorkflow { .. } => "replan_workflow",
            DecisionPayload::SpawnSubagent { .. } => "spawn_subagent",
        }
    }
}

/// `recovery_plan.action` for `error_recovery` (spec §4.2: `retry | skip | abort | modify`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryAction {
    Retry,
    Skip,
    Abort,
    Modify,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecoveryPlan {
    pub action: RecoveryAction,
    pub modified_config: Option<serde_json::Value>,
}

/// The decision envelope as it travels on the bus (spec §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Decision {
    pub decision_id: String,
    pub correlation_id: String,
    pub session_id: String,
    pub payload: DecisionPayload,
    pub confidence: f64,
    pub source_agent: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl Decision {
    pub fn decision_type(&self) -> &'static str {
        self.payload.kind()
    }
}

/// A single structural failure, part of the structured error list a
/// rejected decision carries (spec §4.2 "structured error list").
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Validation failure for a [`DecisionPayload`] (spec §4.2, fail-closed).
///
/// Carries the full list of field errors rather than failing on the first
/// one, so `DecisionRejected` can report everything wrong at once.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("payload exceeds max size of {max_bytes} bytes (was {actual_bytes})")]
    PayloadTooLarge { max_bytes: usize, actual_bytes: usize },
    #[error("payload failed {} field check(s)", .0.len())]
    FieldErrors(Vec<FieldError>),
    #[error("dag validation failed: {0}")]
    Dag(#[from] DagError),
}

/// Validate a decision's payload against the schema rules in spec §4.2.
///
/// `known_node_ids` and `known_subagent_types` let the caller (the
/// Coordinator) supply the session-scoped registries these checks need
/// without this module depending on [`crate::coordinator`] or
/// [`crate::workflow_agent`] directly.
pub fn validate_payload(
    payload: &DecisionPayload,
    serialized_len: usize,
    max_payload_bytes: usize,
    known_node_ids: &HashSet<String>,
    known_subagent_types: &HashSet<String>,
    max_container_depth: usize,
) -> Result<(), ValidationError> {
    if serialized_len > max_payload_bytes {
        return Err(ValidationError::PayloadTooLarge {
            max_bytes: max_payload_bytes,
            actual_bytes: serialized_len,
        });
    }

    let mut errors = Vec::new();

    match payload {
        DecisionPayload::Respond {
            response,
            confidence,
            ..
        } => {
            if response.trim().is_empty() {
                errors.push(FieldError::new("response", "must be non-empty"));
            }
            if !(0.0..=1.0).contains(confidence) {
                errors.push(FieldError::new("confidence", "must be in [0, 1]"));
            }
        }
        DecisionPayload::CreateNode { node_type, config, .. } => {
            if node_type.trim().is_empty() {
                errors.push(FieldError::new("node_type", "must be non-empty"));
            } else if let Ok(parsed_type) = node_type.parse::<NodeType>() {
                for field in parsed_type.required_config_fields() {
                    if config.get(field).is_none() {
                        errors.push(FieldError::new(
                            *field,
                            format!("required in config for node_type \"{node_type}\""),
                        ));
                    }
                }
            }
        }
        DecisionPayload::CreateWorkflowPlan { plan } => {
            if let Err(dag_err) = plan.validate(max_container_depth) {
                return Err(ValidationError::Dag(dag_err));
            }
        }
        DecisionPayload::ExecuteWorkflow { workflow_id } => {
            if workflow_id.trim().is_empty() {
                errors.push(FieldError::new("workflow_id", "must be non-empty"));
            }
        }
        DecisionPayload::RequestClarification { question, .. } => {
            if question.trim().is_empty() {
                errors.push(FieldError::new("question", "must be non-empty"));
            }
        }
        DecisionPayload::Continue { .. } => {}
        DecisionPayload::ModifyNode { node_id, .. } => {
            if !known_node_ids.contains(node_id) {
                errors.push(FieldError::new("node_id", "references an unknown node"));
            }
        }
        DecisionPayload::ErrorRecovery {
            workflow_id,
            failed_node_id,
            ..
        } => {
            if workflow_id.trim().is_empty() {
                errors.push(FieldError::new("workflow_id", "must be non-empty"));
            }
            if failed_node_id.trim().is_empty() {
                errors.push(FieldError::new("failed_node_id", "must be non-empty"));
            }
        }
        DecisionPayload::ReplanWorkflow {
            workflow_id,
            reason,
            ..
        } => {
            if workflow_id.trim().is_empty() {
                errors.push(FieldError::new("workflow_id", "must be non-empty"));
            }
            if reason.trim().is_empty() {
                errors.push(FieldError::new("reason", "must be non-empty"));
            }
        }
        DecisionPayload::SpawnSubagent { subagent_type, .. } => {
            if !known_subagent_types.contains(subagent_type) {
                errors.push(FieldError::new(
                    "subagent_type",
                    "not a registered subagent type",
                ));
            }
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ValidationError::FieldErrors(errors))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dag::{Edge, GlobalConfig, Node, NodeType};

    fn empty_sets() -> (HashSet<String>, HashSet<String>) {
        (HashSet::new(), HashSet::new())
    }

    #[test]
    fn respond_requires_nonempty_response_and_bounded_confidence() {
        let (nodes, subagents) = empty_sets();
        let payload = DecisionPayload::Respond {
            response: "".into(),
            intent: "greeting".into(),
            confidence: 1.5,
        };
        let err = validate_payload(&payload, 10, 1024, &nodes, &subagents, 5).unwrap_err();
        match err {
            ValidationError::FieldErrors(errs) => assert_eq!(errs.len(), 2),
            _ => panic!("expected field errors"),
        }
    }

    #[test]
    fn respond_valid_passes() {
        let (nodes, subagents) = empty_sets();
        let payload = DecisionPayload::Respond {
            response: "hi there".into(),
            intent: "greeting".into(),
            confidence: 0.9,
        };
        assert!(validate_payload(&payload, 10, 1024, &nodes, &subagents, 5).is_ok());
    }

    #[test]
    fn oversized_payload_rejected_before_field_checks() {
        let (nodes, subagents) = empty_sets();
        let payload = DecisionPayload::Continue {
            thought: "thinking".into(),
        };
        let err = validate_payload(&payload, 2048, 1024, &nodes, &subagents, 5).unwrap_err();
        assert!(matches!(err, ValidationError::PayloadTooLarge { .. }));
    }

    #[test]
    fn modify_node_requires_known_node_id() {
        let (nodes, subagents) = empty_sets();
        let payload = DecisionPayload::ModifyNode {
            node_id: "missing".into(),
            updates: serde_json::json!({}),
        };
        assert!(validate_payload(&payload, 10, 1024, &nodes, &subagents, 5).is_err());
    }

    #[test]
    fn create_node_requires_type_specific_config_fields() {
        let (nodes, subagents) = empty_sets();
        let payload = DecisionPayload::CreateNode {
            node_type: "http".into(),
            node_name: "n1".into(),
            config: serde_json::json!({}),
        };
        let err = validate_payload(&payload, 10, 1024, &nodes, &subagents, 5).unwrap_err();
        match err {
            ValidationError::FieldErrors(errs) => {
                assert!(errs.iter().any(|e| e.field == "url"));
                assert!(errs.iter().any(|e| e.field == "method"));
            }
            _ => panic!("expected field errors"),
        }
    }

    #[test]
    fn create_node_with_required_config_fields_present_passes() {
        let (nodes, subagents) = empty_sets();
        let payload = DecisionPayload::CreateNode {
            node_type: "http".into(),
            node_name: "n1".into(),
            config: serde_json::json!({"url": "https://example.com", "method": "GET"}),
        };
        assert!(validate_payload(&payload, 10, 1024, &nodes, &subagents, 5).is_ok());
    }

    #[test]
    fn create_node_with_unknown_node_type_skips_config_check() {
        let (nodes, subagents) = empty_sets();
        let payload = DecisionPayload::CreateNode {
            node_type: "custom-future-type".into(),
            node_name: "n1".into(),
            config: serde_json::json!({}),
        };
        assert!(validate_payload(&payload, 10, 1024, &nodes, &subagents, 5).is_ok());
    }

    #[test]
    fn create_workflow_plan_rejects_cyclic_plan() {
        let (nodes, subagents) = empty_sets();
        let plan = WorkflowPlan {
            workflow_id: "wf-1".into(),
            name: "cyclic".into(),
            description: "".into(),
            nodes: vec![
                Node::new("a", NodeType::Http, serde_json::json!({"url": "x"})),
                Node::new("b", NodeType::Http, serde_json::json!({"url": "x"})),
            ],
            edges: vec![
                Edge {
                    source: "a".into(),
                    target: "b".into(),
                    condition: None,
                },
                Edge {
                    source: "b".into(),
                    target: "a".into(),
                    condition: None,
                },
            ],
            global_config: GlobalConfig::default(),
        };
        let payload = DecisionPayload::CreateWorkflowPlan { plan };
        let err = validate_payload(&payload, 10, 1024, &nodes, &subagents, 5).unwrap_err();
        assert!(matches!(err, ValidationError::Dag(DagError::Cycle(_))));
    }

    #[test]
    fn spawn_subagent_requires_registered_type() {
        let mut subagents = HashSet::new();
        subagents.insert("research".to_string());
        let payload = DecisionPayload::SpawnSubagent {
            subagent_type: "unregistered".into(),
            task_payload: serde_json::json!({}),
        };
        assert!(
            validate_payload(&payload, 10, 1024, &HashSet::new(), &subagents, 5).is_err()
        );
        let payload_ok = DecisionPayload::SpawnSubagent {
            subagent_type: "research".into(),
            task_payload: serde_json::json!({}),
        };
        assert!(
            validate_payload(&payload_ok, 10, 1024, &HashSet::new(), &subagents, 5).is_ok()
        );
    }

    #[test]
    fn decision_type_matches_payload_kind() {
        let decision = Decision {
            decision_id: "d1".into(),
            correlation_id: "c1".into(),
            session_id: "s1".into(),
            payload: DecisionPayload::Continue {
                thought: "t".into(),
            },
            confidence: 0.5,
            source_agent: "conversation".into(),
            timestamp: chrono::Utc::now(),
        };
        assert_eq!(decision.decision_type(), "continue");
    }
}
