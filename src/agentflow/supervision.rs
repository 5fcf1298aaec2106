//! Supervision rules and intervention actions (spec §4.6, §4.10).
//!
//! Grounded on `planner.rs`'s `PolicyEngine` trait in the teacher crate,
//! which already separates "evaluate context against a rule set" from
//! "apply the resulting decision" — generalized from a single policy
//! check into a priority-ordered rule chain with three intervention
//! severities.

use serde::{Deserialize, Serialize};

/// Point in the Conversation Agent's loop at which an injection applies
/// (spec §3 `ContextInjection`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InjectionPoint {
    PreLoop,
    PreThinking,
    PostThinking,
    Intervention,
}

/// Kind of guidance an injection carries (spec §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InjectionType {
    Instruction,
    Observation,
    Memory,
    Warning,
    Supplement,
    Intervention,
}

/// Supervisor-originated guidance consumed by the Conversation Agent at a
/// declared insertion point (spec §3, §4.6 "Context injection").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextInjection {
    pub injection_id: String,
    pub injection_type: InjectionType,
    pub point: InjectionPoint,
    pub content: String,
    pub priority: u32,
    pub applied: bool,
}

/// Severity/action of an intervention (spec §4.6, §4.10): `notify` is
/// low-severity, `terminate` is highest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InterventionAction {
    Notify,
    Warning,
    Replace,
    Terminate,
}

/// Outcome of evaluating one supervision rule against the current context
/// (spec §4.6 "Supervision"): a rule that matched produces a `SupervisionInfo`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupervisionInfo {
    pub rule_id: String,
    pub action: InterventionAction,
    pub reason: String,
}

/// Inputs a supervision rule's condition is evaluated against. Deliberately
/// flat rather than a reference into `SessionContext` so rules stay
/// decoupled from `crate::context`'s internal representation.
#[derive(Debug, Clone, Default)]
pub struct SupervisionContext {
    pub usage_ratio: f64,
    pub history_length: usize,
    pub save_request_path: Option<String>,
    pub content: Option<String>,
    pub command: Option<String>,
    pub last_three_decision_types: Vec<String>,
}

/// A supervision rule: `{rule_id, name, description, action, priority,
/// enabled, condition, replacement_content}` (spec §4.10).
///
/// `condition` is a plain closure rather than a serialized predicate
/// language — rule *configuration* (paths, thresholds) is what spec §6's
/// YAML/JSON rule file persists; the condition logic itself is compiled
/// code, matching how `PolicyEngine::evaluate` in the teacher crate is a
/// Rust closure/trait method rather than an interpreted expression.
pub struct SupervisionRule {
    pub rule_id: String,
    pub name: String,
    pub description: String,
    pub action: InterventionAction,
    pub priority: u32,
    pub enabled: bool,
    pub condition: Box<dyn Fn(&SupervisionContext) -> bool + Send + Sync>,
    pub replacement_content: Option<String>,
}

impl std::fmt::Debug for SupervisionRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SupervisionRule")
            .field("rule_id", &self.rule_id)
            .field("name", &self.name)
            .field("action", &self.action)
            .field("priority", &self.priority)
            .field("enabled", &self.enabled)
            .finish()
    }
}

const DANGEROUS_PATH_PREFIXES: &[&str] = &["/etc", "/sys", "/proc", "/boot"];
const DANGEROUS_COMMAND_TOKENS: &[&str] = &["rm -rf", "mkfs", ":(){ :|:& };:", "dd if="];
const SENSITIVE_CONTENT_MARKERS: &[&str] = &["-----BEGIN", "api_key", "password="];

/// Built-in rule chain (spec §4.10): usage warnings, dangerous-path
/// termination, sensitive-content warning with replacement, dangerous
/// command termination, loop detection, oversized-history warning.
pub fn builtin_rules(warning_threshold: f64, saturation_threshold: f64) -> Vec<SupervisionRule> {
    vec![
        SupervisionRule {
            rule_id: "critical-usage".into(),
            name: "Critical context usage".into(),
            description: "Context usage at or beyond the saturation threshold".into(),
            action: InterventionAction::Warning,
            priority: 10,
            enabled: true,
            condition: Box::new(move |ctx| ctx.usage_ratio >= saturation_threshold),
            replacement_content: None,
        },
        SupervisionRule {
            rule_id: "high-usage".into(),
            name: "High context usage".into(),
            description: "Context usage past the warning threshold".into(),
            action: InterventionAction::Notify,
            priority: 20,
            enabled: true,
            condition: Box::new(move |ctx| ctx.usage_ratio >= warning_threshold),
            replacement_content: None,
        },
        SupervisionRule {
            rule_id: "dangerous-path".into(),
            name: "Dangerous save path".into(),
            description: "Save request targets a system path".into(),
            action: InterventionAction::Terminate,
            priority: 1,
            enabled: true,
            condition: Box::new(|ctx| {
                ctx.save_request_path
                    .as_deref()
                    .map(|path| DANGEROUS_PATH_PREFIXES.iter().any(|p| path.starts_with(p)))
                    .unwrap_or(false)
            }),
            replacement_content: None,
        },
        SupervisionRule {
            rule_id: "sensitive-content".into(),
            name: "Sensitive content detected".into(),
            description: "Save request content looks like a credential or key".into(),
            action: InterventionAction::Replace,
            priority: 5,
            enabled: true,
            condition: Box::new(|ctx| {
                ctx.content
                    .as_deref()
                    .map(|content| SENSITIVE_CONTENT_MARKERS.iter().any(|m| content.contains(m)))
                    .unwrap_or(false)
            }),
            replacement_content: Some("[redacted]".into()),
        },
        SupervisionRule {
            rule_id: "dangerous-command".into(),
            name: "Dangerous command".into(),
            description: "A command rule matched a destructive pattern".into(),
            action: InterventionAction::Terminate,
            priority: 1,
            enabled: true,
            condition: Box::new(|ctx| {
                ctx.command
                    .as_deref()
                    .map(|cmd| DANGEROUS_COMMAND_TOKENS.iter().any(|t| cmd.contains(t)))
                    .unwrap_or(false)
            }),
            replacement_content: None,
        },
        SupervisionRule {
            rule_id: "loop-detected".into(),
            name: "Decision loop detected".into(),
            description: "Last three decisions were identical in kind".into(),
            action: InterventionAction::Warning,
            priority: 15,
            enabled: true,
            condition: Box::new(|ctx| {
                ctx.last_three_decision_types.len() == 3
                    && ctx.last_three_decision_types.iter().all(|d| d == &ctx.last_three_decision_types[0])
            }),
            replacement_content: None,
        },
        SupervisionRule {
            rule_id: "oversized-history".into(),
            name: "Oversized decision history".into(),
            description: "Session decision history has grown unusually large".into(),
            action: InterventionAction::Notify,
            priority: 25,
            enabled: true,
            condition: Box::new(|ctx| ctx.history_length > 500),
            replacement_content: None,
        },
    ]
}

/// Evaluate rules in priority order (lower number first) and return
/// every match; `should_intervene` is true iff the result is non-empty
/// (spec §4.6 `should_intervene()`).
pub fn evaluate_rules(
    rules: &[SupervisionRule],
    context: &SupervisionContext,
) -> Vec<SupervisionInfo> {
    let mut matches: Vec<&SupervisionRule> = rules
        .iter()
        .filter(|r| r.enabled && (r.condition)(context))
        .collect();
    matches.sort_by_key(|r| r.priority);
    matches
        .into_iter()
        .map(|r| SupervisionInfo {
            rule_id: r.rule_id.clone(),
            action: r.action,
            reason: r.description.clone(),
        })
        .collect()
}

/// The single highest-priority (by [`InterventionAction`] ordering)
/// matching action, if any matched (spec §4.6: "the highest-priority
/// action governs").
pub fn governing_action(infos: &[SupervisionInfo]) -> Option<InterventionAction> {
    infos.iter().map(|i| i.action).max()
}

/// Request to substitute or remove a node in the live plan (spec §4.6
/// "replace"). `None` replacement means the node is removed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeReplacementRequest {
    pub workflow_id: String,
    pub node_id: String,
    pub replacement: Option<crate::dag::Node>,
    pub reason: String,
}

/// Request to terminate a task (spec §4.6 "terminate"): notifies the
/// listed agents, optionally the user, and a terminal error event follows.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskTerminationRequest {
    pub session_id: String,
    pub notify_agents: Vec<String>,
    pub notify_user: bool,
    pub reason: String,
}
