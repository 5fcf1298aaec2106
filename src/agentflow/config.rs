//! Engine-wide configuration.
//!
//! Provides [`EngineConfig`] for the tunables named throughout `spec.md`
//! (max ReAct iterations, saturation threshold, retry policy, ...).
//! Users construct this manually — no file parsing dependency is required
//! to use the engine, matching the shape of `CloudLLMConfig` in the
//! teacher crate, which is likewise a plain struct with a `Default` impl.
//!
//! # Example
//!
//! ```rust
//! use agentflow_core::agentflow::config::EngineConfig;
//!
//! let config = EngineConfig::default();
//! assert_eq!(config.max_react_iterations, 10);
//! assert!((config.saturation_threshold - 0.92).abs() < f64::EPSILON);
//! ```

use std::time::Duration;

/// Global configuration for the orchestration engine.
///
/// Every field here corresponds to a default value named explicitly in
/// `spec.md`; see each field's doc comment for the source section.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// ReAct loop iteration cap (spec §3 ReActStep, §4.7). Default 10.
    pub max_react_iterations: usize,
    /// `usage_ratio` threshold that latches `ShortTermSaturated` and begins
    /// distillation (spec §3 SessionContext, §4.3). Default 0.92.
    pub saturation_threshold: f64,
    /// `usage_ratio` threshold above which a warning log fires every turn
    /// (spec §4.3). Default 0.80.
    pub warning_threshold: f64,
    /// Number of most-recent turns retained verbatim through distillation
    /// (spec §4.4 step 4). Default 2.
    pub distillation_retained_turns: usize,
    /// Default `K` for [`crate::vault::VaultRetriever::fetch`] (spec §4.5). Default 6.
    pub vault_retrieval_k: usize,
    /// Max retries for the `retry` failure strategy (spec §4.6). Default 3.
    pub max_retries: u32,
    /// Base backoff between retries (spec §4.6). Default 1s.
    pub retry_backoff: Duration,
    /// Whether retry backoff grows exponentially (spec §4.6). Default false.
    pub retry_backoff_exponential: bool,
    /// Max nodes dispatched concurrently within a layer (spec §4.7, §4.8). Default 3.
    pub max_parallel: usize,
    /// Max CONTAINER node nesting depth (spec §4.8). Default 5.
    pub max_container_depth: usize,
    /// Number of messages the flow broker retains for replay (spec §4.9). Default 200.
    pub flow_replay_capacity: usize,
    /// Soft cap on the per-session flow queue before `thought` messages are
    /// dropped (spec §4.9). Default 1000.
    pub flow_queue_soft_cap: usize,
    /// Max decision payload size in bytes (spec §4.2). Default 1 MiB.
    pub max_payload_bytes: usize,
    /// Default context window for unknown models (spec §4.3). Default 4096.
    pub default_context_window: usize,
    /// Default workflow-level timeout when `global_config.timeout` is unset
    /// (spec §5). Default 300s.
    pub default_workflow_timeout: Duration,
    /// Rejection threshold for consecutive `DecisionRejected` before the
    /// ReAct loop forces `request_clarification` (spec §4.7 step 5). Default 3.
    pub max_consecutive_rejections: u32,
    /// Archival age for `next_action` notes the vault inspector sweeps
    /// (spec §4.5). Default 30 days.
    pub next_action_archive_after: chrono::Duration,
}

impl Default for EngineConfig {
    /// Reproduce every default value named in `spec.md`.
    ///
    /// # Example
    ///
    /// ```rust
    /// use agentflow_core::EngineConfig;
    /// let config = EngineConfig::default();
    /// assert_eq!(config.max_parallel, 3);
    /// assert_eq!(config.flow_replay_capacity, 200);
    /// ```
    fn default() -> Self {
        Self {
            max_react_iterations: 10,
            saturation_threshold: 0.92,
            warning_threshold: 0.80,
            distillation_retained_turns: 2,
            vault_retrieval_k: 6,
            max_retries: 3,
            retry_backoff: Duration::from_secs(1),
            retry_backoff_exponential: false,
            max_parallel: 3,
            max_container_depth: 5,
            flow_replay_capacity: 200,
            flow_queue_soft_cap: 1000,
            max_payload_bytes: 1024 * 1024,
            default_context_window: 4096,
            default_workflow_timeout: Duration::from_secs(300),
            max_consecutive_rejections: 3,
            next_action_archive_after: chrono::Duration::days(30),
        }
    }
}
