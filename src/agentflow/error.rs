//! Shared error classification used across the Coordinator's failure
//! strategy dispatch (spec §4.6, §7).
//!
//! Each component error enum (see [`crate::event_bus::EventBusError`],
//! [`crate::decision::ValidationError`], [`crate::context::ContextError`],
//! [`crate::distillation::DistillationError`], [`crate::vault::VaultError`],
//! [`crate::coordinator::CoordinatorError`], [`crate::workflow_agent::WorkflowError`],
//! [`crate::conversation_agent::AgentError`]) attaches an [`ErrorClass`] so the
//! Coordinator can decide retry/skip/abort/replan without matching on the
//! concrete error type of whichever component raised it.

use serde::{Deserialize, Serialize};

/// Classification of an error independent of its originating component.
///
/// Drives the Coordinator's failure strategy selection (spec §4.6, §7):
/// `Transient` defaults to retry, `Permanent` to abort/replan, `Resource`
/// triggers distillation (token overflow) or termination (memory/cpu),
/// `Policy` triggers supervision warn/replace/terminate, and `Validation`
/// is recovered locally by re-planning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorClass {
    /// Payload or DAG violation — recovered locally by re-planning.
    Validation,
    /// Network timeout, rate limit — retried per strategy.
    Transient,
    /// Missing resource, auth failure — abort or replan.
    Permanent,
    /// Token overflow (triggers distillation) or memory/cpu exhaustion (terminate).
    Resource,
    /// Supervision rule trigger — warn/replace/terminate.
    Policy,
}

impl ErrorClass {
    /// Whether this class of error is, by default, worth retrying.
    ///
    /// Used by [`crate::coordinator::Coordinator`] when a node failure carries
    /// no per-node override (spec §4.6's error classification table).
    pub fn default_retryable(self) -> bool {
        matches!(self, ErrorClass::Transient)
    }
}

/// Finer-grained error code surfaced to users on node failure (spec §4.6
/// table, §9 scenario 6): transient/permanent/resource/timeout/rate_limit/
/// auth/not_found/invalid_config/overflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCode {
    Transient,
    Permanent,
    Resource,
    Timeout,
    RateLimit,
    Auth,
    NotFound,
    InvalidConfig,
    Overflow,
}

impl ErrorCode {
    /// Map a node-level error code to the coarser [`ErrorClass`] the
    /// Coordinator dispatches on.
    pub fn class(self) -> ErrorClass {
        match self {
            ErrorCode::Transient | ErrorCode::Timeout | ErrorCode::RateLimit => {
                ErrorClass::Transient
            }
            ErrorCode::Permanent | ErrorCode::Auth | ErrorCode::NotFound => ErrorClass::Permanent,
            ErrorCode::Resource | ErrorCode::Overflow => ErrorClass::Resource,
            ErrorCode::InvalidConfig => ErrorClass::Validation,
        }
    }
}
