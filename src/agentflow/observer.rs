//! Ambient observability hook (spec §2's "ambient stack"; not itself a
//! numbered component, but needed the way every agent triad member emits
//! structured log lines today).
//!
//! Grounded on `event.rs`'s `EventHandler` trait in the teacher crate:
//! one method per thing worth observing, all defaulted to a no-op so a
//! caller only overrides what it cares about. Where `EventHandler` is the
//! *dispatch* mechanism (spec's `event_bus::Subscriber` plays that role
//! here), `EngineObserver` is a lighter-weight hook meant for metrics/
//! tracing sinks that don't need the full `Event` enum — e.g. a
//! `prometheus` exporter counting ReAct iterations without matching on
//! every event variant.

use async_trait::async_trait;

/// Default-no-op observability hook. Implementations override only the
/// callbacks they care about.
#[async_trait]
pub trait EngineObserver: Send + Sync {
    async fn on_react_iteration(&self, _session_id: &str, _iteration: usize) {}
    async fn on_decision_rejected(&self, _session_id: &str, _decision_type: &str) {}
    async fn on_distillation(&self, _session_id: &str, _success: bool) {}
    async fn on_node_failure(&self, _session_id: &str, _node_id: &str, _error_code: crate::error::ErrorCode) {}
    async fn on_intervention(&self, _session_id: &str, _action: crate::supervision::InterventionAction) {}
}

/// No-op observer used when no sink is configured.
pub struct NullObserver;

#[async_trait]
impl EngineObserver for NullObserver {}

/// Observer that forwards every callback to the `log` crate at a level
/// matching its severity, matching the teacher's pattern of logging
/// every lifecycle transition at `debug`/`warn` as appropriate.
pub struct LoggingObserver;

#[async_trait]
impl EngineObserver for LoggingObserver {
    async fn on_react_iteration(&self, session_id: &str, iteration: usize) {
        log::debug!("session {session_id}: react iteration {iteration}");
    }

    async fn on_decision_rejected(&self, session_id: &str, decision_type: &str) {
        log::warn!("session {session_id}: decision '{decision_type}' rejected");
    }

    async fn on_distillation(&self, session_id: &str, success: bool) {
        if success {
            log::info!("session {session_id}: distillation succeeded");
        } else {
            log::warn!("session {session_id}: distillation failed, rolled back");
        }
    }

    async fn on_node_failure(&self, session_id: &str, node_id: &str, error_code: crate::error::ErrorCode) {
        log::warn!("session {session_id}: node {node_id} failed with {error_code:?}");
    }

    async fn on_intervention(&self, session_id: &str, action: crate::supervision::InterventionAction) {
        log::warn!("session {session_id}: supervision intervention {action:?}");
    }
}
