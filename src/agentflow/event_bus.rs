//! Typed pub/sub event bus with a middleware chain (spec §4.1).
//!
//! Grounded on `event.rs`'s `EventHandler` trait in the teacher crate: a
//! single trait with one method per event kind, async, default no-op,
//! registered subscribers invoked in order. That shape is kept; the event
//! set itself is replaced with the fourteen-odd event kinds spec §4.1 and
//! §6 name, and a middleware chain is added ahead of dispatch (the teacher
//! has no equivalent — modeled after the filter-or-pass shape common to
//! the corpus's tower-style middleware, generalized to a plain closure
//! trait since this crate doesn't depend on `tower`).

use crate::decision::{Decision, FieldError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Terminal status of a workflow execution (spec §4.8 step 5).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    Succeeded,
    Failed,
    PartiallySucceeded,
}

/// Per-node progress status carried by `ExecutionProgress` (spec §4.8 step 3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressStatus {
    Started,
    Running,
    Completed,
    Failed,
}

/// Outcome of a save-request rule evaluation (spec §4.6, §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SaveRequestStatus {
    Accepted,
    Rejected,
}

/// All event classes named in spec §4.1 and §6's wire protocol.
///
/// One variant per class, each carrying exactly the fields that class
/// needs. `correlation_id` is threaded through decision-adjacent events so
/// invariant 1 (spec §8: "exactly one of {DecisionValidated, DecisionRejected}
/// follows DecisionMade with the same correlation_id") is checkable by a
/// subscriber without inspecting a nested payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    DecisionMade {
        decision: Decision,
    },
    DecisionValidated {
        correlation_id: String,
        session_id: String,
        decision: Decision,
    },
    DecisionRejected {
        correlation_id: String,
        session_id: String,
        errors: Vec<FieldError>,
    },
    WorkflowExecutionStarted {
        session_id: String,
        workflow_id: String,
    },
    WorkflowExecutionCompleted {
        session_id: String,
        workflow_id: String,
        status: WorkflowStatus,
    },
    NodeExecutionStarted {
        session_id: String,
        workflow_id: String,
        node_id: String,
    },
    NodeExecutionCompleted {
        session_id: String,
        workflow_id: String,
        node_id: String,
        success: bool,
        error_code: Option<crate::error::ErrorCode>,
    },
    ExecutionProgress {
        session_id: String,
        workflow_id: String,
        node_id: String,
        status: ProgressStatus,
        progress: f32,
    },
    WorkflowReflectionCompleted {
        session_id: String,
        workflow_id: String,
        assessment: String,
        should_retry: bool,
        confidence: f64,
        recommendations: Vec<String>,
    },
    ShortTermSaturated {
        session_id: String,
        usage_ratio: f64,
    },
    SpawnSubAgent {
        session_id: String,
        correlation_id: String,
        subagent_type: String,
        task_payload: serde_json::Value,
    },
    SubAgentCompleted {
        session_id: String,
        correlation_id: String,
        result: serde_json::Value,
    },
    SaveRequest {
        request: crate::coordinator::SaveRequest,
    },
    SaveRequestReceived {
        request_id: String,
        session_id: String,
    },
    SaveRequestResult {
        request_id: String,
        session_id: String,
        status: SaveRequestStatus,
        triggering_rule_id: Option<String>,
        message: Option<String>,
    },
    ContextInjection {
        injection: crate::supervision::ContextInjection,
    },
    InjectionApplied {
        injection_id: String,
        session_id: String,
    },
    ReplanRequested {
        session_id: String,
        workflow_id: String,
        failed_node_id: String,
        reason: String,
    },
}

impl Event {
    /// Stable name for this event's class, used for logging and for
    /// matching against a subscriber's declared interest set.
    pub fn kind(&self) -> &'static str {
        match self {
            Event::DecisionMade { .. } => "DecisionMade",
            Event::DecisionValidated { .. } => "DecisionValidated",
            Event::DecisionRejected { .. } => "DecisionRejected",
            Event::WorkflowExecutionStarted { .. } => "WorkflowExecutionStarted",
            Event::WorkflowExecutionCompleted { .. } => "WorkflowExecutionCompleted",
            Event::NodeExecutionStarted { .. } => "NodeExecutionStarted",
            Event::NodeExecutionCompleted { .. } => "NodeExecutionCompleted",
            Event::ExecutionProgress { .. } => "ExecutionProgress",
            Event::WorkflowReflectionCompleted { .. } => "WorkflowReflectionCompleted",
            Event::ShortTermSaturated { .. } => "ShortTermSaturated",
            Event::SpawnSubAgent { .. } => "SpawnSubAgent",
            Event::SubAgentCompleted { .. } => "SubAgentCompleted",
            Event::SaveRequest { .. } => "SaveRequest",
            Event::SaveRequestReceived { .. } => "SaveRequestReceived",
            Event::SaveRequestResult { .. } => "SaveRequestResult",
            Event::ContextInjection { .. } => "ContextInjection",
            Event::InjectionApplied { .. } => "InjectionApplied",
            Event::ReplanRequested { .. } => "ReplanRequested",
        }
    }
}

/// Middleware wraps publication: inspect, optionally transform, or
/// suppress an event before subscribers see it (spec §4.1).
///
/// Returning `Ok(None)` suppresses dispatch entirely.
#[async_trait]
pub trait Middleware: Send + Sync {
    async fn process(&self, event: Event) -> Result<Option<Event>, Box<dyn std::error::Error + Send + Sync>>;
}

/// A registered listener for bus events (spec §4.1: "subscribers register
/// against a class and receive events synchronously in registration order").
///
/// Subscribers see every event and filter by [`Event::kind`] or by
/// pattern-matching; this mirrors `EventHandler`'s one-trait-many-methods
/// shape in the teacher crate but collapses it to a single method since
/// Rust's exhaustive `match` gives the same ergonomics without fourteen
/// default-no-op methods to override.
#[async_trait]
pub trait Subscriber: Send + Sync {
    async fn handle(&self, event: &Event) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
}

/// Typed pub/sub bus: a middleware chain followed by registration-ordered
/// subscriber dispatch (spec §4.1).
///
/// Publication is not parallelized across subscribers — spec §5's
/// cooperative single-threaded scheduling model means one session's
/// publish call runs to completion (including every subscriber) before
/// the next suspension point, which is exactly what sequential `await`
/// over a `Vec` gives for free.
pub struct EventBus {
    middlewares: Vec<Arc<dyn Middleware>>,
    subscribers: Vec<Arc<dyn Subscriber>>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            middlewares: Vec::new(),
            subscribers: Vec::new(),
        }
    }

    /// Register a middleware. Middlewares run in registration order;
    /// the first to suppress an event stops the chain.
    pub fn add_middleware(&mut self, middleware: Arc<dyn Middleware>) {
        self.middlewares.push(middleware);
    }

    /// Register a subscriber. Subscribers are invoked in registration
    /// order (spec §5 ordering guarantee 2).
    pub fn subscribe(&mut self, subscriber: Arc<dyn Subscriber>) {
        self.subscribers.push(subscriber);
    }

    /// Run an event through the middleware chain, then fan it out to every
    /// subscriber in order. An error returned by one subscriber is logged
    /// and does not prevent the remaining subscribers from running (spec
    /// §4.1: "the bus captures and logs exceptions").
    pub async fn publish(&self, mut event: Event) {
        for middleware in &self.middlewares {
            match middleware.process(event).await {
                Ok(Some(transformed)) => event = transformed,
                Ok(None) => {
                    log::debug!("event suppressed by middleware");
                    return;
                }
                Err(err) => {
                    log::error!("middleware raised an error, suppressing event: {err}");
                    return;
                }
            }
        }

        for subscriber in &self.subscribers {
            if let Err(err) = subscriber.handle(&event).await {
                log::error!(
                    "subscriber raised an error handling {} event: {err}",
                    event.kind()
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingSubscriber {
        count: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Subscriber for CountingSubscriber {
        async fn handle(&self, _event: &Event) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
            self.count.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct SuppressAll;

    #[async_trait]
    impl Middleware for SuppressAll {
        async fn process(&self, _event: Event) -> Result<Option<Event>, Box<dyn std::error::Error + Send + Sync>> {
            Ok(None)
        }
    }

    struct FailingSubscriber;

    #[async_trait]
    impl Subscriber for FailingSubscriber {
        async fn handle(&self, _event: &Event) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
            Err("boom".into())
        }
    }

    fn sample_event() -> Event {
        Event::InjectionApplied {
            injection_id: "i1".into(),
            session_id: "s1".into(),
        }
    }

    #[tokio::test]
    async fn subscribers_receive_events_in_registration_order() {
        let mut bus = EventBus::new();
        let count = Arc::new(AtomicUsize::new(0));
        bus.subscribe(Arc::new(CountingSubscriber {
            count: count.clone(),
        }));
        bus.subscribe(Arc::new(CountingSubscriber {
            count: count.clone(),
        }));
        bus.publish(sample_event()).await;
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn middleware_can_suppress_dispatch() {
        let mut bus = EventBus::new();
        let count = Arc::new(AtomicUsize::new(0));
        bus.add_middleware(Arc::new(SuppressAll));
        bus.subscribe(Arc::new(CountingSubscriber {
            count: count.clone(),
        }));
        bus.publish(sample_event()).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn one_subscriber_erroring_does_not_block_others() {
        let mut bus = EventBus::new();
        let count = Arc::new(AtomicUsize::new(0));
        bus.subscribe(Arc::new(FailingSubscriber));
        bus.subscribe(Arc::new(CountingSubscriber {
            count: count.clone(),
        }));
        bus.publish(sample_event()).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}
