//! Per-session streaming reasoning-trace broker (spec §4.9).
//!
//! Grounded on `thought_chain.rs`'s append-only `.jsonl` log in the
//! teacher crate, generalized from disk-persisted thoughts into an
//! in-memory, per-session queue with a monotonic sequence number and
//! bounded replay buffer — the durability spec §1's Non-goals explicitly
//! excludes ("durable event replay across process restarts").

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};

/// Kind of flow message (spec §6 `SessionFlowMessage.flow_type`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowType {
    Thought,
    Action,
    Observation,
    ToolRequest,
    ToolResult,
    FinalAnswer,
    SystemNotice,
}

/// Wire shape of a single flow message (spec §6, field-for-field).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionFlowMessage {
    pub session_id: String,
    pub stream_seq: u64,
    pub displayed_at: chrono::DateTime<chrono::Utc>,
    pub flow_type: FlowType,
    pub content: serde_json::Value,
    pub raw_payload: Option<serde_json::Value>,
}

/// Per-session broker state: monotonic sequence counter, backpressured
/// queue, and bounded replay buffer (spec §4.9).
struct SessionBroker {
    next_seq: u64,
    queue: VecDeque<SessionFlowMessage>,
    replay: VecDeque<SessionFlowMessage>,
}

impl SessionBroker {
    fn new() -> Self {
        Self {
            next_seq: 0,
            queue: VecDeque::new(),
            replay: VecDeque::new(),
        }
    }
}

/// Session Flow Generator: holds one [`SessionBroker`] per session (spec
/// §4.9). Not `Sync`-shared across sessions by design — each session's
/// state is owned independently, matching spec §5's "no shared mutable
/// state between sessions".
pub struct SessionFlowGenerator {
    brokers: HashMap<String, SessionBroker>,
    soft_cap: usize,
    replay_capacity: usize,
}

impl SessionFlowGenerator {
    pub fn new(soft_cap: usize, replay_capacity: usize) -> Self {
        Self {
            brokers: HashMap::new(),
            soft_cap,
            replay_capacity,
        }
    }

    fn broker_mut(&mut self, session_id: &str) -> &mut SessionBroker {
        self.brokers
            .entry(session_id.to_string())
            .or_insert_with(SessionBroker::new)
    }

    /// Emit one message, assigning the next monotonic `stream_seq` for
    /// this session (spec §4.9 "Ordering guarantee").
    fn emit(
        &mut self,
        session_id: &str,
        flow_type: FlowType,
        content: serde_json::Value,
        raw_payload: Option<serde_json::Value>,
    ) -> SessionFlowMessage {
        let replay_capacity = self.replay_capacity;
        let soft_cap = self.soft_cap;
        let broker = self.broker_mut(session_id);
        let stream_seq = broker.next_seq;
        broker.next_seq += 1;

        let message = SessionFlowMessage {
            session_id: session_id.to_string(),
            stream_seq,
            displayed_at: chrono::Utc::now(),
            flow_type,
            content,
            raw_payload,
        };

        broker.queue.push_back(message.clone());
        if broker.queue.len() > soft_cap {
            log::warn!("session {session_id} flow queue exceeded soft cap {soft_cap}; dropping oldest thought message");
            drop_oldest_thought(&mut broker.queue);
        }

        broker.replay.push_back(message.clone());
        if broker.replay.len() > replay_capacity {
            broker.replay.pop_front();
        }

        message
    }

    pub fn emit_thought(&mut self, session_id: &str, thought: impl Into<String>) -> SessionFlowMessage {
        self.emit(session_id, FlowType::Thought, serde_json::json!({"thought": thought.into()}), None)
    }

    pub fn emit_action(&mut self, session_id: &str, action: serde_json::Value) -> SessionFlowMessage {
        self.emit(session_id, FlowType::Action, action, None)
    }

    pub fn emit_observation(&mut self, session_id: &str, observation: impl Into<String>) -> SessionFlowMessage {
        self.emit(session_id, FlowType::Observation, serde_json::json!({"observation": observation.into()}), None)
    }

    pub fn emit_tool_request(&mut self, session_id: &str, request: serde_json::Value) -> SessionFlowMessage {
        self.emit(session_id, FlowType::ToolRequest, request, None)
    }

    pub fn emit_tool_result(&mut self, session_id: &str, result: serde_json::Value) -> SessionFlowMessage {
        self.emit(session_id, FlowType::ToolResult, result, None)
    }

    pub fn emit_final_answer(&mut self, session_id: &str, answer: impl Into<String>) -> SessionFlowMessage {
        self.emit(session_id, FlowType::FinalAnswer, serde_json::json!({"answer": answer.into()}), None)
    }

    pub fn emit_system_notice(&mut self, session_id: &str, notice: impl Into<String>) -> SessionFlowMessage {
        self.emit(session_id, FlowType::SystemNotice, serde_json::json!({"notice": notice.into()}), None)
    }

    /// Replay every message with `stream_seq > after_seq` from the
    /// retention window (spec §4.9 "Replay").
    pub fn replay_after(&self, session_id: &str, after_seq: u64) -> Vec<SessionFlowMessage> {
        self.brokers
            .get(session_id)
            .map(|broker| {
                broker
                    .replay
                    .iter()
                    .filter(|m| m.stream_seq > after_seq)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn drain_queue(&mut self, session_id: &str) -> Vec<SessionFlowMessage> {
        self.brokers
            .get_mut(session_id)
            .map(|broker| broker.queue.drain(..).collect())
            .unwrap_or_default()
    }
}

/// Drop the oldest `thought` message from the queue; never touches
/// `final_answer`/`system_notice` (spec §4.9).
fn drop_oldest_thought(queue: &mut VecDeque<SessionFlowMessage>) {
    if let Some(pos) = queue.iter().position(|m| m.flow_type == FlowType::Thought) {
        queue.remove(pos);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stream_seq_is_strictly_increasing_within_a_session() {
        let mut gen = SessionFlowGenerator::new(1000, 200);
        let m1 = gen.emit_thought("s1", "first");
        let m2 = gen.emit_thought("s1", "second");
        assert!(m2.stream_seq > m1.stream_seq);
    }

    #[test]
    fn soft_cap_drops_oldest_thought_not_final_answer() {
        let mut gen = SessionFlowGenerator::new(2, 200);
        gen.emit_thought("s1", "t1");
        gen.emit_final_answer("s1", "done");
        gen.emit_thought("s1", "t2"); // exceeds soft cap of 2, should drop oldest thought (t1)

        let remaining = gen.drain_queue("s1");
        assert!(remaining.iter().any(|m| m.flow_type == FlowType::FinalAnswer));
        assert!(!remaining.iter().any(|m| matches!(m.content.get("thought"), Some(v) if v == "t1")));
    }

    #[test]
    fn replay_returns_only_messages_after_given_seq() {
        let mut gen = SessionFlowGenerator::new(1000, 200);
        gen.emit_thought("s1", "t1");
        gen.emit_thought("s1", "t2");
        gen.emit_thought("s1", "t3");
        let tail = gen.replay_after("s1", 0);
        assert_eq!(tail.len(), 2);
        assert!(tail.iter().all(|m| m.stream_seq > 0));
    }

    #[test]
    fn replay_buffer_discards_beyond_retention_window() {
        let mut gen = SessionFlowGenerator::new(1000, 2);
        gen.emit_thought("s1", "t1");
        gen.emit_thought("s1", "t2");
        gen.emit_thought("s1", "t3");
        let tail = gen.replay_after("s1", 0);
        assert_eq!(tail.len(), 2);
    }

    #[test]
    fn sessions_are_independent() {
        let mut gen = SessionFlowGenerator::new(1000, 200);
        gen.emit_thought("s1", "a");
        let m = gen.emit_thought("s2", "b");
        assert_eq!(m.stream_seq, 0);
    }
}
