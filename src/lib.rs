// src/lib.rs

//! Core multi-agent orchestration engine: an in-process event bus, the
//! decision-payload contract, the context/memory lifecycle, the
//! knowledge vault, and the conversation/workflow/coordinator agent
//! triad. The LLM provider, node execution sandbox, transport layer, and
//! database persistence are external collaborators (see
//! [`agentflow::collaborators`]) implemented outside this crate.

pub mod agentflow;

pub use agentflow::collaborators::{LlmProvider, NodeExecutor, SaveExecutor, Summarizer};
pub use agentflow::config::EngineConfig;
pub use agentflow::coordinator::Coordinator;
pub use agentflow::event_bus::{Event, EventBus};
pub use agentflow::vault::KnowledgeVault;
pub use agentflow::workflow_agent::WorkflowAgent;
