//! The Global/Session/Workflow/Node context hierarchy exercised together,
//! including the saturation latch feeding into a real distillation pass.

mod common;

use agentflow_core::agentflow::context::{GlobalContext, NodeContext, SessionContext, Turn, TurnRole, TurnTokenUsage};
use agentflow_core::agentflow::distillation::distill;
use agentflow_core::agentflow::workflow_agent::WorkflowAgent;
use common::StubSummarizer;

fn turn(id: &str, prompt: u64) -> Turn {
    Turn {
        turn_id: id.into(),
        role: TurnRole::User,
        content: format!("turn {id}"),
        tool_refs: vec![],
        token_usage: TurnTokenUsage {
            prompt_tokens: prompt,
            completion_tokens: 0,
        },
        timestamp: chrono::Utc::now(),
    }
}

#[tokio::test]
async fn session_reaching_saturation_threshold_distills_back_below_warning_threshold() {
    common::init_test_logging();
    let mut session = SessionContext::new(
        "sess-1",
        GlobalContext {
            user_id: "user-1".into(),
            system_config: serde_json::json!({"env": "test"}),
        },
        1000,
        0.92,
        0.80,
    );

    for i in 0..12 {
        let outcome = session.add_turn(turn(&format!("t{i}"), 80)).unwrap();
        if outcome.crossed_saturation {
            break;
        }
    }
    assert!(session.is_saturated);

    let summarizer = StubSummarizer;
    distill(&mut session, &summarizer, 2, 200).await.unwrap();

    assert!(!session.is_saturated);
    assert!(session.usage_ratio() < 0.80);
    assert!(session.distilled_summary.is_some());
}

#[test]
fn workflow_and_node_contexts_are_independent_of_session_context() {
    common::init_test_logging();
    // Workflow/node context are scoped per-execution and carry no token
    // accounting of their own (spec §3) — this just exercises that they
    // construct and update independently of whatever a SessionContext is
    // doing alongside them.
    let agent = WorkflowAgent::new(5);
    assert!(agent.active_plan().is_none());

    let node_ctx = NodeContext {
        node_id: "n1".into(),
        inputs: serde_json::json!({"x": 1}),
    };
    assert_eq!(node_ctx.node_id, "n1");
    assert_eq!(node_ctx.inputs["x"], 1);
}

#[test]
fn global_context_is_shared_verbatim_across_sessions() {
    common::init_test_logging();
    let global = GlobalContext {
        user_id: "user-42".into(),
        system_config: serde_json::json!({"region": "us-east"}),
    };
    let session_a = SessionContext::new("sess-a", global.clone(), 4096, 0.92, 0.80);
    let session_b = SessionContext::new("sess-b", global, 4096, 0.92, 0.80);

    assert_eq!(session_a.global_context.user_id, session_b.global_context.user_id);
    assert_eq!(session_a.session_id, "sess-a");
    assert_eq!(session_b.session_id, "sess-b");
}
