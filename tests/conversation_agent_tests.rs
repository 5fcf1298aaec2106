//! Conversation Agent ReAct loop wired to a scripted LLM collaborator and
//! through the Coordinator's validation pipeline, the way a real turn would
//! actually run end to end (spec §4.7, §4.6).

mod common;

use agentflow_core::agentflow::collaborators::LlmMessage;
use agentflow_core::agentflow::conversation_agent::{
    route_intent, Goal, GoalStack, GoalStatus, Intent, ReActLoop, RoutingHint,
};
use agentflow_core::agentflow::coordinator::{Coordinator, ValidationOutcome};
use agentflow_core::agentflow::decision::{Decision, DecisionPayload};
use agentflow_core::agentflow::rules::RuleConfig;
use common::ScriptedLlmProvider;

#[tokio::test]
async fn react_loop_think_step_is_recorded_and_rejection_is_validated_on_retry() {
    common::init_test_logging();
    let llm = ScriptedLlmProvider::new(vec!["I should respond with a greeting."]);
    let mut loop_state = ReActLoop::new(10, 3);

    let thought = loop_state
        .think(
            &llm,
            &[LlmMessage {
                role: "user".into(),
                content: "hi".into(),
            }],
            &[],
            "gpt-4o",
        )
        .await
        .unwrap();
    assert_eq!(thought, "I should respond with a greeting.");
    assert_eq!(loop_state.steps.len(), 1);

    let coord = Coordinator::new(1024 * 1024, 5, RuleConfig::default(), 0.80, 0.92);
    let bad_decision = Decision {
        decision_id: "d1".into(),
        correlation_id: "c1".into(),
        session_id: "s1".into(),
        payload: DecisionPayload::Respond {
            response: "".into(),
            intent: "greeting".into(),
            confidence: 0.9,
        },
        confidence: 0.9,
        source_agent: "conversation".into(),
        timestamp: chrono::Utc::now(),
    };
    match coord.validate(bad_decision, 10) {
        ValidationOutcome::Rejected(errors) => {
            let force_clarification = loop_state.record_rejection(&errors);
            assert!(!force_clarification);
        }
        ValidationOutcome::Validated(_) => panic!("empty response should have been rejected"),
    }

    let good_decision = Decision {
        decision_id: "d2".into(),
        correlation_id: "c1".into(),
        session_id: "s1".into(),
        payload: DecisionPayload::Respond {
            response: "hello!".into(),
            intent: "greeting".into(),
            confidence: 0.9,
        },
        confidence: 0.9,
        source_agent: "conversation".into(),
        timestamp: chrono::Utc::now(),
    };
    match coord.validate(good_decision, 10) {
        ValidationOutcome::Validated(decision) => {
            loop_state.record_validated(&decision);
            assert_eq!(loop_state.consecutive_rejections, 0);
        }
        ValidationOutcome::Rejected(_) => panic!("non-empty response should have been validated"),
    }
}

#[test]
fn complex_task_intent_routes_to_node_or_plan_or_subagent_and_decomposes_goals() {
    common::init_test_logging();
    assert_eq!(
        route_intent(Intent::ComplexTask),
        RoutingHint::CreateNodeOrPlanOrSubagent
    );

    let mut stack = GoalStack::new();
    let parent = Goal {
        goal_id: "g0".into(),
        description: "ship the release".into(),
        parent_id: None,
        status: GoalStatus::Active,
    };
    stack.decompose_goal(&parent, vec!["run tests".into(), "tag release".into()]);

    // LIFO: the last sub-goal pushed pops first.
    let first_popped = stack.pop_goal().unwrap();
    assert_eq!(first_popped.description, "tag release");
    assert_eq!(first_popped.parent_id.as_deref(), Some("g0"));
}

#[tokio::test]
async fn workflow_request_intent_with_llm_proposing_a_plan_reaches_validated_decision() {
    common::init_test_logging();
    let llm = ScriptedLlmProvider::new(vec!["proposing a two-step workflow plan"]);
    let mut loop_state = ReActLoop::new(5, 3);
    loop_state
        .think(&llm, &[], &[], "gpt-4o")
        .await
        .unwrap();

    assert_eq!(route_intent(Intent::WorkflowRequest), RoutingHint::ExecuteOrCreatePlan);
}
