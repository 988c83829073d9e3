//! Phase B/C: compile the plan into flows, with a deterministic
//! validate-retry gate around the chat call.

use tokio_util::sync::CancellationToken;

use crate::jsonx;
use crate::model::{PackPlan, TestPack};
use crate::providers::chat::{ChatClient, ChatOptions};
use crate::validate;

/// Upper bound on chat invocations per compile.
pub const MAX_COMPILE_RETRIES: u32 = 3;

#[derive(Debug, Clone)]
pub struct CompileResult {
    /// The best candidate seen, even on failure (for diagnostics).
    pub pack: Option<TestPack>,
    pub errors: Vec<String>,
    pub attempts: u32,
    pub success: bool,
}

pub async fn compile(
    template: &TestPack,
    plan: &PackPlan,
    chat: &dyn ChatClient,
    cancel: &CancellationToken,
) -> anyhow::Result<CompileResult> {
    let mut errors: Vec<String> = Vec::new();
    let mut candidate: Option<TestPack> = None;
    let mut attempt = 1u32;

    loop {
        anyhow::ensure!(!cancel.is_cancelled(), "compile cancelled");

        let user = if attempt == 1 {
            initial_prompt(template, plan)
        } else {
            // Corrections re-inject the plan so the model keeps context.
            correction_prompt(plan, &errors)
        };
        tracing::debug!(attempt, "requesting compiled pack");
        let reply = chat
            .complete(&system_prompt(), &user, &ChatOptions::json())
            .await?;

        match jsonx::parse_reply::<TestPack>(&reply) {
            Err(_) => {
                errors =
                    vec!["Failed to parse TestPack JSON from compiler response.".to_string()];
                candidate = None;
            }
            Ok(mut parsed) => {
                merge_template_fields(&mut parsed, template);
                errors = validate_all_flows(&parsed);
                if errors.is_empty() {
                    return Ok(CompileResult {
                        pack: Some(parsed),
                        errors,
                        attempts: attempt,
                        success: true,
                    });
                }
                candidate = Some(parsed);
            }
        }

        if attempt >= MAX_COMPILE_RETRIES {
            return Ok(CompileResult {
                pack: candidate,
                errors,
                attempts: attempt,
                success: false,
            });
        }
        attempt += 1;
    }
}

/// The template owns identity, targets, guardrails, execution and data
/// profiles; the model only authors journeys and flows.
fn merge_template_fields(candidate: &mut TestPack, template: &TestPack) {
    candidate.pack_id = template.pack_id.clone();
    if candidate.pack_name.is_empty() {
        candidate.pack_name = template.pack_name.clone();
    }
    candidate.inputs = template.inputs.clone();
    candidate.targets = template.targets.clone();
    candidate.guardrails = template.guardrails.clone();
    candidate.execution = template.execution.clone();
    candidate.data_profiles = template.data_profiles.clone();
}

/// The deterministic gate: guardrail bounds, journey wiring, then the
/// flow validator over every compiled flow. All findings are aggregated
/// into one flow-qualified error list.
pub fn validate_all_flows(pack: &TestPack) -> Vec<String> {
    let mut errors = Vec::new();
    let g = &pack.guardrails;

    if pack.journeys.len() > g.max_journeys {
        errors.push(format!(
            "Pack has {} journeys; guardrail allows {}.",
            pack.journeys.len(),
            g.max_journeys
        ));
    }
    let total_steps = pack.total_steps();
    if total_steps > g.max_total_steps {
        errors.push(format!(
            "Pack has {total_steps} total steps; guardrail allows {}.",
            g.max_total_steps
        ));
    }

    for flow in &pack.flows {
        if flow.steps.len() > g.max_steps_per_flow {
            errors.push(format!(
                "Flow '{}': {} steps exceed the guardrail of {}.",
                flow.test_name,
                flow.steps.len(),
                g.max_steps_per_flow
            ));
        }
    }

    for journey in &pack.journeys {
        if journey.success_criteria.is_empty() {
            errors.push(format!(
                "Journey '{}': needs at least one success criterion.",
                journey.journey_id
            ));
        }
        for flow_ref in &journey.flows {
            if pack.flow_by_name(&flow_ref.flow_ref_id).is_none() {
                errors.push(format!(
                    "Journey '{}': flowRef '{}' does not match any flow.",
                    journey.journey_id, flow_ref.flow_ref_id
                ));
            }
        }
    }

    for flow in &pack.flows {
        let mut normalized = flow.clone();
        normalized.auto_number_steps();
        let report = validate::validate(&normalized);
        for error in report.errors {
            errors.push(format!("Flow '{}': {error}", flow.test_name));
        }
    }

    errors
}

fn system_prompt() -> String {
    "You are a desktop UI test compiler. Turn the plan into a JSON \
     TestPack whose journeys reference flows by testName and whose flows \
     use schemaVersion 1 steps. Reply with JSON only."
        .to_string()
}

fn initial_prompt(template: &TestPack, plan: &PackPlan) -> String {
    format!(
        "Pack template:\n{}\n\nPlan:\n{}\n\nEmit the full TestPack with \
         journeys and flows. Every journey flowRef must name an emitted \
         flow's testName, and every journey needs successCriteria.",
        serde_json::to_string_pretty(template).unwrap_or_default(),
        serde_json::to_string_pretty(plan).unwrap_or_default()
    )
}

fn correction_prompt(plan: &PackPlan, errors: &[String]) -> String {
    format!(
        "Your previous TestPack was rejected. Fix these problems and emit \
         the corrected full TestPack as JSON:\n- {}\n\nPlan (for context):\n{}",
        errors.join("\n- "),
        serde_json::to_string_pretty(plan).unwrap_or_default()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{
        FlowRef, Journey, PackGuardrails, Priority, StepAction, TestFlow, TestStep,
    };
    use crate::providers::chat::fake::ScriptedChatClient;

    fn template() -> TestPack {
        TestPack {
            pack_id: "pack-7".into(),
            pack_name: "notes".into(),
            inputs: vec!["save a note".into()],
            targets: vec![],
            data_profiles: vec![],
            journeys: vec![],
            flows: vec![],
            guardrails: PackGuardrails::default(),
            execution: Default::default(),
        }
    }

    fn plan_stub() -> PackPlan {
        PackPlan {
            pack_name: "notes".into(),
            journeys: vec![],
            coverage_map: vec![],
            risks: vec![],
            suggested_data_profiles: vec![],
        }
    }

    fn good_pack_json() -> String {
        r#"{
            "packId": "ignored-by-merge",
            "packName": "notes",
            "journeys": [{
                "journeyId": "j1",
                "title": "Save a note",
                "priority": "p0",
                "flows": [{"flowRefId": "save-note"}],
                "successCriteria": ["note saved"]
            }],
            "flows": [{
                "schemaVersion": 1,
                "testName": "save-note",
                "targetApp": "notes.exe",
                "steps": [
                    {"action": "launch", "processPath": "notes.exe", "description": "start"},
                    {"action": "click", "selector": "Button#Save", "description": "save"}
                ]
            }]
        }"#
        .to_string()
    }

    #[tokio::test]
    async fn compile_succeeds_first_attempt() {
        let chat = ScriptedChatClient::with_replies([good_pack_json()]);
        let result = compile(&template(), &plan_stub(), &chat, &CancellationToken::new())
            .await
            .unwrap();
        assert!(result.success);
        assert_eq!(result.attempts, 1);
        let pack = result.pack.unwrap();
        assert_eq!(pack.pack_id, "pack-7", "template owns packId");
        assert!(pack.flow_by_name("save-note").is_some());
    }

    #[tokio::test]
    async fn compile_retries_then_converges() {
        // Invalid twice (dangling flowRef), valid on the third attempt.
        let bad = good_pack_json().replace("\"flowRefId\": \"save-note\"", "\"flowRefId\": \"missing\"");
        let chat = ScriptedChatClient::with_replies([bad.clone(), bad, good_pack_json()]);
        let result = compile(&template(), &plan_stub(), &chat, &CancellationToken::new())
            .await
            .unwrap();
        assert!(result.success);
        assert_eq!(result.attempts, 3);
        assert_eq!(chat.call_count(), 3);
        let pack = result.pack.unwrap();
        let journey_ref = &pack.journeys[0].flows[0].flow_ref_id;
        assert!(pack.flow_by_name(journey_ref).is_some());
    }

    #[tokio::test]
    async fn compile_gives_up_after_bound() {
        let chat = ScriptedChatClient::with_replies(["garbage"]);
        let result = compile(&template(), &plan_stub(), &chat, &CancellationToken::new())
            .await
            .unwrap();
        assert!(!result.success);
        assert_eq!(result.attempts, MAX_COMPILE_RETRIES);
        assert_eq!(chat.call_count(), MAX_COMPILE_RETRIES as usize);
        assert_eq!(
            result.errors,
            vec!["Failed to parse TestPack JSON from compiler response.".to_string()]
        );
    }

    #[test]
    fn gate_catches_guardrail_and_wiring_problems() {
        let mut pack = template();
        let mut flow = TestFlow {
            test_name: "big".into(),
            ..Default::default()
        };
        for _ in 0..3 {
            let mut s = TestStep::new(StepAction::Wait);
            s.description = Some("pause".into());
            flow.steps.push(s);
        }
        pack.guardrails.max_steps_per_flow = 2;
        pack.flows.push(flow);
        pack.journeys.push(Journey {
            journey_id: "j1".into(),
            title: "t".into(),
            priority: Priority::P1,
            tags: vec![],
            coverage_areas: vec![],
            required_backends: vec![],
            flows: vec![FlowRef {
                flow_ref_id: "nope".into(),
                data_profile_id: None,
            }],
            success_criteria: vec![],
            perception_override: None,
        });

        let errors = validate_all_flows(&pack);
        assert!(errors.iter().any(|e| e.contains("Flow 'big'")));
        assert!(errors.iter().any(|e| e.contains("success criterion")));
        assert!(errors.iter().any(|e| e.contains("flowRef 'nope'")));
    }

    #[test]
    fn gate_qualifies_flow_validator_errors() {
        let mut pack = template();
        let mut flow = TestFlow {
            test_name: "broken".into(),
            ..Default::default()
        };
        flow.steps.push(TestStep::new(StepAction::Click));
        pack.flows.push(flow);

        let errors = validate_all_flows(&pack);
        assert!(errors
            .iter()
            .any(|e| e == "Flow 'broken': Step 1: 'click' requires a selector."));
    }
}
