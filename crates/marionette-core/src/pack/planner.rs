//! Phase A: turn a pack's free-text inputs into a journey plan.
//!
//! The chat call is the only non-deterministic piece; prompt building
//! and reply parsing are pure.

use std::time::Instant;

use tokio_util::sync::CancellationToken;

use crate::jsonx;
use crate::model::{PackPlan, TestPack};
use crate::providers::chat::{ChatClient, ChatOptions};

#[derive(Debug, Clone)]
pub struct PlanOutcome {
    pub plan: PackPlan,
    pub message: String,
    pub duration_ms: u64,
}

pub async fn plan(
    pack: &TestPack,
    chat: &dyn ChatClient,
    cancel: &CancellationToken,
) -> anyhow::Result<PlanOutcome> {
    anyhow::ensure!(!cancel.is_cancelled(), "plan cancelled");
    let started = Instant::now();

    let system = system_prompt(pack);
    let user = user_prompt(pack);
    tracing::debug!(pack = %pack.pack_id, "requesting plan");
    let reply = chat.complete(&system, &user, &ChatOptions::json()).await?;
    anyhow::ensure!(!cancel.is_cancelled(), "plan cancelled");

    let mut plan: PackPlan = jsonx::parse_reply(&reply)?;
    if plan.pack_name.is_empty() {
        plan.pack_name = pack.pack_name.clone();
    }

    let message = format!(
        "Planned {} journeys across {} coverage areas",
        plan.journeys.len(),
        plan.coverage_map.len()
    );
    Ok(PlanOutcome {
        plan,
        message,
        duration_ms: started.elapsed().as_millis() as u64,
    })
}

fn system_prompt(pack: &TestPack) -> String {
    let g = &pack.guardrails;
    let mut prompt = String::from(
        "You are a desktop UI test planner. Produce a JSON PackPlan with \
         journeys, a coverageMap, risks and suggestedDataProfiles. \
         Reply with JSON only.\n\nGuardrails:\n",
    );
    prompt.push_str(&format!(
        "- at most {} journeys, {} total steps, {} steps per flow\n",
        g.max_journeys, g.max_total_steps, g.max_steps_per_flow
    ));
    prompt.push_str(&format!(
        "- runtime budget {} minutes, vision fallback policy {}\n",
        g.max_runtime_minutes, g.vision_fallback_policy
    ));
    if !g.forbidden_actions.is_empty() {
        let forbidden: Vec<&str> = g.forbidden_actions.iter().map(|a| a.as_str()).collect();
        prompt.push_str(&format!("- forbidden actions: {}\n", forbidden.join(", ")));
    }

    if !pack.targets.is_empty() {
        prompt.push_str("\nTargets:\n");
        for t in &pack.targets {
            prompt.push_str(&format!(
                "- {} (backend {}, process {}, window {})\n",
                t.target_id,
                t.backend_name,
                t.process_name.as_deref().unwrap_or("?"),
                t.window_title.as_deref().unwrap_or("?")
            ));
        }
    }
    if !pack.data_profiles.is_empty() {
        prompt.push_str("\nData profiles:\n");
        for p in &pack.data_profiles {
            prompt.push_str(&format!("- {}: {}\n", p.profile_id, p.description));
        }
    }
    prompt
}

fn user_prompt(pack: &TestPack) -> String {
    let mut prompt = format!("Plan test journeys for pack '{}'.\n", pack.pack_name);
    if pack.inputs.is_empty() {
        prompt.push_str("No further inputs were given; plan from the targets alone.\n");
    } else {
        prompt.push_str("Inputs:\n");
        for input in &pack.inputs {
            prompt.push_str(&format!("- {input}\n"));
        }
    }
    prompt
}
