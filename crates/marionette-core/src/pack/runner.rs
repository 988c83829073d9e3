//! Phase D: priority-ordered journey execution with guardrail
//! enforcement.
//!
//! Journeys run strictly sequentially; the raw report this produces is
//! enriched by the report builder.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;

use crate::backend::AutomationBackend;
use crate::capabilities::{Clock, SystemClock};
use crate::engine::FlowExecutor;
use crate::model::{
    flow::FLOW_SCHEMA_VERSION, ExecutionReport, FlowVerdict, Journey, JourneyResult,
    JourneyStatus, MachineInfo, PackReport, PackSummary, PerceptionStats, StepAction, StepResult,
    StepStatus, TestFlow, TestPack, WARNING_VISION_FALLBACK,
};
use crate::safety::{AuditLog, KillSwitch};

pub struct PackRunner {
    backends: HashMap<String, Arc<dyn AutomationBackend>>,
    kill_switch: KillSwitch,
    audit: AuditLog,
    clock: Arc<dyn Clock>,
    artifact_root: PathBuf,
}

impl PackRunner {
    pub fn new() -> Self {
        Self {
            backends: HashMap::new(),
            kill_switch: KillSwitch::new(),
            audit: AuditLog::disabled(),
            clock: Arc::new(SystemClock),
            artifact_root: PathBuf::from("reports").join("_pack"),
        }
    }

    pub fn with_backend(mut self, backend: Arc<dyn AutomationBackend>) -> Self {
        self.backends
            .insert(backend.name().to_lowercase(), backend);
        self
    }

    pub fn with_kill_switch(mut self, kill_switch: KillSwitch) -> Self {
        self.kill_switch = kill_switch;
        self
    }

    pub fn with_audit(mut self, audit: AuditLog) -> Self {
        self.audit = audit;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_artifact_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.artifact_root = root.into();
        self
    }

    pub async fn execute(&self, pack: &TestPack, cancel: &CancellationToken) -> PackReport {
        let started_at = self.clock.now();
        let started = Instant::now();
        let runtime_budget =
            Duration::from_secs(pack.guardrails.max_runtime_minutes.saturating_mul(60));

        // Priority order, stable within a level.
        let mut ordered: Vec<&Journey> = pack.journeys.iter().collect();
        ordered.sort_by_key(|j| j.priority);

        let mut journey_results: Vec<JourneyResult> = Vec::new();
        let mut aborted_reason: Option<String> = None;
        let mut failed_journeys = 0usize;

        for journey in ordered {
            if cancel.is_cancelled() || self.kill_switch.is_tripped() {
                journey_results.push(skipped_journey(journey));
                continue;
            }
            if aborted_reason.is_some() {
                journey_results.push(skipped_journey(journey));
                continue;
            }
            if started.elapsed() > runtime_budget {
                aborted_reason = Some("runtime budget exhausted".to_string());
                tracing::warn!(pack = %pack.pack_id, "runtime budget exhausted");
                journey_results.push(skipped_journey(journey));
                continue;
            }
            if failed_journeys >= pack.guardrails.max_failures_before_stop {
                aborted_reason = Some("failure budget exhausted".to_string());
                tracing::warn!(pack = %pack.pack_id, "failure budget exhausted");
                journey_results.push(skipped_journey(journey));
                continue;
            }

            let result = self.run_journey(pack, journey, cancel).await;
            if result.status == JourneyStatus::Failed {
                failed_journeys += 1;
            }
            journey_results.push(result);
        }

        let summary = summarize(&journey_results, started.elapsed().as_millis() as u64);
        let perception_stats = raw_perception(&journey_results);

        PackReport {
            pack_id: pack.pack_id.clone(),
            pack_name: pack.pack_name.clone(),
            summary,
            journey_results,
            failures: Vec::new(),
            warnings: Vec::new(),
            coverage_map_status: Vec::new(),
            perception_stats,
            fix_queue: Vec::new(),
            confidence_score: 0.0,
            started_at,
            finished_at: self.clock.now(),
            aborted_reason,
        }
    }

    async fn run_journey(
        &self,
        pack: &TestPack,
        journey: &Journey,
        cancel: &CancellationToken,
    ) -> JourneyResult {
        let started = Instant::now();

        let backend_name = journey
            .required_backends
            .first()
            .map(String::as_str)
            .unwrap_or("desktop");
        let Some(backend) = self.backends.get(&backend_name.to_lowercase()) else {
            tracing::warn!(
                journey = %journey.journey_id,
                backend = backend_name,
                "required backend not registered"
            );
            return JourneyResult {
                journey_id: journey.journey_id.clone(),
                title: journey.title.clone(),
                priority: journey.priority,
                status: JourneyStatus::Failed,
                flow_reports: vec![missing_backend_report(backend_name)],
                passed_steps: 0,
                failed_steps: 1,
                warning_steps: 0,
                skipped_steps: 0,
                time_ms: started.elapsed().as_millis() as u64,
            };
        };

        let executor = FlowExecutor::new(backend.clone())
            .with_kill_switch(self.kill_switch.clone())
            .with_audit(self.audit.clone())
            .with_clock(self.clock.clone());

        let mut flow_reports: Vec<ExecutionReport> = Vec::new();
        for flow_ref in &journey.flows {
            if cancel.is_cancelled() {
                break;
            }
            let Some(flow) = pack.flow_by_name(&flow_ref.flow_ref_id) else {
                flow_reports.push(flow_not_found_report(&flow_ref.flow_ref_id));
                continue;
            };

            if let Some(forbidden) = first_forbidden_action(pack, flow) {
                tracing::warn!(
                    flow = %flow.test_name,
                    action = %forbidden.1,
                    "flow uses a forbidden action"
                );
                flow_reports.push(forbidden_action_report(flow, forbidden));
                continue;
            }

            let mut flow = flow.clone();
            if pack.guardrails.require_target_lock_for_desktop
                && flow.backend.eq_ignore_ascii_case("desktop")
            {
                flow.target_lock = true;
            }

            let dir = self
                .artifact_root
                .join(&journey.journey_id)
                .join(sanitize(&flow.test_name));
            flow_reports.push(executor.execute_flow_in(&flow, cancel, &dir).await);
        }

        let mut result = JourneyResult {
            journey_id: journey.journey_id.clone(),
            title: journey.title.clone(),
            priority: journey.priority,
            status: JourneyStatus::Passed,
            flow_reports,
            passed_steps: 0,
            failed_steps: 0,
            warning_steps: 0,
            skipped_steps: 0,
            time_ms: started.elapsed().as_millis() as u64,
        };
        fold_journey(&mut result);
        result
    }
}

impl Default for PackRunner {
    fn default() -> Self {
        Self::new()
    }
}

fn fold_journey(result: &mut JourneyResult) {
    let mut any_failed = false;
    let mut any_soft = false;
    for report in &result.flow_reports {
        for step in &report.steps {
            match step.status {
                StepStatus::Passed => result.passed_steps += 1,
                StepStatus::Failed | StepStatus::Error => result.failed_steps += 1,
                StepStatus::Warning => result.warning_steps += 1,
                StepStatus::Skipped => result.skipped_steps += 1,
            }
        }
        match report.result {
            FlowVerdict::Failed => any_failed = true,
            FlowVerdict::Mixed => any_soft = true,
            FlowVerdict::Passed => {}
        }
    }
    result.status = if result.flow_reports.is_empty() {
        JourneyStatus::Skipped
    } else if any_failed {
        JourneyStatus::Failed
    } else if any_soft {
        JourneyStatus::Mixed
    } else {
        JourneyStatus::Passed
    };
}

fn skipped_journey(journey: &Journey) -> JourneyResult {
    JourneyResult {
        journey_id: journey.journey_id.clone(),
        title: journey.title.clone(),
        priority: journey.priority,
        status: JourneyStatus::Skipped,
        flow_reports: Vec::new(),
        passed_steps: 0,
        failed_steps: 0,
        warning_steps: 0,
        skipped_steps: 0,
        time_ms: 0,
    }
}

fn summarize(results: &[JourneyResult], duration_ms: u64) -> PackSummary {
    let count = |s: JourneyStatus| results.iter().filter(|r| r.status == s).count();
    PackSummary {
        total_journeys: results.len(),
        passed_journeys: count(JourneyStatus::Passed),
        failed_journeys: count(JourneyStatus::Failed),
        warning_journeys: count(JourneyStatus::Mixed),
        skipped_journeys: count(JourneyStatus::Skipped),
        total_steps: results
            .iter()
            .map(|r| {
                r.passed_steps + r.failed_steps + r.warning_steps + r.skipped_steps
            })
            .sum(),
        duration_ms,
    }
}

/// Raw fallback counters; the report builder derives the rate.
fn raw_perception(results: &[JourneyResult]) -> PerceptionStats {
    let mut stats = PerceptionStats::default();
    for result in results {
        for report in &result.flow_reports {
            for step in &report.steps {
                if step.warning_code.as_deref() == Some(WARNING_VISION_FALLBACK) {
                    stats.structural_to_visual_fallbacks += 1;
                    stats.visual_captures += 1;
                } else if step.selector.is_some() && step.status != StepStatus::Skipped {
                    stats.structural_captures += 1;
                }
            }
        }
    }
    stats
}

fn first_forbidden_action<'a>(
    pack: &TestPack,
    flow: &'a TestFlow,
) -> Option<(i64, StepAction)> {
    flow.steps
        .iter()
        .enumerate()
        .find(|(_, s)| pack.guardrails.forbidden_actions.contains(&s.action))
        .map(|(i, s)| (if s.order > 0 { s.order } else { i as i64 + 1 }, s.action))
}

fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}

fn shell_report(test_name: &str, steps: Vec<StepResult>, summary: String) -> ExecutionReport {
    ExecutionReport {
        schema_version: FLOW_SCHEMA_VERSION,
        test_name: test_name.to_string(),
        result: FlowVerdict::Failed,
        total_time_ms: 0,
        started_at: chrono::Utc::now(),
        finished_at: chrono::Utc::now(),
        backend_used: String::new(),
        backend_version: String::new(),
        machine_info: MachineInfo::capture(),
        steps,
        summary,
    }
}

fn missing_backend_report(backend_name: &str) -> ExecutionReport {
    shell_report(
        "",
        Vec::new(),
        format!("Required backend '{backend_name}' is not available"),
    )
}

fn flow_not_found_report(flow_ref_id: &str) -> ExecutionReport {
    shell_report(
        flow_ref_id,
        Vec::new(),
        format!("No compiled flow named '{flow_ref_id}'"),
    )
}

fn forbidden_action_report(flow: &TestFlow, forbidden: (i64, StepAction)) -> ExecutionReport {
    let (order, action) = forbidden;
    let mut step = StepResult::synthesized(
        order,
        action,
        StepStatus::Failed,
        "Refused by guardrails before execution",
    );
    step.error = Some(format!("forbidden action '{action}'"));
    shell_report(
        &flow.test_name,
        vec![step],
        format!("Forbidden action '{action}' at step {order}"),
    )
}
