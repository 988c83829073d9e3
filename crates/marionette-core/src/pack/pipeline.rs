//! End-to-end pack orchestration: Plan -> Compile -> Validate ->
//! Execute -> Report.
//!
//! Phase faults abort the current phase; outputs of prior phases are
//! preserved in the result so a failed pipeline is still inspectable.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::model::{PackPlan, PackReport, TestPack};
use crate::providers::chat::ChatClient;

use super::compiler::{self, CompileResult};
use super::planner;
use super::report;
use super::runner::PackRunner;

#[derive(Debug, Default)]
pub struct PipelineResult {
    pub plan: Option<PackPlan>,
    pub compile: Option<CompileResult>,
    pub report: Option<PackReport>,
    /// Phase-level faults (chat unreachable, compile retries exhausted).
    pub phase_errors: Vec<String>,
    pub success: bool,
}

pub struct PackPipeline {
    chat: Arc<dyn ChatClient>,
    runner: PackRunner,
}

impl PackPipeline {
    pub fn new(chat: Arc<dyn ChatClient>, runner: PackRunner) -> Self {
        Self { chat, runner }
    }

    pub async fn run(&self, pack: &TestPack, cancel: &CancellationToken) -> PipelineResult {
        let mut result = PipelineResult::default();

        // Phase A: plan.
        let plan = match planner::plan(pack, self.chat.as_ref(), cancel).await {
            Ok(outcome) => {
                tracing::info!(%outcome.message, duration_ms = outcome.duration_ms, "plan ready");
                outcome.plan
            }
            Err(e) => {
                result.phase_errors.push(format!("plan: {e}"));
                return result;
            }
        };
        result.plan = Some(plan.clone());

        // Phases B/C: compile with the validation gate.
        let compiled = match compiler::compile(pack, &plan, self.chat.as_ref(), cancel).await {
            Ok(c) => c,
            Err(e) => {
                result.phase_errors.push(format!("compile: {e}"));
                return result;
            }
        };
        let success = compiled.success;
        let compiled_pack = compiled.pack.clone();
        result.compile = Some(compiled);
        if !success {
            result
                .phase_errors
                .push("compile: retries exhausted without a valid pack".to_string());
            return result;
        }
        let Some(compiled_pack) = compiled_pack else {
            result
                .phase_errors
                .push("compile: no pack produced".to_string());
            return result;
        };

        // Phase D: execute.
        let raw = self.runner.execute(&compiled_pack, cancel).await;

        // Phase E: enrich.
        let built = report::build(&raw, &compiled_pack, Some(&plan));
        result.success = built.summary.failed_journeys == 0 && built.aborted_reason.is_none();
        result.report = Some(built);
        result
    }
}
