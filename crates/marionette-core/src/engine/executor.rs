//! Single-flow orchestration: validate, step through the backend,
//! stop on failure, assemble the report.
//!
//! The executor never performs UI calls of its own; resolution, checks
//! and actions are all delegated to the backend.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use tokio_util::sync::CancellationToken;

use crate::backend::{AutomationBackend, BackendExecutionContext, BackendOptions};
use crate::capabilities::{Clock, SystemClock};
use crate::model::{
    ExecutionReport, FlowVerdict, MachineInfo, StepResult, StepStatus, TestFlow,
    flow::FLOW_SCHEMA_VERSION,
};
use crate::safety::{events, AuditLog, KillSwitch};
use crate::validate::validate;

pub struct FlowExecutor {
    backend: Arc<dyn AutomationBackend>,
    kill_switch: KillSwitch,
    audit: AuditLog,
    clock: Arc<dyn Clock>,
}

impl FlowExecutor {
    pub fn new(backend: Arc<dyn AutomationBackend>) -> Self {
        Self {
            backend,
            kill_switch: KillSwitch::new(),
            audit: AuditLog::disabled(),
            clock: Arc::new(SystemClock),
        }
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

    pub fn backend(&self) -> &Arc<dyn AutomationBackend> {
        &self.backend
    }

    /// Run one flow with artifacts rooted in a temp-free default
    /// directory under `reports/`.
    pub async fn execute_flow(
        &self,
        flow: &TestFlow,
        cancel: &CancellationToken,
    ) -> ExecutionReport {
        let dir = PathBuf::from("reports").join("_artifacts");
        self.execute_flow_in(flow, cancel, &dir).await
    }

    /// Run one flow, writing step artifacts into `artifact_dir`.
    pub async fn execute_flow_in(
        &self,
        flow: &TestFlow,
        cancel: &CancellationToken,
        artifact_dir: &Path,
    ) -> ExecutionReport {
        let started_at = self.clock.now();
        let started = Instant::now();

        let mut flow = flow.clone();
        flow.auto_number_steps();

        // Schema gate: no side effect before this passes.
        let validation = validate(&flow);
        if !validation.is_valid() {
            tracing::warn!(
                test_name = %flow.test_name,
                errors = validation.errors.len(),
                "flow rejected by validator"
            );
            return ExecutionReport {
                schema_version: FLOW_SCHEMA_VERSION,
                test_name: flow.test_name.clone(),
                result: FlowVerdict::Failed,
                total_time_ms: started.elapsed().as_millis() as u64,
                started_at,
                finished_at: self.clock.now(),
                backend_used: self.backend.name().to_string(),
                backend_version: self.backend.version(),
                machine_info: MachineInfo::capture(),
                steps: Vec::new(),
                summary: format!("Validation failed: {}", validation.errors.join("; ")),
            };
        }

        if let Err(e) = self.backend.initialize(&BackendOptions {
            artifact_dir: artifact_dir.to_path_buf(),
        }) {
            tracing::warn!(error = %e, "backend initialize failed");
        }

        let mut ctx = BackendExecutionContext::new(flow.clone(), artifact_dir)
            .with_cancel(cancel.clone())
            .with_kill_switch(self.kill_switch.clone());

        let mut steps_out: Vec<StepResult> = Vec::new();
        let total = flow.steps.len();

        for (i, step) in flow.steps.iter().enumerate() {
            if cancel.is_cancelled() {
                self.skip_rest(&flow, i, "Step cancelled", &mut steps_out);
                break;
            }
            if self.kill_switch.is_tripped() {
                self.audit.record(
                    events::KILL_SWITCH,
                    &format!("flow '{}' stopped at step {}", flow.test_name, step.order),
                );
                self.skip_rest(&flow, i, "Kill switch engaged", &mut steps_out);
                break;
            }

            tracing::debug!(step = step.order, action = %step.action, "executing step");
            let result = self.backend.execute_step(step, &mut ctx).await;
            let failed = result.is_failure();
            // Target-lock drift stops the flow regardless of policy.
            let lock_violation = result
                .error
                .as_deref()
                .map(|e| e.contains("TargetLock"))
                .unwrap_or(false);
            steps_out.push(result);

            if failed && (flow.stop_on_failure || lock_violation) {
                self.skip_rest(&flow, i + 1, "Skipped due to earlier failure", &mut steps_out);
                break;
            }
        }

        let result = ExecutionReport::fold_verdict(&steps_out);
        let summary = summarize(&steps_out, total, started.elapsed().as_secs_f64());

        ExecutionReport {
            schema_version: FLOW_SCHEMA_VERSION,
            test_name: flow.test_name.clone(),
            result,
            total_time_ms: started.elapsed().as_millis() as u64,
            started_at,
            finished_at: self.clock.now(),
            backend_used: self.backend.name().to_string(),
            backend_version: self.backend.version(),
            machine_info: MachineInfo::capture(),
            steps: steps_out,
            summary,
        }
    }

    fn skip_rest(
        &self,
        flow: &TestFlow,
        from: usize,
        diagnostics: &str,
        steps_out: &mut Vec<StepResult>,
    ) {
        for step in &flow.steps[from..] {
            let mut skipped = StepResult::synthesized(
                step.order,
                step.action,
                StepStatus::Skipped,
                diagnostics,
            );
            skipped.selector = step.effective_selector().map(str::to_string);
            skipped.description = step.description.clone().unwrap_or_default();
            skipped.backend_name = self.backend.name().to_string();
            steps_out.push(skipped);
        }
    }
}

fn summarize(steps: &[StepResult], total: usize, elapsed_secs: f64) -> String {
    let count = |s: StepStatus| steps.iter().filter(|r| r.status == s).count();
    let passed = count(StepStatus::Passed);
    let failed = count(StepStatus::Failed) + count(StepStatus::Error);
    let warnings = count(StepStatus::Warning);
    let skipped = count(StepStatus::Skipped);
    format!(
        "{passed}/{total} steps passed ({failed} failed, {warnings} warnings, {skipped} skipped) in {elapsed_secs:.1}s"
    )
}
