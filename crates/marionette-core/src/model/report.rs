//! Per-step and per-flow execution results.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::flow::{AssertionType, StepAction};
use super::string_enum;

string_enum! {
    /// Terminal status of one executed step.
    pub enum StepStatus {
        Passed => "passed",
        Failed => "failed",
        Skipped => "skipped",
        Error => "error",
        Warning => "warning",
    }
}

string_enum! {
    /// Aggregate verdict of a flow run.
    pub enum FlowVerdict {
        Passed => "passed",
        Failed => "failed",
        Mixed => "mixed",
    }
}

string_enum! {
    pub enum LogLevel {
        Debug => "debug",
        Info => "info",
        Warn => "warn",
        Error => "error",
    }
}

/// Screen-space rectangle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bounds {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl Bounds {
    pub fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Non-empty with positive area.
    pub fn has_area(&self) -> bool {
        self.width > 0 && self.height > 0
    }

    pub fn center(&self) -> (i32, i32) {
        (self.x + self.width / 2, self.y + self.height / 2)
    }
}

/// Where an action will land, in screen pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClickPoint {
    pub x: i32,
    pub y: i32,
    pub w: i32,
    pub h: i32,
}

impl From<Bounds> for ClickPoint {
    fn from(b: Bounds) -> Self {
        Self {
            x: b.x,
            y: b.y,
            w: b.width,
            h: b.height,
        }
    }
}

/// Element facts captured at resolution time and never re-read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElementSnapshot {
    pub control_type: String,
    pub name: String,
    #[serde(default)]
    pub automation_id: String,
    pub bounds: Bounds,
    pub enabled: bool,
    pub offscreen: bool,
}

/// One time-ordered line of backend activity within a step. Timestamps
/// are milliseconds since step start, monotonic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackendLogLine {
    pub timestamp_ms: u64,
    pub level: LogLevel,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssertionResult {
    #[serde(rename = "type")]
    pub kind: AssertionType,
    pub passed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub found: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Outcome of one step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepResult {
    pub step_index: i64,
    pub action: StepAction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selector: Option<String>,
    #[serde(default)]
    pub description: String,
    pub status: StepStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warning_code: Option<String>,
    #[serde(default)]
    pub retry_count: u32,
    pub time_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub element_snapshot: Option<ElementSnapshot>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selector_resolved_to: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub click_point: Option<ClickPoint>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub screenshot: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub assertion_results: Vec<AssertionResult>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub backend_call_log: Vec<BackendLogLine>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diagnostics: Option<String>,
    #[serde(default)]
    pub backend_name: String,
}

impl StepResult {
    /// A result the executor synthesizes without touching the backend
    /// (skips, validation rejects).
    pub fn synthesized(
        step_index: i64,
        action: StepAction,
        status: StepStatus,
        diagnostics: impl Into<String>,
    ) -> Self {
        Self {
            step_index,
            action,
            selector: None,
            description: String::new(),
            status,
            warning_code: None,
            retry_count: 0,
            time_ms: 0,
            element_snapshot: None,
            selector_resolved_to: None,
            click_point: None,
            screenshot: None,
            assertion_results: Vec::new(),
            backend_call_log: Vec::new(),
            error: None,
            diagnostics: Some(diagnostics.into()),
            backend_name: String::new(),
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self.status, StepStatus::Failed | StepStatus::Error)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MachineInfo {
    pub hostname: String,
    pub os: String,
    pub arch: String,
}

impl MachineInfo {
    pub fn capture() -> Self {
        let hostname = std::env::var("COMPUTERNAME")
            .or_else(|_| std::env::var("HOSTNAME"))
            .unwrap_or_else(|_| "unknown".to_string());
        Self {
            hostname,
            os: std::env::consts::OS.to_string(),
            arch: std::env::consts::ARCH.to_string(),
        }
    }
}

/// The contract artifact of a flow run: complete and well-formed even
/// when the run failed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionReport {
    pub schema_version: i64,
    pub test_name: String,
    pub result: FlowVerdict,
    pub total_time_ms: u64,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub backend_used: String,
    pub backend_version: String,
    pub machine_info: MachineInfo,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub steps: Vec<StepResult>,
    #[serde(default)]
    pub summary: String,
}

impl ExecutionReport {
    pub fn passed(&self) -> bool {
        self.result == FlowVerdict::Passed
    }

    /// Fold step statuses into the aggregate verdict: any failure or
    /// error wins, then any warning or skip downgrades to mixed.
    pub fn fold_verdict(steps: &[StepResult]) -> FlowVerdict {
        let mut saw_soft = false;
        for s in steps {
            match s.status {
                StepStatus::Failed | StepStatus::Error => return FlowVerdict::Failed,
                StepStatus::Warning | StepStatus::Skipped => saw_soft = true,
                StepStatus::Passed => {}
            }
        }
        if saw_soft {
            FlowVerdict::Mixed
        } else {
            FlowVerdict::Passed
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn step(status: StepStatus) -> StepResult {
        StepResult::synthesized(1, StepAction::Wait, status, "t")
    }

    #[test]
    fn verdict_folding() {
        assert_eq!(
            ExecutionReport::fold_verdict(&[step(StepStatus::Passed)]),
            FlowVerdict::Passed
        );
        assert_eq!(
            ExecutionReport::fold_verdict(&[step(StepStatus::Passed), step(StepStatus::Warning)]),
            FlowVerdict::Mixed
        );
        assert_eq!(
            ExecutionReport::fold_verdict(&[step(StepStatus::Warning), step(StepStatus::Failed)]),
            FlowVerdict::Failed
        );
        assert_eq!(ExecutionReport::fold_verdict(&[]), FlowVerdict::Passed);
    }

    #[test]
    fn bounds_math() {
        let b = Bounds::new(10, 20, 100, 50);
        assert!(b.has_area());
        assert_eq!(b.center(), (60, 45));
        assert!(!Bounds::new(0, 0, 0, 10).has_area());
    }
}
