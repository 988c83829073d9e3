//! Pack-level reporting: journey results, failures, fix queue, confidence.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::flow::StepAction;
use super::pack::Priority;
use super::report::{BackendLogLine, ElementSnapshot, ExecutionReport};
use super::string_enum;

string_enum! {
    /// Aggregate status of one journey.
    pub enum JourneyStatus {
        Passed => "passed",
        Failed => "failed",
        Mixed => "mixed",
        Skipped => "skipped",
    }
}

string_enum! {
    /// Per coverage area: did the associated journeys exercise it cleanly?
    pub enum CoverageStatus {
        Ok => "ok",
        Partial => "partial",
        Missing => "missing",
    }
}

string_enum! {
    /// Machine-readable root-cause hint attached to a failure group.
    pub enum FixHint {
        BadSelector => "bad_selector",
        ElementDisabled => "element_disabled",
        WindowMissing => "window_missing",
        TextMismatch => "text_mismatch",
        VisionBelowThreshold => "vision_below_threshold",
        TargetLockViolation => "target_lock_violation",
        UnknownAction => "unknown_action",
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackSummary {
    pub total_journeys: usize,
    pub passed_journeys: usize,
    pub failed_journeys: usize,
    pub warning_journeys: usize,
    pub skipped_journeys: usize,
    pub total_steps: usize,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JourneyResult {
    pub journey_id: String,
    #[serde(default)]
    pub title: String,
    pub priority: Priority,
    pub status: JourneyStatus,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub flow_reports: Vec<ExecutionReport>,
    pub passed_steps: usize,
    pub failed_steps: usize,
    pub warning_steps: usize,
    pub skipped_steps: usize,
    pub time_ms: u64,
}

/// Everything a repair agent needs to reproduce one failed step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailureEvidence {
    pub step_index: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selector: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub found: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub backend_call_log: Vec<BackendLogLine>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub screenshot: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub element_snapshot: Option<ElementSnapshot>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackFailure {
    pub journey_id: String,
    pub flow_name: String,
    pub step_index: i64,
    pub action: StepAction,
    pub message: String,
    pub evidence: FailureEvidence,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WarningOccurrence {
    pub journey_id: String,
    pub flow_name: String,
    pub step_index: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
}

/// Warnings aggregated by `warning_code`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackWarning {
    pub code: String,
    pub count: usize,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub occurrences: Vec<WarningOccurrence>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CoverageAreaStatus {
    pub area: String,
    pub status: CoverageStatus,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub journey_ids: Vec<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerceptionStats {
    pub structural_captures: u64,
    pub visual_captures: u64,
    pub structural_to_visual_fallbacks: u64,
    pub fallback_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FixPacket {
    pub hint: FixHint,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selector: Option<String>,
    #[serde(default)]
    pub detail: String,
}

/// One ranked entry of repair work. Ordering: journey priority, then
/// failure count, then recency (latest failing step).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FixQueueItem {
    pub rank: usize,
    pub journey_id: String,
    pub flow_name: String,
    pub priority: Priority,
    pub failure_count: usize,
    pub last_step_index: i64,
    pub packet: FixPacket,
}

/// Confidence-scored multi-journey report. Built once by the report
/// builder; rebuilding from the same inputs is a no-op.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackReport {
    pub pack_id: String,
    #[serde(default)]
    pub pack_name: String,
    #[serde(default)]
    pub summary: PackSummary,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub journey_results: Vec<JourneyResult>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failures: Vec<PackFailure>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<PackWarning>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub coverage_map_status: Vec<CoverageAreaStatus>,
    #[serde(default)]
    pub perception_stats: PerceptionStats,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fix_queue: Vec<FixQueueItem>,
    #[serde(default)]
    pub confidence_score: f64,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aborted_reason: Option<String>,
}
