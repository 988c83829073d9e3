//! Phase E: enrich a raw pack report with failures, warnings, coverage,
//! the fix queue and the confidence score.
//!
//! `build` is pure, deterministic and idempotent: every derived field is
//! recomputed from the journey results, so rebuilding a built report is
//! a no-op.

use std::collections::BTreeMap;

use crate::model::{
    CoverageAreaStatus, CoverageStatus, FailureEvidence, FixHint, FixPacket, FixQueueItem,
    JourneyResult, JourneyStatus, PackFailure, PackPlan, PackReport, PackSummary, PackWarning,
    PerceptionStats, Priority, StepResult, StepStatus, TestPack, WarningOccurrence,
    WARNING_VISION_FALLBACK,
};

pub fn build(raw: &PackReport, pack: &TestPack, plan: Option<&PackPlan>) -> PackReport {
    let mut report = raw.clone();

    report.summary = summarize(&report.journey_results, raw.summary.duration_ms);
    report.failures = collect_failures(&report.journey_results);
    report.warnings = collect_warnings(&report.journey_results);
    report.coverage_map_status = coverage_status(plan, pack, &report.journey_results);
    report.perception_stats = perception(&report.journey_results, report.summary.total_steps);
    report.fix_queue = fix_queue(&report.failures, &report.journey_results);
    report.confidence_score = confidence(
        &report.summary,
        &report.coverage_map_status,
        &report.perception_stats,
        &report.warnings,
    );
    report
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
            .map(|r| r.passed_steps + r.failed_steps + r.warning_steps + r.skipped_steps)
            .sum(),
        duration_ms,
    }
}

fn collect_failures(results: &[JourneyResult]) -> Vec<PackFailure> {
    let mut failures = Vec::new();
    for journey in results {
        for report in &journey.flow_reports {
            for step in &report.steps {
                if !matches!(step.status, StepStatus::Failed | StepStatus::Error) {
                    continue;
                }
                let (expected, found) = expected_found(step);
                failures.push(PackFailure {
                    journey_id: journey.journey_id.clone(),
                    flow_name: report.test_name.clone(),
                    step_index: step.step_index,
                    action: step.action,
                    message: step
                        .error
                        .clone()
                        .unwrap_or_else(|| "step failed".to_string()),
                    evidence: FailureEvidence {
                        step_index: step.step_index,
                        selector: step.selector.clone(),
                        expected,
                        found,
                        backend_call_log: step.backend_call_log.clone(),
                        screenshot: step.screenshot.clone(),
                        element_snapshot: step.element_snapshot.clone(),
                    },
                });
            }
        }
    }
    failures
}

fn expected_found(step: &StepResult) -> (Option<String>, Option<String>) {
    step.assertion_results
        .iter()
        .find(|a| !a.passed)
        .map(|a| (a.expected.clone(), a.found.clone()))
        .unwrap_or((None, None))
}

fn collect_warnings(results: &[JourneyResult]) -> Vec<PackWarning> {
    let mut grouped: BTreeMap<String, Vec<WarningOccurrence>> = BTreeMap::new();
    for journey in results {
        for report in &journey.flow_reports {
            for step in &report.steps {
                let Some(code) = &step.warning_code else {
                    continue;
                };
                grouped.entry(code.clone()).or_default().push(WarningOccurrence {
                    journey_id: journey.journey_id.clone(),
                    flow_name: report.test_name.clone(),
                    step_index: step.step_index,
                    confidence: vision_confidence(step),
                });
            }
        }
    }
    grouped
        .into_iter()
        .map(|(code, occurrences)| PackWarning {
            code,
            count: occurrences.len(),
            occurrences,
        })
        .collect()
}

/// Pull the confidence out of a `[Vision] label (0.87)` resolution
/// string.
fn vision_confidence(step: &StepResult) -> Option<f64> {
    if step.warning_code.as_deref() != Some(WARNING_VISION_FALLBACK) {
        return None;
    }
    let resolved = step.selector_resolved_to.as_deref()?;
    let open = resolved.rfind('(')?;
    let close = resolved.rfind(')')?;
    resolved.get(open + 1..close)?.parse().ok()
}

fn coverage_status(
    plan: Option<&PackPlan>,
    pack: &TestPack,
    results: &[JourneyResult],
) -> Vec<CoverageAreaStatus> {
    let Some(plan) = plan else {
        return Vec::new();
    };
    let by_id: BTreeMap<&str, &JourneyResult> = results
        .iter()
        .map(|r| (r.journey_id.as_str(), r))
        .collect();

    plan.coverage_map
        .iter()
        .map(|area| {
            // The plan's association, widened by journeys that declare
            // the area themselves.
            let mut journey_ids: Vec<String> = area.journey_ids.clone();
            for journey in &pack.journeys {
                if journey.coverage_areas.iter().any(|a| a == &area.area)
                    && !journey_ids.contains(&journey.journey_id)
                {
                    journey_ids.push(journey.journey_id.clone());
                }
            }

            let statuses: Vec<JourneyStatus> = journey_ids
                .iter()
                .filter_map(|id| by_id.get(id.as_str()).map(|r| r.status))
                .collect();

            let executed = statuses
                .iter()
                .filter(|s| **s != JourneyStatus::Skipped)
                .count();
            let status = if statuses.is_empty() || executed == 0 {
                CoverageStatus::Missing
            } else if statuses.len() == journey_ids.len()
                && statuses.iter().all(|s| *s == JourneyStatus::Passed)
            {
                // Every associated journey ran and passed cleanly.
                CoverageStatus::Ok
            } else {
                CoverageStatus::Partial
            };

            CoverageAreaStatus {
                area: area.area.clone(),
                status,
                journey_ids,
            }
        })
        .collect()
}

fn perception(results: &[JourneyResult], total_steps: usize) -> PerceptionStats {
    let mut stats = PerceptionStats::default();
    for journey in results {
        for report in &journey.flow_reports {
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
    stats.fallback_rate =
        stats.structural_to_visual_fallbacks as f64 / (total_steps.max(1)) as f64;
    stats
}

/// Root-cause signature for one failure.
fn classify(failure: &PackFailure, results: &[JourneyResult]) -> FixHint {
    let message = failure.message.as_str();
    if message.contains("TargetLock") {
        return FixHint::TargetLockViolation;
    }
    if message.contains("forbidden action") || message.contains("unknown key") {
        return FixHint::UnknownAction;
    }
    if message.contains("window not found") || message.contains("Window not found") {
        return FixHint::WindowMissing;
    }
    if message.contains("'enabled'") || message.contains("disabled") {
        return FixHint::ElementDisabled;
    }
    if message.contains("Element not found") {
        // Below-threshold vision attempts leave their reason in the
        // step diagnostics.
        if step_of(failure, results)
            .and_then(|s| s.diagnostics.as_deref())
            .map(|d| d.contains("confidence") && d.contains("below threshold"))
            .unwrap_or(false)
        {
            return FixHint::VisionBelowThreshold;
        }
        return FixHint::BadSelector;
    }
    if message.contains("text containing") || message.contains("Text mismatch") {
        return FixHint::TextMismatch;
    }
    if message.contains("Assertion failed") {
        return FixHint::TextMismatch;
    }
    FixHint::BadSelector
}

fn step_of<'a>(failure: &PackFailure, results: &'a [JourneyResult]) -> Option<&'a StepResult> {
    results
        .iter()
        .find(|j| j.journey_id == failure.journey_id)?
        .flow_reports
        .iter()
        .find(|r| r.test_name == failure.flow_name)?
        .steps
        .iter()
        .find(|s| s.step_index == failure.step_index)
}

fn priority_of(journey_id: &str, results: &[JourneyResult]) -> Priority {
    results
        .iter()
        .find(|j| j.journey_id == journey_id)
        .map(|j| j.priority)
        .unwrap_or(Priority::P3)
}

fn fix_queue(failures: &[PackFailure], results: &[JourneyResult]) -> Vec<FixQueueItem> {
    // Group by selector + root-cause signature.
    let mut groups: BTreeMap<(String, FixHint), Vec<&PackFailure>> = BTreeMap::new();
    for failure in failures {
        let hint = classify(failure, results);
        let key = (
            failure.evidence.selector.clone().unwrap_or_default(),
            hint,
        );
        groups.entry(key).or_default().push(failure);
    }

    let mut items: Vec<FixQueueItem> = groups
        .into_iter()
        .map(|((selector, hint), group)| {
            // Rank facts come from the highest-priority failure in the
            // group; recency is the latest failing step.
            let top = group
                .iter()
                .min_by_key(|f| priority_of(&f.journey_id, results))
                .map(|f| (*f).clone())
                .unwrap_or_else(|| group[0].clone());
            let last_step_index = group.iter().map(|f| f.step_index).max().unwrap_or(0);
            FixQueueItem {
                rank: 0,
                priority: priority_of(&top.journey_id, results),
                journey_id: top.journey_id.clone(),
                flow_name: top.flow_name.clone(),
                failure_count: group.len(),
                last_step_index,
                packet: FixPacket {
                    hint,
                    selector: if selector.is_empty() {
                        None
                    } else {
                        Some(selector)
                    },
                    detail: top.message.clone(),
                },
            }
        })
        .collect();

    items.sort_by(|a, b| {
        a.priority
            .cmp(&b.priority)
            .then(b.failure_count.cmp(&a.failure_count))
            .then(b.last_step_index.cmp(&a.last_step_index))
    });
    for (i, item) in items.iter_mut().enumerate() {
        item.rank = i + 1;
    }
    items
}

fn confidence(
    summary: &PackSummary,
    coverage: &[CoverageAreaStatus],
    perception: &PerceptionStats,
    warnings: &[PackWarning],
) -> f64 {
    // No passing journey means no confidence at all.
    if summary.total_journeys > 0 && summary.passed_journeys == 0 {
        return 0.0;
    }

    let journey_pass_rate =
        summary.passed_journeys as f64 / (summary.total_journeys.max(1)) as f64;
    let ok_areas = coverage
        .iter()
        .filter(|a| a.status == CoverageStatus::Ok)
        .count();
    let coverage_completion = ok_areas as f64 / (coverage.len().max(1)) as f64;
    let warning_count: usize = warnings.iter().map(|w| w.count).sum();
    let warning_rate = warning_count as f64 / (summary.total_steps.max(1)) as f64;

    let score = 0.6 * journey_pass_rate
        + 0.2 * coverage_completion
        + 0.1 * (1.0 - perception.fallback_rate)
        + 0.1 * (1.0 - (2.0 * warning_rate).min(1.0));
    (score * 1000.0).round() / 1000.0
}
