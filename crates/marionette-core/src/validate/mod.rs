//! Flow validation: the schema gate that must pass before any side effect.
//!
//! `validate` is a pure function. It performs no I/O, mutates nothing,
//! and returns byte-identical output for the same input.

use crate::model::{
    Assertion, AssertionType, SelectorKind, StepAction, TestFlow, TestStep,
    flow::FLOW_SCHEMA_VERSION,
};
use crate::selector::{is_known_control_type, Selector, SelectorError};

#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationReport {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Validate one flow against the schema contract.
pub fn validate(flow: &TestFlow) -> ValidationReport {
    let mut report = ValidationReport::default();

    validate_top_level(flow, &mut report);

    let mut seen_orders = std::collections::BTreeMap::new();
    for (i, step) in flow.steps.iter().enumerate() {
        let idx = i + 1;
        validate_step(idx, step, flow, &mut report);
        if step.order != 0 {
            *seen_orders.entry(step.order).or_insert(0usize) += 1;
        }
    }
    for (order, count) in seen_orders {
        if count > 1 {
            report
                .warnings
                .push(format!("Duplicate step order {order} used by {count} steps."));
        }
    }

    report
}

fn validate_top_level(flow: &TestFlow, report: &mut ValidationReport) {
    if flow.test_name.trim().is_empty() {
        report.errors.push("testName must not be empty.".to_string());
    } else if flow.test_name.trim().eq_ignore_ascii_case("untitled") {
        report
            .warnings
            .push("testName is a default placeholder; give the flow a real name.".to_string());
    }
    if flow.steps.is_empty() {
        report.errors.push("Flow has no steps.".to_string());
    }
    if flow.timeout_seconds < 0 {
        report
            .errors
            .push("timeoutSeconds must be >= 0.".to_string());
    }
    if flow.schema_version != FLOW_SCHEMA_VERSION {
        report.warnings.push(format!(
            "schemaVersion {} is not the current version {}.",
            flow.schema_version, FLOW_SCHEMA_VERSION
        ));
    }
}

fn has_selector(step: &TestStep) -> bool {
    step.effective_selector()
        .map(|s| !s.trim().is_empty())
        .unwrap_or(false)
}

fn is_set(field: &Option<String>) -> bool {
    field.as_deref().map(|s| !s.trim().is_empty()).unwrap_or(false)
}

fn validate_step(idx: usize, step: &TestStep, flow: &TestFlow, report: &mut ValidationReport) {
    let action = step.action;

    // Action-specific required fields.
    match action {
        StepAction::Click
        | StepAction::Hover
        | StepAction::AssertExists
        | StepAction::AssertNotExists => {
            if !has_selector(step) {
                report
                    .errors
                    .push(format!("Step {idx}: '{action}' requires a selector."));
            }
        }
        StepAction::Type => {
            if !is_set(&step.text) {
                report
                    .errors
                    .push(format!("Step {idx}: 'type' requires text."));
            }
        }
        StepAction::SendKeys => {
            if !is_set(&step.keys) {
                report
                    .errors
                    .push(format!("Step {idx}: 'send_keys' requires keys."));
            }
        }
        StepAction::Navigate => {
            if !is_set(&step.url) {
                report
                    .errors
                    .push(format!("Step {idx}: 'navigate' requires a url."));
            } else {
                report.warnings.push(format!(
                    "Step {idx}: 'navigate' opens the url with the shell; there is no in-app navigation."
                ));
            }
        }
        StepAction::Launch => {
            if !is_set(&step.process_path) {
                report
                    .errors
                    .push(format!("Step {idx}: 'launch' requires a processPath."));
            }
        }
        StepAction::AssertText => {
            if !has_selector(step) {
                report
                    .errors
                    .push(format!("Step {idx}: 'assert_text' requires a selector."));
            }
            if !is_set(&step.contains) {
                report
                    .errors
                    .push(format!("Step {idx}: 'assert_text' requires contains."));
            }
        }
        StepAction::AssertWindow => {
            if !is_set(&step.window_title) && !is_set(&step.contains) {
                report.errors.push(format!(
                    "Step {idx}: 'assert_window' requires a windowTitle or contains."
                ));
            }
        }
        StepAction::FocusWindow => {
            if !is_set(&step.app) && !is_set(&step.window_title) {
                report.errors.push(format!(
                    "Step {idx}: 'focus_window' requires an app or windowTitle."
                ));
            }
        }
        StepAction::Scroll => {
            if step.direction.is_none() {
                report.errors.push(format!(
                    "Step {idx}: 'scroll' requires a direction (up, down, left or right)."
                ));
            }
        }
        StepAction::Wait | StepAction::Screenshot => {}
    }

    // Sanity.
    if step.timeout_ms < 0 {
        report
            .errors
            .push(format!("Step {idx}: timeoutMs must be >= 0."));
    }
    if step.delay_after_ms < 0 {
        report
            .errors
            .push(format!("Step {idx}: delayAfterMs must be >= 0."));
    }
    if !is_set(&step.description) {
        report.warnings.push(format!(
            "Step {idx}: no description; reports and the vision fallback work better with one."
        ));
    }

    // Selector grammar.
    if let Some(raw) = step.effective_selector() {
        if !raw.trim().is_empty() {
            lint_selector(idx, raw, report);
        }
    }

    // Assertions.
    for assertion in &step.assertions {
        validate_assertion(idx, assertion, report);
    }

    // Backend rules.
    if flow.backend.eq_ignore_ascii_case("desktop") {
        if let Some(ts) = &step.typed_selector {
            if !matches!(ts.kind, SelectorKind::DesktopUia) {
                report.errors.push(format!(
                    "Step {idx}: backend 'desktop' only resolves desktop_uia selectors."
                ));
            }
        }
    }
}

fn lint_selector(idx: usize, raw: &str, report: &mut ValidationReport) {
    if !raw.contains('#') {
        report.warnings.push(format!(
            "Step {idx}: selector '{raw}' has no '#'; matching by identifier only."
        ));
    }
    match Selector::parse(raw, false) {
        Ok(sel) => {
            if let Some(tag) = &sel.control_type {
                if !is_known_control_type(tag) {
                    report.warnings.push(format!(
                        "Step {idx}: unknown control type '{tag}' in selector '{raw}'."
                    ));
                }
            }
        }
        Err(SelectorError::EmptyIdentifier(_)) => {
            report.errors.push(format!(
                "Step {idx}: selector '{raw}' has an empty identifier."
            ));
        }
        Err(SelectorError::Empty) => {
            report
                .errors
                .push(format!("Step {idx}: selector is empty."));
        }
    }
}

fn validate_assertion(idx: usize, assertion: &Assertion, report: &mut ValidationReport) {
    let kind = assertion.kind;
    let needs_selector = matches!(
        kind,
        AssertionType::Exists
            | AssertionType::NotExists
            | AssertionType::TextContains
            | AssertionType::TextEquals
    );
    let needs_expected = matches!(
        kind,
        AssertionType::TextContains
            | AssertionType::TextEquals
            | AssertionType::WindowTitle
            | AssertionType::ProcessRunning
    );
    if needs_selector && !is_set(&assertion.selector) {
        report.errors.push(format!(
            "Step {idx}: assertion '{kind}' requires a selector."
        ));
    }
    if needs_expected && !is_set(&assertion.expected) {
        report.errors.push(format!(
            "Step {idx}: assertion '{kind}' requires expected."
        ));
    }
}
