//! Step assertion evaluation (the `assertions` list on a step, plus the
//! `assert_*` actions' expected/found production).

use crate::backend::log::CallLog;
use crate::capabilities::{ProcessEnumerator, UiTree, WindowInfo};
use crate::model::{Assertion, AssertionResult, AssertionType};
use crate::selector::Selector;

use super::resolve::resolve_once;

pub(super) struct AssertionDeps<'a> {
    pub tree: &'a dyn UiTree,
    pub processes: &'a dyn ProcessEnumerator,
    pub window: Option<&'a WindowInfo>,
}

/// Evaluate one assertion. Never faults: failures are data.
pub(super) fn evaluate(
    assertion: &Assertion,
    deps: &AssertionDeps<'_>,
    log: &mut CallLog,
) -> AssertionResult {
    let result = match assertion.kind {
        AssertionType::Exists => exists(assertion, deps, true),
        AssertionType::NotExists => exists(assertion, deps, false),
        AssertionType::TextContains => text(assertion, deps, false),
        AssertionType::TextEquals => text(assertion, deps, true),
        AssertionType::WindowTitle => window_title(assertion, deps),
        AssertionType::ProcessRunning => process_running(assertion, deps),
    };
    if result.passed {
        log.info(format!("Assertion '{}' passed", assertion.kind));
    } else {
        log.error(format!(
            "Assertion '{}' failed: expected {:?}, found {:?}",
            assertion.kind, result.expected, result.found
        ));
    }
    result
}

fn resolve_selector(
    assertion: &Assertion,
    deps: &AssertionDeps<'_>,
) -> Result<Option<crate::capabilities::ElementProps>, AssertionResult> {
    let Some(raw) = assertion.selector.as_deref() else {
        return Err(failure(assertion, "selector", "no selector given"));
    };
    let Some(window) = deps.window else {
        return Err(failure(assertion, "a resolved window", "no window in scope"));
    };
    let selector = match Selector::parse(raw, false) {
        Ok(s) => s,
        Err(e) => return Err(failure(assertion, "a parseable selector", &e.to_string())),
    };
    Ok(resolve_once(deps.tree, window, &selector))
}

fn exists(assertion: &Assertion, deps: &AssertionDeps<'_>, want_present: bool) -> AssertionResult {
    let found = match resolve_selector(assertion, deps) {
        Ok(found) => found,
        Err(fail) => return fail,
    };
    let present = found.is_some();
    AssertionResult {
        kind: assertion.kind,
        passed: present == want_present,
        expected: Some(if want_present {
            "element present".into()
        } else {
            "element absent".into()
        }),
        found: Some(match &found {
            Some(el) => format!("{}#{}", el.control_type, el.name),
            None => "nothing".into(),
        }),
        message: None,
    }
}

fn text(assertion: &Assertion, deps: &AssertionDeps<'_>, exact: bool) -> AssertionResult {
    let expected = assertion.expected.clone().unwrap_or_default();
    let found = match resolve_selector(assertion, deps) {
        Ok(found) => found,
        Err(fail) => return fail,
    };
    let Some(el) = found else {
        return failure(assertion, &expected, "element not found");
    };
    let actual = deps.tree.element_text(el.id).unwrap_or_default();
    let passed = if exact {
        actual == expected
    } else {
        actual.contains(&expected)
    };
    AssertionResult {
        kind: assertion.kind,
        passed,
        expected: Some(expected),
        found: Some(actual),
        message: None,
    }
}

fn window_title(assertion: &Assertion, deps: &AssertionDeps<'_>) -> AssertionResult {
    let expected = assertion.expected.clone().unwrap_or_default();
    let Some(window) = deps.window else {
        return failure(assertion, &expected, "no window in scope");
    };
    // Re-read: the title may have changed since resolution.
    let title = deps
        .tree
        .window(window.id)
        .ok()
        .flatten()
        .map(|w| w.title)
        .unwrap_or_else(|| window.title.clone());
    AssertionResult {
        kind: assertion.kind,
        passed: title.to_lowercase().contains(&expected.to_lowercase()),
        expected: Some(expected),
        found: Some(title),
        message: None,
    }
}

fn process_running(assertion: &Assertion, deps: &AssertionDeps<'_>) -> AssertionResult {
    let expected = assertion.expected.clone().unwrap_or_default();
    let running = deps.processes.is_running(&expected).unwrap_or(false);
    AssertionResult {
        kind: assertion.kind,
        passed: running,
        expected: Some(format!("process '{expected}' running")),
        found: Some(if running {
            "running".into()
        } else {
            "not running".into()
        }),
        message: None,
    }
}

fn failure(assertion: &Assertion, expected: &str, found: &str) -> AssertionResult {
    AssertionResult {
        kind: assertion.kind,
        passed: false,
        expected: Some(expected.to_string()),
        found: Some(found.to_string()),
        message: None,
    }
}
