//! Per-action actionability checks.
//!
//! Every check outcome appends a line to the step's call log; the first
//! failed check aborts the step with a human-readable reason.

use std::sync::Arc;

use crate::backend::log::CallLog;
use crate::capabilities::{ElementProps, Sleeper, UiTree};
use crate::errors::StepFault;
use crate::model::StepAction;
use crate::timing::TimingSettings;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum Check {
    Visible,
    Enabled,
    Stable,
    ReceivesEvents,
    Editable,
}

/// Which checks guard which action. `exists` is implicit: an element
/// only reaches this point once resolved.
pub(super) fn checks_for(action: StepAction) -> &'static [Check] {
    match action {
        StepAction::Click => &[
            Check::Visible,
            Check::Stable,
            Check::Enabled,
            Check::ReceivesEvents,
        ],
        StepAction::Type => &[Check::Visible, Check::Enabled, Check::Editable],
        StepAction::Hover => &[Check::Visible, Check::Stable],
        StepAction::Scroll => &[Check::Visible],
        // exists-only or no checks at all.
        StepAction::AssertExists
        | StepAction::AssertText
        | StepAction::AssertWindow
        | StepAction::FocusWindow
        | StepAction::AssertNotExists
        | StepAction::SendKeys
        | StepAction::Wait
        | StepAction::Navigate
        | StepAction::Screenshot
        | StepAction::Launch => &[],
    }
}

pub(super) async fn evaluate(
    action: StepAction,
    element: &ElementProps,
    tree: &dyn UiTree,
    sleeper: &Arc<dyn Sleeper>,
    timing: &TimingSettings,
    log: &mut CallLog,
) -> Result<(), StepFault> {
    log.info("Actionability: exists ✓");
    for check in checks_for(action) {
        match check {
            Check::Visible => {
                if !element.bounds.has_area() {
                    log.error("Actionability: visible ✗");
                    return Err(fail(
                        "visible",
                        format!(
                            "bounding box {:?} is empty",
                            (element.bounds.width, element.bounds.height)
                        ),
                    ));
                }
                log.info("Actionability: visible ✓");
            }
            Check::Enabled => {
                if !element.enabled {
                    log.error("Actionability: enabled ✗");
                    return Err(fail("enabled", "element is disabled".to_string()));
                }
                log.info("Actionability: enabled ✓");
            }
            Check::Stable => {
                stability(element, tree, sleeper, timing, log).await?;
            }
            Check::ReceivesEvents => {
                if element.offscreen {
                    log.error("Actionability: receives_events ✗");
                    return Err(fail(
                        "receives_events",
                        "element is marked off-screen".to_string(),
                    ));
                }
                log.info("Actionability: receives_events ✓");
            }
            Check::Editable => {
                let editable = match element.value_read_only {
                    Some(read_only) => !read_only,
                    None => element.enabled && !element.offscreen,
                };
                if !editable {
                    log.error("Actionability: editable ✗");
                    return Err(fail(
                        "editable",
                        "element's value pattern is read-only".to_string(),
                    ));
                }
                log.info("Actionability: editable ✓");
            }
        }
    }
    Ok(())
}

/// Bounding box must read equal across two reads; one retry before
/// declaring instability.
async fn stability(
    element: &ElementProps,
    tree: &dyn UiTree,
    sleeper: &Arc<dyn Sleeper>,
    timing: &TimingSettings,
    log: &mut CallLog,
) -> Result<(), StepFault> {
    let first = tree
        .props(element.id)
        .map_err(|e| StepFault::ActionFailed(e.to_string()))?
        .bounds;
    sleeper.sleep(timing.stability_window()).await;
    let second = tree
        .props(element.id)
        .map_err(|e| StepFault::ActionFailed(e.to_string()))?
        .bounds;
    if first == second {
        log.info("Actionability: stable ✓");
        return Ok(());
    }

    sleeper.sleep(timing.stability_retry()).await;
    let third = tree
        .props(element.id)
        .map_err(|e| StepFault::ActionFailed(e.to_string()))?
        .bounds;
    if second == third {
        log.info("Actionability: stable ✓ (after retry)");
        return Ok(());
    }

    log.error("Actionability: stable ✗");
    Err(fail(
        "stable",
        format!(
            "bounds moved from ({},{},{},{}) to ({},{},{},{})",
            second.x, second.y, second.width, second.height, third.x, third.y, third.width,
            third.height
        ),
    ))
}

fn fail(check: &'static str, reason: String) -> StepFault {
    StepFault::Actionability { check, reason }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capabilities::fake::FakeUiTree;
    use crate::capabilities::NoopSleeper;
    use crate::model::Bounds;

    async fn run(
        tree: &FakeUiTree,
        element: crate::capabilities::ElementId,
        action: StepAction,
    ) -> Result<(), StepFault> {
        let sleeper: Arc<dyn Sleeper> = Arc::new(NoopSleeper);
        let props = tree.props(element).unwrap();
        let mut log = CallLog::new();
        evaluate(
            action,
            &props,
            tree,
            &sleeper,
            &TimingSettings::default(),
            &mut log,
        )
        .await
    }

    #[test]
    fn click_requires_all_four_checks() {
        assert_eq!(
            checks_for(StepAction::Click),
            &[
                Check::Visible,
                Check::Stable,
                Check::Enabled,
                Check::ReceivesEvents
            ]
        );
    }

    #[tokio::test]
    async fn disabled_element_fails_click() {
        let tree = FakeUiTree::new();
        let win = tree.add_window("App", "app.exe", 1);
        let btn = tree.add_element(win, None, "Button", "Go", "go");
        tree.with_element(btn, |el| {
            el.enabled(false);
        });
        let err = run(&tree, btn, StepAction::Click).await.unwrap_err();
        assert!(matches!(
            err,
            StepFault::Actionability { check: "enabled", .. }
        ));
    }

    #[tokio::test]
    async fn empty_bounds_fail_visibility() {
        let tree = FakeUiTree::new();
        let win = tree.add_window("App", "app.exe", 1);
        let btn = tree.add_element(win, None, "Button", "Go", "go");
        tree.with_element(btn, |el| {
            el.bounds(Bounds::new(0, 0, 0, 0));
        });
        let err = run(&tree, btn, StepAction::Click).await.unwrap_err();
        assert!(matches!(
            err,
            StepFault::Actionability { check: "visible", .. }
        ));
    }

    #[tokio::test]
    async fn drifting_bounds_fail_stability_with_both_coordinates() {
        let tree = FakeUiTree::new();
        let win = tree.add_window("App", "app.exe", 1);
        let btn = tree.add_element(win, None, "Button", "Go", "go");
        tree.with_element(btn, |el| {
            el.bounds_script(vec![
                Bounds::new(0, 0, 10, 10),
                Bounds::new(5, 0, 10, 10),
                Bounds::new(10, 0, 10, 10),
                Bounds::new(15, 0, 10, 10),
            ]);
        });
        let err = run(&tree, btn, StepAction::Click).await.unwrap_err();
        match err {
            StepFault::Actionability { check, reason } => {
                assert_eq!(check, "stable");
                assert!(reason.contains("(10,0,10,10)"), "{reason}");
                assert!(reason.contains("(15,0,10,10)"), "{reason}");
            }
            other => panic!("unexpected fault: {other:?}"),
        }
    }

    #[tokio::test]
    async fn settled_bounds_pass_after_retry() {
        let tree = FakeUiTree::new();
        let win = tree.add_window("App", "app.exe", 1);
        let btn = tree.add_element(win, None, "Button", "Go", "go");
        tree.with_element(btn, |el| {
            el.bounds_script(vec![
                Bounds::new(0, 0, 10, 10),
                Bounds::new(5, 0, 10, 10),
                Bounds::new(5, 0, 10, 10),
            ]);
        });
        assert!(run(&tree, btn, StepAction::Click).await.is_ok());
    }

    #[tokio::test]
    async fn readonly_value_pattern_blocks_type() {
        let tree = FakeUiTree::new();
        let win = tree.add_window("App", "app.exe", 1);
        let edit = tree.add_element(win, None, "Edit", "Name", "name");
        tree.with_element(edit, |el| {
            el.value_read_only(Some(true));
        });
        let err = run(&tree, edit, StepAction::Type).await.unwrap_err();
        assert!(matches!(
            err,
            StepFault::Actionability { check: "editable", .. }
        ));
    }

    #[tokio::test]
    async fn offscreen_fallback_editability() {
        let tree = FakeUiTree::new();
        let win = tree.add_window("App", "app.exe", 1);
        let edit = tree.add_element(win, None, "Edit", "Name", "name");
        tree.with_element(edit, |el| {
            el.value_read_only(None).offscreen(true);
        });
        let err = run(&tree, edit, StepAction::Type).await.unwrap_err();
        assert!(matches!(
            err,
            StepFault::Actionability { check: "editable", .. }
        ));
    }
}
