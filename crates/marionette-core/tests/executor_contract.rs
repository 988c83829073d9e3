//! End-to-end contract tests: flows driven through the real step
//! machine over the scriptable in-memory capabilities.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use marionette_core::backend::desktop::DesktopBackend;
use marionette_core::backend::{AutomationBackend, BackendExecutionContext};
use marionette_core::capabilities::fake::{FakeCapture, FakeInput, FakeProcesses, FakeUiTree};
use marionette_core::capabilities::NoopSleeper;
use marionette_core::engine::FlowExecutor;
use marionette_core::model::{
    FlowVerdict, StepAction, StepStatus, TestFlow, TestStep, WARNING_VISION_FALLBACK,
};
use marionette_core::providers::chat::fake::ScriptedChatClient;
use marionette_core::safety::{AuditLog, KillSwitch};
use marionette_core::timing::TimingSettings;
use marionette_core::vision::{VisionConfig, VisionLocator};

fn fast_timing() -> TimingSettings {
    TimingSettings {
        window_poll_ms: 1,
        element_poll_ms: 1,
        stability_window_ms: 0,
        stability_retry_ms: 0,
        type_char_delay_ms: 0,
        post_click_focus_ms: 0,
        send_key_delay_ms: 0,
        window_wait_floor_ms: 50,
    }
}

struct Rig {
    tree: Arc<FakeUiTree>,
    input: Arc<FakeInput>,
    processes: Arc<FakeProcesses>,
    backend: Arc<DesktopBackend>,
}

fn rig_with(audit: AuditLog, vision: Option<Arc<VisionLocator>>) -> Rig {
    let tree = Arc::new(FakeUiTree::new());
    let input = Arc::new(FakeInput::new());
    let capture = Arc::new(FakeCapture::new());
    let processes = Arc::new(FakeProcesses::new());

    let mut backend = DesktopBackend::new(
        tree.clone(),
        input.clone(),
        capture.clone(),
        processes.clone(),
    )
    .with_timing(fast_timing())
    .with_sleeper(Arc::new(NoopSleeper))
    .with_audit(audit);
    if let Some(v) = vision {
        backend = backend.with_vision(v);
    }

    Rig {
        tree,
        input,
        processes,
        backend: Arc::new(backend),
    }
}

fn rig() -> Rig {
    rig_with(AuditLog::disabled(), None)
}

fn seed_notepad(tree: &FakeUiTree) -> u64 {
    let win = tree.add_window("Untitled - Notepad", "notepad.exe", 4242);
    let bar = tree.add_element(win, None, "ToolBar", "Menu", "menuBar");
    tree.add_element(win, Some(bar), "Button", "New", "btnNew");
    tree.add_element(win, Some(bar), "Button", "Save (Ctrl+S)", "btnSave");
    tree.add_element(win, None, "Edit", "Text editor", "editBody");
    win
}

fn step(action: StepAction) -> TestStep {
    let mut s = TestStep::new(action);
    s.description = Some(format!("{action} step"));
    s
}

fn flow(name: &str, steps: Vec<TestStep>) -> TestFlow {
    TestFlow {
        test_name: name.into(),
        target_app: Some("notepad.exe".into()),
        steps,
        ..Default::default()
    }
}

async fn execute(rig: &Rig, flow: &TestFlow) -> marionette_core::model::ExecutionReport {
    let dir = tempfile::tempdir().unwrap();
    FlowExecutor::new(rig.backend.clone())
        .execute_flow_in(flow, &CancellationToken::new(), dir.path())
        .await
}

#[tokio::test]
async fn launch_then_click_passes_with_full_call_log() {
    let rig = rig();
    seed_notepad(&rig.tree);

    let mut launch = step(StepAction::Launch);
    launch.process_path = Some("notepad.exe".into());
    let mut click = step(StepAction::Click);
    click.selector = Some("Button#New".into());
    click.timeout_ms = 5000;

    let report = execute(&rig, &flow("click-succeeds", vec![launch, click])).await;

    assert_eq!(report.result, FlowVerdict::Passed);
    assert_eq!(report.steps.len(), 2);
    assert_eq!(rig.processes.spawned(), vec!["notepad.exe".to_string()]);

    let click_result = &report.steps[1];
    assert_eq!(click_result.status, StepStatus::Passed);
    assert_eq!(click_result.step_index, 2);
    assert_eq!(click_result.backend_name, "desktop");
    assert!(click_result.element_snapshot.is_some());
    assert_eq!(
        click_result.selector_resolved_to.as_deref(),
        Some("Button#New")
    );

    let log: Vec<&str> = click_result
        .backend_call_log
        .iter()
        .map(|l| l.message.as_str())
        .collect();
    for needle in [
        "Finding window",
        "Window found",
        "Resolving selector",
        "Element resolved",
        "Actionability: visible ✓",
        "Actionability: enabled ✓",
        "Actionability: stable ✓",
        "Executing action: click",
        "Action succeeded",
    ] {
        assert!(
            log.iter().any(|m| m.contains(needle)),
            "missing '{needle}' in {log:?}"
        );
    }

    // The call log is strictly time-ordered.
    let stamps: Vec<u64> = click_result
        .backend_call_log
        .iter()
        .map(|l| l.timestamp_ms)
        .collect();
    assert!(stamps.windows(2).all(|w| w[0] <= w[1]));

    // Invoke pattern was preferred over a synthesized click.
    assert_eq!(rig.tree.invoked().len(), 1);
}

#[tokio::test]
async fn fuzzy_selector_tolerates_decorations() {
    let rig = rig();
    seed_notepad(&rig.tree);

    let mut click = step(StepAction::Click);
    click.selector = Some("Button#Save".into());
    let report = execute(&rig, &flow("fuzzy", vec![click])).await;

    assert_eq!(report.result, FlowVerdict::Passed);
    assert_eq!(
        report.steps[0].selector_resolved_to.as_deref(),
        Some("Button#Save (Ctrl+S)")
    );
}

#[tokio::test]
async fn stop_on_failure_skips_the_rest() {
    let rig = rig();
    seed_notepad(&rig.tree);

    let mut missing = step(StepAction::Click);
    missing.selector = Some("Button#Nope".into());
    let mut follows = step(StepAction::Click);
    follows.selector = Some("Button#New".into());

    let mut f = flow("stop-on-failure", vec![missing, follows]);
    f.stop_on_failure = true;
    let report = execute(&rig, &f).await;

    assert_eq!(report.result, FlowVerdict::Failed);
    assert_eq!(report.steps[0].status, StepStatus::Failed);
    assert!(report.steps[0]
        .error
        .as_deref()
        .unwrap()
        .contains("Element not found"));
    assert_eq!(report.steps[1].status, StepStatus::Skipped);
}

#[tokio::test]
async fn missing_window_fails_with_window_not_found() {
    let rig = rig(); // no windows at all
    let mut click = step(StepAction::Click);
    click.selector = Some("Button#New".into());
    let report = execute(&rig, &flow("no-window", vec![click])).await;

    assert_eq!(report.result, FlowVerdict::Failed);
    assert!(report.steps[0]
        .error
        .as_deref()
        .unwrap()
        .contains("Target window not found"));
}

#[tokio::test]
async fn vision_fallback_flags_a_warning_never_a_pass() {
    let audit_dir = tempfile::tempdir().unwrap();
    let audit_path = audit_dir.path().join("audit_log.txt");
    let audit = AuditLog::at(&audit_path);

    let chat = Arc::new(ScriptedChatClient::with_replies([
        r#"{"found":true,"x":12,"y":8,"width":60,"height":20,"confidence":0.92,"description":"the File menu"}"#,
    ]));
    let vision = Arc::new(VisionLocator::new(
        chat,
        Arc::new(FakeCapture::new()),
        Arc::new(marionette_core::capabilities::SystemClock),
        VisionConfig::default(),
        audit_dir.path().join("_vision"),
    ));
    let rig = rig_with(audit, Some(vision));
    seed_notepad(&rig.tree);

    let mut click = step(StepAction::Click);
    click.selector = Some("Button#DoesNotExist".into());
    click.description = Some("the File menu".into());
    click.timeout_ms = 20;

    let report = execute(&rig, &flow("vision", vec![click])).await;

    let s = &report.steps[0];
    assert_eq!(s.status, StepStatus::Warning);
    assert_eq!(s.warning_code.as_deref(), Some(WARNING_VISION_FALLBACK));
    assert!(s
        .selector_resolved_to
        .as_deref()
        .unwrap()
        .starts_with("[Vision]"));
    assert!(s.click_point.is_some());
    assert_eq!(report.result, FlowVerdict::Mixed);

    let audit_text = std::fs::read_to_string(&audit_path).unwrap();
    assert!(audit_text.contains("Vision fallback used"));

    // A clicked point was synthesized (no invoke pattern on a region).
    assert!(!rig.input.events().is_empty());
}

#[tokio::test]
async fn vision_below_threshold_fails_the_step() {
    let chat = Arc::new(ScriptedChatClient::with_replies([
        r#"{"found":true,"x":1,"y":1,"width":4,"height":4,"confidence":0.3}"#,
    ]));
    let dir = tempfile::tempdir().unwrap();
    let vision = Arc::new(VisionLocator::new(
        chat,
        Arc::new(FakeCapture::new()),
        Arc::new(marionette_core::capabilities::SystemClock),
        VisionConfig::default(),
        dir.path().join("_vision"),
    ));
    let rig = rig_with(AuditLog::disabled(), Some(vision));
    seed_notepad(&rig.tree);

    let mut click = step(StepAction::Click);
    click.selector = Some("Button#DoesNotExist".into());
    click.description = Some("something vague".into());
    click.timeout_ms = 20;

    let report = execute(&rig, &flow("vision-low", vec![click])).await;
    let s = &report.steps[0];
    assert_eq!(s.status, StepStatus::Failed);
    assert!(s.warning_code.is_none());
    assert!(s
        .diagnostics
        .as_deref()
        .unwrap()
        .contains("below threshold"));
}

#[tokio::test]
async fn target_lock_violation_fails_with_greppable_error() {
    let rig = rig();
    let win = seed_notepad(&rig.tree);

    let mut f = flow("locked", vec![]);
    f.target_lock = true;

    let dir = tempfile::tempdir().unwrap();
    let mut ctx = BackendExecutionContext::new(f, dir.path());

    let mut click = step(StepAction::Click);
    click.selector = Some("Button#New".into());
    click.order = 1;
    let first = rig.backend.execute_step(&click, &mut ctx).await;
    assert_eq!(first.status, StepStatus::Passed);

    // The app restarts under the same title: same hwnd lookup, new pid.
    rig.tree.set_window_pid(win, 9999);

    let mut second_click = step(StepAction::Click);
    second_click.selector = Some("Button#Save".into());
    second_click.order = 2;
    let second = rig.backend.execute_step(&second_click, &mut ctx).await;
    assert_eq!(second.status, StepStatus::Failed);
    assert!(second.error.as_deref().unwrap().contains("TargetLock"));
}

#[tokio::test]
async fn window_context_is_inherited_across_steps() {
    let rig = rig();
    let tree = &rig.tree;
    let win = tree.add_window("Ledger - Accounts", "ledger.exe", 77);
    tree.add_element(win, None, "Button", "Post", "btnPost");

    let mut focus = step(StepAction::FocusWindow);
    focus.app = Some("ledger.exe".into());
    // No app/title on the click: it must reuse the ledger window.
    let mut click = step(StepAction::Click);
    click.selector = Some("Button#Post".into());

    let mut f = flow("inherit", vec![focus, click]);
    f.target_app = None;
    let report = execute(&rig, &f).await;

    assert_eq!(report.result, FlowVerdict::Passed, "{:?}", report.steps);
    assert_eq!(rig.tree.foreground(), Some(win));
}

#[tokio::test]
async fn type_focuses_and_emits_characters() {
    let rig = rig();
    seed_notepad(&rig.tree);

    let mut type_step = step(StepAction::Type);
    type_step.selector = Some("Edit#Text editor".into());
    type_step.text = Some("hello".into());

    let report = execute(&rig, &flow("typing", vec![type_step])).await;
    assert_eq!(report.result, FlowVerdict::Passed);
    assert_eq!(rig.input.typed_text(), "hello");
    assert!(rig.tree.focused().is_some());
}

#[tokio::test]
async fn send_keys_emits_chords_in_order() {
    let rig = rig();
    seed_notepad(&rig.tree);

    let mut keys = step(StepAction::SendKeys);
    keys.keys = Some("Ctrl+S, Enter".into());
    let report = execute(&rig, &flow("chords", vec![keys])).await;
    assert_eq!(report.result, FlowVerdict::Passed);

    use marionette_core::capabilities::fake::InputEvent;
    let events = rig.input.events();
    assert_eq!(
        events,
        vec![
            InputEvent::Chord {
                modifiers: vec!["ctrl".into()],
                key: "s".into()
            },
            InputEvent::Chord {
                modifiers: vec![],
                key: "enter".into()
            },
        ]
    );
}

#[tokio::test]
async fn assert_not_exists_resolves_once_and_fails_on_presence() {
    let rig = rig();
    seed_notepad(&rig.tree);

    let mut absent = step(StepAction::AssertNotExists);
    absent.selector = Some("Button#Nonexistent".into());
    let mut present = step(StepAction::AssertNotExists);
    present.selector = Some("Button#New".into());

    let mut f = flow("not-exists", vec![absent, present]);
    f.stop_on_failure = false;
    let report = execute(&rig, &f).await;

    assert_eq!(report.steps[0].status, StepStatus::Passed);
    assert_eq!(report.steps[1].status, StepStatus::Failed);
    assert!(report.steps[1]
        .error
        .as_deref()
        .unwrap()
        .contains("element absent"));
}

#[tokio::test]
async fn step_assertions_fail_the_step_with_expected_and_found() {
    let rig = rig();
    let win = seed_notepad(&rig.tree);
    let status = rig
        .tree
        .add_element(win, None, "Text", "Status", "statusBar");
    rig.tree.set_element_text(status, "Draft saved");

    let mut click = step(StepAction::Click);
    click.selector = Some("Button#Save".into());
    click.assertions = vec![marionette_core::model::Assertion {
        kind: marionette_core::model::AssertionType::TextContains,
        selector: Some("Text#Status".into()),
        expected: Some("Published".into()),
    }];

    let report = execute(&rig, &flow("assertions", vec![click])).await;
    let s = &report.steps[0];
    assert_eq!(s.status, StepStatus::Failed);
    assert_eq!(s.assertion_results.len(), 1);
    assert_eq!(s.assertion_results[0].found.as_deref(), Some("Draft saved"));
    assert!(s.error.as_deref().unwrap().contains("Assertion failed"));
}

#[tokio::test]
async fn cancellation_skips_all_steps_but_still_reports() {
    let rig = rig();
    seed_notepad(&rig.tree);

    let mut click = step(StepAction::Click);
    click.selector = Some("Button#New".into());
    let f = flow("cancelled", vec![click.clone(), click]);

    let cancel = CancellationToken::new();
    cancel.cancel();
    let dir = tempfile::tempdir().unwrap();
    let report = FlowExecutor::new(rig.backend.clone())
        .execute_flow_in(&f, &cancel, dir.path())
        .await;

    assert_eq!(report.steps.len(), 2);
    assert!(report
        .steps
        .iter()
        .all(|s| s.status == StepStatus::Skipped));
    assert!(report.steps[0]
        .diagnostics
        .as_deref()
        .unwrap()
        .contains("Step cancelled"));
}

#[tokio::test]
async fn kill_switch_stops_the_flow_and_audits() {
    let audit_dir = tempfile::tempdir().unwrap();
    let audit_path = audit_dir.path().join("audit_log.txt");
    let rig = rig_with(AuditLog::at(&audit_path), None);
    seed_notepad(&rig.tree);

    let mut click = step(StepAction::Click);
    click.selector = Some("Button#New".into());
    let f = flow("killed", vec![click.clone(), click]);

    let kill = KillSwitch::new();
    kill.trip();
    let dir = tempfile::tempdir().unwrap();
    let report = FlowExecutor::new(rig.backend.clone())
        .with_kill_switch(kill)
        .with_audit(AuditLog::at(&audit_path))
        .execute_flow_in(&f, &CancellationToken::new(), dir.path())
        .await;

    assert!(report
        .steps
        .iter()
        .all(|s| s.status == StepStatus::Skipped));
    let audit_text = std::fs::read_to_string(&audit_path).unwrap();
    assert!(audit_text.contains("KillSwitch"));
}

#[tokio::test]
async fn invalid_flow_is_rejected_before_any_side_effect() {
    let rig = rig();
    seed_notepad(&rig.tree);

    let f = flow("invalid", vec![step(StepAction::Click)]); // click without selector
    let report = execute(&rig, &f).await;

    assert_eq!(report.result, FlowVerdict::Failed);
    assert!(report.steps.is_empty());
    assert!(report.summary.contains("'click' requires a selector"));
    assert!(rig.input.events().is_empty(), "no UI calls happened");
    assert!(rig.processes.spawned().is_empty());
}

#[tokio::test]
async fn step_indexes_are_strictly_increasing_after_auto_numbering() {
    let rig = rig();
    seed_notepad(&rig.tree);

    let mut steps = Vec::new();
    for _ in 0..4 {
        let mut s = step(StepAction::AssertExists);
        s.selector = Some("Button#New".into());
        steps.push(s);
    }
    let report = execute(&rig, &flow("ordering", steps)).await;

    let indexes: Vec<i64> = report.steps.iter().map(|s| s.step_index).collect();
    assert_eq!(indexes, vec![1, 2, 3, 4]);
}

#[tokio::test]
async fn screenshot_writes_a_step_artifact() {
    let rig = rig();
    seed_notepad(&rig.tree);

    let shot = step(StepAction::Screenshot);
    let dir = tempfile::tempdir().unwrap();
    let report = FlowExecutor::new(rig.backend.clone())
        .execute_flow_in(
            &flow("shot", vec![shot]),
            &CancellationToken::new(),
            dir.path(),
        )
        .await;

    let path = report.steps[0].screenshot.as_deref().unwrap();
    assert!(std::path::Path::new(path).exists());
}

#[tokio::test]
async fn launch_outside_allowlist_is_refused() {
    let audit_dir = tempfile::tempdir().unwrap();
    let audit_path = audit_dir.path().join("audit_log.txt");

    let tree = Arc::new(FakeUiTree::new());
    let input = Arc::new(FakeInput::new());
    let processes = Arc::new(FakeProcesses::new());
    let backend = Arc::new(
        DesktopBackend::new(
            tree.clone(),
            input,
            Arc::new(FakeCapture::new()),
            processes.clone(),
        )
        .with_timing(fast_timing())
        .with_sleeper(Arc::new(NoopSleeper))
        .with_allowlist(marionette_core::safety::ProcessAllowlist::new(vec![
            "notepad.exe".into(),
        ]))
        .with_audit(AuditLog::at(&audit_path)),
    );

    let mut launch = step(StepAction::Launch);
    launch.process_path = Some("cmd.exe".into());
    let f = TestFlow {
        test_name: "refused".into(),
        steps: vec![launch],
        ..Default::default()
    };
    let dir = tempfile::tempdir().unwrap();
    let report = FlowExecutor::new(backend)
        .execute_flow_in(&f, &CancellationToken::new(), dir.path())
        .await;

    assert_eq!(report.result, FlowVerdict::Failed);
    assert!(processes.spawned().is_empty());
    let audit_text = std::fs::read_to_string(&audit_path).unwrap();
    assert!(audit_text.contains("AllowlistRefused"));
}
