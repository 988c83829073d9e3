//! Tool surface tests over in-memory capabilities.

use std::sync::Arc;

use serde_json::json;
use tokio_util::sync::CancellationToken;

use marionette_core::backend::desktop::DesktopBackend;
use marionette_core::capabilities::fake::{FakeCapture, FakeInput, FakeProcesses, FakeUiTree};
use marionette_core::capabilities::NoopSleeper;
use marionette_core::config::RuntimeConfig;
use marionette_core::report::ReportStore;
use marionette_core::safety::{AuditLog, KillSwitch};
use marionette_core::timing::TimingSettings;
use marionette_mcp_server::tools::{dispatch, ToolContext};

fn context(store_root: &std::path::Path) -> ToolContext {
    let tree = Arc::new(FakeUiTree::new());
    let win = tree.add_window("Untitled - Notepad", "notepad.exe", 4242);
    let bar = tree.add_element(win, None, "ToolBar", "Menu", "menuBar");
    tree.add_element(win, Some(bar), "Button", "New", "btnNew");

    let processes = Arc::new(FakeProcesses::new());
    processes.add_running("notepad.exe", 4242);
    let capture = Arc::new(FakeCapture::new());

    let timing = TimingSettings {
        window_poll_ms: 1,
        element_poll_ms: 1,
        stability_window_ms: 0,
        stability_retry_ms: 0,
        type_char_delay_ms: 0,
        post_click_focus_ms: 0,
        send_key_delay_ms: 0,
        window_wait_floor_ms: 20,
    };
    let backend = Arc::new(
        DesktopBackend::new(tree, Arc::new(FakeInput::new()), capture.clone(), processes.clone())
            .with_timing(timing)
            .with_sleeper(Arc::new(NoopSleeper)),
    );

    ToolContext {
        backend,
        processes,
        capture,
        chat: None,
        vision: None,
        store: ReportStore::new(store_root),
        config: RuntimeConfig::default(),
        kill_switch: KillSwitch::new(),
        audit: AuditLog::disabled(),
        cancel: CancellationToken::new(),
    }
}

#[tokio::test]
async fn list_windows_returns_targets() {
    let tmp = tempfile::tempdir().unwrap();
    let ctx = context(tmp.path());
    let out = dispatch(&ctx, "list_windows", &json!({})).await.unwrap();
    assert_eq!(out["windows"][0]["source"], "notepad.exe");
}

#[tokio::test]
async fn inspect_window_suggests_selectors() {
    let tmp = tempfile::tempdir().unwrap();
    let ctx = context(tmp.path());
    let out = dispatch(
        &ctx,
        "inspect_window",
        &json!({"processOrTitle": "notepad.exe", "maxDepth": 3}),
    )
    .await
    .unwrap();
    let toolbar = &out["nodes"][0];
    assert_eq!(toolbar["controlType"], "ToolBar");
    assert_eq!(toolbar["children"][0]["suggestedSelector"], "Button#New");
    assert_eq!(out["truncated"], false);
}

#[tokio::test]
async fn validate_flow_flags_missing_selector() {
    let tmp = tempfile::tempdir().unwrap();
    let ctx = context(tmp.path());
    let out = dispatch(
        &ctx,
        "validate_flow",
        &json!({"flow": {"testName": "t", "steps": [{"action": "click"}]}}),
    )
    .await
    .unwrap();
    assert_eq!(out["isValid"], false);
    assert!(out["errors"][0]
        .as_str()
        .unwrap()
        .contains("'click' requires a selector"));
}

#[tokio::test]
async fn run_flow_persists_and_lists_reports() {
    let tmp = tempfile::tempdir().unwrap();
    let ctx = context(tmp.path());
    let flow = json!({
        "testName": "smoke",
        "targetApp": "notepad.exe",
        "steps": [{"action": "assert_exists", "selector": "Button#New", "description": "there"}]
    });
    let out = dispatch(&ctx, "run_flow", &json!({ "flow": flow })).await.unwrap();
    assert_eq!(out["result"], "passed");
    assert!(out["reportPath"].as_str().unwrap().contains("smoke"));

    let listed = dispatch(&ctx, "list_reports", &json!({"max": 5}))
        .await
        .unwrap();
    assert_eq!(listed["reports"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn pack_queries_without_a_report_are_refusals() {
    let tmp = tempfile::tempdir().unwrap();
    let ctx = context(tmp.path());
    for tool in ["get_fix_queue", "get_confidence", "analyze_report"] {
        let out = dispatch(&ctx, tool, &json!({})).await.unwrap();
        assert_eq!(out["error"]["code"], "E_NO_REPORT", "{tool}");
    }
}

#[tokio::test]
async fn vision_tool_without_vision_is_a_capability_refusal() {
    let tmp = tempfile::tempdir().unwrap();
    let ctx = context(tmp.path());
    let out = dispatch(&ctx, "locate_by_vision", &json!({"description": "the save button"}))
        .await
        .unwrap();
    assert_eq!(out["error"]["code"], "E_CAPABILITY_MISSING");
}

#[tokio::test]
async fn unknown_tool_is_reported_not_fatal() {
    let tmp = tempfile::tempdir().unwrap();
    let ctx = context(tmp.path());
    let out = dispatch(&ctx, "frobnicate", &json!({})).await.unwrap();
    assert_eq!(out["error"]["code"], "E_UNKNOWN_TOOL");
}
