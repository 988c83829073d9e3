//! The fixed, self-describing tool surface the agent drives.
//!
//! Tools are pure pass-throughs to the core services; they never mutate
//! shared state beyond what the delegated service already persists.

mod discovery;
mod execution;
mod pack;

use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use marionette_core::backend::AutomationBackend;
use marionette_core::capabilities::{ProcessEnumerator, ScreenCapture};
use marionette_core::config::RuntimeConfig;
use marionette_core::providers::chat::ChatClient;
use marionette_core::report::ReportStore;
use marionette_core::safety::{AuditLog, KillSwitch};
use marionette_core::vision::VisionLocator;

/// Everything a tool call may touch.
pub struct ToolContext {
    pub backend: Arc<dyn AutomationBackend>,
    pub processes: Arc<dyn ProcessEnumerator>,
    pub capture: Arc<dyn ScreenCapture>,
    pub chat: Option<Arc<dyn ChatClient>>,
    pub vision: Option<Arc<VisionLocator>>,
    pub store: ReportStore,
    pub config: RuntimeConfig,
    pub kill_switch: KillSwitch,
    pub audit: AuditLog,
    pub cancel: CancellationToken,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDef {
    pub name: &'static str,
    pub description: &'static str,
    pub category: &'static str,
    pub risk: &'static str,
    pub input_schema: Value,
}

/// Uniform tool failure payload.
#[derive(Debug)]
pub struct ToolError {
    pub code: &'static str,
    pub message: String,
}

impl ToolError {
    pub fn new(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn payload(&self) -> Value {
        json!({ "error": { "code": self.code, "message": self.message } })
    }
}

fn obj_schema(properties: Value, required: &[&str]) -> Value {
    json!({ "type": "object", "properties": properties, "required": required })
}

/// The complete surface, in presentation order.
pub fn registry() -> Vec<ToolDef> {
    vec![
        ToolDef {
            name: "list_windows",
            description: "Enumerate top-level windows with id, title, process and bounds.",
            category: "discovery",
            risk: "low",
            input_schema: obj_schema(json!({}), &[]),
        },
        ToolDef {
            name: "inspect_window",
            description: "Depth-bounded accessibility tree of one window, with suggested selectors.",
            category: "discovery",
            risk: "low",
            input_schema: obj_schema(
                json!({
                    "processOrTitle": { "type": "string" },
                    "maxDepth": { "type": "integer", "default": 3 },
                    "scope": { "type": "string", "description": "Optional selector to narrow the root." }
                }),
                &["processOrTitle"],
            ),
        },
        ToolDef {
            name: "list_processes",
            description: "Running processes (pid, name).",
            category: "discovery",
            risk: "low",
            input_schema: obj_schema(json!({}), &[]),
        },
        ToolDef {
            name: "get_capabilities",
            description: "Backend identity and supported actions, assertions and selector kinds.",
            category: "discovery",
            risk: "low",
            input_schema: obj_schema(json!({}), &[]),
        },
        ToolDef {
            name: "capture_screenshot",
            description: "Capture the screen (or one window) to a PNG under the report root.",
            category: "discovery",
            risk: "low",
            input_schema: obj_schema(
                json!({ "windowHint": { "type": "string" } }),
                &[],
            ),
        },
        ToolDef {
            name: "locate_by_vision",
            description: "Locate an element from a natural-language description via the vision model. Non-deterministic; results are advisory.",
            category: "discovery",
            risk: "medium",
            input_schema: obj_schema(
                json!({
                    "description": { "type": "string" },
                    "windowHint": { "type": "string" }
                }),
                &["description"],
            ),
        },
        ToolDef {
            name: "validate_flow",
            description: "Run the flow validator; returns errors and warnings, no side effects.",
            category: "execution",
            risk: "low",
            input_schema: obj_schema(json!({ "flow": { "type": "object" } }), &["flow"]),
        },
        ToolDef {
            name: "run_flow",
            description: "Validate and execute one flow against the live backend; persists and returns the execution report.",
            category: "execution",
            risk: "high",
            input_schema: obj_schema(json!({ "flow": { "type": "object" } }), &["flow"]),
        },
        ToolDef {
            name: "list_reports",
            description: "Most recent run reports, newest first.",
            category: "execution",
            risk: "low",
            input_schema: obj_schema(
                json!({ "max": { "type": "integer", "default": 10 } }),
                &[],
            ),
        },
        ToolDef {
            name: "run_pipeline",
            description: "Full pack pipeline: plan, compile with validation retries, execute, report. Uses the configured chat model.",
            category: "pack",
            risk: "high",
            input_schema: obj_schema(json!({ "pack": { "type": "object" } }), &["pack"]),
        },
        ToolDef {
            name: "plan_pack",
            description: "Phase A only: produce a journey plan for a pack.",
            category: "pack",
            risk: "medium",
            input_schema: obj_schema(json!({ "pack": { "type": "object" } }), &["pack"]),
        },
        ToolDef {
            name: "get_fix_queue",
            description: "Ranked repair queue from the most recent pack report.",
            category: "pack",
            risk: "low",
            input_schema: obj_schema(json!({}), &[]),
        },
        ToolDef {
            name: "get_confidence",
            description: "Confidence score and summary of the most recent pack report.",
            category: "pack",
            risk: "low",
            input_schema: obj_schema(json!({}), &[]),
        },
        ToolDef {
            name: "analyze_report",
            description: "Condensed analysis of the most recent pack report: failures, coverage gaps, top fixes.",
            category: "pack",
            risk: "low",
            input_schema: obj_schema(json!({}), &[]),
        },
    ]
}

/// Route one tool call. `Err` only for faults worth a JSON-RPC error;
/// tool-level refusals come back as `{error: ...}` payloads.
pub async fn dispatch(ctx: &ToolContext, name: &str, args: &Value) -> anyhow::Result<Value> {
    match name {
        "list_windows" => discovery::list_windows(ctx),
        "inspect_window" => discovery::inspect_window(ctx, args),
        "list_processes" => discovery::list_processes(ctx),
        "get_capabilities" => discovery::get_capabilities(ctx),
        "capture_screenshot" => discovery::capture_screenshot(ctx, args),
        "locate_by_vision" => discovery::locate_by_vision(ctx, args).await,
        "validate_flow" => execution::validate_flow(args),
        "run_flow" => execution::run_flow(ctx, args).await,
        "list_reports" => execution::list_reports(ctx, args),
        "run_pipeline" => pack::run_pipeline(ctx, args).await,
        "plan_pack" => pack::plan_pack(ctx, args).await,
        "get_fix_queue" => pack::get_fix_queue(ctx),
        "get_confidence" => pack::get_confidence(ctx),
        "analyze_report" => pack::analyze_report(ctx),
        other => Ok(ToolError::new("E_UNKNOWN_TOOL", format!("no tool named '{other}'")).payload()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_is_complete_and_self_describing() {
        let tools = registry();
        assert_eq!(tools.len(), 14);
        for tool in &tools {
            assert!(!tool.description.is_empty(), "{}", tool.name);
            assert!(
                matches!(tool.category, "discovery" | "execution" | "pack"),
                "{}",
                tool.name
            );
            assert!(tool.input_schema.get("type").is_some(), "{}", tool.name);
        }
        let names: Vec<_> = tools.iter().map(|t| t.name).collect();
        for expected in [
            "list_windows",
            "inspect_window",
            "validate_flow",
            "run_flow",
            "run_pipeline",
            "get_fix_queue",
            "get_confidence",
            "analyze_report",
        ] {
            assert!(names.contains(&expected), "{expected}");
        }
    }
}
