//! Execution tools: validate, run, list reports.

use serde_json::{json, Value};

use super::{ToolContext, ToolError};
use marionette_core::engine::FlowExecutor;
use marionette_core::model::TestFlow;
use marionette_core::validate::validate;

fn parse_flow(args: &Value) -> Result<TestFlow, ToolError> {
    let Some(flow_value) = args.get("flow") else {
        return Err(ToolError::new("E_INVALID_ARGS", "flow is required"));
    };
    // Tolerate a JSON string as well as an object.
    let parsed = match flow_value {
        Value::String(s) => serde_json::from_str(s),
        other => serde_json::from_value(other.clone()),
    };
    parsed.map_err(|e| ToolError::new("E_FLOW_PARSE", format!("flow does not parse: {e}")))
}

pub(super) fn validate_flow(args: &Value) -> anyhow::Result<Value> {
    let mut flow = match parse_flow(args) {
        Ok(f) => f,
        Err(e) => return Ok(e.payload()),
    };
    flow.auto_number_steps();
    let report = validate(&flow);
    Ok(json!({
        "isValid": report.is_valid(),
        "errors": report.errors,
        "warnings": report.warnings,
    }))
}

pub(super) async fn run_flow(ctx: &ToolContext, args: &Value) -> anyhow::Result<Value> {
    let flow = match parse_flow(args) {
        Ok(f) => f,
        Err(e) => return Ok(e.payload()),
    };

    let executor = FlowExecutor::new(ctx.backend.clone())
        .with_kill_switch(ctx.kill_switch.clone())
        .with_audit(ctx.audit.clone());
    let dir = ctx.store.create_run_dir(&flow.test_name)?;
    let report = executor.execute_flow_in(&flow, &ctx.cancel, &dir).await;
    let path = ctx.store.write_flow_report(&dir, &report)?;
    tracing::info!(report = %path.display(), result = %report.result, "flow run complete");

    let mut payload = serde_json::to_value(&report)?;
    if let Value::Object(map) = &mut payload {
        map.insert("reportPath".into(), json!(path.display().to_string()));
    }
    Ok(payload)
}

pub(super) fn list_reports(ctx: &ToolContext, args: &Value) -> anyhow::Result<Value> {
    let max = args.get("max").and_then(Value::as_u64).unwrap_or(10) as usize;
    let entries = ctx.store.list_reports(max)?;
    Ok(json!({ "reports": entries }))
}
