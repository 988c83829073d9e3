//! Discovery tools: windows, processes, capabilities, screenshots,
//! vision lookups.

use serde_json::{json, Value};

use super::{ToolContext, ToolError};
use marionette_core::model::Bounds;
use marionette_core::vision::VisionOutcome;

pub(super) fn list_windows(ctx: &ToolContext) -> anyhow::Result<Value> {
    let targets = ctx.backend.list_targets()?;
    Ok(json!({ "windows": targets }))
}

pub(super) fn inspect_window(ctx: &ToolContext, args: &Value) -> anyhow::Result<Value> {
    let Some(target) = args.get("processOrTitle").and_then(Value::as_str) else {
        return Ok(ToolError::new("E_INVALID_ARGS", "processOrTitle is required").payload());
    };
    let max_depth = args
        .get("maxDepth")
        .and_then(Value::as_u64)
        .unwrap_or(3)
        .min(10) as usize;
    let scope = args.get("scope").and_then(Value::as_str);
    match ctx.backend.inspect_target(target, max_depth, scope) {
        Ok(result) => Ok(serde_json::to_value(result)?),
        Err(e) => Ok(ToolError::new("E_TARGET_NOT_FOUND", e.to_string()).payload()),
    }
}

pub(super) fn list_processes(ctx: &ToolContext) -> anyhow::Result<Value> {
    let processes: Vec<Value> = ctx
        .processes
        .processes()?
        .into_iter()
        .map(|p| json!({ "pid": p.pid, "name": p.name }))
        .collect();
    Ok(json!({ "processes": processes }))
}

pub(super) fn get_capabilities(ctx: &ToolContext) -> anyhow::Result<Value> {
    Ok(json!({
        "name": ctx.backend.name(),
        "version": ctx.backend.version(),
        "capabilities": ctx.backend.capabilities(),
    }))
}

pub(super) fn capture_screenshot(ctx: &ToolContext, args: &Value) -> anyhow::Result<Value> {
    let region = window_region(ctx, args.get("windowHint").and_then(Value::as_str));
    let png = ctx.capture.capture_region(region)?;
    let dir = ctx.store.root().join("_screenshots");
    std::fs::create_dir_all(&dir)?;
    let stamp = chrono_stamp();
    let path = dir.join(format!("screenshot_{stamp}.png"));
    std::fs::write(&path, &png)?;
    Ok(json!({ "path": path.display().to_string(), "bytes": png.len() }))
}

pub(super) async fn locate_by_vision(ctx: &ToolContext, args: &Value) -> anyhow::Result<Value> {
    let Some(description) = args.get("description").and_then(Value::as_str) else {
        return Ok(ToolError::new("E_INVALID_ARGS", "description is required").payload());
    };
    let Some(vision) = &ctx.vision else {
        return Ok(ToolError::new(
            "E_CAPABILITY_MISSING",
            "vision is not configured (set vision.enabled and a chat endpoint)",
        )
        .payload());
    };
    let region = window_region(ctx, args.get("windowHint").and_then(Value::as_str));
    match vision.locate(description, region).await? {
        VisionOutcome::Found(candidate) => Ok(json!({
            "found": true,
            "bounds": {
                "x": candidate.bounds.x,
                "y": candidate.bounds.y,
                "width": candidate.bounds.width,
                "height": candidate.bounds.height
            },
            "center": { "x": candidate.center.0, "y": candidate.center.1 },
            "confidence": candidate.confidence,
            "description": candidate.description,
            "screenshot": candidate.screenshot.display().to_string(),
            "warning": "vision results are non-deterministic"
        })),
        VisionOutcome::NotFound(reason) => Ok(json!({ "found": false, "reason": reason })),
    }
}

/// Resolve an optional window hint to its bounds.
fn window_region(ctx: &ToolContext, hint: Option<&str>) -> Option<Bounds> {
    let hint = hint?;
    let lowered = hint.to_lowercase();
    ctx.backend
        .list_targets()
        .ok()?
        .into_iter()
        .find(|t| {
            t.source.eq_ignore_ascii_case(hint) || t.title.to_lowercase().contains(&lowered)
        })
        .map(|t| t.bounds)
}

fn chrono_stamp() -> String {
    chrono::Utc::now().format("%Y%m%d_%H%M%S%3f").to_string()
}
