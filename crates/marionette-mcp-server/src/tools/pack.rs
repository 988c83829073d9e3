//! Pack tools: the pipeline and report interrogation.

use serde_json::{json, Value};

use super::{ToolContext, ToolError};
use marionette_core::model::TestPack;
use marionette_core::pack::{planner, PackPipeline, PackRunner};

fn parse_pack(args: &Value) -> Result<TestPack, ToolError> {
    let Some(pack_value) = args.get("pack") else {
        return Err(ToolError::new("E_INVALID_ARGS", "pack is required"));
    };
    let parsed = match pack_value {
        Value::String(s) => serde_json::from_str(s),
        other => serde_json::from_value(other.clone()),
    };
    parsed.map_err(|e| ToolError::new("E_PACK_PARSE", format!("pack does not parse: {e}")))
}

fn chat_missing() -> Value {
    ToolError::new(
        "E_CAPABILITY_MISSING",
        "no chat client configured (set agentEndpoint and the API key env var)",
    )
    .payload()
}

pub(super) async fn run_pipeline(ctx: &ToolContext, args: &Value) -> anyhow::Result<Value> {
    let pack = match parse_pack(args) {
        Ok(p) => p,
        Err(e) => return Ok(e.payload()),
    };
    let Some(chat) = ctx.chat.clone() else {
        return Ok(chat_missing());
    };

    let runner = PackRunner::new()
        .with_backend(ctx.backend.clone())
        .with_kill_switch(ctx.kill_switch.clone())
        .with_audit(ctx.audit.clone())
        .with_artifact_root(ctx.store.root().join("_pack"));
    let pipeline = PackPipeline::new(chat, runner);
    let result = pipeline.run(&pack, &ctx.cancel).await;

    let report_path = match &result.report {
        Some(report) => {
            let dir = ctx.store.create_run_dir(&pack.pack_name)?;
            Some(ctx.store.write_pack_report(&dir, report)?)
        }
        None => None,
    };

    Ok(json!({
        "success": result.success,
        "phaseErrors": result.phase_errors,
        "compileAttempts": result.compile.as_ref().map(|c| c.attempts),
        "compileErrors": result.compile.as_ref().map(|c| c.errors.clone()),
        "plan": result.plan,
        "report": result.report,
        "reportPath": report_path.map(|p| p.display().to_string()),
    }))
}

pub(super) async fn plan_pack(ctx: &ToolContext, args: &Value) -> anyhow::Result<Value> {
    let pack = match parse_pack(args) {
        Ok(p) => p,
        Err(e) => return Ok(e.payload()),
    };
    let Some(chat) = &ctx.chat else {
        return Ok(chat_missing());
    };
    match planner::plan(&pack, chat.as_ref(), &ctx.cancel).await {
        Ok(outcome) => Ok(json!({
            "plan": outcome.plan,
            "message": outcome.message,
            "durationMs": outcome.duration_ms,
        })),
        Err(e) => Ok(ToolError::new("E_PLAN_FAILED", e.to_string()).payload()),
    }
}

fn no_pack_report() -> Value {
    ToolError::new("E_NO_REPORT", "no pack report found; run a pipeline first").payload()
}

pub(super) fn get_fix_queue(ctx: &ToolContext) -> anyhow::Result<Value> {
    match ctx.store.latest_pack_report()? {
        Some(report) => Ok(json!({
            "packId": report.pack_id,
            "fixQueue": report.fix_queue,
        })),
        None => Ok(no_pack_report()),
    }
}

pub(super) fn get_confidence(ctx: &ToolContext) -> anyhow::Result<Value> {
    match ctx.store.latest_pack_report()? {
        Some(report) => Ok(json!({
            "packId": report.pack_id,
            "confidenceScore": report.confidence_score,
            "summary": report.summary,
            "abortedReason": report.aborted_reason,
        })),
        None => Ok(no_pack_report()),
    }
}

pub(super) fn analyze_report(ctx: &ToolContext) -> anyhow::Result<Value> {
    let Some(report) = ctx.store.latest_pack_report()? else {
        return Ok(no_pack_report());
    };

    let missing_coverage: Vec<&str> = report
        .coverage_map_status
        .iter()
        .filter(|a| a.status != marionette_core::model::CoverageStatus::Ok)
        .map(|a| a.area.as_str())
        .collect();
    let top_fixes: Vec<Value> = report
        .fix_queue
        .iter()
        .take(5)
        .map(|item| {
            json!({
                "rank": item.rank,
                "hint": item.packet.hint,
                "selector": item.packet.selector,
                "journeyId": item.journey_id,
                "failureCount": item.failure_count,
                "detail": item.packet.detail,
            })
        })
        .collect();

    Ok(json!({
        "packId": report.pack_id,
        "confidenceScore": report.confidence_score,
        "summary": report.summary,
        "failureCount": report.failures.len(),
        "warningCount": report.warnings.iter().map(|w| w.count).sum::<usize>(),
        "fallbackRate": report.perception_stats.fallback_rate,
        "coverageGaps": missing_coverage,
        "topFixes": top_fixes,
        "abortedReason": report.aborted_reason,
    }))
}
