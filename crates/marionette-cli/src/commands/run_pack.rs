use std::path::Path;

use tokio_util::sync::CancellationToken;

use crate::commands::load_json;
use crate::commands::run::spawn_ctrl_c;
use crate::exit_codes;
use crate::wiring;

use marionette_core::config::RuntimeConfig;
use marionette_core::model::TestPack;
use marionette_core::pack::{PackPipeline, PackRunner};
use marionette_core::report::ReportStore;

pub async fn run(path: &Path, config: &RuntimeConfig) -> anyhow::Result<i32> {
    let pack: TestPack = match load_json(path, "pack") {
        Ok(p) => p,
        Err(code) => return Ok(code),
    };

    let Some(wired) = wiring::wire(config) else {
        eprintln!("no automation backend available (set MARIONETTE_BACKEND=fake for the demo backend)");
        return Ok(exit_codes::CAPABILITY_MISSING);
    };
    let Some(chat) = wired.chat.clone() else {
        eprintln!(
            "pack pipeline needs a chat client; set {} and agentEndpoint in {}",
            config.api_key_env, "config.json"
        );
        return Ok(exit_codes::CAPABILITY_MISSING);
    };

    let cancel = CancellationToken::new();
    spawn_ctrl_c(cancel.clone(), wired.kill_switch.clone());

    let store = ReportStore::new(&config.report_dir);
    let runner = PackRunner::new()
        .with_backend(wired.backend.clone())
        .with_kill_switch(wired.kill_switch.clone())
        .with_audit(wired.audit.clone())
        .with_artifact_root(store.root().join("_pack"));
    let pipeline = PackPipeline::new(chat, runner);

    let result = pipeline.run(&pack, &cancel).await;

    for error in &result.phase_errors {
        eprintln!("phase error: {error}");
    }
    if let Some(compile) = &result.compile {
        println!(
            "compile: {} after {} attempt(s)",
            if compile.success { "ok" } else { "failed" },
            compile.attempts
        );
        for error in &compile.errors {
            eprintln!("  {error}");
        }
    }

    let Some(report) = &result.report else {
        return Ok(if cancel.is_cancelled() {
            exit_codes::CANCELLED
        } else {
            exit_codes::TEST_FAILURE
        });
    };

    let dir = store.create_run_dir(&pack.pack_name)?;
    let report_path = store.write_pack_report(&dir, report)?;
    println!(
        "{}/{} journeys passed, confidence {:.3}",
        report.summary.passed_journeys, report.summary.total_journeys, report.confidence_score
    );
    if let Some(reason) = &report.aborted_reason {
        println!("aborted: {reason}");
    }
    println!("report: {}", report_path.display());

    if cancel.is_cancelled() || wired.kill_switch.is_tripped() {
        return Ok(exit_codes::CANCELLED);
    }

    let clean = report.failures.is_empty()
        && report.aborted_reason.is_none()
        && report.confidence_score >= config.confidence_threshold;
    Ok(if clean {
        exit_codes::SUCCESS
    } else {
        exit_codes::TEST_FAILURE
    })
}
