use std::path::Path;

use tokio_util::sync::CancellationToken;

use crate::commands::load_json;
use crate::exit_codes;
use crate::wiring;

use marionette_core::engine::FlowExecutor;
use marionette_core::config::RuntimeConfig;
use marionette_core::model::TestFlow;
use marionette_core::report::ReportStore;

pub async fn run(path: &Path, config: &RuntimeConfig) -> anyhow::Result<i32> {
    let flow: TestFlow = match load_json(path, "flow") {
        Ok(f) => f,
        Err(code) => return Ok(code),
    };

    let Some(wired) = wiring::wire(config) else {
        eprintln!("no automation backend available (set MARIONETTE_BACKEND=fake for the demo backend)");
        return Ok(exit_codes::CAPABILITY_MISSING);
    };

    let cancel = CancellationToken::new();
    spawn_ctrl_c(cancel.clone(), wired.kill_switch.clone());

    let store = ReportStore::new(&config.report_dir);
    let dir = store.create_run_dir(&flow.test_name)?;
    let executor = FlowExecutor::new(wired.backend.clone())
        .with_kill_switch(wired.kill_switch.clone())
        .with_audit(wired.audit.clone());

    let report = executor.execute_flow_in(&flow, &cancel, &dir).await;
    let report_path = store.write_flow_report(&dir, &report)?;

    println!("{}", report.summary);
    println!("report: {}", report_path.display());

    if cancel.is_cancelled() || wired.kill_switch.is_tripped() {
        return Ok(exit_codes::CANCELLED);
    }
    Ok(if report.passed() {
        exit_codes::SUCCESS
    } else {
        exit_codes::TEST_FAILURE
    })
}

pub(crate) fn spawn_ctrl_c(
    cancel: CancellationToken,
    kill_switch: marionette_core::safety::KillSwitch,
) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received; cancelling");
            kill_switch.trip();
            cancel.cancel();
        }
    });
}
