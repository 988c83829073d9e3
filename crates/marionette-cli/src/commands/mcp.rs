use tokio_util::sync::CancellationToken;

use crate::commands::run::spawn_ctrl_c;
use crate::exit_codes;
use crate::wiring;

use marionette_core::config::RuntimeConfig;
use marionette_core::report::ReportStore;
use marionette_mcp_server::{serve_stdio, ToolContext};

pub async fn run(config: &RuntimeConfig) -> anyhow::Result<i32> {
    let Some(wired) = wiring::wire(config) else {
        // Stdout is reserved for JSON-RPC; this goes to stderr.
        eprintln!("no automation backend available; cannot serve tools");
        return Ok(exit_codes::CAPABILITY_MISSING);
    };

    let cancel = CancellationToken::new();
    spawn_ctrl_c(cancel.clone(), wired.kill_switch.clone());

    let ctx = ToolContext {
        backend: wired.backend,
        processes: wired.processes,
        capture: wired.capture,
        chat: wired.chat,
        vision: wired.vision,
        store: ReportStore::new(&config.report_dir),
        config: config.clone(),
        kill_switch: wired.kill_switch,
        audit: wired.audit,
        cancel,
    };

    serve_stdio(ctx).await?;
    Ok(exit_codes::SUCCESS)
}
