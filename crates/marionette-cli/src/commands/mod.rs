pub mod mcp;
pub mod run;
pub mod run_pack;
pub mod validate;

use crate::args::Cli;
use crate::exit_codes;

use marionette_core::config::load_config;

pub async fn dispatch(cli: Cli) -> anyhow::Result<i32> {
    let config = match load_config(&cli.config) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("config error: {e}");
            return Ok(exit_codes::CONFIG_ERROR);
        }
    };

    if let Some(path) = &cli.validate {
        return validate::run(path, &config);
    }
    if let Some(path) = &cli.run {
        return run::run(path, &config).await;
    }
    if let Some(path) = &cli.run_pack {
        return run_pack::run(path, &config).await;
    }
    if cli.mcp {
        return mcp::run(&config).await;
    }

    // No mode given: print help, exit clean.
    use clap::CommandFactory;
    Cli::command().print_help()?;
    println!();
    Ok(exit_codes::SUCCESS)
}

/// Read and parse a JSON input file; config-error on any problem.
pub(crate) fn load_json<T: serde::de::DeserializeOwned>(
    path: &std::path::Path,
    what: &str,
) -> Result<T, i32> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        eprintln!("cannot read {what} file {}: {e}", path.display());
        exit_codes::CONFIG_ERROR
    })?;
    serde_json::from_str(&content).map_err(|e| {
        eprintln!("cannot parse {what} file {}: {e}", path.display());
        exit_codes::CONFIG_ERROR
    })
}
