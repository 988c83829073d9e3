use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "marionette",
    version,
    about = "Spec-driven desktop UI automation — validate flows, run them against the accessibility tree, and pipeline whole test packs"
)]
pub struct Cli {
    /// Validate a flow file and exit (0 valid, 1 invalid).
    #[arg(long, value_name = "FLOW_JSON", conflicts_with_all = ["run", "run_pack", "mcp"])]
    pub validate: Option<PathBuf>,

    /// Execute a flow and write its report under the report directory.
    #[arg(long, value_name = "FLOW_JSON", conflicts_with_all = ["run_pack", "mcp"])]
    pub run: Option<PathBuf>,

    /// Run the full pack pipeline (plan, compile, execute, report).
    #[arg(long = "run-pack", value_name = "PACK_JSON", conflicts_with = "mcp")]
    pub run_pack: Option<PathBuf>,

    /// Serve the agent tool surface as an MCP stdio server
    /// (stdout is JSON-RPC only; logs go to stderr).
    #[arg(long)]
    pub mcp: bool,

    /// Runtime configuration file.
    #[arg(long, value_name = "PATH", default_value = "config.json")]
    pub config: PathBuf,
}
