//! MCP stdio server: the agent tool surface over the automation core.
//!
//! Stdout carries JSON-RPC only; logs go to stderr via `tracing`.

pub mod jsonrpc;
pub mod server;
pub mod tools;

pub use server::serve_stdio;
pub use tools::{registry, ToolContext};
