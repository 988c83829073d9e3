//! Stdio transport: newline-delimited JSON-RPC on stdin/stdout.

use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use crate::jsonrpc::{error_codes, JsonRpcRequest, JsonRpcResponse};
use crate::tools::{dispatch, registry, ToolContext};

pub const PROTOCOL_VERSION: &str = "2024-11-05";

/// Serve until stdin closes or the context's cancel token fires.
pub async fn serve_stdio(ctx: ToolContext) -> anyhow::Result<()> {
    let stdin = BufReader::new(tokio::io::stdin());
    let mut stdout = tokio::io::stdout();
    let mut lines = stdin.lines();

    tracing::info!(tools = registry().len(), "mcp server listening on stdio");

    loop {
        let line = tokio::select! {
            _ = ctx.cancel.cancelled() => break,
            line = lines.next_line() => line?,
        };
        let Some(line) = line else {
            break;
        };
        if line.trim().is_empty() {
            continue;
        }

        let response = match serde_json::from_str::<JsonRpcRequest>(&line) {
            Ok(request) => {
                if request.is_notification() {
                    tracing::debug!(method = %request.method, "notification ignored");
                    continue;
                }
                handle(&ctx, request).await
            }
            Err(e) => JsonRpcResponse::err(
                Value::Null,
                error_codes::PARSE_ERROR,
                format!("unparseable request: {e}"),
            ),
        };

        let mut payload = serde_json::to_string(&response)?;
        payload.push('\n');
        stdout.write_all(payload.as_bytes()).await?;
        stdout.flush().await?;
    }
    Ok(())
}

async fn handle(ctx: &ToolContext, request: JsonRpcRequest) -> JsonRpcResponse {
    let id = request.id.clone().unwrap_or(Value::Null);
    match request.method.as_str() {
        "initialize" => JsonRpcResponse::ok(
            id,
            json!({
                "protocolVersion": PROTOCOL_VERSION,
                "capabilities": { "tools": {} },
                "serverInfo": {
                    "name": "marionette",
                    "version": env!("CARGO_PKG_VERSION"),
                },
            }),
        ),
        "ping" => JsonRpcResponse::ok(id, json!({})),
        "tools/list" => {
            let tools: Vec<Value> = registry()
                .iter()
                .map(|t| {
                    json!({
                        "name": t.name,
                        "description": t.description,
                        "inputSchema": t.input_schema,
                        "annotations": { "category": t.category, "risk": t.risk },
                    })
                })
                .collect();
            JsonRpcResponse::ok(id, json!({ "tools": tools }))
        }
        "tools/call" => {
            let Some(params) = request.tool_params() else {
                return JsonRpcResponse::err(
                    id,
                    error_codes::INVALID_PARAMS,
                    "tools/call needs {name, arguments}",
                );
            };
            tracing::debug!(tool = %params.name, "tool call");
            match dispatch(ctx, &params.name, &params.arguments).await {
                Ok(payload) => {
                    let is_error = payload.get("error").is_some();
                    JsonRpcResponse::ok(id, crate::jsonrpc::tool_result(&payload, is_error))
                }
                Err(e) => JsonRpcResponse::err(
                    id,
                    error_codes::INTERNAL_ERROR,
                    format!("tool '{}' failed: {e}", params.name),
                ),
            }
        }
        other => JsonRpcResponse::err(
            id,
            error_codes::METHOD_NOT_FOUND,
            format!("unknown method '{other}'"),
        ),
    }
}
