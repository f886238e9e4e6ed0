//! Line-delimited JSON tool server over stdio.
//!
//! Each request line is `{"id"?, "tool", "arguments"}`; each response line
//! is `{"id"?, "ok", "result" | "error"}`. The MCP transport proper sits in
//! front of this loop; stdout carries only protocol frames, logs go to
//! stderr.

use std::sync::Arc;

use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{info, warn};

use crate::state::AppState;
use crate::tools::ToolManager;

pub async fn serve_stdio(state: Arc<AppState>) -> std::io::Result<()> {
    let manager = ToolManager::new();
    let names: Vec<&str> = manager.get_tools().iter().map(|t| t.name()).collect();
    info!("serving tools over stdio: {}", names.join(", "));

    let stdin = BufReader::new(tokio::io::stdin());
    let mut stdout = tokio::io::stdout();
    let mut lines = stdin.lines();

    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let response = handle_line(&manager, &state, line).await;
        let mut payload = serde_json::to_string(&response).unwrap_or_else(|_| {
            r#"{"ok":false,"error":"response serialization failed"}"#.to_string()
        });
        payload.push('\n');
        stdout.write_all(payload.as_bytes()).await?;
        stdout.flush().await?;
    }
    Ok(())
}

async fn handle_line(manager: &ToolManager, state: &AppState, line: &str) -> Value {
    let request: Value = match serde_json::from_str(line) {
        Ok(value) => value,
        Err(err) => {
            warn!("unparseable request line: {err}");
            return json!({"ok": false, "error": format!("invalid request: {err}")});
        }
    };
    let id = request.get("id").cloned();
    let Some(tool) = request.get("tool").and_then(Value::as_str) else {
        return respond(id, Err("missing tool name".to_string()));
    };
    let args = request.get("arguments").cloned().unwrap_or(json!({}));

    let result = manager.execute(tool, args, state).await;
    respond(id, result)
}

fn respond(id: Option<Value>, result: Result<String, String>) -> Value {
    let mut response = match result {
        Ok(raw) => {
            // Tool outputs are JSON documents; embed them structurally.
            let value: Value = serde_json::from_str(&raw).unwrap_or(Value::String(raw));
            json!({"ok": true, "result": value})
        }
        Err(err) => json!({"ok": false, "error": err}),
    };
    if let Some(id) = id {
        response["id"] = id;
    }
    response
}
