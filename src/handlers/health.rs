use serde_json::{json, Value};

use crate::protocol::ToolResult;

/// Liveness payload shared by the `health` tool and `GET /health`.
pub fn status() -> Value {
    json!({ "status": "ok" })
}

/// Health check.
pub async fn handle() -> ToolResult {
    ToolResult::json(&status())
}
