pub mod catalog;
pub mod files;
pub mod health;
pub mod intelligence;
pub mod urls;

use std::future::Future;

use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::config::ServerConfig;
use crate::error::Result;
use crate::protocol::{
    InitializeParams, JsonRpcError, JsonRpcRequest, JsonRpcResponse, McpErrorCode,
    McpErrorResponse, ToolCallParams, ToolResult,
};
use crate::schema;
use crate::vt::{sanitize, VtClient};

/// Protocol revisions this server can speak, oldest first.
pub const SUPPORTED_PROTOCOL_VERSIONS: &[&str] = &["2024-11-05", "2025-03-26", "2025-06-18"];

pub const SERVER_NAME: &str = "gti-mcp-server";

/// Dispatch a JSON-RPC request to the appropriate handler.
///
/// Returns `None` for notifications (no response required).
pub async fn dispatch(req: &JsonRpcRequest, config: &ServerConfig) -> Option<JsonRpcResponse> {
    match req.method.as_str() {
        "initialize" => Some(JsonRpcResponse::success(req.id.clone(), initialize(req))),

        "notifications/initialized" | "notifications/cancelled" => None,

        "ping" => Some(JsonRpcResponse::success(req.id.clone(), serde_json::json!({}))),

        "tools/list" => {
            let result = serde_json::json!({ "tools": catalog::definitions() });
            Some(JsonRpcResponse::success(req.id.clone(), result))
        }

        "tools/call" => {
            let params: ToolCallParams = match &req.params {
                Some(v) => match serde_json::from_value(v.clone()) {
                    Ok(p) => p,
                    Err(e) => {
                        return Some(JsonRpcResponse::error(
                            req.id.clone(),
                            JsonRpcError::invalid_params(format!(
                                "Invalid tools/call params: {e}"
                            )),
                        ));
                    }
                },
                None => {
                    return Some(JsonRpcResponse::error(
                        req.id.clone(),
                        JsonRpcError::invalid_params("Missing params for tools/call"),
                    ));
                }
            };

            let tool_result = dispatch_tool_call(&params, config).await;
            let response = match serde_json::to_value(&tool_result) {
                Ok(result) => JsonRpcResponse::success(req.id.clone(), result),
                Err(e) => JsonRpcResponse::error(
                    req.id.clone(),
                    JsonRpcError::internal_error(format!("Tool result serialization failed: {e}")),
                ),
            };
            Some(response)
        }

        _ if req.is_notification() => {
            debug!(method = %req.method, "ignoring unknown notification");
            None
        }

        _ => Some(JsonRpcResponse::error(
            req.id.clone(),
            JsonRpcError::method_not_found(&req.method),
        )),
    }
}

fn initialize(req: &JsonRpcRequest) -> Value {
    let params: Option<InitializeParams> = req
        .params
        .as_ref()
        .and_then(|v| serde_json::from_value(v.clone()).ok());

    let requested = params.as_ref().and_then(|p| p.protocol_version.as_deref());
    let latest = SUPPORTED_PROTOCOL_VERSIONS[SUPPORTED_PROTOCOL_VERSIONS.len() - 1];
    let version = requested
        .filter(|v| SUPPORTED_PROTOCOL_VERSIONS.contains(v))
        .unwrap_or(latest);

    if let Some(client) = params.as_ref().and_then(|p| p.client_info.as_ref()) {
        info!(
            client = client.name.as_deref().unwrap_or("unknown"),
            client_version = client.version.as_deref().unwrap_or("unknown"),
            protocol = version,
            "client initializing"
        );
    }

    serde_json::json!({
        "protocolVersion": version,
        "capabilities": {
            "tools": {}
        },
        "serverInfo": {
            "name": SERVER_NAME,
            "title": "Google Threat Intelligence MCP server",
            "version": env!("CARGO_PKG_VERSION")
        }
    })
}

/// Validate arguments, then run the named tool under its time budget.
pub async fn dispatch_tool_call(params: &ToolCallParams, config: &ServerConfig) -> ToolResult {
    let Some(schema) = catalog::input_schema(&params.name) else {
        return ToolResult::error(format!("Unknown tool: {}", params.name));
    };

    let arguments = params
        .arguments
        .clone()
        .unwrap_or_else(|| Value::Object(Default::default()));
    if let Err(e) = schema::validate_value(&schema, &arguments) {
        return McpErrorResponse::new(
            McpErrorCode::InvalidArguments,
            format!("Invalid arguments for {}: {e}", params.name),
        )
        .into();
    }

    let budget = if params.name == "analyse_file" {
        config.analysis_timeout
    } else {
        config.tool_timeout
    };

    info!(tool = %params.name, "tool call");
    match tokio::time::timeout(budget, run_tool(&params.name, arguments, config)).await {
        Ok(result) => {
            if result.is_error {
                warn!(tool = %params.name, "tool call failed");
            }
            result
        }
        Err(_) => {
            warn!(tool = %params.name, secs = budget.as_secs(), "tool call timed out");
            McpErrorResponse::canonical(McpErrorCode::Timeout).into()
        }
    }
}

async fn run_tool(name: &str, arguments: Value, config: &ServerConfig) -> ToolResult {
    match name {
        "get_file_report" => with_args(name, arguments, |p| files::report(p, config)).await,
        "get_entities_related_to_a_file" => {
            with_args(name, arguments, |p| files::related_entities(p, config)).await
        }
        "get_file_behavior_report" => {
            with_args(name, arguments, |p| files::behaviour_report(p, config)).await
        }
        "get_file_behavior_summary" => {
            with_args(name, arguments, |p| files::behaviour_summary(p, config)).await
        }
        "analyse_file" => with_args(name, arguments, |p| files::analyse(p, config)).await,
        "get_url_report" => with_args(name, arguments, |p| urls::report(p, config)).await,
        "get_entities_related_to_a_url" => {
            with_args(name, arguments, |p| urls::related_entities(p, config)).await
        }
        "search" => with_args(name, arguments, |p| intelligence::search(p, config)).await,
        "get_whois" => with_args(name, arguments, |p| intelligence::whois(p, config)).await,
        "get_hunting_ruleset" => {
            with_args(name, arguments, |p| intelligence::hunting_ruleset(p, config)).await
        }
        "get_entities_related_to_a_hunting_ruleset" => {
            with_args(name, arguments, |p| {
                intelligence::hunting_ruleset_related_entities(p, config)
            })
            .await
        }
        "health" => health::handle().await,
        _ => ToolResult::error(format!("Unknown tool: {name}")),
    }
}

/// Deserialize typed params and hand them to a handler.
async fn with_args<P, F, Fut>(name: &str, arguments: Value, handler: F) -> ToolResult
where
    P: DeserializeOwned,
    F: FnOnce(P) -> Fut,
    Fut: Future<Output = ToolResult>,
{
    match serde_json::from_value::<P>(arguments) {
        Ok(params) => handler(params).await,
        Err(e) => McpErrorResponse::new(
            McpErrorCode::InvalidArguments,
            format!("Invalid arguments for {name}: {e}"),
        )
        .into(),
    }
}

/// Turn an API outcome into a tool result, pruning empty fields.
pub(crate) fn respond(result: Result<Value>) -> ToolResult {
    match result {
        Ok(value) => ToolResult::json(&sanitize(value)),
        Err(e) => {
            warn!(error = %e, "threat intelligence request failed");
            McpErrorResponse::from(e).into()
        }
    }
}

/// Objects reachable from `{collection}/{id}` over one relationship.
pub(crate) async fn fetch_related(
    config: &ServerConfig,
    collection: &[&str],
    id: &str,
    relationship: &str,
    descriptors_only: bool,
    limit: u32,
) -> Result<Value> {
    let client = VtClient::from_config(config)?;
    let mut related = client
        .fetch_object_relationships(collection, id, &[relationship], descriptors_only, limit)
        .await?;
    Ok(related
        .remove(relationship)
        .unwrap_or_else(|| Value::Array(Vec::new())))
}
