use std::sync::atomic::{AtomicBool, Ordering};

use tracing::warn;

use crate::config::ServerConfig;
use crate::handlers;
use crate::protocol::{JsonRpcError, JsonRpcRequest, JsonRpcResponse};

/// Maximum bytes per JSON-RPC message (1 MiB).
pub const MAX_MESSAGE_BYTES: usize = 1024 * 1024;

/// Outcome of decoding one inbound message.
#[derive(Debug)]
pub enum Inbound {
    Request(JsonRpcRequest),
    /// The message was rejected; send this error back.
    Reject(JsonRpcResponse),
    /// Blank line; nothing to do.
    Empty,
}

/// Decode a raw message into a JSON-RPC request.
pub fn parse_message(raw: &[u8]) -> Inbound {
    if raw.len() > MAX_MESSAGE_BYTES {
        warn!(bytes = raw.len(), limit = MAX_MESSAGE_BYTES, "message too large");
        return Inbound::Reject(JsonRpcResponse::error(None, JsonRpcError::parse_error()));
    }

    let trimmed = match std::str::from_utf8(raw) {
        Ok(s) => s.trim(),
        Err(_) => {
            return Inbound::Reject(JsonRpcResponse::error(None, JsonRpcError::parse_error()));
        }
    };

    if trimmed.is_empty() {
        return Inbound::Empty;
    }

    let req: JsonRpcRequest = match serde_json::from_str(trimmed) {
        Ok(r) => r,
        Err(e) => {
            warn!(error = %e, "parse error");
            return Inbound::Reject(JsonRpcResponse::error(None, JsonRpcError::parse_error()));
        }
    };

    // Validate jsonrpc version
    if req.jsonrpc != "2.0" {
        return Inbound::Reject(JsonRpcResponse::error(
            req.id.clone(),
            JsonRpcError::invalid_request(),
        ));
    }

    Inbound::Request(req)
}

/// Per-connection MCP state: whether the `initialize` handshake happened.
#[derive(Debug, Default)]
pub struct Session {
    initialized: AtomicBool,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    /// A session that skips the handshake, for stateless HTTP requests.
    pub fn stateless() -> Self {
        Self {
            initialized: AtomicBool::new(true),
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    /// Run one request through the initialization gate and the dispatcher.
    pub async fn handle(&self, req: &JsonRpcRequest, config: &ServerConfig) -> Option<JsonRpcResponse> {
        // Initialization gate: only `initialize` and `ping` are allowed before handshake completes
        if !self.is_initialized() && req.method != "initialize" && req.method != "ping" {
            if req.is_notification() {
                return None;
            }
            return Some(JsonRpcResponse::error(
                req.id.clone(),
                JsonRpcError::invalid_request_with("Server not initialized"),
            ));
        }

        let resp = handlers::dispatch(req, config).await;

        if req.method == "initialize" {
            self.initialized.store(true, Ordering::Release);
        }

        resp
    }

    /// Decode and handle raw bytes in one step.
    pub async fn handle_raw(&self, raw: &[u8], config: &ServerConfig) -> Option<JsonRpcResponse> {
        match parse_message(raw) {
            Inbound::Request(req) => self.handle(&req, config).await,
            Inbound::Reject(resp) => Some(resp),
            Inbound::Empty => None,
        }
    }
}
