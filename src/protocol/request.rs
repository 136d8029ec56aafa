use serde::{Deserialize, Serialize};

/// JSON-RPC 2.0 request id: a number or a string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RpcId {
    Number(i64),
    Str(String),
}

/// JSON-RPC 2.0 request envelope.
#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    pub id: Option<RpcId>,
    pub method: String,
    pub params: Option<serde_json::Value>,
}

impl JsonRpcRequest {
    /// Requests without an `id` are notifications and never get a response.
    pub fn is_notification(&self) -> bool {
        self.id.is_none()
    }
}

/// MCP `initialize` params.
#[derive(Debug, Clone, Deserialize)]
pub struct InitializeParams {
    #[serde(rename = "protocolVersion")]
    pub protocol_version: Option<String>,
    #[serde(rename = "clientInfo")]
    pub client_info: Option<ClientInfo>,
}

/// Client information sent during `initialize`.
#[derive(Debug, Clone, Deserialize)]
pub struct ClientInfo {
    pub name: Option<String>,
    pub version: Option<String>,
}

/// Parameters for `tools/call`.
#[derive(Debug, Clone, Deserialize)]
pub struct ToolCallParams {
    pub name: String,
    pub arguments: Option<serde_json::Value>,
}

fn default_limit() -> u32 {
    10
}

fn default_order() -> String {
    "relevance-".to_string()
}

/// Parameters for `get_file_report` and `get_file_behavior_summary`.
#[derive(Debug, Clone, Deserialize)]
pub struct FileHashParams {
    pub hash: String,
}

/// Parameters for `get_entities_related_to_a_file`.
#[derive(Debug, Clone, Deserialize)]
pub struct FileRelationshipParams {
    pub hash: String,
    pub relationship_name: String,
    pub descriptors_only: bool,
    #[serde(default = "default_limit")]
    pub limit: u32,
}

/// Parameters for `get_file_behavior_report`.
#[derive(Debug, Clone, Deserialize)]
pub struct FileBehaviourParams {
    pub file_behaviour_id: String,
}

/// Parameters for `analyse_file`.
#[derive(Debug, Clone, Deserialize)]
pub struct AnalyseFileParams {
    pub file_path: String,
}

/// Parameters for `get_url_report`.
#[derive(Debug, Clone, Deserialize)]
pub struct UrlReportParams {
    pub url: String,
}

/// Parameters for `get_entities_related_to_a_url`.
#[derive(Debug, Clone, Deserialize)]
pub struct UrlRelationshipParams {
    pub url: String,
    pub relationship_name: String,
    pub descriptors_only: bool,
    #[serde(default = "default_limit")]
    pub limit: u32,
}

/// Parameters for `search`.
#[derive(Debug, Clone, Deserialize)]
pub struct SearchParams {
    pub query: String,
    #[serde(default = "default_limit")]
    pub limit: u32,
    #[serde(default = "default_order")]
    pub order_by: String,
}

/// Parameters for `get_whois`.
#[derive(Debug, Clone, Deserialize)]
pub struct WhoisParams {
    pub query: String,
    #[serde(default = "default_limit")]
    pub limit: u32,
}

/// Parameters for `get_hunting_ruleset`.
#[derive(Debug, Clone, Deserialize)]
pub struct HuntingRulesetParams {
    pub ruleset_id: String,
}

/// Parameters for `get_entities_related_to_a_hunting_ruleset`.
#[derive(Debug, Clone, Deserialize)]
pub struct HuntingRulesetRelationshipParams {
    pub ruleset_id: String,
    pub relationship_name: String,
    #[serde(default = "default_limit")]
    pub limit: u32,
}
