pub mod request;
pub mod response;

pub use request::{
    AnalyseFileParams, FileBehaviourParams, FileHashParams, FileRelationshipParams,
    HuntingRulesetParams, HuntingRulesetRelationshipParams, InitializeParams, JsonRpcRequest,
    RpcId, SearchParams, ToolCallParams, UrlRelationshipParams, UrlReportParams, WhoisParams,
};
pub use response::{
    JsonRpcError, JsonRpcResponse, McpError, McpErrorCode, McpErrorResponse, ToolResult,
    ToolResultContent,
};
