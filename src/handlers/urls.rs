use serde_json::Value;

use super::respond;
use crate::config::ServerConfig;
use crate::error::Result;
use crate::protocol::{McpErrorResponse, ToolResult, UrlRelationshipParams, UrlReportParams};
use crate::vt::{url_id, VtClient};

pub const URL_RELATIONSHIPS: &[&str] = &[
    "analyses",
    "associations",
    "campaigns",
    "collections",
    "comments",
    "communicating_files",
    "contacted_domains",
    "contacted_ips",
    "downloaded_files",
    "embedded_js_files",
    "graphs",
    "http_response_contents",
    "last_serving_ip_address",
    "malware_families",
    "memory_pattern_parents",
    "network_location",
    "redirecting_urls",
    "referrer_files",
    "related_comments",
    "related_reports",
    "related_threat_actors",
    "reports",
    "submissions",
    "screenshots",
    "software_toolkits",
    "user_votes",
    "votes",
];

pub const URL_KEY_RELATIONSHIPS: &[&str] = &["last_serving_ip_address", "network_location"];

/// Handle a `get_url_report` tool call.
pub async fn report(params: UrlReportParams, config: &ServerConfig) -> ToolResult {
    respond(fetch_report(&params.url, config).await)
}

async fn fetch_report(url: &str, config: &ServerConfig) -> Result<Value> {
    let client = VtClient::from_config(config)?;
    client
        .fetch_object(
            &["urls"],
            "url",
            &url_id(url),
            URL_KEY_RELATIONSHIPS,
            &[("exclude_attributes", "last_analysis_results".to_string())],
        )
        .await
}

/// Handle a `get_entities_related_to_a_url` tool call.
pub async fn related_entities(params: UrlRelationshipParams, config: &ServerConfig) -> ToolResult {
    if !URL_RELATIONSHIPS.contains(&params.relationship_name.as_str()) {
        return McpErrorResponse::unknown_relationship(&params.relationship_name, URL_RELATIONSHIPS)
            .into();
    }

    let result = super::fetch_related(
        config,
        &["urls"],
        &url_id(&params.url),
        &params.relationship_name,
        params.descriptors_only,
        params.limit,
    )
    .await;
    respond(result)
}
