use std::path::Path;

use serde_json::Value;
use tracing::info;

use super::respond;
use crate::config::ServerConfig;
use crate::error::Result;
use crate::protocol::{
    AnalyseFileParams, FileBehaviourParams, FileHashParams, FileRelationshipParams,
    McpErrorResponse, ToolResult,
};
use crate::vt::VtClient;

pub const FILE_RELATIONSHIPS: &[&str] = &[
    "bundled_files",
    "carbonblack_children",
    "carbonblack_parents",
    "cloned_files",
    "collections",
    "comments",
    "compressed_parents",
    "contacted_domains",
    "contacted_ips",
    "contacted_urls",
    "dropped_files",
    "email_parents",
    "embedded_domains",
    "embedded_ips",
    "embedded_urls",
    "execution_parents",
    "graphs",
    "historical_ssl_certificates",
    "historical_whois",
    "itw_domains",
    "itw_ips",
    "itw_urls",
    "memory_pattern_domains",
    "memory_pattern_ips",
    "memory_pattern_urls",
    "overlay_parents",
    "pcap_parents",
    "pe_resource_children",
    "pe_resource_parents",
    "related_comments",
    "related_reports",
    "related_threat_actors",
    "reports",
    "similar_files",
    "submissions",
    "screenshots",
    "software_toolkits",
    "target_domains",
    "target_ips",
    "target_urls",
    "urls",
    "user_votes",
    "votes",
    "vulnerabilities",
];

/// Relationships embedded in every file report.
pub const FILE_KEY_RELATIONSHIPS: &[&str] = &["contacted_domains", "contacted_ips", "contacted_urls"];

const BEHAVIOUR_RELATIONSHIPS: &[&str] = &[
    "contacted_domains",
    "contacted_ips",
    "contacted_urls",
    "dropped_files",
    "embedded_domains",
    "embedded_ips",
    "embedded_urls",
    "associations",
];

/// Handle a `get_file_report` tool call.
///
/// The per-engine verdict table is excluded; it dwarfs the rest of the
/// report and the aggregated stats carry the same signal.
pub async fn report(params: FileHashParams, config: &ServerConfig) -> ToolResult {
    respond(fetch_report(&params.hash, config).await)
}

async fn fetch_report(hash: &str, config: &ServerConfig) -> Result<Value> {
    let client = VtClient::from_config(config)?;
    client
        .fetch_object(
            &["files"],
            "file",
            hash,
            FILE_KEY_RELATIONSHIPS,
            &[("exclude_attributes", "last_analysis_results".to_string())],
        )
        .await
}

/// Handle a `get_entities_related_to_a_file` tool call.
pub async fn related_entities(params: FileRelationshipParams, config: &ServerConfig) -> ToolResult {
    if !FILE_RELATIONSHIPS.contains(&params.relationship_name.as_str()) {
        return McpErrorResponse::unknown_relationship(&params.relationship_name, FILE_RELATIONSHIPS)
            .into();
    }

    let result = super::fetch_related(
        config,
        &["files"],
        &params.hash,
        &params.relationship_name,
        params.descriptors_only,
        params.limit,
    )
    .await;
    respond(result)
}

/// Handle a `get_file_behavior_report` tool call.
///
/// Behaviour ids look like `{sha256}_{sandbox name}`.
pub async fn behaviour_report(params: FileBehaviourParams, config: &ServerConfig) -> ToolResult {
    respond(fetch_behaviour_report(&params.file_behaviour_id, config).await)
}

async fn fetch_behaviour_report(id: &str, config: &ServerConfig) -> Result<Value> {
    let client = VtClient::from_config(config)?;
    client
        .fetch_object(
            &["file_behaviours"],
            "file_behaviour",
            id,
            BEHAVIOUR_RELATIONSHIPS,
            &[],
        )
        .await
}

/// Handle a `get_file_behavior_summary` tool call.
pub async fn behaviour_summary(params: FileHashParams, config: &ServerConfig) -> ToolResult {
    respond(fetch_behaviour_summary(&params.hash, config).await)
}

async fn fetch_behaviour_summary(hash: &str, config: &ServerConfig) -> Result<Value> {
    let client = VtClient::from_config(config)?;
    let body = client
        .get_json(&["files", hash, "behaviour_summary"], &[])
        .await?;
    Ok(body.get("data").cloned().unwrap_or(Value::Null))
}

/// Handle an `analyse_file` tool call: upload, then wait for the verdict.
pub async fn analyse(params: AnalyseFileParams, config: &ServerConfig) -> ToolResult {
    respond(upload_and_wait(&params.file_path, config).await)
}

async fn upload_and_wait(file_path: &str, config: &ServerConfig) -> Result<Value> {
    let client = VtClient::from_config(config)?;
    let analysis_id = client.scan_file(Path::new(file_path)).await?;
    info!(%file_path, %analysis_id, "file submitted for analysis");

    let analysis = client
        .wait_for_analysis(&analysis_id, config.analysis_poll_interval)
        .await?;
    info!(%analysis_id, "analysis has completed");
    Ok(analysis)
}
