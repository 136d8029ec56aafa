use serde_json::Value;

use super::respond;
use crate::config::ServerConfig;
use crate::error::Result;
use crate::protocol::{
    HuntingRulesetParams, HuntingRulesetRelationshipParams, McpErrorResponse, SearchParams,
    ToolResult, WhoisParams,
};
use crate::vt::VtClient;

pub const HUNTING_RULESET_RELATIONSHIPS: &[&str] = &["hunting_notification_files"];

const HUNTING_RULESETS: &[&str] = &["intelligence", "hunting_rulesets"];

/// Handle a `search` tool call.
///
/// `order_by` takes a sort key (`relevance`, `last_analysis_date`,
/// `first_submission_date`, `last_submission_date`) suffixed with `+` or `-`.
pub async fn search(params: SearchParams, config: &ServerConfig) -> ToolResult {
    let query = [("query", params.query), ("order", params.order_by)];
    respond(collect(config, &["intelligence", "search"], &query, params.limit).await)
}

/// Handle a `get_whois` tool call.
pub async fn whois(params: WhoisParams, config: &ServerConfig) -> ToolResult {
    let query = [("query", params.query)];
    respond(collect(config, &["intelligence", "whois_search"], &query, params.limit).await)
}

async fn collect(
    config: &ServerConfig,
    segments: &[&str],
    query: &[(&str, String)],
    limit: u32,
) -> Result<Value> {
    let client = VtClient::from_config(config)?;
    let objects = client.iterate(segments, query, limit).await?;
    Ok(Value::Array(objects))
}

/// Handle a `get_hunting_ruleset` tool call.
pub async fn hunting_ruleset(params: HuntingRulesetParams, config: &ServerConfig) -> ToolResult {
    respond(fetch_ruleset(&params.ruleset_id, config).await)
}

async fn fetch_ruleset(ruleset_id: &str, config: &ServerConfig) -> Result<Value> {
    let client = VtClient::from_config(config)?;
    client
        .fetch_object(HUNTING_RULESETS, "hunting_ruleset", ruleset_id, &[], &[])
        .await
}

/// Handle a `get_entities_related_to_a_hunting_ruleset` tool call.
pub async fn hunting_ruleset_related_entities(
    params: HuntingRulesetRelationshipParams,
    config: &ServerConfig,
) -> ToolResult {
    if !HUNTING_RULESET_RELATIONSHIPS.contains(&params.relationship_name.as_str()) {
        return McpErrorResponse::unknown_relationship(
            &params.relationship_name,
            HUNTING_RULESET_RELATIONSHIPS,
        )
        .into();
    }

    let result = super::fetch_related(
        config,
        HUNTING_RULESETS,
        &params.ruleset_id,
        &params.relationship_name,
        false,
        params.limit,
    )
    .await;
    respond(result)
}
