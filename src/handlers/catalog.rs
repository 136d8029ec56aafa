use serde::Serialize;
use serde_json::{json, Value};

use super::files::FILE_RELATIONSHIPS;
use super::intelligence::HUNTING_RULESET_RELATIONSHIPS;
use super::urls::URL_RELATIONSHIPS;

/// A tool as advertised by `tools/list`.
#[derive(Debug, Clone, Serialize)]
pub struct ToolDefinition {
    pub name: &'static str,
    pub description: String,
    #[serde(rename = "inputSchema")]
    pub input_schema: Value,
}

const DESCRIPTORS_ONLY_HELP: &str = "Must be true when the target object type is one of file, \
domain, url, ip_address or collection.";

fn limit_property(subject: &str) -> Value {
    json!({
        "type": "integer",
        "minimum": 1,
        "default": 10,
        "description": format!("Limit the number of {subject} to retrieve. 10 by default.")
    })
}

/// Not an `enum`: unknown names get a dedicated error listing the options.
fn relationship_property() -> Value {
    json!({ "type": "string", "minLength": 1, "description": "Relationship name." })
}

fn string_property(description: &str) -> Value {
    json!({ "type": "string", "minLength": 1, "description": description })
}

fn relationships_help(kind: &str, available: &[&str]) -> String {
    format!(
        "Retrieve entities related to the given {kind}. Available relationships: {}.",
        available.join(", ")
    )
}

/// Every callable tool, in advertisement order.
///
/// `health` is callable but deliberately absent: it is an operational probe,
/// not something an agent should pick.
pub fn definitions() -> Vec<ToolDefinition> {
    vec![
        ToolDefinition {
            name: "get_file_report",
            description: "Get a comprehensive file analysis report from Google Threat \
                Intelligence."
                .into(),
            input_schema: json!({
                "type": "object",
                "required": ["hash"],
                "properties": {
                    "hash": string_property("SHA-256, SHA-1 or MD5 of the file.")
                }
            }),
        },
        ToolDefinition {
            name: "get_entities_related_to_a_file",
            description: relationships_help("file hash", FILE_RELATIONSHIPS),
            input_schema: json!({
                "type": "object",
                "required": ["hash", "relationship_name", "descriptors_only"],
                "properties": {
                    "hash": string_property("SHA-256, SHA-1 or MD5 of the file."),
                    "relationship_name": relationship_property(),
                    "descriptors_only": { "type": "boolean", "description": DESCRIPTORS_ONLY_HELP },
                    "limit": limit_property("entities")
                }
            }),
        },
        ToolDefinition {
            name: "get_file_behavior_report",
            description: "Retrieve the sandbox behaviour report for a file behaviour \
                identifier. Identifiers follow the pattern \"{file hash}_{sandbox name}\"."
                .into(),
            input_schema: json!({
                "type": "object",
                "required": ["file_behaviour_id"],
                "properties": {
                    "file_behaviour_id": string_property("File behaviour ID.")
                }
            }),
        },
        ToolDefinition {
            name: "get_file_behavior_summary",
            description: "Retrieve a summary of all the file behaviour reports from all the \
                sandboxes."
                .into(),
            input_schema: json!({
                "type": "object",
                "required": ["hash"],
                "properties": {
                    "hash": string_property("MD5, SHA-1 or SHA-256 hash that identifies the file.")
                }
            }),
        },
        ToolDefinition {
            name: "analyse_file",
            description: "Upload and analyse a file. The file is shared with the community \
                and the completed analysis is returned."
                .into(),
            input_schema: json!({
                "type": "object",
                "required": ["file_path"],
                "properties": {
                    "file_path": string_property("Absolute path to the file to analyse.")
                }
            }),
        },
        ToolDefinition {
            name: "get_url_report",
            description: "Get a comprehensive URL analysis report from Google Threat \
                Intelligence."
                .into(),
            input_schema: json!({
                "type": "object",
                "required": ["url"],
                "properties": {
                    "url": string_property("URL to analyse.")
                }
            }),
        },
        ToolDefinition {
            name: "get_entities_related_to_a_url",
            description: relationships_help("URL", URL_RELATIONSHIPS),
            input_schema: json!({
                "type": "object",
                "required": ["url", "relationship_name", "descriptors_only"],
                "properties": {
                    "url": string_property("URL to analyse."),
                    "relationship_name": relationship_property(),
                    "descriptors_only": { "type": "boolean", "description": DESCRIPTORS_ONLY_HELP },
                    "limit": limit_property("entities")
                }
            }),
        },
        ToolDefinition {
            name: "search",
            description: "Search for threats in Google Threat Intelligence. Results can be \
                ordered by relevance, last_analysis_date, first_submission_date or \
                last_submission_date, suffixed with + (ascending) or - (descending)."
                .into(),
            input_schema: json!({
                "type": "object",
                "required": ["query"],
                "properties": {
                    "query": string_property("Search query."),
                    "limit": limit_property("objects"),
                    "order_by": {
                        "type": "string",
                        "default": "relevance-",
                        "description": "Order results by the given order key."
                    }
                }
            }),
        },
        ToolDefinition {
            name: "get_whois",
            description: "Get WHOIS information for a domain or IP address.".into(),
            input_schema: json!({
                "type": "object",
                "required": ["query"],
                "properties": {
                    "query": string_property("Domain or IP address."),
                    "limit": limit_property("objects")
                }
            }),
        },
        ToolDefinition {
            name: "get_hunting_ruleset",
            description: "Get a Hunting Ruleset object. Yara rule contents are in the `rules` \
                attribute."
                .into(),
            input_schema: json!({
                "type": "object",
                "required": ["ruleset_id"],
                "properties": {
                    "ruleset_id": string_property("Hunting ruleset identifier.")
                }
            }),
        },
        ToolDefinition {
            name: "get_entities_related_to_a_hunting_ruleset",
            description: relationships_help("Hunting Ruleset", HUNTING_RULESET_RELATIONSHIPS),
            input_schema: json!({
                "type": "object",
                "required": ["ruleset_id", "relationship_name"],
                "properties": {
                    "ruleset_id": string_property("Hunting ruleset identifier."),
                    "relationship_name": relationship_property(),
                    "limit": limit_property("entities")
                }
            }),
        },
    ]
}

/// Input schema for a tool name, including the unlisted `health` probe.
pub fn input_schema(name: &str) -> Option<Value> {
    if name == "health" {
        return Some(json!({ "type": "object", "properties": {} }));
    }
    definitions()
        .into_iter()
        .find(|d| d.name == name)
        .map(|d| d.input_schema)
}
