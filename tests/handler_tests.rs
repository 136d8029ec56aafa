//! Integration tests for the tool handlers.
//!
//! Handlers run against an `httpmock` server standing in for the threat
//! intelligence API, both directly and through the full dispatch flow.

use std::time::Duration;

use gti_mcp_server::config::ServerConfig;
use gti_mcp_server::handlers::{self, files, intelligence, urls};
use gti_mcp_server::protocol::{
    AnalyseFileParams, FileBehaviourParams, FileHashParams, FileRelationshipParams,
    HuntingRulesetRelationshipParams, JsonRpcRequest, RpcId, SearchParams, ToolResult,
    UrlReportParams, WhoisParams,
};
use httpmock::prelude::*;
use serde_json::{json, Value};

const API_KEY: &str = "test-key";
const SHA256: &str = "275a021bbfb6489e54d471899f7db9d1663fc695ec2fe2a2c4538aabf651fd0f";

fn test_config(server: &MockServer) -> ServerConfig {
    ServerConfig {
        api_key: Some(API_KEY.to_string()),
        api_base_url: server.base_url(),
        tool_timeout: Duration::from_secs(5),
        analysis_poll_interval: Duration::from_millis(10),
        ..ServerConfig::default()
    }
}

fn payload(result: &ToolResult) -> Value {
    serde_json::from_str(&result.content[0].text).expect("tool output must be JSON")
}

fn error_code(result: &ToolResult) -> String {
    assert!(result.is_error, "expected a tool error, got {:?}", result.content[0].text);
    payload(result)["error"]["code"].as_str().unwrap().to_string()
}

// ---------------------------------------------------------------------------
// files
// ---------------------------------------------------------------------------

#[tokio::test]
async fn file_report_normalizes_and_sanitizes() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(GET)
                .path(format!("/files/{SHA256}"))
                .header("x-apikey", API_KEY)
                .query_param("relationships", "contacted_domains,contacted_ips,contacted_urls")
                .query_param("exclude_attributes", "last_analysis_results");
            then.status(200).json_body(json!({
                "data": {
                    "id": SHA256,
                    "type": "file",
                    "links": {"self": "https://example/files/x"},
                    "attributes": {
                        "meaningful_name": "invoice.exe",
                        "tags": [],
                        "sandbox_verdicts": {},
                        "aggregations": {"files": {}},
                        "last_analysis_stats": {"malicious": 52, "undetected": 0}
                    },
                    "relationships": {
                        "contacted_domains": {
                            "data": [{"type": "domain", "id": "evil.example"}],
                            "links": {"self": "..."}
                        },
                        "contacted_ips": {"data": [], "links": {"self": "..."}},
                        "contacted_urls": {"data": []}
                    }
                }
            }));
        })
        .await;

    let config = test_config(&server);
    let result = files::report(FileHashParams { hash: SHA256.into() }, &config).await;
    mock.assert_async().await;
    assert!(!result.is_error);

    let report = payload(&result);
    assert_eq!(
        report,
        json!({
            "id": SHA256,
            "type": "file",
            "attributes": {
                "meaningful_name": "invoice.exe",
                "last_analysis_stats": {"malicious": 52, "undetected": 0}
            },
            "relationships": {
                "contacted_domains": [{"type": "domain", "id": "evil.example"}]
            }
        })
    );
}

#[tokio::test]
async fn file_report_not_found() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/files/deadbeef");
            then.status(404).json_body(json!({
                "error": {"code": "NotFoundError", "message": "File \"deadbeef\" not found"}
            }));
        })
        .await;

    let config = test_config(&server);
    let result = files::report(FileHashParams { hash: "deadbeef".into() }, &config).await;
    assert_eq!(error_code(&result), "not_found");
    assert!(payload(&result)["error"]["message"]
        .as_str()
        .unwrap()
        .starts_with("NotFoundError"));
}

#[tokio::test]
async fn api_errors_surface_code_and_message() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path(format!("/files/{SHA256}/behaviour_summary"));
            then.status(429).json_body(json!({
                "error": {"code": "QuotaExceededError", "message": "Quota exceeded"}
            }));
        })
        .await;

    let config = test_config(&server);
    let result = files::behaviour_summary(FileHashParams { hash: SHA256.into() }, &config).await;
    assert_eq!(error_code(&result), "api_error");
    assert_eq!(
        payload(&result)["error"]["message"],
        "QuotaExceededError: Quota exceeded"
    );
}

#[tokio::test]
async fn missing_api_key_is_reported_per_call() {
    let config = ServerConfig::default();
    let result = files::report(FileHashParams { hash: SHA256.into() }, &config).await;
    assert_eq!(error_code(&result), "missing_api_key");
}

#[tokio::test]
async fn unknown_file_relationship_is_rejected_without_calling_the_api() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.any_request();
            then.status(500);
        })
        .await;

    let config = test_config(&server);
    let params = FileRelationshipParams {
        hash: SHA256.into(),
        relationship_name: "friends".into(),
        descriptors_only: true,
        limit: 10,
    };
    let result = files::related_entities(params, &config).await;

    assert_eq!(error_code(&result), "unknown_relationship");
    let message = payload(&result)["error"]["message"].as_str().unwrap().to_string();
    assert!(message.starts_with("Relationship friends does not exist."));
    assert!(message.contains("contacted_ips,contacted_urls"));
    assert_eq!(mock.hits_async().await, 0);
}

#[tokio::test]
async fn related_descriptors_follow_the_cursor() {
    let server = MockServer::start_async().await;
    let path = format!("/files/{SHA256}/relationships/contacted_ips");

    let first = server
        .mock_async(|when, then| {
            when.method(GET).path(path.clone()).query_param("limit", "3");
            then.status(200).json_body(json!({
                "data": [
                    {"type": "ip_address", "id": "192.0.2.1"},
                    {"type": "ip_address", "id": "192.0.2.2"}
                ],
                "meta": {"cursor": "c1"}
            }));
        })
        .await;
    let second = server
        .mock_async(|when, then| {
            when.method(GET)
                .path(path.clone())
                .query_param("limit", "1")
                .query_param("cursor", "c1");
            then.status(200).json_body(json!({
                "data": [
                    {"type": "ip_address", "id": "192.0.2.3", "context_attributes": {"x": 1}}
                ],
                "meta": {"cursor": "c2"}
            }));
        })
        .await;

    let config = test_config(&server);
    let params = FileRelationshipParams {
        hash: SHA256.into(),
        relationship_name: "contacted_ips".into(),
        descriptors_only: true,
        limit: 3,
    };
    let result = files::related_entities(params, &config).await;
    first.assert_async().await;
    second.assert_async().await;

    let ids: Vec<String> = payload(&result)
        .as_array()
        .unwrap()
        .iter()
        .map(|o| o["id"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(ids, ["192.0.2.1", "192.0.2.2", "192.0.2.3"]);
}

#[tokio::test]
async fn behaviour_report_requests_network_relationships() {
    let server = MockServer::start_async().await;
    let id = format!("{SHA256}_Zenbox");
    let mock = server
        .mock_async(|when, then| {
            when.method(GET)
                .path(format!("/file_behaviours/{id}"))
                .query_param(
                    "relationships",
                    "contacted_domains,contacted_ips,contacted_urls,dropped_files,\
                     embedded_domains,embedded_ips,embedded_urls,associations",
                );
            then.status(200).json_body(json!({
                "data": {"id": id, "type": "file_behaviour", "attributes": {"sandbox_name": "Zenbox"}}
            }));
        })
        .await;

    let config = test_config(&server);
    let result = files::behaviour_report(FileBehaviourParams { file_behaviour_id: id.clone() }, &config)
        .await;
    mock.assert_async().await;
    assert_eq!(payload(&result)["attributes"]["sandbox_name"], "Zenbox");
}

#[tokio::test]
async fn wrong_object_type_is_an_api_error() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/file_behaviours/x_Zenbox");
            then.status(200)
                .json_body(json!({"data": {"id": "x", "type": "file"}}));
        })
        .await;

    let config = test_config(&server);
    let params = FileBehaviourParams { file_behaviour_id: "x_Zenbox".into() };
    let result = files::behaviour_report(params, &config).await;
    assert_eq!(error_code(&result), "api_error");
}

#[tokio::test]
async fn behaviour_summary_returns_data_member() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path(format!("/files/{SHA256}/behaviour_summary"));
            then.status(200).json_body(json!({
                "data": {"processes_created": ["cmd.exe"], "files_deleted": []}
            }));
        })
        .await;

    let config = test_config(&server);
    let result = files::behaviour_summary(FileHashParams { hash: SHA256.into() }, &config).await;
    assert_eq!(payload(&result), json!({"processes_created": ["cmd.exe"]}));
}

#[tokio::test]
async fn analyse_file_uploads_then_waits_for_completion() {
    let server = MockServer::start_async().await;
    let upload = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/files")
                .header("x-apikey", API_KEY)
                .body_contains("sample payload");
            then.status(200)
                .json_body(json!({"data": {"type": "analysis", "id": "an-1"}}));
        })
        .await;
    let analysis = server
        .mock_async(|when, then| {
            when.method(GET).path("/analyses/an-1");
            then.status(200).json_body(json!({
                "data": {
                    "type": "analysis",
                    "id": "an-1",
                    "attributes": {"status": "completed", "stats": {"malicious": 3}}
                }
            }));
        })
        .await;

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("sample.bin");
    std::fs::write(&path, "sample payload").unwrap();

    let config = test_config(&server);
    let params = AnalyseFileParams { file_path: path.to_string_lossy().into_owned() };
    let result = files::analyse(params, &config).await;

    upload.assert_async().await;
    analysis.assert_async().await;
    let body = payload(&result);
    assert_eq!(body["id"], "an-1");
    assert_eq!(body["attributes"]["status"], "completed");
}

#[tokio::test]
async fn analyse_missing_file_is_io_error() {
    let server = MockServer::start_async().await;
    let config = test_config(&server);
    let dir = tempfile::tempdir().unwrap();
    let params = AnalyseFileParams {
        file_path: dir.path().join("absent.bin").to_string_lossy().into_owned(),
    };
    let result = files::analyse(params, &config).await;
    assert_eq!(error_code(&result), "io_error");
}

// ---------------------------------------------------------------------------
// urls
// ---------------------------------------------------------------------------

#[tokio::test]
async fn url_report_uses_base64_identifier() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/urls/aHR0cHM6Ly9ldmlsLmV4YW1wbGUvcGF0aA")
                .query_param("relationships", "last_serving_ip_address,network_location");
            then.status(200).json_body(json!({
                "data": {
                    "id": "abc",
                    "type": "url",
                    "attributes": {"url": "https://evil.example/path"},
                    "relationships": {
                        "last_serving_ip_address": {"data": {"type": "ip_address", "id": "192.0.2.9"}},
                        "network_location": {"data": null}
                    }
                }
            }));
        })
        .await;

    let config = test_config(&server);
    let result = urls::report(UrlReportParams { url: "https://evil.example/path".into() }, &config)
        .await;
    mock.assert_async().await;

    let report = payload(&result);
    assert_eq!(report["relationships"]["last_serving_ip_address"]["id"], "192.0.2.9");
    assert!(report["relationships"].get("network_location").is_none());
}

// ---------------------------------------------------------------------------
// intelligence
// ---------------------------------------------------------------------------

#[tokio::test]
async fn search_passes_query_and_order() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/intelligence/search")
                .query_param("query", "type:peexe p:5+")
                .query_param("order", "last_submission_date-")
                .query_param("limit", "10");
            then.status(200).json_body(json!({
                "data": [{"type": "file", "id": "a"}, {"type": "file", "id": "b"}]
            }));
        })
        .await;

    let config = test_config(&server);
    let params = SearchParams {
        query: "type:peexe p:5+".into(),
        limit: 10,
        order_by: "last_submission_date-".into(),
    };
    let result = intelligence::search(params, &config).await;
    mock.assert_async().await;
    assert_eq!(payload(&result).as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn whois_never_returns_more_than_limit() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/intelligence/whois_search");
            then.status(200).json_body(json!({
                "data": [
                    {"type": "whois", "id": "1"},
                    {"type": "whois", "id": "2"},
                    {"type": "whois", "id": "3"}
                ],
                "meta": {"cursor": "more"}
            }));
        })
        .await;

    let config = test_config(&server);
    let params = WhoisParams { query: "example.com".into(), limit: 2 };
    let result = intelligence::whois(params, &config).await;
    assert_eq!(payload(&result).as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn hunting_ruleset_related_files() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/intelligence/hunting_rulesets/rs-1/hunting_notification_files");
            then.status(200)
                .json_body(json!({"data": [{"type": "file", "id": SHA256}]}));
        })
        .await;

    let config = test_config(&server);
    let params = HuntingRulesetRelationshipParams {
        ruleset_id: "rs-1".into(),
        relationship_name: "hunting_notification_files".into(),
        limit: 10,
    };
    let result = intelligence::hunting_ruleset_related_entities(params, &config).await;
    mock.assert_async().await;
    assert_eq!(payload(&result)[0]["id"], SHA256);

    let bad = HuntingRulesetRelationshipParams {
        ruleset_id: "rs-1".into(),
        relationship_name: "owner".into(),
        limit: 10,
    };
    let result = intelligence::hunting_ruleset_related_entities(bad, &config).await;
    assert_eq!(error_code(&result), "unknown_relationship");
}

// ---------------------------------------------------------------------------
// Dispatch integration tests
// ---------------------------------------------------------------------------

fn call(id: i64, name: &str, arguments: Value) -> JsonRpcRequest {
    JsonRpcRequest {
        jsonrpc: "2.0".into(),
        id: Some(RpcId::Number(id)),
        method: "tools/call".into(),
        params: Some(json!({ "name": name, "arguments": arguments })),
    }
}

#[tokio::test]
async fn dispatch_tools_list_advertises_all_tools() {
    let config = ServerConfig::default();
    let req = JsonRpcRequest {
        jsonrpc: "2.0".into(),
        id: Some(RpcId::Number(1)),
        method: "tools/list".into(),
        params: None,
    };

    let response = handlers::dispatch(&req, &config).await.unwrap();
    let result = response.result.unwrap();
    let tools = result["tools"].as_array().unwrap();

    let names: Vec<&str> = tools.iter().map(|t| t["name"].as_str().unwrap()).collect();
    for expected in [
        "get_file_report",
        "get_entities_related_to_a_file",
        "get_file_behavior_report",
        "get_file_behavior_summary",
        "analyse_file",
        "get_url_report",
        "get_entities_related_to_a_url",
        "search",
        "get_whois",
        "get_hunting_ruleset",
        "get_entities_related_to_a_hunting_ruleset",
    ] {
        assert!(names.contains(&expected), "should advertise {expected}");
    }
    assert_eq!(tools.len(), 11);
    assert!(!names.contains(&"health"));
    assert!(tools.iter().all(|t| t["inputSchema"]["type"] == "object"));
}

#[tokio::test]
async fn dispatch_file_report_via_tools_call() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path(format!("/files/{SHA256}"));
            then.status(200).json_body(json!({
                "data": {"id": SHA256, "type": "file", "attributes": {"size": 1024}}
            }));
        })
        .await;

    let config = test_config(&server);
    let response = handlers::dispatch(&call(2, "get_file_report", json!({"hash": SHA256})), &config)
        .await
        .unwrap();
    assert_eq!(response.id, Some(RpcId::Number(2)));

    let result = response.result.unwrap();
    assert!(result.get("isError").is_none());
    let text = result["content"][0]["text"].as_str().unwrap();
    let report: Value = serde_json::from_str(text).unwrap();
    assert_eq!(report["attributes"]["size"], 1024);
}

#[tokio::test]
async fn dispatch_rejects_arguments_that_violate_the_schema() {
    let config = ServerConfig::default();

    let response = handlers::dispatch(&call(3, "get_file_report", json!({})), &config)
        .await
        .unwrap();
    let result = response.result.unwrap();
    assert_eq!(result["isError"], true);
    let text = result["content"][0]["text"].as_str().unwrap();
    let err: Value = serde_json::from_str(text).unwrap();
    assert_eq!(err["error"]["code"], "invalid_arguments");

    let response = handlers::dispatch(&call(4, "search", json!({"query": "x", "limit": 0})), &config)
        .await
        .unwrap();
    assert_eq!(response.result.unwrap()["isError"], true);
}

#[tokio::test]
async fn dispatch_unknown_tool_and_method() {
    let config = ServerConfig::default();

    let response = handlers::dispatch(&call(5, "delete_everything", json!({})), &config)
        .await
        .unwrap();
    let result = response.result.unwrap();
    assert_eq!(result["isError"], true);
    assert_eq!(result["content"][0]["text"], "Unknown tool: delete_everything");

    let req = JsonRpcRequest {
        jsonrpc: "2.0".into(),
        id: Some(RpcId::Str("abc".into())),
        method: "resources/list".into(),
        params: None,
    };
    let response = handlers::dispatch(&req, &config).await.unwrap();
    assert_eq!(response.error.unwrap().code, -32601);
}

#[tokio::test]
async fn dispatch_tools_call_without_params_is_invalid() {
    let config = ServerConfig::default();
    let req = JsonRpcRequest {
        jsonrpc: "2.0".into(),
        id: Some(RpcId::Number(6)),
        method: "tools/call".into(),
        params: None,
    };
    let response = handlers::dispatch(&req, &config).await.unwrap();
    assert_eq!(response.error.unwrap().code, -32602);
}

#[tokio::test]
async fn dispatch_health_tool_is_callable() {
    let config = ServerConfig::default();
    let response = handlers::dispatch(&call(7, "health", json!({})), &config)
        .await
        .unwrap();
    let result = response.result.unwrap();
    assert_eq!(result["content"][0]["text"], r#"{"status":"ok"}"#);
}

#[tokio::test]
async fn slow_api_calls_time_out() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/intelligence/hunting_rulesets/slow");
            then.status(200)
                .delay(Duration::from_secs(2))
                .json_body(json!({"data": {"id": "slow", "type": "hunting_ruleset"}}));
        })
        .await;

    let config = ServerConfig {
        tool_timeout: Duration::from_millis(100),
        ..test_config(&server)
    };
    let response = handlers::dispatch(
        &call(8, "get_hunting_ruleset", json!({"ruleset_id": "slow"})),
        &config,
    )
    .await
    .unwrap();
    let result = response.result.unwrap();
    let text = result["content"][0]["text"].as_str().unwrap();
    let err: Value = serde_json::from_str(text).unwrap();
    assert_eq!(err["error"]["code"], "timeout");
}
