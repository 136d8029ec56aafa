use std::path::Path;
use std::time::Duration;

use reqwest::multipart::{Form, Part};
use reqwest::{Body, Response, StatusCode, Url};
use serde_json::{Map, Value};
use tracing::{debug, info};

use super::object::normalize_object;
use crate::config::ServerConfig;
use crate::error::{GtiError, Result};

const API_KEY_HEADER: &str = "x-apikey";

/// Largest page the API serves from collection endpoints.
const MAX_PAGE_SIZE: usize = 40;

/// Files above this size must go through a one-off upload URL.
const MAX_DIRECT_UPLOAD_BYTES: u64 = 32 * 1024 * 1024;

/// Query string pairs for an API call.
pub type Query<'a> = [(&'a str, String)];

/// Thin async client for the threat intelligence REST API (v3).
#[derive(Debug, Clone)]
pub struct VtClient {
    http: reqwest::Client,
    base_url: Url,
    api_key: String,
    direct_upload_limit: u64,
}

impl VtClient {
    pub fn new(api_key: impl Into<String>, base_url: &str) -> Result<Self> {
        let base_url = Url::parse(base_url)
            .map_err(|e| GtiError::Malformed(format!("invalid API base URL {base_url:?}: {e}")))?;
        let http = reqwest::Client::builder()
            .user_agent(concat!("gti-mcp-server/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            http,
            base_url,
            api_key: api_key.into(),
            direct_upload_limit: MAX_DIRECT_UPLOAD_BYTES,
        })
    }

    /// Override the size above which uploads go through `files/upload_url`.
    pub fn with_direct_upload_limit(mut self, bytes: u64) -> Self {
        self.direct_upload_limit = bytes;
        self
    }

    /// Build a client for one tool call. Fails when no API key is configured.
    pub fn from_config(config: &ServerConfig) -> Result<Self> {
        let api_key = config.api_key.as_deref().ok_or(GtiError::MissingApiKey)?;
        Self::new(api_key, &config.api_base_url)
    }

    /// Append `segments` to the base URL. Each element is exactly one path
    /// segment: a `/` inside an identifier is encoded, never split.
    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| GtiError::Malformed("API base URL cannot carry a path".into()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// GET an endpoint and return the decoded JSON body.
    pub async fn get_json(&self, segments: &[&str], query: &Query<'_>) -> Result<Value> {
        let url = self.endpoint(segments)?;
        debug!(path = %url.path(), "GET");
        let resp = self
            .http
            .get(url)
            .header(API_KEY_HEADER, &self.api_key)
            .query(query)
            .send()
            .await?;
        decode(resp).await
    }

    /// Fetch a single object and check that it has the expected type.
    pub async fn fetch_object(
        &self,
        collection: &[&str],
        expected_type: &str,
        id: &str,
        relationships: &[&str],
        query: &Query<'_>,
    ) -> Result<Value> {
        let mut params = query.to_vec();
        if !relationships.is_empty() {
            params.push(("relationships", relationships.join(",")));
        }

        let body = self.get_json(&nested(collection, &[id]), &params).await?;
        let data = body
            .get("data")
            .cloned()
            .ok_or_else(|| GtiError::Malformed("response has no data member".into()))?;

        let actual = data.get("type").and_then(Value::as_str).unwrap_or_default();
        if actual != expected_type {
            return Err(GtiError::UnexpectedType {
                expected: expected_type.to_string(),
                actual: actual.to_string(),
            });
        }

        Ok(normalize_object(data))
    }

    /// Walk a collection endpoint, following `meta.cursor`, until `limit`
    /// objects are collected or the collection ends.
    pub async fn iterate(
        &self,
        segments: &[&str],
        query: &Query<'_>,
        limit: u32,
    ) -> Result<Vec<Value>> {
        let limit = limit as usize;
        let mut items = Vec::new();
        let mut cursor: Option<String> = None;

        while items.len() < limit {
            let remaining = limit - items.len();
            let mut params = query.to_vec();
            params.push(("limit", remaining.min(MAX_PAGE_SIZE).to_string()));
            if let Some(c) = &cursor {
                params.push(("cursor", c.clone()));
            }

            let body = self.get_json(segments, &params).await?;
            let page = match body.get("data") {
                Some(Value::Array(objects)) => objects.clone(),
                Some(Value::Null) | None => Vec::new(),
                // One-to-one relationships answer with a single object.
                Some(object) => vec![object.clone()],
            };
            if page.is_empty() {
                break;
            }
            items.extend(page.into_iter().take(remaining).map(normalize_object));

            cursor = body
                .pointer("/meta/cursor")
                .and_then(Value::as_str)
                .filter(|c| !c.is_empty())
                .map(str::to_string);
            if cursor.is_none() {
                break;
            }
        }

        Ok(items)
    }

    /// Collect related objects for each relationship into `{name: [...]}`.
    ///
    /// With `descriptors_only` only `{type, id}` descriptors are fetched.
    pub async fn fetch_object_relationships(
        &self,
        collection: &[&str],
        id: &str,
        relationships: &[&str],
        descriptors_only: bool,
        limit: u32,
    ) -> Result<Map<String, Value>> {
        let mut out = Map::new();
        for rel in relationships {
            let segments = if descriptors_only {
                nested(collection, &[id, "relationships", *rel])
            } else {
                nested(collection, &[id, *rel])
            };
            let objects = self.iterate(&segments, &[], limit).await?;
            out.insert((*rel).to_string(), Value::Array(objects));
        }
        Ok(out)
    }

    /// Upload a file for analysis and return the analysis identifier.
    ///
    /// The file is streamed from disk, never held in memory whole.
    pub async fn scan_file(&self, path: &Path) -> Result<String> {
        let file = tokio::fs::File::open(path).await?;
        let size = file.metadata().await?.len();
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "file".to_string());

        let target = if size > self.direct_upload_limit {
            let body = self.get_json(&["files", "upload_url"], &[]).await?;
            let url = body
                .get("data")
                .and_then(Value::as_str)
                .ok_or_else(|| GtiError::Malformed("upload_url response has no URL".into()))?;
            Url::parse(url).map_err(|e| GtiError::Malformed(format!("bad upload URL: {e}")))?
        } else {
            self.endpoint(&["files"])?
        };

        let part = Part::stream_with_length(Body::from(file), size).file_name(file_name);
        let form = Form::new().part("file", part);
        let resp = self
            .http
            .post(target)
            .header(API_KEY_HEADER, &self.api_key)
            .multipart(form)
            .send()
            .await?;
        let body = decode(resp).await?;

        let id = body
            .pointer("/data/id")
            .and_then(Value::as_str)
            .ok_or_else(|| GtiError::Malformed("upload response has no analysis id".into()))?;
        info!(analysis_id = %id, bytes = size, "file uploaded");
        Ok(id.to_string())
    }

    /// Poll an analysis until its status is `completed`.
    ///
    /// Never gives up on its own; callers bound it with a timeout.
    pub async fn wait_for_analysis(&self, analysis_id: &str, poll: Duration) -> Result<Value> {
        loop {
            let body = self.get_json(&["analyses", analysis_id], &[]).await?;
            let data = body
                .get("data")
                .cloned()
                .ok_or_else(|| GtiError::Malformed("analysis response has no data".into()))?;

            let status = data
                .pointer("/attributes/status")
                .and_then(Value::as_str)
                .unwrap_or_default();
            if status == "completed" {
                return Ok(normalize_object(data));
            }

            debug!(%analysis_id, %status, "analysis pending");
            tokio::time::sleep(poll).await;
        }
    }
}

fn nested<'a>(collection: &[&'a str], rest: &[&'a str]) -> Vec<&'a str> {
    collection.iter().chain(rest).copied().collect()
}

/// Decode a response body, mapping API error objects onto `GtiError`.
async fn decode(resp: Response) -> Result<Value> {
    let status = resp.status();
    let text = resp.text().await?;

    if status.is_success() {
        return serde_json::from_str(&text)
            .map_err(|e| GtiError::Malformed(format!("invalid JSON body: {e}")));
    }

    let (code, message) = match serde_json::from_str::<Value>(&text) {
        Ok(body) => (
            body.pointer("/error/code")
                .and_then(Value::as_str)
                .unwrap_or("HttpError")
                .to_string(),
            body.pointer("/error/message")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
        ),
        Err(_) => ("HttpError".to_string(), format!("HTTP {status}")),
    };

    if status == StatusCode::NOT_FOUND {
        Err(GtiError::NotFound(format!("{code}: {message}")))
    } else {
        Err(GtiError::Api { code, message })
    }
}
