//! MCP server for Google Threat Intelligence.
//!
//! Exposes file, URL and intelligence lookups (`get_file_report`, `search`,
//! `get_url_report`, ...) as MCP tools over JSON-RPC 2.0, on stdio for local
//! agents or over HTTP (SSE and streamable HTTP) when deployed in a container.

pub mod config;
pub mod error;
pub mod handlers;
pub mod logging;
pub mod protocol;
pub mod server;
pub mod session;
pub mod transport;
pub mod vt;

pub mod schema;
