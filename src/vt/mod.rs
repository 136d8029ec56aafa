//! Client for the Google Threat Intelligence / VirusTotal v3 REST API.

pub mod client;
pub mod object;

pub use client::VtClient;
pub use object::{normalize_object, sanitize, url_id};
