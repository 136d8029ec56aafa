use std::net::IpAddr;
use std::str::FromStr;
use std::time::Duration;

use clap::{Parser, ValueEnum};

/// Default timeout for tool operations (30 seconds).
const DEFAULT_TOOL_TIMEOUT_SECS: u64 = 30;

/// Uploads can sit in the analysis queue for minutes.
const DEFAULT_ANALYSIS_TIMEOUT_SECS: u64 = 600;

const DEFAULT_ANALYSIS_POLL_SECS: u64 = 20;

/// Streamable HTTP sessions idle longer than this are dropped.
const DEFAULT_SESSION_IDLE_SECS: u64 = 1800;

const DEFAULT_MAX_SESSIONS: usize = 1000;

pub const DEFAULT_API_BASE_URL: &str = "https://www.virustotal.com/api/v3";
pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_SSE_PATH: &str = "/sse";
pub const DEFAULT_MESSAGE_PATH: &str = "/messages/";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{name} must be a positive integer")]
    InvalidNumber { name: &'static str },
    #[error("PORT must be a valid TCP port, got {0:?}")]
    InvalidPort(String),
    #[error("HOST must be an IP address, got {0:?}")]
    InvalidHost(String),
    #[error("MCP_TRANSPORT must be `stdio`, `sse` or `http`, got {0:?}")]
    InvalidTransport(String),
    #[error("FORWARDED_ALLOW_IPS contains an invalid address: {0:?}")]
    InvalidForwardedIp(String),
    #[error("{name} must start with '/', got {value:?}")]
    InvalidPath { name: &'static str, value: String },
    #[error("LOG_FORMAT must be `text` or `json`, got {0:?}")]
    InvalidLogFormat(String),
}

/// Transport the server speaks MCP over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Transport {
    /// Newline-delimited JSON-RPC on stdin/stdout.
    Stdio,
    /// HTTP: SSE and streamable HTTP endpoints.
    #[value(alias = "http")]
    Sse,
}

impl FromStr for Transport {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "stdio" => Ok(Self::Stdio),
            "sse" | "http" => Ok(Self::Sse),
            _ => Err(ConfigError::InvalidTransport(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            _ => Err(ConfigError::InvalidLogFormat(s.to_string())),
        }
    }
}

/// Peers whose `X-Forwarded-For` header is trusted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ForwardedAllowIps {
    Any,
    List(Vec<IpAddr>),
}

impl ForwardedAllowIps {
    pub fn trusts(&self, peer: &IpAddr) -> bool {
        match self {
            Self::Any => true,
            Self::List(ips) => ips.contains(peer),
        }
    }
}

impl Default for ForwardedAllowIps {
    fn default() -> Self {
        Self::List(vec![IpAddr::from([127, 0, 0, 1])])
    }
}

impl FromStr for ForwardedAllowIps {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut ips = Vec::new();
        for part in s.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            if part == "*" {
                return Ok(Self::Any);
            }
            let ip = part
                .parse::<IpAddr>()
                .map_err(|_| ConfigError::InvalidForwardedIp(part.to_string()))?;
            ips.push(ip);
        }
        Ok(Self::List(ips))
    }
}

/// Server configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub api_key: Option<String>,
    pub api_base_url: String,
    pub tool_timeout: Duration,
    pub analysis_timeout: Duration,
    pub analysis_poll_interval: Duration,
    pub transport: Transport,
    pub host: IpAddr,
    pub port: u16,
    pub sse_path: String,
    pub message_path: String,
    pub stateless: bool,
    pub session_idle_timeout: Duration,
    pub max_sessions: usize,
    pub forwarded_allow_ips: ForwardedAllowIps,
    pub log_format: LogFormat,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            tool_timeout: Duration::from_secs(DEFAULT_TOOL_TIMEOUT_SECS),
            analysis_timeout: Duration::from_secs(DEFAULT_ANALYSIS_TIMEOUT_SECS),
            analysis_poll_interval: Duration::from_secs(DEFAULT_ANALYSIS_POLL_SECS),
            transport: Transport::Stdio,
            host: IpAddr::from([0, 0, 0, 0]),
            port: DEFAULT_PORT,
            sse_path: DEFAULT_SSE_PATH.to_string(),
            message_path: DEFAULT_MESSAGE_PATH.to_string(),
            stateless: false,
            session_idle_timeout: Duration::from_secs(DEFAULT_SESSION_IDLE_SECS),
            max_sessions: DEFAULT_MAX_SESSIONS,
            forwarded_allow_ips: ForwardedAllowIps::default(),
            log_format: LogFormat::Text,
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment.
    ///
    /// - `VT_APIKEY` (optional at startup) - checked when a tool needs the API
    /// - `PORT` (optional) - when set, the HTTP transport is selected
    /// - `MCP_TRANSPORT` (optional) - `stdio` or `sse`, overrides the `PORT` rule
    /// - `STATELESS=1` (optional) - streamable HTTP without session tracking
    ///
    /// The remaining knobs are listed in the README.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        config.api_key = lookup("VT_APIKEY").filter(|k| !k.trim().is_empty());
        if let Some(url) = lookup("VT_API_BASE_URL") {
            config.api_base_url = url.trim_end_matches('/').to_string();
        }

        config.tool_timeout = secs(&lookup, "GTI_TOOL_TIMEOUT_SECS", DEFAULT_TOOL_TIMEOUT_SECS)?;
        config.analysis_timeout =
            secs(&lookup, "GTI_ANALYSIS_TIMEOUT_SECS", DEFAULT_ANALYSIS_TIMEOUT_SECS)?;
        config.analysis_poll_interval =
            secs(&lookup, "GTI_ANALYSIS_POLL_SECS", DEFAULT_ANALYSIS_POLL_SECS)?;

        let port = lookup("PORT").filter(|p| !p.trim().is_empty());
        if let Some(port) = &port {
            config.port = parse_port(port)?;
            config.transport = Transport::Sse;
        }
        if let Some(transport) = lookup("MCP_TRANSPORT") {
            config.transport = transport.parse()?;
        }

        if let Some(host) = lookup("HOST") {
            config.host = host
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidHost(host.clone()))?;
        }
        if let Some(path) = lookup("SSE_PATH") {
            config.sse_path = check_path("SSE_PATH", path)?;
        }
        if let Some(path) = lookup("MESSAGE_PATH") {
            config.message_path = check_path("MESSAGE_PATH", path)?;
        }

        config.stateless = lookup("STATELESS").as_deref() == Some("1");
        config.session_idle_timeout =
            secs(&lookup, "SESSION_IDLE_SECS", DEFAULT_SESSION_IDLE_SECS)?;
        if let Some(max) = lookup("MAX_SESSIONS") {
            config.max_sessions = max
                .trim()
                .parse::<usize>()
                .ok()
                .filter(|v| *v > 0)
                .ok_or(ConfigError::InvalidNumber { name: "MAX_SESSIONS" })?;
        }

        if let Some(ips) = lookup("FORWARDED_ALLOW_IPS") {
            config.forwarded_allow_ips = ips.parse()?;
        }

        if let Some(format) = lookup("LOG_FORMAT") {
            config.log_format = format.parse()?;
        }

        Ok(config)
    }

    /// Apply command-line overrides on top of the environment.
    pub fn apply_cli(mut self, cli: &Cli) -> Result<Self, ConfigError> {
        if let Some(port) = cli.port {
            self.port = port;
            self.transport = Transport::Sse;
        }
        if let Some(transport) = cli.transport {
            self.transport = transport;
        }
        if let Some(host) = cli.host {
            self.host = host;
        }
        if let Some(path) = &cli.sse_path {
            self.sse_path = check_path("--sse-path", path.clone())?;
        }
        if let Some(path) = &cli.message_path {
            self.message_path = check_path("--message-path", path.clone())?;
        }
        if cli.stateless {
            self.stateless = true;
        }
        Ok(self)
    }

    pub fn bind_addr(&self) -> std::net::SocketAddr {
        std::net::SocketAddr::new(self.host, self.port)
    }
}

/// Command-line flags. Every flag is optional; unset flags fall back to
/// the environment.
#[derive(Debug, Default, Parser)]
#[command(name = "gti-mcp-server", version, about = "Google Threat Intelligence MCP server")]
pub struct Cli {
    /// Transport to serve MCP over.
    #[arg(long, value_enum)]
    pub transport: Option<Transport>,

    /// Address to bind the HTTP transport to.
    #[arg(long)]
    pub host: Option<IpAddr>,

    /// Port for the HTTP transport. Implies `--transport sse`.
    #[arg(long)]
    pub port: Option<u16>,

    /// Path of the SSE stream endpoint.
    #[arg(long)]
    pub sse_path: Option<String>,

    /// Path clients POST SSE session messages to.
    #[arg(long)]
    pub message_path: Option<String>,

    /// Serve streamable HTTP without session tracking.
    #[arg(long)]
    pub stateless: bool,
}

fn secs<F>(lookup: &F, name: &'static str, default: u64) -> Result<Duration, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(name) {
        Some(val) => val
            .trim()
            .parse::<u64>()
            .ok()
            .filter(|v| *v > 0)
            .map(Duration::from_secs)
            .ok_or(ConfigError::InvalidNumber { name }),
        None => Ok(Duration::from_secs(default)),
    }
}

fn parse_port(raw: &str) -> Result<u16, ConfigError> {
    raw.trim()
        .parse::<u16>()
        .map_err(|_| ConfigError::InvalidPort(raw.to_string()))
}

fn check_path(name: &'static str, value: String) -> Result<String, ConfigError> {
    if value.starts_with('/') {
        Ok(value)
    } else {
        Err(ConfigError::InvalidPath { name, value })
    }
}
