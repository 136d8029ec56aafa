use tracing::info;

use crate::config::{ServerConfig, Transport};
use crate::transport::{http, stdio};

/// MCP server bound to the transport its configuration selects.
pub struct McpServer {
    config: ServerConfig,
}

impl McpServer {
    pub fn new(config: ServerConfig) -> Self {
        Self { config }
    }

    pub async fn run(self) -> Result<(), Box<dyn std::error::Error>> {
        if self.config.api_key.is_none() {
            info!("VT_APIKEY is not set; tool calls will fail until it is provided");
        }

        match self.config.transport {
            Transport::Stdio => {
                info!("running in local mode with stdio transport");
                stdio::serve(tokio::io::stdin(), tokio::io::stdout(), &self.config).await?;
            }
            Transport::Sse => {
                info!(addr = %self.config.bind_addr(), "running in HTTP mode with SSE transport");
                http::serve(self.config).await?;
            }
        }
        Ok(())
    }
}
