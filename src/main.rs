use clap::Parser;

use gti_mcp_server::config::{Cli, ServerConfig};
use gti_mcp_server::logging;
use gti_mcp_server::server::McpServer;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match ServerConfig::from_env().and_then(|c| c.apply_cli(&cli)) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("gti-mcp-server: configuration error: {e}");
            std::process::exit(1);
        }
    };

    logging::init(config.log_format);

    let server = McpServer::new(config);
    if let Err(e) = server.run().await {
        tracing::error!(error = %e, "fatal error");
        std::process::exit(1);
    }
}
