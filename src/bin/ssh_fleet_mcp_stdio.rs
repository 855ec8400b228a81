#![deny(warnings)]
#![deny(clippy::unwrap_used)]

use std::sync::Arc;

use dotenv::dotenv;
use poem_mcpserver::McpServer;
use ssh_fleet_mcp::mcp::{Fleet, FleetConfig, McpFleetCommands};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();

    // stdout carries the protocol, so logs go to stderr
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive("info".parse()?),
        )
        .init();

    let fleet = Arc::new(Fleet::from_config(&FleetConfig::from_env())?);

    poem_mcpserver::stdio::stdio(McpServer::new().tools(McpFleetCommands::new(Arc::clone(&fleet))))
        .await?;

    fleet.shutdown();
    Ok(())
}
