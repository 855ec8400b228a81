#![deny(warnings)]
#![deny(clippy::unwrap_used)]

use std::sync::Arc;

use dotenv::dotenv;
use poem::{EndpointExt, Route, Server, listener::TcpListener, middleware::Tracing};
use poem_mcpserver::{McpServer, streamable_http};
use ssh_fleet_mcp::mcp::{Fleet, FleetConfig, McpFleetCommands};
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive("info".parse()?),
        )
        .init();

    let config = FleetConfig::from_env();
    info!("Using host registry {}", config.store_path.display());
    let fleet = Arc::new(Fleet::from_config(&config)?);

    let mcp_port: u16 = std::env::var("MCP_PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(8000);
    let mcp_addr = format!("0.0.0.0:{}", mcp_port);
    info!("Starting MCP server on {}", mcp_addr);

    let tools_fleet = Arc::clone(&fleet);
    let app = Route::new()
        .at(
            "/",
            streamable_http::endpoint(move |_| {
                McpServer::new().tools(McpFleetCommands::new(Arc::clone(&tools_fleet)))
            }),
        )
        .with(Tracing);

    info!("MCP fleet server is ready");

    let shutdown_fleet = Arc::clone(&fleet);
    Server::new(TcpListener::bind(mcp_addr))
        .name("SSH Fleet MCP Server")
        .run_with_graceful_shutdown(
            app,
            async move {
                let _ = tokio::signal::ctrl_c().await;
                info!("Shutting down, cancelling in-flight dispatches");
                shutdown_fleet.shutdown();
            },
            None,
        )
        .await?;

    Ok(())
}
