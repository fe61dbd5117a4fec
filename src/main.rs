//! Food Analyser
//!
//! Serves food analysis over MCP (stdio) or HTTP.

use rmcp::ServiceExt;
use tokio::io::{stdin, stdout};
use tracing_subscriber::EnvFilter;

use food_analyser::api::AppState;
use food_analyser::build_info;
use food_analyser::config::{Settings, Transport};
use food_analyser::http;
use food_analyser::mcp::FoodAnalyserService;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging (output to stderr to not interfere with MCP stdio)
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("food_analyser=info".parse()?))
        .with_writer(std::io::stderr)
        .init();

    let settings = Settings::from_env()?;

    // Print startup banner to stderr
    build_info::print_startup_banner(settings.transport.as_str());
    eprintln!("Staging directory: {}", settings.staging_dir.display());
    eprintln!(
        "Density source: {} | Volume routines: {}",
        settings.density_source.as_str(),
        settings
            .volume_methods
            .iter()
            .map(|m| m.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    );
    if settings.fdc_api_key.is_empty() {
        tracing::warn!("FOOD_ANALYSER_FDC_API_KEY is not set; nutrient lookups will be rejected");
    }

    // Ensure staging directory exists
    std::fs::create_dir_all(&settings.staging_dir)?;

    let state = AppState::from_settings(&settings)?;

    match settings.transport {
        Transport::Mcp => {
            eprintln!("Starting MCP server on stdio...");
            let service = FoodAnalyserService::new(state);

            // Create stdio transport
            let transport = (stdin(), stdout());

            // Start the MCP server
            let server = service.serve(transport).await?;

            // Wait for the server to complete
            server.waiting().await?;
        }
        Transport::Http => {
            http::serve(state, &settings.bind_addr).await?;
        }
    }

    Ok(())
}
