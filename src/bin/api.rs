use finance_assistant::api::{start_server, AdminSettings};
use finance_assistant::{Assistant, AssistantConfig};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables
    dotenv::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = AssistantConfig::from_env()?;
    if config.gemini_api_key.is_empty() {
        warn!("GEMINI_API_KEY not set; answers will fall back to an apology");
    }

    info!("Finance Assistant - API Server");
    info!(port = config.port, embedding = ?config.embedding_backend, "Configuration loaded");

    let assistant = Arc::new(Assistant::from_config(&config).await?);
    let _sweeper = assistant
        .sessions()
        .clone()
        .spawn_sweeper(config.session_sweep_interval);

    info!("Assistant initialized, starting API server");

    start_server(assistant, config.port, AdminSettings::from_config(&config)).await?;

    Ok(())
}
