// Path and File Name : /root/crate/gateway/src/main.rs
// Details of functionality of this file: process entry point. Loads configuration, initializes
// structured logging, bootstraps the Application, and serves the HTTP surface until shutdown.

use std::path::PathBuf;

use gateway::app::Application;
use gateway::config::Settings;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = Settings::from_env()?;

    tracing_subscriber::fmt()
        .json()
        .with_env_filter(EnvFilter::try_new(&settings.log_level).unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let rules_dir = std::env::var("RULES_DIR").map(PathBuf::from).unwrap_or_else(|_| PathBuf::from("./data/kb"));

    let app = Application::bootstrap(settings.clone(), rules_dir).await?;
    let router = gateway::http::router(app.clone());

    let addr = format!("{}:{}", settings.api_host, settings.api_port);
    tracing::info!(addr = %addr, "gateway_starting");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, router).await?;

    Ok(())
}
