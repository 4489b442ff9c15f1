use anyhow::Result;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;

use crate::core::config::DocpackConfig;
use crate::core::lifecycle::LifecycleManager;
use crate::core::relay::{RelaySettings, RunpodClient, StreamRelay};
use crate::core::terminal::{self, GuideSection};
use crate::interfaces::web::{ApiServer, ApiServerConfig};

/// Builds the relay when upstream credentials are present. Without them the
/// server still starts, and stream requests answer 500.
fn build_relay(config: &DocpackConfig) -> Option<StreamRelay> {
    match config.upstream_credentials() {
        Ok(credentials) => {
            let source = Arc::new(RunpodClient::new(credentials));
            Some(StreamRelay::new(source, RelaySettings::from(&config.polling)))
        }
        Err(e) => {
            terminal::print_warn(&format!(
                "{}. Set RUNPOD_API_KEY and RUNPOD_ENDPOINT_ID.",
                e
            ));
            None
        }
    }
}

pub async fn run_serve(config: &DocpackConfig, api_host: String, api_port: u16) -> Result<()> {
    let relay = build_relay(config);
    if let Some(relay) = &relay {
        let settings = relay.settings();
        info!(
            "Relay polls every {:?}, at most {} times per job",
            settings.poll_interval, settings.max_polls
        );
    }

    let mut lifecycle = LifecycleManager::new();
    lifecycle.attach(Arc::new(Mutex::new(ApiServer::new(ApiServerConfig {
        relay,
        api_host: api_host.clone(),
        api_port,
    }))));
    lifecycle.start().await?;

    GuideSection::new("docpack server")
        .command("Stream", &format!("http://{}:{}/api/docpack/stream/{{job_id}}", api_host, api_port))
        .command("Health", &format!("http://{}:{}/api/health", api_host, api_port))
        .blank()
        .text("Press Ctrl+C to stop.")
        .print();
    println!();

    tokio::signal::ctrl_c().await?;
    info!("Shutting down docpack server...");
    lifecycle.shutdown().await?;
    terminal::print_success("Server stopped");
    Ok(())
}
