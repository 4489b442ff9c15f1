pub(crate) mod auth;
mod handlers;
mod router;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::core::lifecycle::LifecycleComponent;
use crate::core::relay::StreamRelay;

pub use router::build_api_router;

pub struct ApiServerConfig {
    /// `None` when upstream credentials are missing; stream requests then fail with 500.
    pub relay: Option<StreamRelay>,
    pub api_host: String,
    pub api_port: u16,
}

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) relay: Option<StreamRelay>,
    pub(crate) api_port: u16,
}

pub struct ApiServer {
    relay: Option<StreamRelay>,
    api_host: String,
    api_port: u16,
    handle: Option<JoinHandle<()>>,
}

impl ApiServer {
    pub fn new(config: ApiServerConfig) -> Self {
        Self {
            relay: config.relay,
            api_host: config.api_host,
            api_port: config.api_port,
            handle: None,
        }
    }

    fn addr(&self) -> String {
        format!("{}:{}", self.api_host, self.api_port)
    }
}

#[async_trait]
impl LifecycleComponent for ApiServer {
    async fn on_init(&mut self) -> Result<()> {
        info!("API Server Interface initializing...");
        if self.relay.is_none() {
            warn!("RunPod credentials not configured; stream requests will be rejected");
        }
        Ok(())
    }

    async fn on_start(&mut self) -> Result<()> {
        let addr = self.addr();
        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .with_context(|| format!("Failed to bind API server on {}", addr))?;
        let app = router::build_api_router(AppState {
            relay: self.relay.clone(),
            api_port: self.api_port,
        });

        info!("API Server running at http://{addr}");
        self.handle = Some(tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                tracing::error!("API Server crashed: {}", e);
            }
        }));
        Ok(())
    }

    async fn on_shutdown(&mut self) -> Result<()> {
        info!("API Server Interface shutting down...");
        if let Some(handle) = self.handle.take() {
            // Open streams are dropped with the server task, which cancels their relays.
            handle.abort();
        }
        Ok(())
    }
}
