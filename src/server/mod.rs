//! HTTP surface: webhook ingress plus read-only inspection routes.
//!
//! | Route              | Method | Purpose                              |
//! |--------------------|--------|--------------------------------------|
//! | `/webhooks`        | POST   | GitHub webhook deliveries            |
//! | `/github`          | POST   | same, legacy path                    |
//! | `/api/servers`     | GET    | active staging instances             |
//! | `/api/disk-space`  | GET    | root volume usage in KiB             |
//! | `/health`          | GET    | liveness                             |

pub mod api;
pub mod webhook;

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::Router;
use axum::routing::{get, post};
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::config::{Config, StagingSettings};
use crate::dispatcher::{DispatchHandle, Dispatcher, EventHandler};
use crate::notify::{Notifiers, SlackClient};
use crate::runner::{self, CommandRunner};

pub struct AppState {
    pub dispatch: DispatchHandle,
    pub webhook_secret: String,
    pub settings: Arc<StagingSettings>,
    pub runner: Arc<dyn CommandRunner>,
    /// Where rejected deliveries are announced, if anywhere.
    pub alerts: Option<SlackClient>,
}

pub type SharedState = Arc<AppState>;

pub fn build_router(state: SharedState) -> Router {
    Router::new()
        .route("/webhooks", post(webhook::receive))
        .route("/github", post(webhook::receive))
        .route("/api/servers", get(api::list_servers))
        .route("/api/disk-space", get(api::disk_space))
        .route("/health", get(api::health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Run the webhook server until Ctrl-C, then drain the dispatcher.
pub async fn start_server(config: Config) -> Result<()> {
    let webhook_secret = config.webhook_secret()?.to_string();
    let settings = Arc::new(config.staging.clone());
    let runner = runner::from_config(&config);
    let notifiers = Notifiers::from_config(&config).context("Failed to set up notifications")?;

    let alerts = notifiers.slack().cloned();
    let handler = EventHandler::new(settings.clone(), runner.clone(), Arc::new(notifiers));
    let dispatcher = Dispatcher::start(Arc::new(handler), config.server.queue_capacity);

    let state = Arc::new(AppState {
        dispatch: dispatcher.handle(),
        webhook_secret,
        settings,
        runner,
        alerts,
    });
    let app = build_router(state);

    let addr = format!("{}:{}", config.server.bind, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;
    let local_addr = listener.local_addr()?;
    info!(%local_addr, remote = config.remote.is_some(), "stagebot listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("HTTP server stopped, waiting for in-flight events");
    dispatcher.shutdown().await;
    info!("Shut down gracefully");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for Ctrl-C: {}", err);
        std::future::pending::<()>().await;
    }
    info!("Shutting down...");
}
