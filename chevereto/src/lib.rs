pub mod api;
pub mod auth;
pub mod client;
pub mod config;
pub mod metrics_defs;
pub mod probe;
pub mod relay;
pub mod settings;

#[cfg(test)]
mod testutils;

use crate::api::AppState;
use crate::auth::StaticTokenAuthenticator;
use crate::config::{Config, Listener, ValidationError};
use crate::probe::Prober;
use crate::relay::Relay;
use config_store::StoreError;
use shared::admin_service::AdminService;
use shared::http::run_http_service;
use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::net::TcpListener;

#[derive(thiserror::Error, Debug)]
pub enum GatewayError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("could not open settings store: {0}")]
    Store(#[from] StoreError),
    #[error("could not build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
    #[error("invalid config: {0}")]
    Config(#[from] ValidationError),
}

/// Serves the Chevereto API and the admin endpoints until either listener
/// fails.
pub async fn run(config: Config) -> Result<(), GatewayError> {
    config.validate()?;
    if config.auth.tokens.is_empty() {
        tracing::warn!("No API tokens configured, every request will be rejected");
    }

    shared::metrics_defs::describe_all(metrics_defs::ALL_METRICS);

    let store = config_store::open(&config.store)?;
    let client = client::build_client(&config.upstream)?;

    let state = AppState {
        store: store.clone(),
        prober: Prober::new(client.clone(), config.upstream.probe_timeout()),
        relay: Relay::new(client, store, config.upstream.upload_timeout()),
        authenticator: Arc::new(StaticTokenAuthenticator::new(config.auth.tokens.clone())),
    };

    let ready = Arc::new(AtomicBool::new(false));
    let ready_flag = ready.clone();
    let admin_service = AdminService::new(move || ready_flag.load(Ordering::Relaxed));

    let api_task = serve_api(&config.listener, state, ready);
    let admin_task = run_http_service::<_, io::Error>(
        &config.admin_listener.host,
        config.admin_listener.port,
        admin_service,
    );

    tokio::try_join!(api_task, async { admin_task.await.map_err(GatewayError::from) })?;
    Ok(())
}

async fn serve_api(
    listener: &Listener,
    state: AppState,
    ready: Arc<AtomicBool>,
) -> Result<(), GatewayError> {
    let tcp = TcpListener::bind(format!("{}:{}", listener.host, listener.port)).await?;
    tracing::info!(host = %listener.host, port = listener.port, "Chevereto API listening");
    ready.store(true, Ordering::Relaxed);

    axum::serve(tcp, api::router(state)).await?;
    Ok(())
}
