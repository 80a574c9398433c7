use std::sync::Arc;

use breach_verifier::BreachIndex;
use clap::Parser;
use passcheck_server::{AppState, Config, ServerError, serve, spawn_reloader};
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), ServerError> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = Config::parse();
    let index_dir = config.index_dir();
    info!(index_dir = %index_dir.display(), "opening breach index");

    let index = tokio::task::spawn_blocking(move || BreachIndex::open(index_dir))
        .await
        .map_err(|e| ServerError::Index(e.into()))??;

    let state = Arc::new(AppState { index, cors: config.cors() });
    if let Some(every) = config.reload_interval() {
        spawn_reloader(Arc::clone(&state), every);
    }

    let listener = TcpListener::bind(config.bind)
        .await
        .map_err(|source| ServerError::Bind { addr: config.bind, source })?;

    serve(listener, state, async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    })
    .await
}
