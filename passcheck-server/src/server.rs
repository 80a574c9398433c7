use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::error::ServerError;
use crate::http::{AppState, route};

/// Accepts connections until `shutdown` resolves. Each connection is served
/// on its own task.
pub async fn serve<F>(listener: TcpListener, state: Arc<AppState>, shutdown: F) -> Result<(), ServerError>
where
    F: Future<Output = ()>,
{
    tokio::pin!(shutdown);
    info!(addr = %listener.local_addr()?, "listening");

    loop {
        let accepted = tokio::select! {
            accepted = listener.accept() => accepted,
            () = &mut shutdown => {
                info!("shutting down");
                return Ok(());
            }
        };

        let (stream, remote) = match accepted {
            Ok(conn) => conn,
            Err(e) => {
                // usually fd exhaustion; back off instead of spinning
                warn!(error = %e, "failed to accept connection");
                tokio::time::sleep(Duration::from_millis(100)).await;
                continue;
            }
        };

        let state = Arc::clone(&state);
        tokio::spawn(async move {
            let service = service_fn(move |req| route(Arc::clone(&state), req));
            if let Err(e) = http1::Builder::new().serve_connection(TokioIo::new(stream), service).await {
                debug!(%remote, error = %e, "connection closed with error");
            }
        });
    }
}

/// Periodically re-reads `CURRENT` so a newly committed breach set is picked
/// up without a restart. A failed reload keeps the current generation.
pub fn spawn_reloader(state: Arc<AppState>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;

        loop {
            ticker.tick().await;
            let state = Arc::clone(&state);
            match tokio::task::spawn_blocking(move || state.index.reload()).await {
                Ok(Ok(_)) => {}
                Ok(Err(e)) => warn!(error = %e, "reload failed, keeping current breach set"),
                Err(e) => error!(error = %e, "reload task failed"),
            }
        }
    })
}
