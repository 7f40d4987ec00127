use litcircle::telemetry;

use tracing_subscriber::EnvFilter;

const DEFAULT_PORT: u16 = 8080;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let mut state = litcircle::initialize_state().await?;

    // `litcircle sweep-expired-tokens` runs the token expiry sweep once
    // and exits; meant to be driven by cron.
    if std::env::args().nth(1).as_deref() == Some("sweep-expired-tokens") {
        let removed = litcircle::sweep_expired_tokens(&state).await?;
        tracing::info!(removed, "expired refresh tokens swept");
        return Ok(());
    }

    match telemetry::setup_metrics_recorder() {
        Ok(handle) => state.metrics = Some(handle),
        Err(err) => {
            tracing::warn!(error = %err, "metrics recorder not installed")
        },
    }

    let port = state.config.port.unwrap_or(DEFAULT_PORT);
    let listener =
        tokio::net::TcpListener::bind(("0.0.0.0", port)).await?;
    tracing::info!(%port, "server started");

    axum::serve(listener, litcircle::app(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "cannot listen for shutdown signal");
    }
}
