use anyhow::Context;

use calculaud_infra::{AppConfig, StuckPurposeRunner};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    calculaud_observability::init();

    let config = AppConfig::from_env().context("invalid configuration")?;
    let (app, services) = calculaud_api::app::build_app(&config).await?;

    let runner = config.stuck_scan_interval.map(|interval| {
        tracing::info!(interval_secs = interval.as_secs(), "starting stuck purpose runner");
        StuckPurposeRunner::new(interval, services.stuck_policy()).spawn(services.store())
    });

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;

    tracing::info!(
        addr = %listener.local_addr()?,
        environment = %config.environment,
        "listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Some(runner) = runner {
        runner.shutdown().await;
    }
    tracing::info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown signal received");
}
