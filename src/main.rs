use tracing::info;

use bookd::Config;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let config = Config::from_env();
    bookd::observability::init(config.metrics_port);

    let engine = bookd::open(&config)?;
    info!("bookd started");
    info!("  data_dir: {}", config.data_dir.display());
    info!("  compact_threshold: {}", config.compact_threshold);
    info!(
        "  metrics: {}",
        config
            .metrics_port
            .map_or("disabled".to_string(), |p| format!(
                "http://0.0.0.0:{p}/metrics"
            ))
    );

    // Run until SIGTERM/ctrl-c, then compact so the next start replays a
    // minimal log.
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to register SIGTERM handler");
        tokio::select! {
            _ = ctrl_c => {},
            _ = sigterm.recv() => {},
        }
    }
    #[cfg(not(unix))]
    ctrl_c.await?;

    info!("shutting down, compacting WAL");
    if let Err(e) = engine.compact_wal().await {
        tracing::warn!("shutdown compaction failed: {e}");
    }
    Ok(())
}
