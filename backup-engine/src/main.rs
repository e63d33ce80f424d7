use backup_engine::config::AppConfig;
use backup_engine::db::connection::{close_pool, create_pool};
use backup_engine::db::migrate::migrate;
use backup_engine::services::scheduler::BackupScheduler;
use backup_engine::state::AppState;
use std::sync::Arc;
use tokio::signal;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::from_env();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level)),
        )
        .init();

    tracing::info!(data_dir = %config.data_dir.display(), "Starting backup engine");

    // Initialize database
    std::fs::create_dir_all(&config.data_dir)?;
    let db_path = config.db_path.to_string_lossy().to_string();
    let pool = create_pool(&db_path)?;
    migrate(&pool, &config.data_dir)?;

    // Build application state
    let state = Arc::new(AppState::new(pool, config));

    // Activate stored schedules and start the timer loop
    let scheduler = BackupScheduler::new(state.clone()).await?;
    if let Err(e) = scheduler.init_schedules().await {
        tracing::warn!("Failed to initialize schedules: {}", e);
    }
    scheduler.start().await?;

    shutdown_signal().await;

    // Stop in-flight runs between files, then stop the timers
    tracing::info!("Shutting down...");
    state.shutdown.cancel();
    if let Err(e) = scheduler.shutdown().await {
        tracing::warn!("Scheduler shutdown error: {}", e);
    }

    close_pool(&state.db);
    tracing::info!("Backup engine stopped");

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to listen for ctrl+c");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to listen for SIGTERM")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received SIGINT"),
        _ = terminate => tracing::info!("Received SIGTERM"),
    }
}
