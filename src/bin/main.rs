use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;

use price_oracle::alerts::AlertManager;
use price_oracle::api::{self, AppState};
use price_oracle::cli::{AlertsCommands, Cli, Commands, ForecastCommands};
use price_oracle::config::Config;
use price_oracle::engine::Engine;
use price_oracle::scheduler::CronScheduler;
use price_oracle::storage::{DatabasePool, Repositories};
use price_oracle::ws::WsGateway;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse_args();
    let config = Config::load(cli.config.as_deref()).context("failed to load configuration")?;

    price_oracle::init(&config).context("failed to initialize logging and metrics")?;

    match cli.command {
        Commands::Serve => serve(config).await,
        Commands::Crawl { once } => crawl(config, once).await,
        Commands::Alerts { command } => match command {
            AlertsCommands::Check => check_alerts(config).await,
        },
        Commands::Forecast { command } => match command {
            ForecastCommands::Generate => generate_forecasts(config).await,
        },
        Commands::Migrate => migrate(config).await,
    }
}

async fn build_engine(config: &Config) -> Result<(Arc<Engine>, Arc<WsGateway>, DatabasePool)> {
    let pool = DatabasePool::new(&config.database.to_database_config())
        .await
        .context("failed to connect to database")?;
    let repos = Repositories::from_sqlite_pool(&pool)?;

    let ws_gateway = Arc::new(WsGateway::new());
    let engine = Arc::new(Engine::new(repos, None, ws_gateway.clone(), config.smtp.clone()));

    Ok((engine, ws_gateway, pool))
}

async fn serve(config: Config) -> Result<()> {
    let (engine, ws_gateway, pool) = build_engine(&config).await?;

    let alert_manager = Arc::new(AlertManager::new(
        engine.repositories().alerts.clone(),
        engine.repositories().alert_triggers.clone(),
    ));

    let scheduler = Arc::new(CronScheduler::new(engine.clone(), &config.schedules)?);
    let shutdown_tx = scheduler.shutdown_handle();
    let scheduler_handle = tokio::spawn(scheduler.run());

    let state = Arc::new(AppState::new(engine, alert_manager, ws_gateway.clone()));
    let app = api::create_routes(state);

    let addr = format!("{}:{}", config.api.bind, config.api.port);
    info!(%addr, "starting api server");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(wait_for_shutdown_signal())
        .await
        .context("api server failed")?;

    info!("shutdown signal received, stopping scheduler and websocket connections");
    let _ = shutdown_tx.send(());
    let _ = scheduler_handle.await;
    ws_gateway.shutdown().await;
    pool.close().await;

    Ok(())
}

/// Waits for Ctrl+C (or, on Unix, SIGTERM) so the caller can drive a clean
/// shutdown sequence instead of axum dropping connections mid-request.
async fn wait_for_shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

async fn crawl(config: Config, once: bool) -> Result<()> {
    let (engine, _ws_gateway, _pool) = build_engine(&config).await?;

    if once {
        let result = engine.run_crawl_cycle().await;
        info!(
            providers_checked = result.providers_checked,
            new_rates = result.new_rates,
            errors = result.errors.len(),
            "crawl cycle complete"
        );
        for err in &result.errors {
            tracing::warn!(%err, "crawler error");
        }
        return Ok(());
    }

    let scheduler = Arc::new(CronScheduler::new(engine, &config.schedules)?);
    scheduler.run().await;
    Ok(())
}

async fn check_alerts(config: Config) -> Result<()> {
    let (engine, _ws_gateway, _pool) = build_engine(&config).await?;
    let report = engine.check_price_alerts().await?;
    info!(
        checked_alerts = report.checked_alerts,
        triggered_alerts = report.triggered_alerts,
        "alert check complete"
    );
    Ok(())
}

async fn generate_forecasts(config: Config) -> Result<()> {
    let (engine, _ws_gateway, _pool) = build_engine(&config).await?;
    let report = engine.generate_all_forecasts().await?;
    info!(
        skills_attempted = report.skills_attempted,
        skills_forecasted = report.skills_forecasted,
        points_written = report.points_written,
        errors = report.errors.len(),
        "forecast run complete"
    );
    for err in &report.errors {
        tracing::warn!(%err, "forecast generation error");
    }
    Ok(())
}

async fn migrate(config: Config) -> Result<()> {
    let pool = DatabasePool::new(&config.database.to_database_config())
        .await
        .context("failed to connect to database")?;
    pool.run_migrations().await?;
    info!("migrations applied");
    Ok(())
}
