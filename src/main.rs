use anyhow::Result;
use pingboard::*;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::time::FormatTime;

struct LocalTimer;

impl FormatTime for LocalTimer {
    fn format_time(&self, w: &mut tracing_subscriber::fmt::format::Writer<'_>) -> std::fmt::Result {
        write!(
            w,
            "{}",
            chrono::Local::now().format("%Y-%m-%dT%H:%M:%S%.3f%:z")
        )
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_timer(LocalTimer)
        .with_env_filter(filter)
        .init();

    let app_config = config::AppConfig::load()?;
    let data_dir = app_config.data_dir();
    let order = app_config.target_order();
    let targets: Arc<[models::Target]> = app_config.targets().into();
    tracing::info!(
        data_dir = %data_dir.display(),
        oldest_history = app_config.history.oldest_history,
        targets = targets.len(),
        "starting"
    );

    let mut series = series::Series::new(app_config.history.oldest_history);
    warm_start::load(
        &mut series,
        &order,
        &data_dir,
        chrono::Local::now().date_naive(),
    );

    let data_log = data_log::DataLog::open(&data_dir, chrono::Local::now())?;
    let (publisher, snapshots) =
        publisher::IndexPublisher::new(&data_dir, app_config.render.slow_threshold_ms);
    let index_path = publisher.path().to_path_buf();

    let (results_tx, results_rx) = mpsc::unbounded_channel();
    let mut aggregator_handle = aggregator::spawn(
        aggregator::Aggregator::new(series, order, data_log, publisher),
        results_rx,
    );

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();
    let runner = Arc::new(probe::ConnectivityProbe::new(
        app_config.probe.check_url.clone(),
        Duration::from_secs(app_config.probe.connect_timeout_secs),
        Duration::from_secs(app_config.probe.response_timeout_secs),
    ));
    let scheduler_handle = scheduler::spawn(
        scheduler::SchedulerDeps {
            targets,
            runner,
            results_tx,
            shutdown_rx,
        },
        app_config.scheduler_config(),
    );

    let app = routes::app(index_path, snapshots);
    let addr = format!("{}:{}", app_config.server.host, app_config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Listening on http://{}", addr);

    tokio::select! {
        result = axum::serve(listener, app) => {
            result?;
        }
        result = &mut aggregator_handle => {
            // The aggregator only stops on its own when the data log failed.
            result??;
            anyhow::bail!("aggregator stopped unexpectedly");
        }
        _ = shutdown_signal() => {
            tracing::info!("Received shutdown signal");
            let _ = shutdown_tx.send(());
            let _ = scheduler_handle.await;
            // In-flight probes still hold senders; give them a bounded window to land.
            match tokio::time::timeout(Duration::from_secs(60), &mut aggregator_handle).await {
                Ok(result) => result??,
                Err(_) => tracing::warn!("in-flight probes still running; exiting without them"),
            }
        }
    }

    Ok(())
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        let mut sigterm = match tokio::signal::unix::signal(
            tokio::signal::unix::SignalKind::terminate(),
        ) {
            Ok(s) => s,
            Err(_) => {
                let _ = tokio::signal::ctrl_c().await;
                return;
            }
        };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
