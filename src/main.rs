use std::sync::Arc;
use std::time::Duration;

use devtracker::register_custom_metrics;
use devtracker::time::get_now_as_secs;
use devtracker::DeviceHistory;
use devtracker::DeviceRegistry;
use devtracker::DevtrackerConfig;
use devtracker::Error;
use devtracker::Result;
use devtracker::SledBackend;
use devtracker::REGISTRY;
use tokio::signal::unix::signal;
use tokio::signal::unix::SignalKind;
use tokio::sync::watch;
use tracing::error;
use tracing::info;
use tracing::warn;
use tracing_subscriber::EnvFilter;

#[tokio::main(flavor = "multi_thread", worker_threads = 2)]
async fn main() -> Result<()> {
    let settings = DevtrackerConfig::new()?.validate()?;

    // Initializing Logs
    init_observability();
    info!(?settings, "configuration loaded");

    // Metrics are served on `/metrics` of the device endpoints and, when
    // enabled, on a dedicated prometheus port
    if let Err(e) = autometrics::prometheus_exporter::try_init() {
        warn!("autometrics exporter already initialized: {}", e);
    }
    if let Err(e) = register_custom_metrics(&REGISTRY) {
        error!("could not register custom metrics: {}", e);
    }

    // Storage and registry
    let backend = Arc::new(SledBackend::open(&settings.storage.db_path)?);
    let history = DeviceHistory::new(backend)?;

    let mut registry = DeviceRegistry::new(settings.views.clone());
    if settings.storage.archive_on_purge {
        registry = registry.with_history(history.clone());
    }
    let registry = Arc::new(registry);
    registry.register_default_views()?;

    let idle_timeout = settings.storage.idle_timeout_secs as i64;
    registry.hydrate(&history, get_now_as_secs() - idle_timeout)?;

    // Initializing Shutdown Signal
    let (graceful_tx, graceful_rx) = watch::channel(());

    if settings.monitoring.prometheus_enabled {
        tokio::spawn(devtracker::start_server(
            settings.monitoring.prometheus_port,
            graceful_rx.clone(),
        ));
    }

    let purge = tokio::spawn(purge_idle_devices(
        registry.clone(),
        Duration::from_secs(settings.storage.purge_interval_secs),
        idle_timeout,
        graceful_rx.clone(),
    ));

    // Listen on Shutdown Signal
    tokio::spawn(async {
        if let Err(e) = graceful_shutdown(graceful_tx).await {
            error!("Failed to shutdown: {:?}", e);
        }
    });

    info!("Application started. Waiting for CTRL+C signal...");
    let addr = settings.http.socket_addr()?;
    if let Err(e) = devtracker::serve(registry.clone(), addr, graceful_rx).await {
        error!("device endpoints stopped: {:?}", e);
    }

    if let Err(e) = purge.await {
        error!("purge task failed: {:?}", e);
    }
    registry.shutdown()?;

    info!("Exiting program.");
    Ok(())
}

/// Periodically age out devices idle for longer than `idle_timeout` seconds
async fn purge_idle_devices(
    registry: Arc<DeviceRegistry>,
    every: Duration,
    idle_timeout: i64,
    mut shutdown_signal: watch::Receiver<()>,
) {
    let mut ticker = tokio::time::interval(every);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let registry = registry.clone();
                let cutoff = get_now_as_secs() - idle_timeout;
                match tokio::task::spawn_blocking(move || registry.purge_idle(cutoff)).await {
                    Ok(Ok(_)) => {}
                    Ok(Err(e)) => warn!("purge of idle devices failed: {}", e),
                    Err(e) => error!("purge task panicked: {}", e),
                }
            }
            _ = shutdown_signal.changed() => {
                info!("purge loop stopped");
                return;
            }
        }
    }
}

async fn graceful_shutdown(graceful_tx: watch::Sender<()>) -> Result<()> {
    let mut sigint = signal(SignalKind::interrupt()).map_err(|e| Error::Fatal(e.to_string()))?;
    let mut sigterm = signal(SignalKind::terminate()).map_err(|e| Error::Fatal(e.to_string()))?;
    tokio::select! {
        _ = sigint.recv() => {
            info!("SIGINT detected.");
        },
        _ = sigterm.recv() => {
            info!("SIGTERM detected.");
        },
    }

    graceful_tx.send(()).map_err(|e| {
        error!("Failed to send shutdown signal: {}", e);
        Error::Fatal(format!("Failed to send shutdown signal: {}", e))
    })?;

    info!("Shutdown signal sent");
    Ok(())
}

fn init_observability() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
}
