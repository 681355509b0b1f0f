
use autometrics::prometheus_exporter;
use lazy_static::lazy_static;
use prometheus::IntCounterVec;
use prometheus::IntGaugeVec;
use prometheus::Opts;
use prometheus::Registry;
use tokio::sync::watch;
use tracing::error;
use tracing::info;
use warp::Filter;
use warp::Rejection;
use warp::Reply;

lazy_static! {
    pub static ref VIEW_SIZE_METRIC: IntGaugeVec =
        IntGaugeVec::new(Opts::new("view_size", "Number of devices in a view"), &["view"])
            .expect("metric can not be created");

    pub static ref VIEW_MUTATIONS_METRIC: IntCounterVec = IntCounterVec::new(
        Opts::new("view_mutations", "Membership changes applied to a view"),
        &["view", "op"]
    )
    .expect("metric can not be created");

    pub static ref VIEW_LOCK_TIMEOUTS_METRIC: IntCounterVec = IntCounterVec::new(
        Opts::new("view_lock_timeouts", "Lock acquisitions on a view that timed out"),
        &["view"]
    )
    .expect("metric can not be created");

    pub static ref TRACKED_DEVICES_METRIC: IntGaugeVec = IntGaugeVec::new(
        Opts::new("tracked_devices", "Devices currently held by the registry"),
        &["registry"]
    )
    .expect("metric can not be created");

    pub static ref HTTP_REQUESTS_METRIC: IntCounterVec = IntCounterVec::new(
        Opts::new("http_requests", "Device endpoint requests by route and status"),
        &["route", "status"]
    )
    .expect("metric can not be created");

    pub static ref REGISTRY: Registry = Registry::new();
}

pub fn register_custom_metrics(registry: &Registry) -> prometheus::Result<()> {
    registry.register(Box::new(VIEW_SIZE_METRIC.clone()))?;
    registry.register(Box::new(VIEW_MUTATIONS_METRIC.clone()))?;
    registry.register(Box::new(VIEW_LOCK_TIMEOUTS_METRIC.clone()))?;
    registry.register(Box::new(TRACKED_DEVICES_METRIC.clone()))?;
    registry.register(Box::new(HTTP_REQUESTS_METRIC.clone()))?;
    Ok(())
}

/// `GET /metrics`
pub fn metrics_route() -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
    warp::path!("metrics").and(warp::get()).and_then(metrics_handler)
}

/// Serve `/metrics` on a dedicated port. Call `register_custom_metrics` first.
pub async fn start_server(
    port: u16,
    mut shutdown_signal: watch::Receiver<()>,
) {
    info!(port, "metrics server listening");
    let (_, server) =
        warp::serve(metrics_route()).bind_with_graceful_shutdown(([0, 0, 0, 0], port), async move {
            let _ = shutdown_signal.changed().await;
        });
    server.await;
}

async fn metrics_handler() -> Result<impl Reply, Rejection> {
    let mut res = encode_registry(&REGISTRY);
    res.push_str(&get_metrics_body());
    Ok(res)
}

pub(crate) fn encode_registry(registry: &Registry) -> String {
    use prometheus::Encoder;
    let encoder = prometheus::TextEncoder::new();

    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&registry.gather(), &mut buffer) {
        error!("could not encode custom metrics: {}", e);
    };
    match String::from_utf8(buffer) {
        Ok(v) => v,
        Err(e) => {
            error!("custom metrics could not be from_utf8'd: {}", e);
            String::default()
        }
    }
}

/// Export autometrics function metrics for Prometheus to scrape
pub fn get_metrics_body() -> String {
    prometheus_exporter::encode_http_response().into_body()
}
