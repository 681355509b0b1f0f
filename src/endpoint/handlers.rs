use std::sync::Arc;

use tracing::debug;
use warp::Rejection;
use warp::Reply;

use super::ApiError;
use super::DevicePage;
use super::DeviceQuery;
use crate::time::get_now_as_secs;
use crate::time::resolve_relative_time;
use crate::DeviceRecord;
use crate::DeviceRef;
use crate::DeviceRegistry;
use crate::DeviceView;
use crate::RegistryError;
use crate::RequestError;
use crate::Result;
use crate::TimeWorker;
use crate::HTTP_REQUESTS_METRIC;

const ALL_VIEWS_ROUTE: &str = "all_views";
const DEVICES_ROUTE: &str = "devices";
const LAST_TIME_ROUTE: &str = "last_time";

pub(super) async fn all_views(
    registry: Arc<DeviceRegistry>
) -> std::result::Result<impl Reply, Rejection> {
    let body = blocking(ALL_VIEWS_ROUTE, move || {
        let mut body = b"[".to_vec();
        for (i, view) in registry.views().iter().enumerate() {
            if i > 0 {
                body.push(b',');
            }
            view.serialize_summary(&mut body)?;
        }
        body.push(b']');
        Ok(body)
    })
    .await?;

    HTTP_REQUESTS_METRIC
        .with_label_values(&[ALL_VIEWS_ROUTE, "200"])
        .inc();
    Ok(warp::reply::with_header(body, "content-type", "application/json"))
}

pub(super) async fn devices(
    view_id: String,
    query: DeviceQuery,
    registry: Arc<DeviceRegistry>,
) -> std::result::Result<impl Reply, Rejection> {
    debug!(view = %view_id, ?query, "device request");

    let page = blocking(DEVICES_ROUTE, move || {
        let view = lookup(&registry, &view_id)?;
        let worker = query.into_worker(registry.max_page_size())?;
        let page = worker.search(view.snapshot_devices()?);

        Ok(DevicePage {
            records_total: page.total,
            records_filtered: page.filtered,
            data: records(&page.rows),
        })
    })
    .await?;

    Ok(ok_json(DEVICES_ROUTE, &page))
}

pub(super) async fn last_time(
    view_id: String,
    timestamp: String,
    registry: Arc<DeviceRegistry>,
) -> std::result::Result<impl Reply, Rejection> {
    let ts = timestamp
        .parse::<i64>()
        .map_err(|_| ApiError::reject(LAST_TIME_ROUTE, RequestError::InvalidTimestamp(timestamp)))?;
    let since = resolve_relative_time(ts, get_now_as_secs());

    let devices = blocking(LAST_TIME_ROUTE, move || {
        let view = lookup(&registry, &view_id)?;
        let devices = view.snapshot_and_work(&TimeWorker { since })?;
        Ok(records(&devices))
    })
    .await?;

    Ok(ok_json(LAST_TIME_ROUTE, &devices))
}

fn lookup(
    registry: &DeviceRegistry,
    view_id: &str,
) -> Result<Arc<DeviceView>> {
    registry
        .view(view_id)
        .ok_or_else(|| RegistryError::ViewNotFound(view_id.to_string()).into())
}

fn records(devices: &[DeviceRef]) -> Vec<DeviceRecord> {
    devices.iter().map(|d| d.record()).collect()
}

fn ok_json<T: serde::Serialize>(
    route: &'static str,
    body: &T,
) -> warp::reply::Json {
    HTTP_REQUESTS_METRIC.with_label_values(&[route, "200"]).inc();
    warp::reply::json(body)
}

/// Run view work on the blocking pool; view locks are waited on there.
async fn blocking<T, F>(
    route: &'static str,
    f: F,
) -> std::result::Result<T, Rejection>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    match tokio::task::spawn_blocking(f).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(ApiError::reject(route, e)),
        Err(e) => Err(ApiError::reject(route, e)),
    }
}
