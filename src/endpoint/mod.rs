//! HTTP adapters over the view layer.
//!
//! | route | reply |
//! |-------|-------|
//! | `GET /devices/views/all_views.json` | every registered view's summary |
//! | `GET\|POST /devices/view/{id}/devices.json` | one search/sort/page request |
//! | `GET /devices/view/{id}/last-time/{ts}/devices.json` | devices seen since `ts` |
//! | `GET /metrics` | prometheus exposition |
//!
//! View work never runs on the async executor: handlers move it onto the
//! blocking pool, where view locks may be waited on.

mod handlers;
mod rejection;
mod request;


pub use rejection::*;
pub use request::*;

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::sync::watch;
use tracing::info;
use warp::Filter;
use warp::Reply;

use crate::metrics_route;
use crate::DeviceRegistry;
use crate::Error;
use crate::Result;

/// Every device route plus `/metrics`, with rejections rendered as JSON
pub fn routes(
    registry: Arc<DeviceRegistry>
) -> impl Filter<Extract = (impl Reply,), Error = Infallible> + Clone {
    let all_views = warp::path!("devices" / "views" / "all_views.json")
        .and(warp::get())
        .and(with_registry(registry.clone()))
        .and_then(handlers::all_views);

    let devices_get = warp::path!("devices" / "view" / String / "devices.json")
        .and(warp::get())
        .and(warp::query::<DeviceQuery>())
        .and(with_registry(registry.clone()))
        .and_then(handlers::devices);

    let devices_post = warp::path!("devices" / "view" / String / "devices.json")
        .and(warp::post())
        .and(warp::body::content_length_limit(MAX_BODY_BYTES))
        .and(warp::body::json::<DeviceQuery>())
        .and(with_registry(registry.clone()))
        .and_then(handlers::devices);

    let last_time = warp::path!("devices" / "view" / String / "last-time" / String / "devices.json")
        .and(warp::get())
        .and(with_registry(registry))
        .and_then(handlers::last_time);

    all_views
        .or(devices_get)
        .or(devices_post)
        .or(last_time)
        .or(metrics_route())
        .recover(handle_rejection)
}

/// Serve [`routes`] on `addr` until `shutdown_signal` fires
pub async fn serve(
    registry: Arc<DeviceRegistry>,
    addr: SocketAddr,
    mut shutdown_signal: watch::Receiver<()>,
) -> Result<()> {
    let (bound, server) = warp::serve(routes(registry))
        .try_bind_with_graceful_shutdown(addr, async move {
            let _ = shutdown_signal.changed().await;
        })
        .map_err(|e| Error::Fatal(format!("could not bind {addr}: {e}")))?;

    info!(addr = %bound, "device endpoints listening");
    server.await;
    info!("device endpoints stopped");
    Ok(())
}

fn with_registry(
    registry: Arc<DeviceRegistry>
) -> impl Filter<Extract = (Arc<DeviceRegistry>,), Error = Infallible> + Clone {
    warp::any().map(move || registry.clone())
}

/// Keeps request bodies small; a device query is a handful of fields
const MAX_BODY_BYTES: u64 = 16 * 1024;
