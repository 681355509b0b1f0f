use std::convert::Infallible;

use serde::Serialize;
use tracing::warn;
use warp::http::StatusCode;
use warp::Rejection;
use warp::Reply;

use crate::Error;
use crate::RegistryError;
use crate::ViewError;
use crate::HTTP_REQUESTS_METRIC;

/// A handler failure on `route`, carried through warp's rejection chain
#[derive(Debug)]
pub struct ApiError {
    pub route: &'static str,
    pub error: Error,
}

impl warp::reject::Reject for ApiError {}

impl ApiError {
    pub fn reject(
        route: &'static str,
        error: impl Into<Error>,
    ) -> Rejection {
        warp::reject::custom(Self {
            route,
            error: error.into(),
        })
    }

    pub fn status(&self) -> StatusCode {
        match &self.error {
            Error::Request(_) => StatusCode::BAD_REQUEST,
            Error::Registry(RegistryError::ViewNotFound(_)) => StatusCode::NOT_FOUND,
            Error::View(ViewError::Closed(_)) => StatusCode::GONE,
            Error::View(ViewError::LockTimeout { .. }) => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    status: u16,
    error: String,
}

/// Render every rejection as `{ "status", "error" }`
pub async fn handle_rejection(err: Rejection) -> Result<impl Reply, Infallible> {
    let (route, status, message) = if let Some(api) = err.find::<ApiError>() {
        (api.route, api.status(), api.error.to_string())
    } else if let Some(e) = err.find::<warp::reject::InvalidQuery>() {
        ("unmatched", StatusCode::BAD_REQUEST, e.to_string())
    } else if let Some(e) = err.find::<warp::body::BodyDeserializeError>() {
        ("unmatched", StatusCode::BAD_REQUEST, e.to_string())
    } else if let Some(e) = err.find::<warp::reject::PayloadTooLarge>() {
        ("unmatched", StatusCode::PAYLOAD_TOO_LARGE, e.to_string())
    } else if let Some(e) = err.find::<warp::reject::MethodNotAllowed>() {
        ("unmatched", StatusCode::METHOD_NOT_ALLOWED, e.to_string())
    } else if err.is_not_found() {
        ("unmatched", StatusCode::NOT_FOUND, "Not Found".to_string())
    } else {
        warn!("unhandled rejection: {:?}", err);
        ("unmatched", StatusCode::INTERNAL_SERVER_ERROR, format!("{err:?}"))
    };

    if status.is_server_error() {
        warn!(route, %status, "request failed: {}", message);
    }
    HTTP_REQUESTS_METRIC
        .with_label_values(&[route, status.as_str()])
        .inc();

    let body = warp::reply::json(&ErrorBody {
        status: status.as_u16(),
        error: message,
    });
    Ok(warp::reply::with_status(body, status))
}
