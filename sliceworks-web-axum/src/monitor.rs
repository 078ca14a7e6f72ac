//! Request monitoring through application [Notifications].

use axum::body::Body;
use axum::extract::State;
use axum::middleware::Next;
use axum::response::Response;
use fxhash::FxHashMap;
use hyper::Request;
use sliceworks::notifications::Notifications;
use sliceworks_di::instance_provider::ComponentInstancePtr;
use std::time::Instant;
use tracing::warn;

/// Event instrumented after every request.
pub const REQUEST_EVENT: &str = "http.request";

/// Middleware instrumenting [REQUEST_EVENT] with `method`, `path`, `status` and `elapsed_ms`.
pub async fn monitor_request(
    State(notifications): State<ComponentInstancePtr<Notifications>>,
    request: Request<Body>,
    next: Next<Body>,
) -> Response {
    let method = request.method().to_string();
    let path = request.uri().path().to_string();
    let started = Instant::now();

    let response = next.run(request).await;

    let payload: FxHashMap<String, String> = [
        ("method", method),
        ("path", path),
        ("status", response.status().as_u16().to_string()),
        ("elapsed_ms", started.elapsed().as_millis().to_string()),
    ]
    .into_iter()
    .map(|(name, value)| (name.to_string(), value))
    .collect();

    if let Err(error) = notifications.instrument(REQUEST_EVENT, payload) {
        warn!(%error, "Error instrumenting request");
    }

    response
}
