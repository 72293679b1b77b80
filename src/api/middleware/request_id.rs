use axum::{
    extract::Request,
    http::{HeaderName, HeaderValue},
    middleware::Next,
    response::Response,
};
use std::time::Instant;
use tracing::info;
use uuid::Uuid;

pub const REQUEST_ID_HEADER: HeaderName = HeaderName::from_static("x-request-id");

/// Tag every request with an id (reusing the caller's one when valid) and log its latency.
pub async fn request_id_middleware(mut req: Request, next: Next) -> Response {
    let request_id = req
        .headers()
        .get(&REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .and_then(|v| HeaderValue::from_str(v).ok())
        .unwrap_or_else(|| {
            HeaderValue::from_str(&Uuid::new_v4().to_string())
                .unwrap_or(HeaderValue::from_static("unknown"))
        });

    req.headers_mut()
        .insert(REQUEST_ID_HEADER, request_id.clone());

    let start = Instant::now();
    let method = req.method().clone();
    let uri = req.uri().clone();

    let mut response = next.run(req).await;

    info!(
        target: "metrics",
        method = %method,
        uri = %uri,
        status = %response.status().as_u16(),
        latency_ms = %start.elapsed().as_millis(),
        request_id = ?request_id,
        "request_completed"
    );

    response.headers_mut().insert(REQUEST_ID_HEADER, request_id);
    response
}
