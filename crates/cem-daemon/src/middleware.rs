//! Correlation-id propagation (supplemented from
//! `original_source/app/middleware/correlation_id.py`): every request gets
//! an `x-correlation-id`, reusing the caller's header value when present,
//! otherwise minting a fresh UUID. The id is attached to the tracing span
//! so every log line the request produces carries it, and echoed back on
//! the response.

use axum::{body::Body, extract::Request, http::HeaderValue, middleware::Next, response::Response};
use tracing::Instrument;
use uuid::Uuid;

pub const HEADER_NAME: &str = "x-correlation-id";

pub async fn correlation_id(mut req: Request<Body>, next: Next) -> Response {
    let correlation_id = req
        .headers()
        .get(HEADER_NAME)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    req.extensions_mut().insert(CorrelationId(correlation_id.clone()));

    let span = tracing::info_span!("request", correlation_id = %correlation_id);
    let mut response = next.run(req).instrument(span).await;
    if let Ok(value) = HeaderValue::from_str(&correlation_id) {
        response.headers_mut().insert(HEADER_NAME, value);
    }
    response
}

#[derive(Clone, Debug)]
pub struct CorrelationId(pub String);
