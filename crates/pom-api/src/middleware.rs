//! Request middleware: CORS and a per-request trace span.
use axum::middleware::Next;
use axum::{
    body::Body,
    http::{HeaderValue, Request},
    response::Response,
};
use pom_core::RequestContext;
use tower_http::cors::CorsLayer;
use tracing::Instrument;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

pub fn cors() -> CorsLayer {
    CorsLayer::permissive()
}

/// Wrap the request in a `request` span keyed by `x-request-id` (generated
/// when absent) and echo the id on the response.
pub async fn request_context(req: Request<Body>, next: Next) -> Response {
    let operation = format!("{} {}", req.method(), req.uri().path());
    let mut ctx = RequestContext::new(operation);
    if let Some(id) = req
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
    {
        ctx = ctx.with_trace_id(id);
    }

    let span = ctx.span();
    let mut response = next.run(req).instrument(span.clone()).await;

    span.in_scope(|| {
        tracing::debug!(status = response.status().as_u16(), "request finished");
    });
    if let Ok(value) = HeaderValue::from_str(&ctx.trace_id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    response
}
