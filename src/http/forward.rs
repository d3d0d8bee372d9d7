//! Plain HTTP forwarding to the resolved backend.

use axum::body::Body;
use axum::http::{header, Request};
use axum::response::Response;

use crate::http::error::ProxyError;
use crate::http::request::{referer_path, with_query};
use crate::http::server::AppState;

/// Resolve the backend for `request`, rewrite its path and relay the exchange.
///
/// Request and response bodies are streamed. Backend statuses, including
/// errors, are passed through unchanged.
pub async fn forward(
    state: &AppState,
    request: Request<Body>,
    request_id: &str,
) -> Result<Response, ProxyError> {
    let referer = referer_path(request.headers());
    let route = state
        .registry
        .route(request.uri().path(), referer.as_deref())?;

    let host = format!("{}:{}", state.backend_host, route.port);
    let target = format!(
        "http://{}{}",
        host,
        with_query(&route.path, request.uri().query())
    );

    let (parts, body) = request.into_parts();
    let mut builder = Request::builder()
        .method(parts.method.clone())
        .uri(target.as_str());
    if let Some(headers) = builder.headers_mut() {
        for (name, value) in parts.headers.iter() {
            if name != header::HOST {
                headers.append(name.clone(), value.clone());
            }
        }
    }
    let outbound = builder
        .body(body)
        .map_err(|e| ProxyError::Transport(e.to_string()))?;

    let response = state.client.request(outbound).await.map_err(|e| {
        tracing::warn!(
            request_id = %request_id,
            backend = %target,
            error = %e,
            "Forward failed"
        );
        ProxyError::Transport(e.to_string())
    })?;

    tracing::info!(
        request_id = %request_id,
        host = %host,
        path = %route.path,
        backend = %target,
        response_code = response.status().as_u16(),
        referer = referer.as_deref().unwrap_or(""),
        "Forwarded request"
    );

    let (parts, body) = response.into_parts();
    Ok(Response::from_parts(parts, Body::new(body)))
}
