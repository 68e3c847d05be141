use axum::{
    body::Bytes,
    extract::{Path, RawQuery, State},
    http::{header, HeaderMap, HeaderName, HeaderValue, Method, StatusCode},
    response::IntoResponse,
    routing::{any, get},
    Json, Router,
};
use std::net::SocketAddr;
use thiserror::Error;
use tower_http::cors::CorsLayer;
use tracing::{debug, error, info};

#[derive(Error, Debug)]
pub enum ProxyError {
    #[error("Failed to bind proxy listener: {0}")]
    Bind(#[from] std::io::Error),
}

/// Headers that describe a single connection and must not be forwarded
const HOP_BY_HOP: [&str; 8] = [
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

#[derive(Clone)]
pub struct ProxyState {
    client: reqwest::Client,
    target: String,
}

/// Router serving `/health` and forwarding `/api/*` to `target`
pub fn create_router(target: impl Into<String>) -> Router {
    let state = ProxyState {
        client: reqwest::Client::new(),
        target: target.into().trim_end_matches('/').to_string(),
    };
    Router::new()
        .route("/health", get(health))
        .route("/api/*path", any(forward))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Bind `port` on all interfaces and serve until the process exits
pub async fn serve(port: u16, target: String) -> Result<(), ProxyError> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Proxy listening on http://localhost:{} -> {}", port, target);
    axum::serve(listener, create_router(target)).await?;
    Ok(())
}

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

fn upstream_url(target: &str, path: &str, query: Option<&str>) -> String {
    match query {
        Some(query) if !query.is_empty() => format!("{}/{}?{}", target, path, query),
        _ => format!("{}/{}", target, path),
    }
}

/// Copy `headers`, leaving out hop-by-hop headers and anything in `extra`
fn forwardable(headers: &HeaderMap, extra: &[HeaderName]) -> HeaderMap {
    headers
        .iter()
        .filter(|(name, _)| !HOP_BY_HOP.contains(&name.as_str()) && !extra.contains(name))
        .map(|(name, value)| (name.clone(), value.clone()))
        .collect()
}

async fn forward(
    State(state): State<ProxyState>,
    Path(path): Path<String>,
    RawQuery(query): RawQuery,
    method: Method,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    let url = upstream_url(&state.target, &path, query.as_deref());
    debug!("Proxying {} /api/{} -> {}", method, path, url);

    let request_headers = forwardable(&headers, &[header::HOST, header::CONTENT_LENGTH]);
    let response = match state
        .client
        .request(method, &url)
        .headers(request_headers)
        .body(body)
        .send()
        .await
    {
        Ok(response) => response,
        Err(e) => {
            error!("Upstream request to {} failed: {}", url, e);
            return (
                StatusCode::BAD_GATEWAY,
                Json(serde_json::json!({ "error": format!("Upstream request failed: {}", e) })),
            )
                .into_response();
        }
    };

    let status = response.status();
    let mut response_headers = forwardable(response.headers(), &[header::CONTENT_LENGTH]);
    response_headers.insert(
        header::ACCESS_CONTROL_ALLOW_ORIGIN,
        HeaderValue::from_static("*"),
    );
    response_headers.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("GET, POST, OPTIONS"),
    );
    response_headers.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static("Content-Type, Authorization"),
    );

    match response.bytes().await {
        Ok(bytes) => (status, response_headers, bytes).into_response(),
        Err(e) => {
            error!("Failed to read upstream response from {}: {}", url, e);
            (
                StatusCode::BAD_GATEWAY,
                Json(serde_json::json!({ "error": format!("Upstream response failed: {}", e) })),
            )
                .into_response()
        }
    }
}
