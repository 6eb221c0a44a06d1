//! The HTTP surface served by axum.
//!
//! | Method | Path | Description |
//! |---|---|---|
//! | GET | `/metrics` | Prometheus exposition (gzip when accepted) |
//! | GET | `/ping` | Liveness probe |
//!
//! Ingestion (`POST /send-metrics`) never reaches the router; see
//! [`crate::ingest`].

use std::io::Write;

use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use flate2::write::GzEncoder;
use flate2::Compression;
use tracing::warn;

use crate::state::SharedState;

pub const METRICS_CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

pub fn build_router(state: SharedState) -> Router {
    Router::new()
        .route("/metrics", get(metrics))
        .route("/ping", get(ping))
        .fallback(not_found)
        .with_state(state)
}

pub async fn metrics(State(state): State<SharedState>, headers: HeaderMap) -> Response {
    let body = state.render_metrics().await;

    if accepts_gzip(&headers) {
        match gzip(body.as_bytes()) {
            Ok(compressed) => {
                return (
                    StatusCode::OK,
                    [
                        (header::CONTENT_TYPE, METRICS_CONTENT_TYPE),
                        (header::CONTENT_ENCODING, "gzip"),
                    ],
                    compressed,
                )
                    .into_response();
            }
            Err(err) => warn!(error = %err, "gzip failed, sending identity body"),
        }
    }

    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, METRICS_CONTENT_TYPE)],
        body,
    )
        .into_response()
}

async fn ping() -> &'static str {
    "PONG"
}

async fn not_found() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, "Not Found! The Prometheus endpoint lives at /metrics")
}

fn accepts_gzip(headers: &HeaderMap) -> bool {
    headers
        .get_all(header::ACCEPT_ENCODING)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .any(|enc| {
            let mut parts = enc.trim().split(';');
            let name = parts.next().unwrap_or_default().trim();
            let rejected = parts.any(|p| matches!(p.trim(), "q=0" | "q=0.0" | "q=0.00" | "q=0.000"));
            name.eq_ignore_ascii_case("gzip") && !rejected
        })
}

fn gzip(data: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::with_capacity(data.len() / 4), Compression::default());
    encoder.write_all(data)?;
    encoder.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(accept: &str) -> HeaderMap {
        let mut map = HeaderMap::new();
        map.insert(header::ACCEPT_ENCODING, HeaderValue::from_str(accept).unwrap());
        map
    }

    #[test]
    fn gzip_negotiation() {
        assert!(accepts_gzip(&headers("gzip")));
        assert!(accepts_gzip(&headers("deflate, gzip;q=0.5")));
        assert!(!accepts_gzip(&headers("deflate")));
        assert!(!accepts_gzip(&headers("gzip;q=0")));
        assert!(!accepts_gzip(&HeaderMap::new()));
    }
}
