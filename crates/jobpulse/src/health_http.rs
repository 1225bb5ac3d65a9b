//! Minimal HTTP surface (spec §4.13, §6.4): liveness/readiness/health
//! probes plus the bearer-authenticated cron trigger for the daily
//! digest. Everything else — dashboards, settings CRUD, login/session
//! handling, the public application intake form — is out of scope
//! (spec §1) and lives in a separate admin surface this core never touches.

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Json};
use axum::routing::{get, post};
use axum::Router;
use jobpulse_scheduler::HealthMonitor;
use serde::Serialize;
use std::sync::Arc;

use crate::cron::DigestHandler;

#[derive(Clone)]
struct AppState {
    health: Arc<HealthMonitor>,
    digest: Arc<DigestHandler>,
    cron_bearer_secret: Arc<String>,
}

pub async fn serve(port: u16, health: Arc<HealthMonitor>, digest: Arc<DigestHandler>, cron_bearer_secret: String) {
    let state = AppState { health, digest, cron_bearer_secret: Arc::new(cron_bearer_secret) };

    let app = Router::new()
        .route("/healthz", get(liveness))
        .route("/readyz", get(readiness))
        .route("/health", get(health_snapshot))
        .route("/cron/daily_digest", post(trigger_daily_digest))
        .with_state(state);

    let listener = match tokio::net::TcpListener::bind(("0.0.0.0", port)).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(error = %e, port, "failed to bind health http listener");
            return;
        }
    };

    tracing::info!(port, "health http surface listening");
    if let Err(e) = axum::serve(listener, app).await {
        tracing::error!(error = %e, "health http server stopped unexpectedly");
    }
}

async fn liveness(State(state): State<AppState>) -> impl IntoResponse {
    let snapshot = state.health.snapshot(chrono::Utc::now());
    if snapshot.alive {
        (StatusCode::OK, "alive")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "not alive")
    }
}

async fn readiness(State(state): State<AppState>) -> impl IntoResponse {
    let snapshot = state.health.snapshot(chrono::Utc::now());
    if snapshot.ready {
        (StatusCode::OK, "ready")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "not ready")
    }
}

#[derive(Serialize)]
struct HealthBody {
    alive: bool,
    ready: bool,
    healthy: bool,
}

async fn health_snapshot(State(state): State<AppState>) -> impl IntoResponse {
    let snapshot = state.health.snapshot(chrono::Utc::now());
    let status = if snapshot.healthy { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (status, Json(HealthBody { alive: snapshot.alive, ready: snapshot.ready, healthy: snapshot.healthy }))
}

/// spec §6.4: a single externally-callable trigger accepting a bearer
/// token equal to `cron_bearer_secret`; no other endpoint authenticates
/// this way, and this is the only bearer-checked route in the process.
async fn trigger_daily_digest(State(state): State<AppState>, headers: HeaderMap) -> impl IntoResponse {
    if !bearer_matches(&headers, &state.cron_bearer_secret) {
        return (StatusCode::UNAUTHORIZED, "invalid bearer token").into_response();
    }

    match state.digest.compose_and_send().await {
        Ok(()) => (StatusCode::OK, "digest sent").into_response(),
        Err(e) => {
            tracing::error!(error = %e, "cron-triggered digest failed");
            (StatusCode::INTERNAL_SERVER_ERROR, "digest failed").into_response()
        }
    }
}

fn bearer_matches(headers: &HeaderMap, expected: &str) -> bool {
    headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .is_some_and(|token| constant_time_eq(token.as_bytes(), expected.as_bytes()))
}

/// Avoid leaking the secret's length/prefix through response-time
/// differences on a naive `==` comparison.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constant_time_eq_matches_equal_bytes() {
        assert!(constant_time_eq(b"secret", b"secret"));
    }

    #[test]
    fn constant_time_eq_rejects_mismatch() {
        assert!(!constant_time_eq(b"secret", b"wrong"));
        assert!(!constant_time_eq(b"secret", b"secre"));
    }
}
