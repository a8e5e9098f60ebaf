use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::json;

use crate::response::json_error;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(health_root))
        .route("/live", get(health_live))
        .route("/ready", get(health_ready))
        .route("/info", get(health_info))
}

async fn health_root(State(state): State<AppState>) -> Response {
    let started_at: DateTime<Utc> = state.started_at_system().into();

    Json(json!({
        "status": "ok",
        "uptimeSeconds": state.uptime_seconds(),
        "startedAt": started_at.to_rfc3339_opts(SecondsFormat::Secs, true),
    }))
    .into_response()
}

async fn health_live() -> Response {
    Json(json!({ "status": "ok" })).into_response()
}

async fn health_ready(State(state): State<AppState>) -> Response {
    let Some(proxy) = state.db_proxy() else {
        return json_error(
            StatusCode::SERVICE_UNAVAILABLE,
            "DB_UNAVAILABLE",
            "database is not configured",
        )
        .into_response();
    };

    match proxy.ping().await {
        Ok(()) => Json(json!({ "status": "ok", "database": "up" })).into_response(),
        Err(err) => {
            tracing::warn!(error = %err, "readiness probe failed to reach database");
            json_error(
                StatusCode::SERVICE_UNAVAILABLE,
                "DB_UNAVAILABLE",
                "database is unreachable",
            )
            .into_response()
        }
    }
}

async fn health_info(State(state): State<AppState>) -> Response {
    let engine = state.engine();

    Json(json!({
        "name": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
        "database": state.db_proxy().is_some(),
        "uptimeSeconds": state.uptime_seconds(),
        "cachedUsers": engine.store().cached_users().await,
    }))
    .into_response()
}
