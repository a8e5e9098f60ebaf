mod admin;
mod content;
mod health;
mod progress;
mod testimony;

use axum::http::StatusCode;
use axum::middleware;
use axum::response::{IntoResponse, Response};
use axum::Router;

use crate::middleware::auth::{require_admin, require_auth};
use crate::response::json_error;
use crate::state::AppState;

pub fn router(state: AppState) -> Router {
    Router::new()
        .nest("/health", health::router())
        .nest(
            "/api/content",
            content::router().layer(middleware::from_fn_with_state(
                state.clone(),
                require_auth,
            )),
        )
        .nest(
            "/api/progress",
            progress::router().layer(middleware::from_fn_with_state(
                state.clone(),
                require_auth,
            )),
        )
        .nest(
            "/api/testimonies",
            testimony::router().layer(middleware::from_fn_with_state(
                state.clone(),
                require_auth,
            )),
        )
        .nest(
            "/api/admin",
            admin::router()
                .layer(middleware::from_fn(require_admin))
                .layer(middleware::from_fn_with_state(state.clone(), require_auth)),
        )
        .fallback(fallback_handler)
        .with_state(state)
}

async fn fallback_handler() -> Response {
    json_error(StatusCode::NOT_FOUND, "NOT_FOUND", "route not found").into_response()
}
