use axum::extract::{Path, Query, State};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use serde::Deserialize;

use crate::engine::is_known_module;
use crate::response::{json_ok, AppError};
use crate::services::content::{self, ContentError};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/:module_id", get(list_module_content))
}

#[derive(Debug, Deserialize)]
struct ContentQuery {
    #[serde(rename = "type")]
    content_type: Option<String>,
}

async fn list_module_content(
    State(state): State<AppState>,
    Path(module_id): Path<String>,
    Query(query): Query<ContentQuery>,
) -> Response {
    if !is_known_module(&module_id) {
        return AppError::not_found(format!("unknown module: {module_id}")).into_response();
    }

    let Some(proxy) = state.db_proxy() else {
        return AppError::service_unavailable("database is not configured").into_response();
    };

    match content::list_items(&proxy, &module_id, query.content_type.as_deref()).await {
        Ok(items) => json_ok(items).into_response(),
        Err(err) => content_error_response(err),
    }
}

pub(super) fn content_error_response(err: ContentError) -> Response {
    match err {
        ContentError::Validation(message) => AppError::validation(message).into_response(),
        ContentError::NotFound(message) => AppError::not_found(message).into_response(),
        ContentError::Sql(err) => {
            tracing::error!(error = %err, "content query failed");
            AppError::internal("content query failed").into_response()
        }
    }
}
