use axum::extract::{Path, State};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post, put};
use axum::{Json, Router};
use serde::Deserialize;

use crate::engine::is_known_module;
use crate::response::{json_ok, AppError};
use crate::services::admin::{self, AdminError};
use crate::services::content;
use crate::services::testimony;
use crate::state::AppState;

use super::content::content_error_response;
use super::testimony::testimony_error_response;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/users", get(list_users))
        .route("/progress/:user_id", get(get_user_progress))
        .route("/progress/:user_id/:module_id", put(override_progress))
        .route("/content", post(create_content))
        .route("/content/:item_id", delete(delete_content))
        .route("/testimonies", get(list_testimonies))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateContentBody {
    module_id: String,
    item_number: i64,
    title: String,
    content_type: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct OverrideBody {
    completed: bool,
}

async fn list_users(State(state): State<AppState>) -> Response {
    let Some(proxy) = state.db_proxy() else {
        return AppError::service_unavailable("database is not configured").into_response();
    };

    match admin::list_users(&proxy).await {
        Ok(users) => json_ok(users).into_response(),
        Err(err) => admin_error_response(err),
    }
}

async fn get_user_progress(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Response {
    let Some(proxy) = state.db_proxy() else {
        return AppError::service_unavailable("database is not configured").into_response();
    };

    match admin::user_exists(&proxy, &user_id).await {
        Ok(true) => {}
        Ok(false) => {
            return AppError::not_found(format!("user {user_id} does not exist")).into_response()
        }
        Err(err) => return admin_error_response(err),
    }

    let summary = state.engine().summary(&user_id).await;
    json_ok(summary).into_response()
}

async fn override_progress(
    State(state): State<AppState>,
    Path((user_id, module_id)): Path<(String, String)>,
    Json(body): Json<OverrideBody>,
) -> Response {
    if !is_known_module(&module_id) {
        return AppError::not_found(format!("unknown module: {module_id}")).into_response();
    }

    let Some(proxy) = state.db_proxy() else {
        return AppError::service_unavailable("database is not configured").into_response();
    };

    match admin::user_exists(&proxy, &user_id).await {
        Ok(true) => {}
        Ok(false) => {
            return AppError::not_found(format!("user {user_id} does not exist")).into_response()
        }
        Err(err) => return admin_error_response(err),
    }

    let record = state
        .engine()
        .set_completed(&user_id, &module_id, body.completed)
        .await;

    json_ok(record).into_response()
}

async fn create_content(
    State(state): State<AppState>,
    Json(body): Json<CreateContentBody>,
) -> Response {
    if !is_known_module(&body.module_id) {
        return AppError::validation(format!("unknown module: {}", body.module_id))
            .into_response();
    }

    let Some(proxy) = state.db_proxy() else {
        return AppError::service_unavailable("database is not configured").into_response();
    };

    match content::create_item(
        &proxy,
        &body.module_id,
        body.item_number,
        &body.title,
        &body.content_type,
        &body.content,
    )
    .await
    {
        Ok(item) => json_ok(item).into_response(),
        Err(err) => content_error_response(err),
    }
}

async fn list_testimonies(State(state): State<AppState>) -> Response {
    let Some(proxy) = state.db_proxy() else {
        return AppError::service_unavailable("database is not configured").into_response();
    };

    match testimony::list_all(&proxy).await {
        Ok(testimonies) => json_ok(testimonies).into_response(),
        Err(err) => testimony_error_response(err),
    }
}

async fn delete_content(State(state): State<AppState>, Path(item_id): Path<String>) -> Response {
    let Some(proxy) = state.db_proxy() else {
        return AppError::service_unavailable("database is not configured").into_response();
    };

    match content::delete_item(&proxy, &item_id).await {
        Ok(()) => json_ok(serde_json::json!({ "deleted": true })).into_response(),
        Err(err) => content_error_response(err),
    }
}

fn admin_error_response(err: AdminError) -> Response {
    match err {
        AdminError::NotFound(message) => AppError::not_found(message).into_response(),
        AdminError::Sql(err) => {
            tracing::error!(error = %err, "admin query failed");
            AppError::internal("admin query failed").into_response()
        }
    }
}
