use axum::extract::{Path, Query, State};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Extension, Json, Router};
use serde::{Deserialize, Serialize};

use crate::auth::AuthUser;
use crate::engine::{is_known_module, prerequisite_for, GateDecision, ProgressRecord};
use crate::response::{json_ok, AppError};
use crate::services::content;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(get_summary))
        .route("/gate", get(check_gate))
        .route("/:module_id", get(get_module))
        .route("/:module_id/expand", post(expand_item))
        .route("/:module_id/ended", post(item_ended))
        .route("/:module_id/resume", put(save_resume))
        .route("/:module_id/complete", put(set_completed))
}

#[derive(Debug, Deserialize)]
struct GateQuery {
    /// Explicit prerequisite to check, e.g. `?required=module2`.
    required: Option<String>,
    /// Target module; the prerequisite is looked up server-side.
    module: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ItemBody {
    #[serde(rename = "itemIndex")]
    item_index: i64,
}

#[derive(Debug, Deserialize)]
struct ResumeBody {
    #[serde(rename = "itemIndex")]
    item_index: i64,
    position: f64,
}

#[derive(Debug, Deserialize)]
struct CompleteBody {
    completed: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct EndedResponse {
    record: ProgressRecord,
    advanced: bool,
    completed_now: bool,
}

async fn get_summary(State(state): State<AppState>, Extension(user): Extension<AuthUser>) -> Response {
    let summary = state.engine().summary(&user.id).await;
    json_ok(summary).into_response()
}

async fn check_gate(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Query(query): Query<GateQuery>,
) -> Response {
    if let Some(required) = query.required.as_deref() {
        if !is_known_module(required) {
            return AppError::validation(format!("unknown module: {required}")).into_response();
        }
    }
    if let Some(module) = query.module.as_deref() {
        if !is_known_module(module) {
            return AppError::validation(format!("unknown module: {module}")).into_response();
        }
    }

    let required = query
        .required
        .as_deref()
        .or_else(|| query.module.as_deref().and_then(prerequisite_for));

    let decision: GateDecision = state
        .engine()
        .check_gate(Some(&user.id), &user.role, required)
        .await;

    json_ok(decision).into_response()
}

async fn get_module(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(module_id): Path<String>,
) -> Response {
    if !is_known_module(&module_id) {
        return AppError::not_found(format!("unknown module: {module_id}")).into_response();
    }

    let decision = state
        .engine()
        .check_gate(Some(&user.id), &user.role, prerequisite_for(&module_id))
        .await;
    if !decision.is_allowed() {
        return AppError::forbidden(format!("{module_id} is locked")).into_response();
    }

    let item_count = match module_item_count(&state, &module_id).await {
        Ok(count) => count,
        Err(err) => return err.into_response(),
    };

    let view = state.engine().module_view(&user.id, &module_id, item_count).await;
    json_ok(view).into_response()
}

async fn expand_item(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(module_id): Path<String>,
    Json(body): Json<ItemBody>,
) -> Response {
    if !is_known_module(&module_id) {
        return AppError::not_found(format!("unknown module: {module_id}")).into_response();
    }
    if body.item_index < 0 {
        return AppError::validation("itemIndex must be 0 or greater").into_response();
    }

    let item_count = match module_item_count(&state, &module_id).await {
        Ok(count) => count,
        Err(err) => return err.into_response(),
    };
    if body.item_index >= item_count as i64 {
        return AppError::validation(format!(
            "itemIndex {} is out of range for {} items",
            body.item_index, item_count
        ))
        .into_response();
    }

    let record = state
        .engine()
        .mark_item_expanded(&user.id, &module_id, body.item_index, item_count)
        .await;

    json_ok(record).into_response()
}

async fn item_ended(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(module_id): Path<String>,
    Json(body): Json<ItemBody>,
) -> Response {
    if !is_known_module(&module_id) {
        return AppError::not_found(format!("unknown module: {module_id}")).into_response();
    }

    let item_count = match module_item_count(&state, &module_id).await {
        Ok(count) => count,
        Err(err) => return err.into_response(),
    };

    let advance = state
        .engine()
        .handle_item_ended(&user.id, &module_id, body.item_index, item_count)
        .await;

    json_ok(EndedResponse {
        record: advance.record,
        advanced: advance.advanced,
        completed_now: advance.completed_now,
    })
    .into_response()
}

async fn save_resume(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(module_id): Path<String>,
    Json(body): Json<ResumeBody>,
) -> Response {
    if !is_known_module(&module_id) {
        return AppError::not_found(format!("unknown module: {module_id}")).into_response();
    }
    if body.item_index < 0 {
        return AppError::validation("itemIndex must be 0 or greater").into_response();
    }
    if !body.position.is_finite() || body.position < 0.0 {
        return AppError::validation("position must be a non-negative number").into_response();
    }

    state
        .engine()
        .set_resume_offset(&user.id, &module_id, body.item_index, body.position)
        .await;

    json_ok(serde_json::json!({ "saved": true })).into_response()
}

async fn set_completed(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(module_id): Path<String>,
    Json(body): Json<CompleteBody>,
) -> Response {
    if !is_known_module(&module_id) {
        return AppError::not_found(format!("unknown module: {module_id}")).into_response();
    }

    let record = state
        .engine()
        .set_completed(&user.id, &module_id, body.completed)
        .await;

    json_ok(record).into_response()
}

pub(super) async fn module_item_count(
    state: &AppState,
    module_id: &str,
) -> Result<usize, AppError> {
    let Some(proxy) = state.db_proxy() else {
        return Err(AppError::service_unavailable("database is not configured"));
    };

    content::count_items(&proxy, module_id, None)
        .await
        .map_err(|err| {
            tracing::error!(error = %err, module_id, "failed to count module items");
            AppError::internal("failed to load module content")
        })
}
