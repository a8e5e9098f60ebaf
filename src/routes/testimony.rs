use axum::extract::State;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Extension, Json, Router};
use serde::Deserialize;

use crate::auth::AuthUser;
use crate::response::{json_ok, AppError};
use crate::services::testimony::{self, TestimonyError};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/", post(submit_testimony))
}

#[derive(Debug, Deserialize)]
struct SubmitBody {
    body: String,
}

async fn submit_testimony(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(body): Json<SubmitBody>,
) -> Response {
    let Some(proxy) = state.db_proxy() else {
        return AppError::service_unavailable("database is not configured").into_response();
    };

    match testimony::create(&proxy, &user.id, &body.body).await {
        Ok(mut created) => {
            created.username = Some(user.username);
            json_ok(created).into_response()
        }
        Err(err) => testimony_error_response(err),
    }
}

pub(super) fn testimony_error_response(err: TestimonyError) -> Response {
    match err {
        TestimonyError::Validation(message) => AppError::validation(message).into_response(),
        TestimonyError::Sql(err) => {
            tracing::error!(error = %err, "testimony query failed");
            AppError::internal("testimony query failed").into_response()
        }
    }
}
