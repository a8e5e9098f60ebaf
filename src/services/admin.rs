//! Support-side queries for the admin console: user listing with completion
//! counts, and lookups the admin progress endpoints build on.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use sqlx::Row;

use crate::db::DatabaseProxy;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserOverview {
    pub id: String,
    pub email: String,
    pub username: String,
    pub role: String,
    pub completed_modules: i64,
    pub created_at: String,
}

#[derive(Debug, thiserror::Error)]
pub enum AdminError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error(transparent)]
    Sql(#[from] sqlx::Error),
}

pub async fn list_users(proxy: &DatabaseProxy) -> Result<Vec<UserOverview>, AdminError> {
    let rows = sqlx::query(
        r#"SELECT u."id", u."email", u."username", u."role", u."createdAt",
           COUNT(p."moduleId") FILTER (WHERE p."completed") AS "completedModules"
           FROM "users" u
           LEFT JOIN "module_progress" p ON p."userId" = u."id"
           GROUP BY u."id", u."email", u."username", u."role", u."createdAt"
           ORDER BY u."createdAt" ASC"#,
    )
    .fetch_all(proxy.pool())
    .await?;

    rows.iter()
        .map(|row| {
            Ok(UserOverview {
                id: row.try_get("id")?,
                email: row.try_get("email")?,
                username: row.try_get("username")?,
                role: row.try_get("role")?,
                completed_modules: row.try_get("completedModules")?,
                created_at: row
                    .try_get::<DateTime<Utc>, _>("createdAt")?
                    .to_rfc3339_opts(SecondsFormat::Millis, true),
            })
        })
        .collect()
}

pub async fn user_exists(proxy: &DatabaseProxy, user_id: &str) -> Result<bool, AdminError> {
    let count: i64 = sqlx::query_scalar(r#"SELECT COUNT(*) FROM "users" WHERE "id" = $1"#)
        .bind(user_id)
        .fetch_one(proxy.pool())
        .await?;
    Ok(count > 0)
}
