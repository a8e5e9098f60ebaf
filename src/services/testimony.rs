//! Testimony submissions from the transformation module, surfaced in the
//! admin console for review.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use sqlx::Row;
use uuid::Uuid;

use crate::db::DatabaseProxy;

const MAX_BODY_CHARS: usize = 10_000;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Testimony {
    pub id: String,
    pub user_id: String,
    pub username: Option<String>,
    pub body: String,
    pub created_at: String,
}

#[derive(Debug, thiserror::Error)]
pub enum TestimonyError {
    #[error("validation error: {0}")]
    Validation(String),
    #[error(transparent)]
    Sql(#[from] sqlx::Error),
}

/// Every testimony with the submitter's name, newest first.
pub async fn list_all(proxy: &DatabaseProxy) -> Result<Vec<Testimony>, TestimonyError> {
    let rows = sqlx::query(
        r#"SELECT t."id", t."userId", t."body", t."createdAt", u."username"
           FROM "testimonies" t
           LEFT JOIN "users" u ON u."id" = t."userId"
           ORDER BY t."createdAt" DESC"#,
    )
    .fetch_all(proxy.pool())
    .await?;

    rows.iter().map(parse_row).collect()
}

pub async fn create(
    proxy: &DatabaseProxy,
    user_id: &str,
    body: &str,
) -> Result<Testimony, TestimonyError> {
    let body = validate_body(body)?;

    let id = Uuid::new_v4().to_string();
    let row = sqlx::query(
        r#"INSERT INTO "testimonies" ("id","userId","body")
           VALUES ($1,$2,$3)
           RETURNING "id","userId","body","createdAt", NULL::TEXT AS "username""#,
    )
    .bind(&id)
    .bind(user_id)
    .bind(body)
    .fetch_one(proxy.pool())
    .await?;

    parse_row(&row)
}

fn validate_body(body: &str) -> Result<&str, TestimonyError> {
    let body = body.trim();
    if body.is_empty() {
        return Err(TestimonyError::Validation(
            "testimony must not be empty".into(),
        ));
    }
    if body.chars().count() > MAX_BODY_CHARS {
        return Err(TestimonyError::Validation("testimony is too long".into()));
    }
    Ok(body)
}

fn parse_row(row: &sqlx::postgres::PgRow) -> Result<Testimony, TestimonyError> {
    Ok(Testimony {
        id: row.try_get("id")?,
        user_id: row.try_get("userId")?,
        username: row.try_get("username")?,
        body: row.try_get("body")?,
        created_at: row
            .try_get::<DateTime<Utc>, _>("createdAt")?
            .to_rfc3339_opts(SecondsFormat::Millis, true),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_body_trims_and_rejects_empty() {
        assert!(validate_body("").is_err());
        assert!(validate_body("   \n\t ").is_err());
        assert_eq!(validate_body("  grateful  ").unwrap(), "grateful");
    }

    #[test]
    fn test_validate_body_rejects_oversized() {
        let long = "a".repeat(MAX_BODY_CHARS + 1);
        assert!(validate_body(&long).is_err());

        let max = "a".repeat(MAX_BODY_CHARS);
        assert!(validate_body(&max).is_ok());
    }
}
