//! Read side of the content catalog plus the admin authoring operations.
//! Items are always returned ascending by item number; the engine treats
//! that order as the canonical item order.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use sqlx::Row;
use uuid::Uuid;

use crate::db::DatabaseProxy;
use crate::engine::CompletionPolicy;

const CONTENT_TYPES: [&str; 4] = ["text", "audio", "video", "prayer"];

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentItem {
    pub id: String,
    pub module_id: String,
    pub item_number: i64,
    pub title: String,
    pub content_type: String,
    pub content: String,
    pub created_at: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ContentError {
    #[error("validation error: {0}")]
    Validation(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error(transparent)]
    Sql(#[from] sqlx::Error),
}

pub async fn list_items(
    proxy: &DatabaseProxy,
    module_id: &str,
    content_type: Option<&str>,
) -> Result<Vec<ContentItem>, ContentError> {
    if let Some(content_type) = content_type {
        validate_content_type(content_type)?;
    }

    let rows = match content_type {
        Some(content_type) => {
            sqlx::query(
                r#"SELECT "id","moduleId","itemNumber","title","contentType","content","createdAt"
                   FROM "module_content"
                   WHERE "moduleId" = $1 AND "contentType" = $2
                   ORDER BY "itemNumber" ASC"#,
            )
            .bind(module_id)
            .bind(content_type)
            .fetch_all(proxy.pool())
            .await?
        }
        None => {
            sqlx::query(
                r#"SELECT "id","moduleId","itemNumber","title","contentType","content","createdAt"
                   FROM "module_content"
                   WHERE "moduleId" = $1
                   ORDER BY "itemNumber" ASC"#,
            )
            .bind(module_id)
            .fetch_all(proxy.pool())
            .await?
        }
    };

    rows.iter().map(parse_item).collect()
}

pub async fn count_items(
    proxy: &DatabaseProxy,
    module_id: &str,
    content_type: Option<&str>,
) -> Result<usize, ContentError> {
    if let Some(content_type) = content_type {
        validate_content_type(content_type)?;
    }

    let count: i64 = match content_type {
        Some(content_type) => {
            sqlx::query_scalar(
                r#"SELECT COUNT(*) FROM "module_content"
                   WHERE "moduleId" = $1 AND "contentType" = $2"#,
            )
            .bind(module_id)
            .bind(content_type)
            .fetch_one(proxy.pool())
            .await?
        }
        None => {
            sqlx::query_scalar(r#"SELECT COUNT(*) FROM "module_content" WHERE "moduleId" = $1"#)
                .bind(module_id)
                .fetch_one(proxy.pool())
                .await?
        }
    };

    Ok(count as usize)
}

pub async fn create_item(
    proxy: &DatabaseProxy,
    module_id: &str,
    item_number: i64,
    title: &str,
    content_type: &str,
    content: &str,
) -> Result<ContentItem, ContentError> {
    validate_content_type(content_type)?;
    if title.trim().is_empty() {
        return Err(ContentError::Validation("title must not be empty".into()));
    }
    if item_number < 1 {
        return Err(ContentError::Validation(
            "itemNumber must be 1 or greater".into(),
        ));
    }

    let implied = CompletionPolicy::from_content_type(content_type);
    if implied != CompletionPolicy::for_module(module_id) {
        tracing::warn!(
            module_id,
            content_type,
            "content type implies a completion policy the module does not use"
        );
    }

    let id = Uuid::new_v4().to_string();
    let row = sqlx::query(
        r#"INSERT INTO "module_content"
           ("id","moduleId","itemNumber","title","contentType","content")
           VALUES ($1,$2,$3,$4,$5,$6)
           ON CONFLICT ("moduleId","contentType","itemNumber") DO UPDATE SET
           "title"=$4,
           "content"=$6,
           "updatedAt"=NOW()
           RETURNING "id","moduleId","itemNumber","title","contentType","content","createdAt""#,
    )
    .bind(&id)
    .bind(module_id)
    .bind(item_number as i32)
    .bind(title)
    .bind(content_type)
    .bind(content)
    .fetch_one(proxy.pool())
    .await?;

    parse_item(&row)
}

pub async fn delete_item(proxy: &DatabaseProxy, item_id: &str) -> Result<(), ContentError> {
    let result = sqlx::query(r#"DELETE FROM "module_content" WHERE "id" = $1"#)
        .bind(item_id)
        .execute(proxy.pool())
        .await?;

    if result.rows_affected() == 0 {
        return Err(ContentError::NotFound(format!(
            "content item {item_id} does not exist"
        )));
    }

    Ok(())
}

fn validate_content_type(content_type: &str) -> Result<(), ContentError> {
    if CONTENT_TYPES.contains(&content_type) {
        Ok(())
    } else {
        Err(ContentError::Validation(format!(
            "unknown content type: {content_type}"
        )))
    }
}

fn parse_item(row: &sqlx::postgres::PgRow) -> Result<ContentItem, ContentError> {
    Ok(ContentItem {
        id: row.try_get("id")?,
        module_id: row.try_get("moduleId")?,
        item_number: row.try_get::<i32, _>("itemNumber")? as i64,
        title: row.try_get("title")?,
        content_type: row.try_get("contentType")?,
        content: row.try_get("content")?,
        created_at: row
            .try_get::<DateTime<Utc>, _>("createdAt")?
            .to_rfc3339_opts(SecondsFormat::Millis, true),
    })
}
