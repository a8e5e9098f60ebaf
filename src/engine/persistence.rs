//! sqlx layer between the progress store and the `module_progress` /
//! `resume_offsets` tables. Partial-field upserts: only supplied fields are
//! written, absent fields keep their stored value (or the column default on
//! first insert).

use std::sync::Arc;

use sqlx::Row;

use crate::db::DatabaseProxy;
use crate::engine::types::ProgressRecord;

#[derive(Debug, Clone, Default)]
pub struct ProgressUpdate {
    pub completed: Option<bool>,
    pub expanded_items: Option<Vec<i64>>,
    pub last_completed_index: Option<i64>,
}

impl ProgressUpdate {
    pub fn is_empty(&self) -> bool {
        self.completed.is_none()
            && self.expanded_items.is_none()
            && self.last_completed_index.is_none()
    }
}

pub struct ProgressPersistence {
    db_proxy: Arc<DatabaseProxy>,
}

impl ProgressPersistence {
    pub fn new(db_proxy: Arc<DatabaseProxy>) -> Self {
        Self { db_proxy }
    }

    pub async fn read_progress(
        &self,
        user_id: &str,
        module_id: &str,
    ) -> Result<Option<ProgressRecord>, sqlx::Error> {
        let row = sqlx::query(
            r#"SELECT "completed", "expandedItems", "lastCompletedIndex"
               FROM "module_progress" WHERE "userId" = $1 AND "moduleId" = $2"#,
        )
        .bind(user_id)
        .bind(module_id)
        .fetch_optional(self.db_proxy.pool())
        .await?;

        let Some(row) = row else { return Ok(None) };

        let expanded_json: serde_json::Value = row.try_get("expandedItems")?;
        let expanded_items = expanded_json
            .as_array()
            .map(|values| {
                values
                    .iter()
                    .filter_map(|value| value.as_i64())
                    .collect()
            })
            .unwrap_or_default();

        Ok(Some(ProgressRecord {
            completed: row.try_get("completed")?,
            expanded_items,
            last_completed_index: row.try_get::<i32, _>("lastCompletedIndex")? as i64,
        }))
    }

    pub async fn upsert_progress(
        &self,
        user_id: &str,
        module_id: &str,
        update: &ProgressUpdate,
    ) -> Result<(), sqlx::Error> {
        let expanded_json = update
            .expanded_items
            .as_ref()
            .map(|items| serde_json::json!(items));
        let last_index = update.last_completed_index.map(|idx| idx as i32);

        sqlx::query(
            r#"INSERT INTO "module_progress"
               ("userId","moduleId","completed","expandedItems","lastCompletedIndex","updatedAt")
               VALUES ($1,$2,COALESCE($3,FALSE),COALESCE($4,'[]'::jsonb),COALESCE($5,-1),NOW())
               ON CONFLICT ("userId","moduleId") DO UPDATE SET
               "completed"=COALESCE($3,"module_progress"."completed"),
               "expandedItems"=COALESCE($4,"module_progress"."expandedItems"),
               "lastCompletedIndex"=GREATEST(
                   COALESCE($5,"module_progress"."lastCompletedIndex"),
                   "module_progress"."lastCompletedIndex"
               ),
               "updatedAt"=NOW()"#,
        )
        .bind(user_id)
        .bind(module_id)
        .bind(update.completed)
        .bind(expanded_json)
        .bind(last_index)
        .execute(self.db_proxy.pool())
        .await?;

        Ok(())
    }

    pub async fn list_completed(&self, user_id: &str) -> Result<Vec<String>, sqlx::Error> {
        sqlx::query_scalar(
            r#"SELECT "moduleId" FROM "module_progress"
               WHERE "userId" = $1 AND "completed" = TRUE"#,
        )
        .bind(user_id)
        .fetch_all(self.db_proxy.pool())
        .await
    }

    pub async fn read_resume_offsets(
        &self,
        user_id: &str,
        module_id: &str,
    ) -> Result<Vec<(i64, f64)>, sqlx::Error> {
        let rows = sqlx::query(
            r#"SELECT "itemIndex", "position" FROM "resume_offsets"
               WHERE "userId" = $1 AND "moduleId" = $2"#,
        )
        .bind(user_id)
        .bind(module_id)
        .fetch_all(self.db_proxy.pool())
        .await?;

        rows.iter()
            .map(|row| {
                Ok((
                    row.try_get::<i32, _>("itemIndex")? as i64,
                    row.try_get("position")?,
                ))
            })
            .collect()
    }

    pub async fn upsert_resume_offset(
        &self,
        user_id: &str,
        module_id: &str,
        item_index: i64,
        position: f64,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"INSERT INTO "resume_offsets" ("userId","moduleId","itemIndex","position","updatedAt")
               VALUES ($1,$2,$3,$4,NOW())
               ON CONFLICT ("userId","moduleId","itemIndex") DO UPDATE SET
               "position"=$4,
               "updatedAt"=NOW()"#,
        )
        .bind(user_id)
        .bind(module_id)
        .bind(item_index as i32)
        .bind(position)
        .execute(self.db_proxy.pool())
        .await?;

        Ok(())
    }
}
