use sqlx::PgPool;
use thiserror::Error;

pub async fn run_migrations(pool: &PgPool) -> Result<(), MigrationError> {
    tracing::info!("Running database migrations...");

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS "_migrations" (
            "id" SERIAL PRIMARY KEY,
            "name" TEXT NOT NULL UNIQUE,
            "applied_at" TIMESTAMP NOT NULL DEFAULT NOW()
        )
        "#,
    )
    .execute(pool)
    .await
    .map_err(MigrationError::Sqlx)?;

    let applied: Vec<String> =
        sqlx::query_scalar(r#"SELECT "name" FROM "_migrations" ORDER BY "id""#)
            .fetch_all(pool)
            .await
            .map_err(MigrationError::Sqlx)?;

    let migrations = [
        (
            "001_init_schema",
            include_str!("../../sql/001_init_schema.sql"),
        ),
        (
            "002_testimonies",
            include_str!("../../sql/002_testimonies.sql"),
        ),
    ];

    for (name, sql) in migrations {
        if applied.iter().any(|entry| entry == name) {
            continue;
        }

        tracing::info!(migration = name, "applying migration");

        let mut tx = pool.begin().await.map_err(MigrationError::Sqlx)?;

        for statement in split_statements(sql) {
            sqlx::query(&statement)
                .execute(&mut *tx)
                .await
                .map_err(|err| MigrationError::Failed {
                    name: name.to_string(),
                    source: err,
                })?;
        }

        sqlx::query(r#"INSERT INTO "_migrations" ("name") VALUES ($1)"#)
            .bind(name)
            .execute(&mut *tx)
            .await
            .map_err(MigrationError::Sqlx)?;

        tx.commit().await.map_err(MigrationError::Sqlx)?;
    }

    Ok(())
}

// Migration files hold plain DDL with no procedural bodies, so splitting on
// semicolons at line ends is sufficient.
fn split_statements(sql: &str) -> Vec<String> {
    sql.split(";\n")
        .map(|chunk| chunk.trim())
        .filter(|chunk| !chunk.is_empty())
        .map(|chunk| chunk.trim_end_matches(';').to_string())
        .collect()
}

#[derive(Debug, Error)]
pub enum MigrationError {
    #[error("migration query failed: {0}")]
    Sqlx(sqlx::Error),
    #[error("migration {name} failed: {source}")]
    Failed { name: String, source: sqlx::Error },
}
