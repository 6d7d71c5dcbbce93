//! PostgreSQL migration management

use sqlx::PgPool;

use super::schema::{SCHEMA, SCHEMA_VERSION};
use crate::data::error::StoreError;

/// Run all pending migrations.
pub async fn run_migrations(pool: &PgPool) -> Result<(), StoreError> {
    let table_exists: bool = sqlx::query_scalar(
        r#"
        SELECT EXISTS (
            SELECT FROM information_schema.tables
            WHERE table_schema = 'public'
            AND table_name = 'schema_version'
        )
        "#,
    )
    .fetch_one(pool)
    .await?;

    if !table_exists {
        tracing::debug!(version = SCHEMA_VERSION, "applying initial schema");
        return apply_initial_schema(pool).await;
    }

    let current_version: Option<i32> =
        sqlx::query_scalar("SELECT version FROM schema_version WHERE id = 1")
            .fetch_optional(pool)
            .await?;

    match current_version {
        None => {
            tracing::debug!(version = SCHEMA_VERSION, "applying initial schema");
            apply_initial_schema(pool).await?;
        }
        Some(v) if v < SCHEMA_VERSION => {
            tracing::debug!(from = v, to = SCHEMA_VERSION, "migrating schema");
            for version in (v + 1)..=SCHEMA_VERSION {
                apply_versioned_migration(pool, version).await?;
            }
        }
        Some(v) if v > SCHEMA_VERSION => {
            tracing::warn!(
                stored = v,
                supported = SCHEMA_VERSION,
                "schema is newer than this binary; proceeding anyway"
            );
        }
        _ => {
            tracing::debug!(version = SCHEMA_VERSION, "schema is up to date");
        }
    }

    Ok(())
}

async fn apply_initial_schema(pool: &PgPool) -> Result<(), StoreError> {
    let now = chrono::Utc::now().timestamp();
    sqlx::query(SCHEMA).execute(pool).await?;
    sqlx::query(
        "INSERT INTO schema_version (id, version, applied_at) VALUES (1, $1, $2)
         ON CONFLICT (id) DO UPDATE SET version = $1, applied_at = $2",
    )
    .bind(SCHEMA_VERSION)
    .bind(now)
    .execute(pool)
    .await?;
    Ok(())
}

async fn apply_versioned_migration(pool: &PgPool, version: i32) -> Result<(), StoreError> {
    // v1 is the initial schema; later versions add their statements here.
    let statements: &[&str] = match version {
        1 => &[],
        _ => {
            return Err(StoreError::MigrationFailed {
                version,
                error: "unknown target version".into(),
            });
        }
    };

    for statement in statements {
        sqlx::query(statement)
            .execute(pool)
            .await
            .map_err(|e| StoreError::MigrationFailed {
                version,
                error: e.to_string(),
            })?;
    }

    sqlx::query("UPDATE schema_version SET version = $1, applied_at = $2 WHERE id = 1")
        .bind(version)
        .bind(chrono::Utc::now().timestamp())
        .execute(pool)
        .await?;
    Ok(())
}
