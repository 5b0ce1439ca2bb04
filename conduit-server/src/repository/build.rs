//! Build Repository
//!
//! Stored definitions and the latest run status of each build, keyed by
//! `(customer_id, pipeline_name, build_version)`.

use chrono::{DateTime, Utc};
use conduit_core::dto::build::{BuildRecord, BuildStatusUpdate, StoreDefinition, StoredDefinition};
use sqlx::PgPool;

/// Insert or replace the definition of a build, clearing its run status
pub async fn upsert_definition(
    pool: &PgPool,
    customer_id: &str,
    pipeline_name: &str,
    build_version: &str,
    req: &StoreDefinition,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO pipeline_builds (
            customer_id, pipeline_name, build_version, definition_text, stages_state,
            created_by, pipeline_id, build_job_id, updated_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        ON CONFLICT (customer_id, pipeline_name, build_version) DO UPDATE
        SET definition_text = EXCLUDED.definition_text,
            stages_state = EXCLUDED.stages_state,
            created_by = EXCLUDED.created_by,
            pipeline_id = EXCLUDED.pipeline_id,
            build_job_id = EXCLUDED.build_job_id,
            status = NULL,
            execution_id = NULL,
            error_message = NULL,
            started_at = NULL,
            completed_at = NULL,
            updated_at = EXCLUDED.updated_at
        "#,
    )
    .bind(customer_id)
    .bind(pipeline_name)
    .bind(build_version)
    .bind(&req.definition_text)
    .bind(&req.stages_state)
    .bind(&req.created_by)
    .bind(&req.pipeline_id)
    .bind(&req.build_job_id)
    .bind(Utc::now())
    .execute(pool)
    .await?;

    Ok(())
}

/// Find the stored definition of a build
pub async fn find_definition(
    pool: &PgPool,
    customer_id: &str,
    pipeline_name: &str,
    build_version: &str,
) -> Result<Option<StoredDefinition>, sqlx::Error> {
    let row = sqlx::query_as::<_, DefinitionRow>(
        r#"
        SELECT definition_text, stages_state, created_by, pipeline_id, build_job_id
        FROM pipeline_builds
        WHERE customer_id = $1 AND pipeline_name = $2 AND build_version = $3
        "#,
    )
    .bind(customer_id)
    .bind(pipeline_name)
    .bind(build_version)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|r| r.into()))
}

/// Whether an update continues the run already on the record
///
/// Only updates carrying an execution id do. Anything else (a definition
/// that failed to parse) replaces the previous run's id and start time.
fn continues_run(update: &BuildStatusUpdate) -> bool {
    update.execution_id.is_some()
}

/// Write run status fields
///
/// `started_at` is kept from the record when the update continues the run
/// and has none of its own.
pub async fn update_status(
    pool: &PgPool,
    customer_id: &str,
    pipeline_name: &str,
    build_version: &str,
    update: &BuildStatusUpdate,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE pipeline_builds
        SET status = $1, execution_id = $2, error_message = $3,
            started_at = CASE WHEN $10 THEN COALESCE($4, started_at) ELSE $4 END,
            completed_at = $5, updated_at = $6
        WHERE customer_id = $7 AND pipeline_name = $8 AND build_version = $9
        "#,
    )
    .bind(update.status.as_str())
    .bind(&update.execution_id)
    .bind(&update.error_message)
    .bind(update.started_at)
    .bind(update.completed_at)
    .bind(Utc::now())
    .bind(customer_id)
    .bind(pipeline_name)
    .bind(build_version)
    .bind(continues_run(update))
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Find a build record with its status
pub async fn find_record(
    pool: &PgPool,
    customer_id: &str,
    pipeline_name: &str,
    build_version: &str,
) -> Result<Option<BuildRecord>, sqlx::Error> {
    let row = sqlx::query_as::<_, BuildRow>(
        r#"
        SELECT customer_id, pipeline_name, build_version, status, execution_id,
               error_message, started_at, completed_at, created_by, updated_at
        FROM pipeline_builds
        WHERE customer_id = $1 AND pipeline_name = $2 AND build_version = $3
        "#,
    )
    .bind(customer_id)
    .bind(pipeline_name)
    .bind(build_version)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|r| r.into()))
}

// =============================================================================
// Database Row Types
// =============================================================================

#[derive(sqlx::FromRow)]
struct DefinitionRow {
    definition_text: Option<String>,
    stages_state: Option<serde_json::Value>,
    created_by: Option<String>,
    pipeline_id: Option<String>,
    build_job_id: Option<String>,
}

impl From<DefinitionRow> for StoredDefinition {
    fn from(row: DefinitionRow) -> Self {
        StoredDefinition {
            definition_text: row.definition_text,
            stages_state: row.stages_state,
            created_by: row.created_by,
            pipeline_id: row.pipeline_id,
            build_job_id: row.build_job_id,
        }
    }
}

#[derive(sqlx::FromRow)]
struct BuildRow {
    customer_id: String,
    pipeline_name: String,
    build_version: String,
    status: Option<String>,
    execution_id: Option<String>,
    error_message: Option<String>,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    created_by: Option<String>,
    updated_at: DateTime<Utc>,
}

impl From<BuildRow> for BuildRecord {
    fn from(row: BuildRow) -> Self {
        BuildRecord {
            customer_id: row.customer_id,
            pipeline_name: row.pipeline_name,
            build_version: row.build_version,
            status: row.status.and_then(|s| s.parse().ok()),
            execution_id: row.execution_id,
            error_message: row.error_message,
            started_at: row.started_at,
            completed_at: row.completed_at,
            created_by: row.created_by,
            updated_at: row.updated_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use conduit_core::domain::execution::ExecutionStatus;

    #[test]
    fn test_failure_without_execution_does_not_continue_run() {
        let parse_failure = BuildStatusUpdate {
            status: ExecutionStatus::Failed,
            execution_id: None,
            error_message: Some("definition has no 'nodes' list".to_string()),
            started_at: None,
            completed_at: Some(Utc::now()),
        };
        assert!(!continues_run(&parse_failure));

        assert!(continues_run(&BuildStatusUpdate::running("e1")));
        assert!(continues_run(&BuildStatusUpdate::finished("e1", None)));
    }
}
