//! Execution Repository
//!
//! One row per direct run, written as the run progresses.

use conduit_core::domain::execution::ExecutionRecord;
use sqlx::PgPool;

/// Insert or update an execution record by its id
pub async fn upsert(pool: &PgPool, record: &ExecutionRecord) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO executions (
            execution_id, account_id, status, started_at, completed_at, error_message
        )
        VALUES ($1, $2, $3, $4, $5, $6)
        ON CONFLICT (execution_id) DO UPDATE
        SET status = EXCLUDED.status,
            completed_at = EXCLUDED.completed_at,
            error_message = EXCLUDED.error_message
        "#,
    )
    .bind(&record.execution_id)
    .bind(&record.account_id)
    .bind(record.status.as_str())
    .bind(record.started_at)
    .bind(record.completed_at)
    .bind(&record.error_message)
    .execute(pool)
    .await?;

    Ok(())
}
