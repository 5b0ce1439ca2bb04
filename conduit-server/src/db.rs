use sqlx::{PgPool, postgres::PgPoolOptions};
use std::time::Duration;

pub async fn create_pool(database_url: &str) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .acquire_timeout(Duration::from_secs(5))
        .connect(database_url)
        .await
}

pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::Error> {
    // Create pipeline builds table
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS pipeline_builds (
            customer_id VARCHAR(255) NOT NULL,
            pipeline_name VARCHAR(255) NOT NULL,
            build_version VARCHAR(255) NOT NULL,
            definition_text TEXT,
            stages_state JSONB,
            created_by VARCHAR(255),
            pipeline_id VARCHAR(255),
            build_job_id VARCHAR(255),
            status VARCHAR(50),
            execution_id VARCHAR(255),
            error_message TEXT,
            started_at TIMESTAMPTZ,
            completed_at TIMESTAMPTZ,
            updated_at TIMESTAMPTZ NOT NULL,
            PRIMARY KEY (customer_id, pipeline_name, build_version)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Create executions table
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS executions (
            execution_id VARCHAR(255) PRIMARY KEY,
            account_id VARCHAR(255) NOT NULL,
            status VARCHAR(50) NOT NULL,
            started_at TIMESTAMPTZ NOT NULL,
            completed_at TIMESTAMPTZ,
            error_message TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_executions_account_id ON executions(account_id)")
        .execute(pool)
        .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_pipeline_builds_status ON pipeline_builds(status)")
        .execute(pool)
        .await?;

    tracing::info!("Database migrations completed successfully");
    Ok(())
}
