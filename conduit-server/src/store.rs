//! Postgres-backed engine collaborators
//!
//! Implements the engine's definition, build-status and execution
//! repositories over the server's tables.

use async_trait::async_trait;
use conduit_core::domain::execution::ExecutionRecord;
use conduit_core::dto::build::{BuildStatusUpdate, StoredDefinition};
use conduit_engine::EngineError;
use conduit_engine::repository::{BuildStatusRepository, DefinitionRepository, ExecutionRepository};
use sqlx::PgPool;

use crate::repository::{build_repository, execution_repository};

/// Engine store over a shared pool
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Database errors reach the engine as external failures of the store
fn store_error(err: sqlx::Error) -> EngineError {
    let code = match &err {
        sqlx::Error::PoolTimedOut => Some("ServiceUnavailable".to_string()),
        sqlx::Error::Io(_) => Some("ServiceUnavailable".to_string()),
        _ => None,
    };
    EngineError::External {
        status: None,
        code,
        message: format!("database error: {}", err),
    }
}

#[async_trait]
impl DefinitionRepository for PgStore {
    async fn fetch_stored_definition(
        &self,
        customer_id: &str,
        pipeline_name: &str,
        build_version: &str,
    ) -> conduit_engine::Result<Option<StoredDefinition>> {
        build_repository::find_definition(&self.pool, customer_id, pipeline_name, build_version)
            .await
            .map_err(store_error)
    }
}

#[async_trait]
impl BuildStatusRepository for PgStore {
    async fn update_build_status(
        &self,
        customer_id: &str,
        pipeline_name: &str,
        build_version: &str,
        update: &BuildStatusUpdate,
    ) -> conduit_engine::Result<()> {
        let updated = build_repository::update_status(
            &self.pool,
            customer_id,
            pipeline_name,
            build_version,
            update,
        )
        .await
        .map_err(store_error)?;

        if !updated {
            return Err(EngineError::NotFound(format!(
                "build {}/{}/{}",
                customer_id, pipeline_name, build_version
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl ExecutionRepository for PgStore {
    async fn record_execution(&self, record: &ExecutionRecord) -> conduit_engine::Result<()> {
        execution_repository::upsert(&self.pool, record)
            .await
            .map_err(store_error)
    }
}
