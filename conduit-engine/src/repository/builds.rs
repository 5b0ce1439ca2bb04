//! Build and execution record repositories
//!
//! Writes through these traits are best-effort from the orchestrator's
//! point of view: a failed write never changes a run's outcome.

use async_trait::async_trait;
use conduit_core::domain::execution::ExecutionRecord;
use conduit_core::dto::build::{BuildStatusUpdate, StoredDefinition};

use crate::error::Result;

/// Repository trait for stored pipeline definitions
#[async_trait]
pub trait DefinitionRepository: Send + Sync {
    /// Fetches the stored definition of one build
    ///
    /// Returns `Ok(None)` when no such build exists.
    async fn fetch_stored_definition(
        &self,
        customer_id: &str,
        pipeline_name: &str,
        build_version: &str,
    ) -> Result<Option<StoredDefinition>>;
}

/// Repository trait for build status records
#[async_trait]
pub trait BuildStatusRepository: Send + Sync {
    async fn update_build_status(
        &self,
        customer_id: &str,
        pipeline_name: &str,
        build_version: &str,
        update: &BuildStatusUpdate,
    ) -> Result<()>;
}

/// Repository trait for execution records
#[async_trait]
pub trait ExecutionRepository: Send + Sync {
    /// Inserts or updates the record keyed by its execution id
    async fn record_execution(&self, record: &ExecutionRecord) -> Result<()>;
}
