//! Repository layer
//!
//! Narrow, trait-based interfaces to the collaborators the engine reads
//! from and writes to. Implementations hold no business logic; the
//! resilience layer is applied by callers.
//!
//! - [`HttpPlatformRepository`] serves credentials, connectors and
//!   environments from the account platform.
//! - Stored definitions, build records and execution records are provided
//!   by the host (the server backs them with Postgres).

mod builds;
mod platform;

use std::sync::Arc;

// Re-export traits
pub use builds::{BuildStatusRepository, DefinitionRepository, ExecutionRepository};
pub use platform::{ConnectorRepository, CredentialRepository, EnvironmentRepository};

// Re-export implementations
pub use platform::HttpPlatformRepository;

/// Every collaborator the orchestrator needs, shared by `Arc`
#[derive(Clone)]
pub struct Collaborators {
    pub credentials: Arc<dyn CredentialRepository>,
    pub connectors: Arc<dyn ConnectorRepository>,
    pub environments: Arc<dyn EnvironmentRepository>,
    pub definitions: Arc<dyn DefinitionRepository>,
    pub builds: Arc<dyn BuildStatusRepository>,
    pub executions: Arc<dyn ExecutionRepository>,
}
