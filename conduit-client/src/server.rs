//! Conduit server endpoints

use crate::error::Result;
use crate::{ServerClient, endpoint, handle_empty_response, handle_response};
use conduit_core::domain::breaker::BreakerSnapshot;
use conduit_core::dto::build::{BuildRecord, StoreDefinition};
use conduit_core::dto::invocation::{DirectInvocation, Invocation, ReferenceInvocation};
use conduit_core::dto::run::RunOutcome;
use serde_json::Value;

impl ServerClient {
    // =============================================================================
    // Runs
    // =============================================================================

    /// Submit a run of either shape
    pub async fn run(&self, invocation: &Invocation) -> Result<RunOutcome> {
        let url = endpoint(&self.base_url, &["run"])?;
        let response = self.client.post(url).json(invocation).send().await?;

        handle_response(response).await
    }

    /// Submit a run with an already-parsed pipeline
    ///
    /// # Example
    /// ```no_run
    /// # use conduit_client::ServerClient;
    /// # use conduit_core::dto::invocation::DirectInvocation;
    /// # async fn example(invocation: DirectInvocation) -> anyhow::Result<()> {
    /// let client = ServerClient::new("http://localhost:8080");
    /// let outcome = client.run_direct(&invocation).await?;
    /// println!("run finished with {}", outcome.status);
    /// # Ok(())
    /// # }
    /// ```
    pub async fn run_direct(&self, invocation: &DirectInvocation) -> Result<RunOutcome> {
        let url = endpoint(&self.base_url, &["run", "direct"])?;
        let response = self.client.post(url).json(invocation).send().await?;

        handle_response(response).await
    }

    /// Submit a run of a stored definition
    pub async fn run_by_reference(&self, invocation: &ReferenceInvocation) -> Result<RunOutcome> {
        let url = endpoint(&self.base_url, &["run", "reference"])?;
        let response = self.client.post(url).json(invocation).send().await?;

        handle_response(response).await
    }

    // =============================================================================
    // Builds
    // =============================================================================

    /// Store a definition so it can be run by reference
    pub async fn store_definition(
        &self,
        customer_id: &str,
        pipeline_name: &str,
        build_version: &str,
        req: &StoreDefinition,
    ) -> Result<()> {
        let url = endpoint(
            &self.base_url,
            &["builds", customer_id, pipeline_name, build_version],
        )?;
        let response = self.client.put(url).json(req).send().await?;

        handle_empty_response(response).await
    }

    /// Get a build record with its latest status
    pub async fn get_build(
        &self,
        customer_id: &str,
        pipeline_name: &str,
        build_version: &str,
    ) -> Result<BuildRecord> {
        let url = endpoint(
            &self.base_url,
            &["builds", customer_id, pipeline_name, build_version],
        )?;
        let response = self.client.get(url).send().await?;

        handle_response(response).await
    }

    // =============================================================================
    // Health
    // =============================================================================

    /// Current metrics of every circuit breaker
    pub async fn breakers(&self) -> Result<Vec<BreakerSnapshot>> {
        let url = endpoint(&self.base_url, &["health", "breakers"])?;
        let response = self.client.get(url).send().await?;

        handle_response(response).await
    }

    /// Liveness probe
    pub async fn health(&self) -> Result<Value> {
        let url = endpoint(&self.base_url, &["health"])?;
        let response = self.client.get(url).send().await?;

        handle_response(response).await
    }
}
