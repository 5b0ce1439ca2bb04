//! Account platform endpoints
//!
//! Read-only access to the records the engine resolves authentication from.

use crate::error::Result;
use crate::{PlatformClient, endpoint, handle_response};
use conduit_core::domain::auth::{Connector, Credential, Environment};

impl PlatformClient {
    // =============================================================================
    // Credentials
    // =============================================================================

    /// Get a credential by ID, scoped to an account
    ///
    /// # Arguments
    /// * `id` - The credential ID
    /// * `account_id` - The owning account
    ///
    /// # Returns
    /// The credential record with its raw, unnormalized fields
    ///
    /// # Example
    /// ```no_run
    /// # use conduit_client::PlatformClient;
    /// # async fn example() -> anyhow::Result<()> {
    /// let client = PlatformClient::new("http://localhost:9000");
    /// let credential = client.get_credential("cred-1", "acct-42").await?;
    /// println!("{:?}", credential);
    /// # Ok(())
    /// # }
    /// ```
    pub async fn get_credential(&self, id: &str, account_id: &str) -> Result<Credential> {
        let url = endpoint(
            &self.base_url,
            &["api", "accounts", account_id, "credentials", id],
        )?;
        let response = self.get(url).send().await?;

        handle_response(response).await
    }

    /// List every credential of an account
    pub async fn list_credentials(&self, account_id: &str) -> Result<Vec<Credential>> {
        let url = endpoint(&self.base_url, &["api", "accounts", account_id, "credentials"])?;
        let response = self.get(url).send().await?;

        handle_response(response).await
    }

    // =============================================================================
    // Connectors and Environments
    // =============================================================================

    /// Get a connector by ID, scoped to an account
    pub async fn get_connector(&self, id: &str, account_id: &str) -> Result<Connector> {
        let url = endpoint(
            &self.base_url,
            &["api", "accounts", account_id, "connectors", id],
        )?;
        let response = self.get(url).send().await?;

        handle_response(response).await
    }

    /// List every environment of an account
    pub async fn list_environments(&self, account_id: &str) -> Result<Vec<Environment>> {
        let url = endpoint(&self.base_url, &["api", "accounts", account_id, "environments"])?;
        let response = self.get(url).send().await?;

        handle_response(response).await
    }
}
