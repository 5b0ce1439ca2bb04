//! Platform repositories
//!
//! Read-only access to account-scoped credentials, connectors and
//! environments.

use async_trait::async_trait;
use conduit_client::PlatformClient;
use conduit_core::domain::auth::{Connector, Credential, Environment};

use crate::error::Result;

/// Repository trait for credential records
#[async_trait]
pub trait CredentialRepository: Send + Sync {
    /// Fetches one credential, scoped to the owning account
    async fn find_credential(&self, id: &str, account_id: &str) -> Result<Credential>;

    /// Fetches every credential of an account
    ///
    /// Used to match environment entries by credential name.
    async fn list_credentials(&self, account_id: &str) -> Result<Vec<Credential>>;
}

/// Repository trait for connector records
#[async_trait]
pub trait ConnectorRepository: Send + Sync {
    async fn find_connector(&self, id: &str, account_id: &str) -> Result<Connector>;
}

/// Repository trait for environment records
#[async_trait]
pub trait EnvironmentRepository: Send + Sync {
    async fn list_environments(&self, account_id: &str) -> Result<Vec<Environment>>;
}

/// HTTP implementation of the platform repositories
pub struct HttpPlatformRepository {
    client: PlatformClient,
}

impl HttpPlatformRepository {
    /// Creates a new HTTP platform repository
    ///
    /// # Arguments
    /// * `client` - Platform client, already configured with timeout and token
    pub fn new(client: PlatformClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl CredentialRepository for HttpPlatformRepository {
    async fn find_credential(&self, id: &str, account_id: &str) -> Result<Credential> {
        Ok(self.client.get_credential(id, account_id).await?)
    }

    async fn list_credentials(&self, account_id: &str) -> Result<Vec<Credential>> {
        Ok(self.client.list_credentials(account_id).await?)
    }
}

#[async_trait]
impl ConnectorRepository for HttpPlatformRepository {
    async fn find_connector(&self, id: &str, account_id: &str) -> Result<Connector> {
        Ok(self.client.get_connector(id, account_id).await?)
    }
}

#[async_trait]
impl EnvironmentRepository for HttpPlatformRepository {
    async fn list_environments(&self, account_id: &str) -> Result<Vec<Environment>> {
        Ok(self.client.list_environments(account_id).await?)
    }
}
