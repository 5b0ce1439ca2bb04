//! Integration platform client
//!
//! OAuth2 client-credentials token exchange plus the OData design-time
//! artifact endpoints.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use super::{HttpAuth, ensure_success, join};
use crate::error::{EngineError, Result};

#[async_trait]
pub trait IntegrationPlatform: Send + Sync {
    /// Exchanges client credentials for an access token
    async fn fetch_token(
        &self,
        token_url: &str,
        client_id: &str,
        client_secret: &str,
    ) -> Result<String>;

    /// Cheap authenticated call proving the API is reachable
    async fn probe(&self, api_url: &str, token: &str) -> Result<()>;

    /// Downloads one design-time artifact, returning its content
    async fn download_artifact(
        &self,
        api_url: &str,
        token: &str,
        collection: &str,
        id: &str,
        version: &str,
    ) -> Result<Vec<u8>>;
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

pub struct HttpIntegrationPlatform {
    client: Client,
}

impl HttpIntegrationPlatform {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl IntegrationPlatform for HttpIntegrationPlatform {
    async fn fetch_token(
        &self,
        token_url: &str,
        client_id: &str,
        client_secret: &str,
    ) -> Result<String> {
        let request = HttpAuth::Basic {
            username: client_id.to_string(),
            password: client_secret.to_string(),
        }
        .apply(
            self.client
                .post(token_url)
                .form(&[("grant_type", "client_credentials")]),
        );

        let response = ensure_success(request.send().await?).await?;
        let token: TokenResponse = response.json().await?;

        if token.access_token.is_empty() {
            return Err(EngineError::MissingCredentials(
                "token endpoint returned an empty access token".to_string(),
            ));
        }
        Ok(token.access_token)
    }

    async fn probe(&self, api_url: &str, token: &str) -> Result<()> {
        let url = join(api_url, "/api/v1/IntegrationPackages?$top=1");
        let request = self
            .client
            .get(url)
            .bearer_auth(token)
            .header("Accept", "application/json");

        ensure_success(request.send().await?).await?;
        Ok(())
    }

    async fn download_artifact(
        &self,
        api_url: &str,
        token: &str,
        collection: &str,
        id: &str,
        version: &str,
    ) -> Result<Vec<u8>> {
        let url = join(
            api_url,
            &format!(
                "/api/v1/{}(Id='{}',Version='{}')/$value",
                collection,
                odata_quote(id),
                odata_quote(version)
            ),
        );
        let request = self.client.get(url).bearer_auth(token);

        let response = ensure_success(request.send().await?).await?;
        Ok(response.bytes().await?.to_vec())
    }
}

/// Escape a value for an OData single-quoted literal
fn odata_quote(value: &str) -> String {
    value.replace('\'', "''")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_odata_quote() {
        assert_eq!(odata_quote("Order's_Flow"), "Order''s_Flow");
        assert_eq!(odata_quote("active"), "active");
    }
}
