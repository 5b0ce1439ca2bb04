//! Conduit HTTP Clients
//!
//! Typed HTTP clients used across the Conduit workspace:
//! - [`PlatformClient`] reads credentials, connectors and environments from
//!   the account platform that owns them.
//! - [`ServerClient`] submits runs to a Conduit server and inspects its
//!   build records and breaker metrics.
//!
//! # Example
//!
//! ```no_run
//! use conduit_client::PlatformClient;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let client = PlatformClient::new("http://localhost:9000");
//!
//!     let environments = client.list_environments("acct-42").await?;
//!     println!("Found {} environments", environments.len());
//!     Ok(())
//! }
//! ```

pub mod error;
mod platform;
mod server;

// Re-export commonly used types
pub use error::{ClientError, Result};

use reqwest::{Client, Url};
use serde::de::DeserializeOwned;

/// HTTP client for the account platform's collaborator API
///
/// Every read is scoped to an account id; the platform enforces tenancy.
#[derive(Debug, Clone)]
pub struct PlatformClient {
    /// Base URL of the platform (e.g., "http://localhost:9000")
    base_url: String,
    /// Optional bearer token sent with every request
    auth_token: Option<String>,
    /// HTTP client instance
    client: Client,
}

impl PlatformClient {
    /// Create a new platform client
    ///
    /// # Example
    /// ```
    /// use conduit_client::PlatformClient;
    ///
    /// let client = PlatformClient::new("http://localhost:9000");
    /// ```
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(base_url, Client::new())
    }

    /// Create a new platform client with a custom HTTP client
    ///
    /// This allows you to configure timeouts, proxies, TLS settings, etc.
    ///
    /// # Example
    /// ```
    /// use conduit_client::PlatformClient;
    /// use reqwest::Client;
    /// use std::time::Duration;
    ///
    /// let http_client = Client::builder()
    ///     .timeout(Duration::from_secs(30))
    ///     .build()
    ///     .unwrap();
    ///
    /// let client = PlatformClient::with_client("http://localhost:9000", http_client);
    /// ```
    pub fn with_client(base_url: impl Into<String>, client: Client) -> Self {
        let base_url = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            auth_token: None,
            client,
        }
    }

    /// Send `token` as a bearer token on every request
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }

    /// Get the base URL of the platform
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn get(&self, url: Url) -> reqwest::RequestBuilder {
        let request = self.client.get(url);
        match &self.auth_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }
}

/// HTTP client for a Conduit server
#[derive(Debug, Clone)]
pub struct ServerClient {
    /// Base URL of the server (e.g., "http://localhost:8080")
    base_url: String,
    /// HTTP client instance
    client: Client,
}

impl ServerClient {
    /// Create a new server client
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(base_url, Client::new())
    }

    /// Create a new server client with a custom HTTP client
    pub fn with_client(base_url: impl Into<String>, client: Client) -> Self {
        let base_url = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        }
    }

    /// Get the base URL of the server
    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

// =============================================================================
// Request Helpers
// =============================================================================

/// Build a URL from a base and path segments, percent-encoding each segment
pub(crate) fn endpoint(base_url: &str, segments: &[&str]) -> Result<Url> {
    let mut url = Url::parse(base_url)
        .map_err(|e| ClientError::InvalidRequest(format!("Invalid base URL '{}': {}", base_url, e)))?;

    url.path_segments_mut()
        .map_err(|_| ClientError::InvalidRequest(format!("Base URL '{}' cannot hold a path", base_url)))?
        .pop_if_empty()
        .extend(segments);

    Ok(url)
}

// =============================================================================
// Response Handlers
// =============================================================================

/// Handle an API response and deserialize JSON
///
/// This checks the status code and returns an appropriate error if the
/// request failed, or deserializes the response body if successful.
pub(crate) async fn handle_response<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
    let status = response.status();

    if !status.is_success() {
        let error_text = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        tracing::debug!(status = status.as_u16(), "Request returned an error status");
        return Err(ClientError::api_error(status.as_u16(), error_text));
    }

    response
        .json()
        .await
        .map_err(|e| ClientError::ParseError(format!("Failed to parse JSON response: {}", e)))
}

/// Handle an API response that returns no content
pub(crate) async fn handle_empty_response(response: reqwest::Response) -> Result<()> {
    let status = response.status();

    if !status.is_success() {
        let error_text = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        return Err(ClientError::api_error(status.as_u16(), error_text));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_creation() {
        let client = PlatformClient::new("http://localhost:9000");
        assert_eq!(client.base_url(), "http://localhost:9000");
    }

    #[test]
    fn test_client_trims_trailing_slash() {
        let client = ServerClient::new("http://localhost:8080/");
        assert_eq!(client.base_url(), "http://localhost:8080");
    }

    #[test]
    fn test_endpoint_encodes_segments() {
        let url = endpoint("http://localhost:8080", &["builds", "acme", "nightly release", "1.0"])
            .unwrap();
        assert_eq!(
            url.as_str(),
            "http://localhost:8080/builds/acme/nightly%20release/1.0"
        );
    }

    #[test]
    fn test_endpoint_keeps_base_path() {
        let url = endpoint("https://platform.example/gateway", &["api", "accounts"]).unwrap();
        assert_eq!(url.as_str(), "https://platform.example/gateway/api/accounts");
    }

    #[test]
    fn test_endpoint_rejects_invalid_base() {
        assert!(matches!(
            endpoint("not a url", &["x"]),
            Err(ClientError::InvalidRequest(_))
        ));
    }
}
