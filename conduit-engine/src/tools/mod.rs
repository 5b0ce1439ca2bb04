//! External tool clients
//!
//! One trait per tool family so handlers can be exercised against fakes.
//! The HTTP implementations share a `reqwest::Client` built with the
//! configured request timeout and never retry on their own.

mod integration;
mod issue_tracker;
mod source_control;

pub use integration::{HttpIntegrationPlatform, IntegrationPlatform};
pub use issue_tracker::{HttpIssueTracker, IssueTracker};
pub use source_control::{HttpSourceControl, SourceControl};

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use reqwest::{Client, RequestBuilder, Response};
use serde_json::Value;

use crate::error::{EngineError, Result};

/// Credentials attached to an outbound tool request
#[derive(Clone, PartialEq, Eq)]
pub enum HttpAuth {
    Bearer(String),
    Basic { username: String, password: String },
}

impl HttpAuth {
    fn apply(&self, request: RequestBuilder) -> RequestBuilder {
        match self {
            HttpAuth::Bearer(token) => request.bearer_auth(token),
            HttpAuth::Basic { username, password } => request.basic_auth(username, Some(password)),
        }
    }
}

impl fmt::Debug for HttpAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HttpAuth::Bearer(_) => f.write_str("Bearer(***)"),
            HttpAuth::Basic { username, .. } => write!(f, "Basic({}:***)", username),
        }
    }
}

/// The tool clients handed to stage handlers
#[derive(Clone)]
pub struct ToolSet {
    pub issue_tracker: Arc<dyn IssueTracker>,
    pub source_control: Arc<dyn SourceControl>,
    pub integration: Arc<dyn IntegrationPlatform>,
}

impl ToolSet {
    /// HTTP clients for every tool, sharing one connection pool
    pub fn http(timeout: Duration) -> Result<Self> {
        let client = http_client(timeout)?;
        Ok(Self {
            issue_tracker: Arc::new(HttpIssueTracker::new(client.clone())),
            source_control: Arc::new(HttpSourceControl::new(client.clone())),
            integration: Arc::new(HttpIntegrationPlatform::new(client)),
        })
    }
}

/// Build an HTTP client with an explicit request timeout
pub fn http_client(timeout: Duration) -> Result<Client> {
    Ok(Client::builder()
        .timeout(timeout)
        .user_agent(concat!("conduit/", env!("CARGO_PKG_VERSION")))
        .build()?)
}

/// Fail with an external error unless the response is a success
async fn ensure_success(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(EngineError::from_response(status.as_u16(), &body))
}

async fn send_json(request: RequestBuilder) -> Result<Value> {
    let response = ensure_success(request.send().await?).await?;
    Ok(response.json::<Value>().await?)
}

/// Join a base URL and an absolute path without doubling slashes
fn join(base: &str, path: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_normalizes_slashes() {
        assert_eq!(join("https://x.io/", "/rest/api/2/myself"), "https://x.io/rest/api/2/myself");
        assert_eq!(join("https://x.io", "repos/a/b"), "https://x.io/repos/a/b");
    }

    #[test]
    fn test_http_auth_debug_is_redacted() {
        let basic = HttpAuth::Basic {
            username: "ops".to_string(),
            password: "hunter2".to_string(),
        };
        assert_eq!(format!("{:?}", basic), "Basic(ops:***)");
        assert_eq!(format!("{:?}", HttpAuth::Bearer("t0k".to_string())), "Bearer(***)");
    }
}
