//! Issue tracker REST client

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;

use super::{HttpAuth, join, send_json};
use crate::error::Result;

#[async_trait]
pub trait IssueTracker: Send + Sync {
    /// Fetches one issue by key
    async fn fetch_issue(&self, base_url: &str, auth: &HttpAuth, key: &str) -> Result<Value>;

    /// Fetches the identity the credentials belong to
    async fn fetch_myself(&self, base_url: &str, auth: &HttpAuth) -> Result<Value>;
}

pub struct HttpIssueTracker {
    client: Client,
}

impl HttpIssueTracker {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl IssueTracker for HttpIssueTracker {
    async fn fetch_issue(&self, base_url: &str, auth: &HttpAuth, key: &str) -> Result<Value> {
        let url = join(base_url, &format!("/rest/api/2/issue/{}", key));
        let request = auth.apply(self.client.get(url).header("Accept", "application/json"));

        send_json(request).await
    }

    async fn fetch_myself(&self, base_url: &str, auth: &HttpAuth) -> Result<Value> {
        let url = join(base_url, "/rest/api/2/myself");
        let request = auth.apply(self.client.get(url).header("Accept", "application/json"));

        send_json(request).await
    }
}
