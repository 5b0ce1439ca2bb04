//! Source control REST client

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;

use super::{HttpAuth, join, send_json};
use crate::error::Result;

#[async_trait]
pub trait SourceControl: Send + Sync {
    /// Fetches repository metadata
    async fn fetch_repository(
        &self,
        api_url: &str,
        auth: &HttpAuth,
        owner: &str,
        repo: &str,
    ) -> Result<Value>;

    /// Fetches metadata of one branch
    async fn fetch_branch(
        &self,
        api_url: &str,
        auth: &HttpAuth,
        owner: &str,
        repo: &str,
        branch: &str,
    ) -> Result<Value>;
}

pub struct HttpSourceControl {
    client: Client,
}

impl HttpSourceControl {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn get(&self, url: String, auth: &HttpAuth) -> reqwest::RequestBuilder {
        auth.apply(
            self.client
                .get(url)
                .header("Accept", "application/vnd.github+json"),
        )
    }
}

#[async_trait]
impl SourceControl for HttpSourceControl {
    async fn fetch_repository(
        &self,
        api_url: &str,
        auth: &HttpAuth,
        owner: &str,
        repo: &str,
    ) -> Result<Value> {
        let url = join(api_url, &format!("/repos/{}/{}", owner, repo));
        send_json(self.get(url, auth)).await
    }

    async fn fetch_branch(
        &self,
        api_url: &str,
        auth: &HttpAuth,
        owner: &str,
        repo: &str,
        branch: &str,
    ) -> Result<Value> {
        let url = join(api_url, &format!("/repos/{}/{}/branches/{}", owner, repo, branch));
        send_json(self.get(url, auth)).await
    }
}
