//! In-memory collaborators and tools for unit tests

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use conduit_core::domain::auth::{Connector, Credential, Environment};
use conduit_core::domain::execution::ExecutionRecord;
use conduit_core::dto::build::{BuildStatusUpdate, StoredDefinition};
use serde_json::{Value, json};

use crate::error::{EngineError, Result};
use crate::repository::{
    BuildStatusRepository, Collaborators, ConnectorRepository, CredentialRepository,
    DefinitionRepository, EnvironmentRepository, ExecutionRepository,
};
use crate::resilience::{Breakers, Resilience, RetryOptions};
use crate::tools::{HttpAuth, IntegrationPlatform, IssueTracker, SourceControl, ToolSet};

/// Retries without real waiting, default breakers
pub fn fast_resilience() -> Resilience {
    Resilience::new(
        Arc::new(Breakers::default()),
        RetryOptions {
            max_attempts: 3,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(1),
            jitter_factor: 0.0,
        },
    )
}

type BuildKey = (String, String, String);

/// Every repository backed by maps, with call counters
#[derive(Default)]
pub struct FakeStore {
    credentials: Vec<Credential>,
    connectors: Vec<Connector>,
    environments: Vec<Environment>,
    definitions: HashMap<BuildKey, StoredDefinition>,
    fail_writes: AtomicBool,
    build_updates: Mutex<Vec<BuildStatusUpdate>>,
    executions: Mutex<Vec<ExecutionRecord>>,
    credential_calls: AtomicU32,
    connector_calls: AtomicU32,
    environment_calls: AtomicU32,
}

fn key(customer_id: &str, pipeline_name: &str, build_version: &str) -> BuildKey {
    (
        customer_id.to_string(),
        pipeline_name.to_string(),
        build_version.to_string(),
    )
}

impl FakeStore {
    pub fn with_credential(mut self, credential: Credential) -> Self {
        self.credentials.push(credential);
        self
    }

    pub fn with_connector(mut self, connector: Connector) -> Self {
        self.connectors.push(connector);
        self
    }

    pub fn with_environment(mut self, environment: Environment) -> Self {
        self.environments.push(environment);
        self
    }

    pub fn with_definition(
        mut self,
        customer_id: &str,
        pipeline_name: &str,
        build_version: &str,
        stored: StoredDefinition,
    ) -> Self {
        self.definitions
            .insert(key(customer_id, pipeline_name, build_version), stored);
        self
    }

    /// Make every status write fail with a non-transient error
    pub fn failing_writes(self) -> Self {
        self.fail_writes.store(true, Ordering::SeqCst);
        self
    }

    pub fn collaborators(self: Arc<Self>) -> Collaborators {
        Collaborators {
            credentials: self.clone(),
            connectors: self.clone(),
            environments: self.clone(),
            definitions: self.clone(),
            builds: self.clone(),
            executions: self,
        }
    }

    pub fn credential_calls(&self) -> u32 {
        self.credential_calls.load(Ordering::SeqCst)
    }

    pub fn connector_calls(&self) -> u32 {
        self.connector_calls.load(Ordering::SeqCst)
    }

    pub fn environment_calls(&self) -> u32 {
        self.environment_calls.load(Ordering::SeqCst)
    }

    pub fn build_updates(&self) -> Vec<BuildStatusUpdate> {
        self.build_updates.lock().unwrap().clone()
    }

    pub fn executions(&self) -> Vec<ExecutionRecord> {
        self.executions.lock().unwrap().clone()
    }

    fn check_writable(&self) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(EngineError::External {
                status: Some(400),
                code: Some("ValidationException".to_string()),
                message: "write rejected".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl CredentialRepository for FakeStore {
    async fn find_credential(&self, id: &str, account_id: &str) -> Result<Credential> {
        self.credential_calls.fetch_add(1, Ordering::SeqCst);
        self.credentials
            .iter()
            .find(|c| c.id == id && c.account_id == account_id)
            .cloned()
            .ok_or_else(|| EngineError::NotFound(format!("credential {}", id)))
    }

    async fn list_credentials(&self, account_id: &str) -> Result<Vec<Credential>> {
        self.credential_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .credentials
            .iter()
            .filter(|c| c.account_id == account_id)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl ConnectorRepository for FakeStore {
    async fn find_connector(&self, id: &str, _account_id: &str) -> Result<Connector> {
        self.connector_calls.fetch_add(1, Ordering::SeqCst);
        self.connectors
            .iter()
            .find(|c| c.id == id)
            .cloned()
            .ok_or_else(|| EngineError::NotFound(format!("connector {}", id)))
    }
}

#[async_trait]
impl EnvironmentRepository for FakeStore {
    async fn list_environments(&self, _account_id: &str) -> Result<Vec<Environment>> {
        self.environment_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.environments.clone())
    }
}

#[async_trait]
impl DefinitionRepository for FakeStore {
    async fn fetch_stored_definition(
        &self,
        customer_id: &str,
        pipeline_name: &str,
        build_version: &str,
    ) -> Result<Option<StoredDefinition>> {
        Ok(self
            .definitions
            .get(&key(customer_id, pipeline_name, build_version))
            .cloned())
    }
}

#[async_trait]
impl BuildStatusRepository for FakeStore {
    async fn update_build_status(
        &self,
        _customer_id: &str,
        _pipeline_name: &str,
        _build_version: &str,
        update: &BuildStatusUpdate,
    ) -> Result<()> {
        self.check_writable()?;
        self.build_updates.lock().unwrap().push(update.clone());
        Ok(())
    }
}

#[async_trait]
impl ExecutionRepository for FakeStore {
    async fn record_execution(&self, record: &ExecutionRecord) -> Result<()> {
        self.check_writable()?;
        self.executions.lock().unwrap().push(record.clone());
        Ok(())
    }
}

/// Tool fakes answering canned payloads, counting every call
#[derive(Default)]
pub struct CountingTools {
    counters: Arc<Counters>,
    delay: Duration,
}

#[derive(Default)]
struct Counters {
    issue_tracker: AtomicU32,
    source_control: AtomicU32,
    integration: AtomicU32,
}

struct FakeTool {
    counters: Arc<Counters>,
    delay: Duration,
}

impl FakeTool {
    async fn hit(&self, counter: &AtomicU32) {
        counter.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
    }
}

impl CountingTools {
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn tool_set(&self) -> ToolSet {
        let tool = Arc::new(FakeTool {
            counters: self.counters.clone(),
            delay: self.delay,
        });
        ToolSet {
            issue_tracker: tool.clone(),
            source_control: tool.clone(),
            integration: tool,
        }
    }

    pub fn issue_tracker_calls(&self) -> u32 {
        self.counters.issue_tracker.load(Ordering::SeqCst)
    }

    pub fn source_control_calls(&self) -> u32 {
        self.counters.source_control.load(Ordering::SeqCst)
    }

    pub fn integration_calls(&self) -> u32 {
        self.counters.integration.load(Ordering::SeqCst)
    }

    pub fn total_calls(&self) -> u32 {
        self.issue_tracker_calls() + self.source_control_calls() + self.integration_calls()
    }
}

#[async_trait]
impl IssueTracker for FakeTool {
    async fn fetch_issue(&self, _base_url: &str, _auth: &HttpAuth, key: &str) -> Result<Value> {
        self.hit(&self.counters.issue_tracker).await;
        Ok(json!({
            "key": key,
            "fields": {
                "summary": "Ship it",
                "status": { "name": "In Progress" },
                "issuetype": { "name": "Story" }
            }
        }))
    }

    async fn fetch_myself(&self, _base_url: &str, _auth: &HttpAuth) -> Result<Value> {
        self.hit(&self.counters.issue_tracker).await;
        Ok(json!({ "displayName": "Pipeline Bot" }))
    }
}

#[async_trait]
impl SourceControl for FakeTool {
    async fn fetch_repository(
        &self,
        _api_url: &str,
        _auth: &HttpAuth,
        owner: &str,
        repo: &str,
    ) -> Result<Value> {
        self.hit(&self.counters.source_control).await;
        Ok(json!({
            "full_name": format!("{}/{}", owner, repo),
            "default_branch": "main",
            "private": true
        }))
    }

    async fn fetch_branch(
        &self,
        _api_url: &str,
        _auth: &HttpAuth,
        _owner: &str,
        _repo: &str,
        branch: &str,
    ) -> Result<Value> {
        self.hit(&self.counters.source_control).await;
        Ok(json!({
            "name": branch,
            "commit": { "sha": "4f2c9e1" }
        }))
    }
}

#[async_trait]
impl IntegrationPlatform for FakeTool {
    async fn fetch_token(
        &self,
        _token_url: &str,
        _client_id: &str,
        _client_secret: &str,
    ) -> Result<String> {
        self.hit(&self.counters.integration).await;
        Ok("tok".to_string())
    }

    async fn probe(&self, _api_url: &str, _token: &str) -> Result<()> {
        self.hit(&self.counters.integration).await;
        Ok(())
    }

    async fn download_artifact(
        &self,
        _api_url: &str,
        _token: &str,
        _collection: &str,
        id: &str,
        _version: &str,
    ) -> Result<Vec<u8>> {
        self.hit(&self.counters.integration).await;
        Ok(format!("artifact {}", id).into_bytes())
    }
}
