//! Authentication domain types
//!
//! Credentials, connectors and environments are owned by the account
//! platform; the engine only reads them. `Debug` output of anything holding a
//! secret is redacted.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Canonical resolved authentication handed to stage handlers
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectorAuth {
    #[serde(rename = "type", default)]
    pub auth_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_url: Option<String>,
}

impl ConnectorAuth {
    pub fn bearer(token: impl Into<String>) -> Self {
        Self {
            auth_type: "token".to_string(),
            token: Some(token.into()),
            ..Default::default()
        }
    }

    pub fn basic(username: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            auth_type: "basic".to_string(),
            username: Some(username.into()),
            api_key: Some(api_key.into()),
            ..Default::default()
        }
    }

    pub fn oauth2(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        token_url: impl Into<String>,
    ) -> Self {
        Self {
            auth_type: "oauth2".to_string(),
            client_id: Some(client_id.into()),
            client_secret: Some(client_secret.into()),
            token_url: Some(token_url.into()),
            ..Default::default()
        }
    }

    /// True when no usable secret material is present
    pub fn is_empty(&self) -> bool {
        self.api_key.is_none()
            && self.token.is_none()
            && self.client_secret.is_none()
            && self.client_id.is_none()
    }

    /// True when every OAuth2 client-credentials field is present
    pub fn has_client_credentials(&self) -> bool {
        self.client_id.is_some() && self.client_secret.is_some() && self.token_url.is_some()
    }
}

fn redact(value: &Option<String>) -> Option<&'static str> {
    value.as_ref().map(|_| "***")
}

impl fmt::Debug for ConnectorAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectorAuth")
            .field("auth_type", &self.auth_type)
            .field("username", &self.username)
            .field("api_key", &redact(&self.api_key))
            .field("token", &redact(&self.token))
            .field("client_id", &self.client_id)
            .field("client_secret", &redact(&self.client_secret))
            .field("token_url", &self.token_url)
            .finish()
    }
}

/// Credential record owned by the account platform
///
/// Field names inside `credentials` vary by how the record was created and
/// must be normalized before use.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Credential {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub auth_type: String,
    #[serde(default)]
    pub credentials: HashMap<String, String>,
    pub account_id: String,
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys: Vec<&String> = self.credentials.keys().collect();
        keys.sort();
        f.debug_struct("Credential")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("auth_type", &self.auth_type)
            .field("credential_fields", &keys)
            .field("account_id", &self.account_id)
            .finish()
    }
}

/// Account-scoped binding from a tool to a credential
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Connector {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    pub credential_id: String,
}

/// Account-scoped grouping of connectors by deployment target
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Environment {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub connectors: Vec<EnvironmentConnector>,
}

/// A connector entry inside an environment
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvironmentConnector {
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub connector: String,
    #[serde(default)]
    pub credential_name: Option<String>,
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub client_secret: Option<String>,
    #[serde(default)]
    pub token_url: Option<String>,
    #[serde(default)]
    pub api_url: Option<String>,
}

impl fmt::Debug for EnvironmentConnector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EnvironmentConnector")
            .field("category", &self.category)
            .field("connector", &self.connector)
            .field("credential_name", &self.credential_name)
            .field("client_id", &self.client_id)
            .field("client_secret", &redact(&self.client_secret))
            .field("token_url", &self.token_url)
            .field("api_url", &self.api_url)
            .finish()
    }
}
