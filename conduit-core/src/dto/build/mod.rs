//! Build record DTOs
//!
//! A build record is keyed by `(customer_id, pipeline_name, build_version)`
//! and holds the stored definition text plus the latest run status.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;

use crate::domain::execution::ExecutionStatus;

/// Stored definition as returned by the backing store
///
/// The definition text never carries real secrets; the engine re-resolves
/// them from `stages_state`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredDefinition {
    #[serde(default)]
    pub definition_text: Option<String>,
    #[serde(default)]
    pub stages_state: Option<serde_json::Value>,
    #[serde(default)]
    pub created_by: Option<String>,
    #[serde(default)]
    pub pipeline_id: Option<String>,
    #[serde(default)]
    pub build_job_id: Option<String>,
}

impl StoredDefinition {
    /// Stage selections carried in `stages_state`
    ///
    /// Each field is read on its own: a missing or `null` field is empty and
    /// entries that are not strings are dropped. Whatever was dropped is
    /// described in the returned warnings.
    pub fn selections(&self) -> (StageSelections, Vec<String>) {
        let mut warnings = Vec::new();
        let state = match &self.stages_state {
            None | Some(Value::Null) => return (StageSelections::default(), warnings),
            Some(Value::Object(state)) => state,
            Some(_) => {
                warnings.push("stagesState is not an object, ignoring it".to_string());
                return (StageSelections::default(), warnings);
            }
        };

        let selections = StageSelections {
            selected_connectors: string_map(state, "selectedConnectors", &mut warnings),
            selected_environments: string_map(state, "selectedEnvironments", &mut warnings),
            approver_emails: string_list(state, "approverEmails", &mut warnings),
        };
        (selections, warnings)
    }
}

fn string_map(
    state: &Map<String, Value>,
    field: &str,
    warnings: &mut Vec<String>,
) -> HashMap<String, String> {
    match state.get(field) {
        None | Some(Value::Null) => HashMap::new(),
        Some(Value::Object(entries)) => entries
            .iter()
            .filter_map(|(key, value)| match value.as_str() {
                Some(id) => Some((key.clone(), id.to_string())),
                None => {
                    warnings.push(format!("stagesState.{}.{} is not a string", field, key));
                    None
                }
            })
            .collect(),
        Some(_) => {
            warnings.push(format!("stagesState.{} is not an object", field));
            HashMap::new()
        }
    }
}

fn string_list(state: &Map<String, Value>, field: &str, warnings: &mut Vec<String>) -> Vec<String> {
    match state.get(field) {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(items)) => items
            .iter()
            .enumerate()
            .filter_map(|(i, item)| match item.as_str() {
                Some(s) => Some(s.to_string()),
                None => {
                    warnings.push(format!("stagesState.{}[{}] is not a string", field, i));
                    None
                }
            })
            .collect(),
        Some(_) => {
            warnings.push(format!("stagesState.{} is not a list", field));
            Vec::new()
        }
    }
}

/// Connector and environment choices made when the pipeline was saved
///
/// Keys are `"{nodeId}__{stageId}"`, `"{nodeId}::{stageId}"` or `"{stageId}"`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageSelections {
    #[serde(default)]
    pub selected_connectors: HashMap<String, String>,
    #[serde(default)]
    pub selected_environments: HashMap<String, String>,
    #[serde(default)]
    pub approver_emails: Vec<String>,
}

/// Status fields written to a build record
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildStatusUpdate {
    pub status: ExecutionStatus,
    #[serde(default)]
    pub execution_id: Option<String>,
    #[serde(default)]
    pub error_message: Option<String>,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
}

impl BuildStatusUpdate {
    pub fn running(execution_id: impl Into<String>) -> Self {
        Self {
            status: ExecutionStatus::Running,
            execution_id: Some(execution_id.into()),
            error_message: None,
            started_at: Some(Utc::now()),
            completed_at: None,
        }
    }

    pub fn finished(execution_id: impl Into<String>, error_message: Option<String>) -> Self {
        let status = if error_message.is_some() {
            ExecutionStatus::Failed
        } else {
            ExecutionStatus::Success
        };
        Self {
            status,
            execution_id: Some(execution_id.into()),
            error_message,
            started_at: None,
            completed_at: Some(Utc::now()),
        }
    }
}

/// Request to store a definition for later by-reference runs
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreDefinition {
    pub definition_text: String,
    #[serde(default)]
    pub stages_state: Option<serde_json::Value>,
    #[serde(default)]
    pub created_by: Option<String>,
    #[serde(default)]
    pub pipeline_id: Option<String>,
    #[serde(default)]
    pub build_job_id: Option<String>,
}

/// Build record as exposed by the server
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildRecord {
    pub customer_id: String,
    pub pipeline_name: String,
    pub build_version: String,
    pub status: Option<ExecutionStatus>,
    pub execution_id: Option<String>,
    pub error_message: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_by: Option<String>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_selections_from_stages_state() {
        let stored = StoredDefinition {
            stages_state: Some(serde_json::json!({
                "selectedConnectors": { "n1__s1": "conn-1" },
                "approverEmails": ["ops@acme.io"]
            })),
            ..Default::default()
        };

        let (selections, warnings) = stored.selections();
        assert_eq!(
            selections.selected_connectors.get("n1__s1"),
            Some(&"conn-1".to_string())
        );
        assert!(selections.selected_environments.is_empty());
        assert_eq!(selections.approver_emails.len(), 1);
        assert!(warnings.is_empty());
    }

    #[test]
    fn test_selections_tolerate_malformed_state() {
        let stored = StoredDefinition {
            stages_state: Some(serde_json::json!("not an object")),
            ..Default::default()
        };
        let (selections, warnings) = stored.selections();
        assert_eq!(selections, StageSelections::default());
        assert_eq!(warnings.len(), 1);
    }

    #[test]
    fn test_null_field_keeps_other_selections() {
        let stored = StoredDefinition {
            stages_state: Some(serde_json::json!({
                "selectedConnectors": { "n1__code": "conn-gh" },
                "selectedEnvironments": null,
                "approverEmails": null
            })),
            ..Default::default()
        };

        let (selections, warnings) = stored.selections();
        assert_eq!(
            selections.selected_connectors.get("n1__code"),
            Some(&"conn-gh".to_string())
        );
        assert!(selections.approver_emails.is_empty());
        assert!(warnings.is_empty());
    }

    #[test]
    fn test_bad_entries_are_dropped_and_reported() {
        let stored = StoredDefinition {
            stages_state: Some(serde_json::json!({
                "selectedConnectors": { "n1__code": "conn-gh", "n1__build": 42 },
                "selectedEnvironments": ["prod"],
                "approverEmails": ["lead@acme.io", null]
            })),
            ..Default::default()
        };

        let (selections, warnings) = stored.selections();
        assert_eq!(selections.selected_connectors.len(), 1);
        assert!(selections.selected_environments.is_empty());
        assert_eq!(selections.approver_emails, vec!["lead@acme.io".to_string()]);
        assert_eq!(warnings.len(), 3);
        assert!(
            warnings
                .iter()
                .any(|w| w == "stagesState.selectedConnectors.n1__build is not a string")
        );
    }

    #[test]
    fn test_finished_update_status() {
        assert_eq!(
            BuildStatusUpdate::finished("e1", None).status,
            ExecutionStatus::Success
        );
        assert_eq!(
            BuildStatusUpdate::finished("e1", Some("boom".to_string())).status,
            ExecutionStatus::Failed
        );
    }
}
