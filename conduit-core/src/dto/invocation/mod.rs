//! Invocation payloads
//!
//! A run is started either with an already-parsed pipeline (direct) or with a
//! reference to a stored definition (by reference).

use serde::{Deserialize, Serialize};

use crate::domain::pipeline::PipelineDefinition;

/// Direct invocation: the caller supplies the parsed pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectInvocation {
    pub execution_id: String,
    pub account_id: String,
    pub parsed_pipeline: PipelineDefinition,
    #[serde(default)]
    pub is_customer: bool,
    #[serde(default)]
    pub is_private: bool,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub user_email: Option<String>,
    #[serde(default)]
    pub approver_emails: Vec<String>,
    #[serde(default)]
    pub pipeline_id: Option<String>,
    #[serde(default)]
    pub build_job_id: Option<String>,
    #[serde(default)]
    pub branch: Option<String>,
    #[serde(default)]
    pub pipeline_name: Option<String>,
}

/// By-reference invocation: the definition is loaded from storage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReferenceInvocation {
    pub customer_id: String,
    pub pipeline_name: String,
    pub build_version: String,
}

/// Either invocation shape, distinguished by its fields
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Invocation {
    Direct(Box<DirectInvocation>),
    ByReference(ReferenceInvocation),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_untagged_invocation_shapes() {
        let by_ref: Invocation = serde_json::from_value(serde_json::json!({
            "customerId": "acme",
            "pipelineName": "release",
            "buildVersion": "1.4.0"
        }))
        .unwrap();
        assert!(matches!(by_ref, Invocation::ByReference(_)));

        let direct: Invocation = serde_json::from_value(serde_json::json!({
            "executionId": "exec-1",
            "accountId": "acc-1",
            "parsedPipeline": { "name": "p", "nodes": [] },
            "approverEmails": ["a@x.com"]
        }))
        .unwrap();
        match direct {
            Invocation::Direct(inv) => {
                assert_eq!(inv.execution_id, "exec-1");
                assert_eq!(inv.approver_emails, vec!["a@x.com".to_string()]);
                assert!(!inv.is_customer);
            }
            other => panic!("expected direct invocation, got {:?}", other),
        }
    }
}
