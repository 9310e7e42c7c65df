//! # Issuer Client
//!
//! Issues credentials by invoking the workflow's delegated `issue`
//! capability against the external issuer service. Batches run
//! concurrently while preserving input order in the output.

use futures::future::try_join_all;
use serde_json::{Value, json};

use crate::error::{Error, Result};
use crate::provider::{Provider, ZcapInvoker};
use crate::workflow::{WorkflowConfig, zcap_refs};

/// A single issuance instruction.
#[derive(Clone, Debug, Default)]
pub struct IssueRequest {
    /// The template-evaluated credential to sign.
    pub credential: Value,

    /// The requested envelope format, e.g. `ldp_vc` or `jwt_vc_json-ld`.
    /// The issuer's default applies when absent.
    pub format: Option<String>,
}

/// Issue a single credential.
///
/// # Errors
///
/// Returns [`Error::Server`] when no `issue` capability is delegated and
/// [`Error::Data`] when the issuer call fails or returns no credential.
pub async fn issue(
    provider: &impl Provider, workflow: &WorkflowConfig, request: IssueRequest,
) -> Result<Value> {
    tracing::debug!("issuer::issue");

    let Some(capability) = workflow.zcaps.get(zcap_refs::ISSUE) else {
        return Err(Error::Server("no `issue` zcap delegated".to_string()));
    };

    let mut body = json!({ "credential": request.credential });
    if let Some(format) = &request.format {
        body["options"] = json!({ "format": format });
    }

    let response = provider
        .invoke(capability, body)
        .await
        .map_err(|e| Error::data(format!("issuer call failed: {e}")))?;

    let Some(credential) = response.get("verifiableCredential") else {
        return Err(Error::data("issuer returned no credential"));
    };
    Ok(credential.clone())
}

/// Issue a batch of credentials concurrently, preserving input order.
///
/// # Errors
///
/// Fails with the first failing issuance.
pub async fn issue_batch(
    provider: &impl Provider, workflow: &WorkflowConfig, requests: Vec<IssueRequest>,
) -> Result<Vec<Value>> {
    try_join_all(requests.into_iter().map(|request| issue(provider, workflow, request))).await
}
