//! # Verifier Client
//!
//! Requests challenges from, and verifies presentations against, the
//! external verifier service by invoking the workflow's delegated
//! `createChallenge` and `verifyPresentation` capabilities. Enveloped
//! (VC-JWT) presentations are normalized to their effective form before any
//! schema check, and unprotected presentations are accepted structurally
//! only when the step allows them.

use serde_json::{Value, json};

use crate::error::{Error, Result};
use crate::provider::{Provider, ZcapInvoker};
use crate::step::PresentationSchema;
use crate::w3c_vc::{VerifiablePresentation, jwt};
use crate::workflow::{WorkflowConfig, zcap_refs};

/// Options for a single presentation verification.
#[derive(Clone, Debug, Default)]
pub struct VerifyOptions<'a> {
    /// The challenge the presentation proof must bind.
    pub challenge: &'a str,

    /// The domain the presentation proof must bind.
    pub domain: Option<&'a str>,

    /// JSON schema the effective presentation must match.
    pub presentation_schema: Option<&'a PresentationSchema>,

    /// Accept a presentation without a proof.
    pub allow_unprotected: bool,
}

/// The outcome of a successful verification.
#[derive(Clone, Debug, Default)]
pub struct Verification {
    /// The effective presentation: the submitted object, or the decoded
    /// claims view of an enveloped presentation with inner credentials
    /// rewritten as `EnvelopedVerifiableCredential`s.
    pub presentation: VerifiablePresentation,

    /// The DID that authenticated the presentation. Absent for
    /// unprotected presentations.
    pub did: Option<String>,

    /// The verifier's per-credential results, in submission order.
    pub credential_results: Vec<Value>,
}

/// Obtain a fresh challenge from the verifier's challenge service.
///
/// # Errors
///
/// Returns [`Error::Server`] when no `createChallenge` capability is
/// delegated, and [`Error::Data`] when the service call fails.
pub async fn create_challenge(
    provider: &impl Provider, workflow: &WorkflowConfig,
) -> Result<String> {
    tracing::debug!("verifier::create_challenge");

    let Some(capability) = workflow.zcaps.get(zcap_refs::CREATE_CHALLENGE) else {
        return Err(Error::Server("no `createChallenge` zcap delegated".to_string()));
    };
    let response = provider
        .invoke(capability, json!({}))
        .await
        .map_err(|e| Error::data(format!("challenge service call failed: {e}")))?;
    let Some(challenge) = response.get("challenge").and_then(Value::as_str) else {
        return Err(Error::data("challenge service returned no challenge"));
    };
    Ok(challenge.to_string())
}

/// Verify a submitted presentation per the step's contract.
///
/// # Errors
///
/// - [`Error::Data`] — an unprotected presentation where a proof is
///   required, or a mismatched envelope challenge.
/// - [`Error::Validation`] — the effective presentation does not match the
///   step's `presentationSchema`.
/// - [`Error::Verification`] — the verifier rejected the presentation;
///   carries the per-credential results.
pub async fn verify_presentation(
    provider: &impl Provider, workflow: &WorkflowConfig, submitted: &Value,
    options: VerifyOptions<'_>,
) -> Result<Verification> {
    tracing::debug!("verifier::verify_presentation");

    let effective = effective_presentation(submitted, options.challenge)?;

    if let Some(schema) = options.presentation_schema {
        check_schema(schema, &effective)?;
    }

    let presentation: VerifiablePresentation = serde_json::from_value(effective.clone())
        .map_err(|e| Error::data(format!("submitted value is not a presentation: {e}")))?;

    if presentation.proof.is_none() && !is_enveloped(submitted) {
        if options.allow_unprotected {
            return Ok(Verification {
                presentation,
                did: None,
                credential_results: vec![],
            });
        }
        return Err(Error::data("presentation is not protected by a proof"));
    }

    let Some(capability) = workflow.zcaps.get(zcap_refs::VERIFY_PRESENTATION) else {
        return Err(Error::Server("no `verifyPresentation` zcap delegated".to_string()));
    };

    let mut verify_options = json!({
        "challenge": options.challenge,
        "checks": ["proof"],
    });
    if let Some(domain) = options.domain {
        verify_options["domain"] = json!(domain);
    }
    let response = provider
        .invoke(
            capability,
            json!({
                "verifiablePresentation": submitted,
                "options": verify_options,
            }),
        )
        .await
        .map_err(|e| Error::data(format!("verifier call failed: {e}")))?;

    let credential_results = response
        .get("credentialResults")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    if response.get("verified").and_then(Value::as_bool) != Some(true) {
        let message = response
            .get("error")
            .and_then(|e| e.get("message"))
            .and_then(Value::as_str)
            .unwrap_or("presentation verification failed");
        return Err(Error::Verification {
            message: message.to_string(),
            credential_results,
        });
    }

    let did = presentation.did();
    Ok(Verification { presentation, did, credential_results })
}

// The claims view of an enveloped presentation, or the submitted object
// itself. Envelope nonce must match the bound challenge.
fn effective_presentation(submitted: &Value, challenge: &str) -> Result<Value> {
    let token = match submitted {
        Value::String(token) if jwt::is_jwt(token) => Some(token.as_str()),
        Value::Object(_) => jwt::unwrap_enveloped(submitted),
        _ => None,
    };
    let Some(token) = token else {
        return Ok(submitted.clone());
    };

    let claims = jwt::decode_claims(token)?;
    if let Some(nonce) = &claims.nonce {
        if nonce != challenge {
            return Err(Error::data("envelope nonce does not match the exchange challenge"));
        }
    }
    let vp = jwt::presentation_from_claims(&claims)?;
    serde_json::to_value(vp).map_err(|e| crate::server!("issue serializing presentation: {e}"))
}

fn is_enveloped(submitted: &Value) -> bool {
    matches!(submitted, Value::String(token) if jwt::is_jwt(token))
        || jwt::unwrap_enveloped(submitted).is_some()
}

fn check_schema(schema: &PresentationSchema, effective: &Value) -> Result<()> {
    let validator = jsonschema::validator_for(&schema.json_schema)
        .map_err(|e| Error::validation(format!("invalid presentation schema: {e}")))?;

    let errors: Vec<Value> = validator
        .iter_errors(effective)
        .map(|e| json!({"message": e.to_string(), "instancePath": e.instance_path.to_string()}))
        .collect();
    if errors.is_empty() {
        return Ok(());
    }
    Err(Error::Validation {
        message: "presentation does not match the step's schema".to_string(),
        details: Some(json!({ "errors": errors })),
    })
}
