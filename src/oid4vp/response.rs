//! # Authorization Response Handler
//!
//! `POST {exchangeId}/openid/client/authorization/response` (and the
//! per-profile `clients/{profile}` form) — accepts the wallet's
//! `vp_token` and `presentation_submission`. In `direct_post` mode the
//! fields arrive form-encoded; in `direct_post.jwt` mode they arrive
//! inside a JWT/JWE envelope unwrapped by the `Jose` provider. The
//! submitted presentation is verified against the step's effective VPR
//! (`challenge = nonce`, `domain = response_uri`) and captured into the
//! step's result together with the served authorization request.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::core::urlencode;
use crate::endpoint::{Body, ExchangeRef, Handler, Request, Response};
use crate::error::Error as ExchangeError;
use crate::exchange::engine::{self, Transition};
use crate::oid4vp::bridge;
use crate::oid4vp::request::response_uri;
use crate::oid4vp::{Error, Result};
use crate::provider::{Jose, Provider};
use crate::step;
use crate::verifier::{self, VerifyOptions};

/// A wallet's authorization response.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct AuthorizationSubmission {
    /// The client profile the response addresses; the legacy path maps to
    /// `default`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile: Option<String>,

    /// The VP token: a JSON-encoded presentation or a compact VP-JWT.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vp_token: Option<String>,

    /// The JSON-encoded presentation submission.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub presentation_submission: Option<String>,

    /// The `direct_post.jwt` response envelope, mutually exclusive with
    /// the plain fields.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<String>,
}

impl AuthorizationSubmission {
    /// Parse a `direct_post` form body.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidRequest`] when the body is not a form.
    pub fn from_form(body: &str) -> Result<Self> {
        urlencode::from_str(body)
            .map_err(|e| Error::InvalidRequest(format!("invalid form body: {e}")))
    }
}

/// The verifier's acknowledgement of an authorization response.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct AuthorizationResponseResult {
    /// Where the wallet should send the user next, when configured.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redirect_uri: Option<String>,
}

async fn authorization_response(
    target: &str, provider: &impl Provider, submission: AuthorizationSubmission,
) -> Result<Response<AuthorizationResponseResult>> {
    tracing::debug!("oid4vp::authorization_response");

    let exchange_ref = ExchangeRef::parse(target)?;
    let profile_name = submission.profile.clone().unwrap_or_else(|| "default".to_string());

    let response = engine::transition(provider, &exchange_ref, |config, mut exchange| {
        let submission = submission.clone();
        let profile_name = profile_name.clone();
        let exchange_ref = exchange_ref.clone();
        async move {
            let Some(step_name) = exchange.step.clone() else {
                return Err(ExchangeError::validation("workflow has no steps to execute"));
            };
            let step = step::resolve(&config, &exchange, &step_name, None)?;

            let (vp_token, presentation_submission) =
                extract(provider, &submission).await?;

            // the effective VPR comes from the authorization request the
            // wallet is answering
            let served = exchange.authorization_request.clone().unwrap_or_else(|| {
                json!({
                    "nonce": exchange.bound_challenge(),
                    "response_uri": response_uri(&exchange_ref.url, &profile_name),
                })
            });
            let effective = bridge::effective_vpr(&served);
            let challenge =
                effective.challenge.clone().unwrap_or_else(|| exchange.bound_challenge());

            let verification = verifier::verify_presentation(
                provider,
                &config,
                &vp_token,
                VerifyOptions {
                    challenge: &challenge,
                    domain: effective.domain.as_deref(),
                    presentation_schema: step.presentation_schema.as_ref(),
                    allow_unprotected: step.allow_unprotected_presentation,
                },
            )
            .await?;

            let mut result = json!({
                "verifiablePresentation": verification.presentation,
                "openId": {
                    "authorizationRequest": served,
                    "presentationSubmission": presentation_submission,
                }
            });
            if let Some(did) = &verification.did {
                result["did"] = json!(did);
            }
            exchange.record_result(&step_name, result)?;
            exchange.authorization_request = None;

            // when the exchange also delivers credentials over OpenID4VCI,
            // the step stays open until delivery completes it
            if exchange.open_id.is_none() {
                exchange.challenge = None;
                exchange.advance(step.next_step.clone());
            }

            Ok(Transition {
                exchange,
                response: AuthorizationResponseResult { redirect_uri: None },
            })
        }
    })
    .await?;

    Ok(response.into())
}

// recover `vp_token` and `presentation_submission` from the plain or
// enveloped response form
async fn extract(
    provider: &impl Provider, submission: &AuthorizationSubmission,
) -> crate::error::Result<(Value, Value)> {
    if let Some(envelope) = &submission.response {
        let payload = provider
            .unwrap_response(envelope)
            .await
            .map_err(|e| ExchangeError::data(format!("undecodable response envelope: {e}")))?;
        let vp_token = payload
            .get("vp_token")
            .cloned()
            .ok_or_else(|| ExchangeError::data("response envelope carries no vp_token"))?;
        let presentation_submission =
            payload.get("presentation_submission").cloned().unwrap_or(Value::Null);
        return Ok((first_token(vp_token), presentation_submission));
    }

    let Some(vp_token) = &submission.vp_token else {
        return Err(ExchangeError::validation("no vp_token provided"));
    };
    let vp_token = parse_field(vp_token);
    let presentation_submission = submission
        .presentation_submission
        .as_deref()
        .map(parse_field)
        .unwrap_or(Value::Null);
    Ok((first_token(vp_token), presentation_submission))
}

// a form field is a JSON value or a bare compact JWT
fn parse_field(field: &str) -> Value {
    let trimmed = field.trim();
    if trimmed.starts_with(['{', '[']) {
        serde_json::from_str(trimmed).unwrap_or_else(|_| Value::String(field.to_string()))
    } else {
        Value::String(field.to_string())
    }
}

// a vp_token may carry several presentations; this adapter verifies the
// first
fn first_token(vp_token: Value) -> Value {
    match vp_token {
        Value::Array(mut tokens) if !tokens.is_empty() => tokens.swap_remove(0),
        other => other,
    }
}

impl Handler for Request<AuthorizationSubmission> {
    type Response = AuthorizationResponseResult;
    type Error = Error;

    fn handle(
        self, target: &str, provider: &impl Provider,
    ) -> impl Future<Output = Result<Response<Self::Response>>> + Send {
        authorization_response(target, provider, self.body)
    }
}

impl Body for AuthorizationSubmission {}
