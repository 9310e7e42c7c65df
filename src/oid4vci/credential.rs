//! # Credential Handler
//!
//! `POST {exchangeId}/openid/credential` — issues a credential to a wallet
//! holding an exchange-scoped bearer token. The handler enforces the
//! step's requirements before issuing: a JWT DID proof bound to the
//! current `c_nonce` and the exchange URL, and, when the step demands a
//! presentation, a completed OpenID4VP interaction (signaled to the wallet
//! with `presentation_required` and the authorization request to fulfil).

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::endpoint::{Body, ExchangeRef, Handler, Request, Response};
use crate::error::Error as ExchangeError;
use crate::exchange::engine::{self, Transition};
use crate::exchange::{Exchange, OpenIdContext};
use crate::issuer::{self, IssueRequest};
use crate::oid4vci::types::{
    CredentialDefinition, CredentialResponse, Proof, SUPPORTED_FORMATS,
};
use crate::oid4vci::{Error, Result};
use crate::provider::{Clock, Jose, Provider};
use crate::step::{self, StepDescriptor};
use crate::workflow::WorkflowConfig;

const NONCE_EXPIRES_IN: i64 = 900;

/// A credential request.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct CredentialRequest {
    /// The requested format, e.g. `ldp_vc` or `jwt_vc_json-ld`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,

    /// The requested credential definition. The draft-20 `types` alias is
    /// accepted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub credential_definition: Option<CredentialDefinition>,

    /// The key proof, when the step requires one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proof: Option<Proof>,

    /// The bearer token, copied from the `Authorization` header by the
    /// HTTP wrapper.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub access_token: String,
}

async fn credential(
    target: &str, provider: &impl Provider, request: CredentialRequest,
) -> Result<Response<CredentialResponse>> {
    tracing::debug!("oid4vci::credential");

    validate_format(&request)?;
    let exchange_ref = ExchangeRef::parse(target)?;

    let outcome = engine::transition(provider, &exchange_ref, |config, mut exchange| {
        let request = request.clone();
        let exchange_ref = exchange_ref.clone();
        async move {
            let responses = process(
                provider,
                &config,
                &mut exchange,
                &exchange_ref,
                &request.access_token,
                std::slice::from_ref(&request),
            )
            .await?;
            Ok(Transition {
                exchange,
                response: responses.map(|mut r| r.remove(0)),
            })
        }
    })
    .await
    .map_err(as_token_error)?;

    outcome.map(Into::into)
}

pub(super) fn validate_format(request: &CredentialRequest) -> Result<()> {
    if let Some(format) = &request.format {
        if !SUPPORTED_FORMATS.contains(&format.as_str()) {
            return Err(Error::UnsupportedCredentialFormat(format!(
                "unsupported credential format \"{format}\""
            )));
        }
    }
    Ok(())
}

// bearer-token endpoints surface authorization failures as invalid_token
pub(super) fn as_token_error(err: ExchangeError) -> Error {
    match err {
        ExchangeError::NotAllowed(message) => Error::InvalidToken(message),
        other => other.into(),
    }
}

/// Process credential requests against an exchange. On success every
/// request has been issued, the step result captured, and the exchange
/// advanced. The outer `Result` aborts without committing; the inner
/// `Err` carries a protocol error that must be surfaced *after* the
/// transition commits (nonce rotation, presentation-required activation).
pub(super) async fn process(
    provider: &impl Provider, config: &WorkflowConfig, exchange: &mut Exchange,
    exchange_ref: &ExchangeRef, access_token: &str, requests: &[CredentialRequest],
) -> std::result::Result<Result<Vec<CredentialResponse>>, ExchangeError> {
    let now = provider.now();
    {
        let Some(open_id) = &exchange.open_id else {
            return Err(ExchangeError::validation("exchange does not support OpenID4VCI"));
        };
        if !open_id.token_valid(access_token, now) {
            return Err(ExchangeError::NotAllowed("invalid access token".to_string()));
        }
    }

    let step_name = exchange.step.clone();
    let resolved = match &step_name {
        Some(name) => step::resolve(config, exchange, name, None)?,
        None => StepDescriptor::default(),
    };

    // a required presentation that has not yet been verified redirects the
    // wallet to OpenID4VP first
    if resolved.requires_presentation()
        && step_name.as_deref().and_then(|name| exchange.step_result(name)).is_none()
    {
        return presentation_required(provider, config, exchange, exchange_ref, &resolved).await;
    }

    let mut responses = Vec::with_capacity(requests.len());
    let mut dids: Vec<Option<String>> = Vec::with_capacity(requests.len());
    let mut issued_all = Vec::new();

    for (index, request) in requests.iter().enumerate() {
        check_expected(exchange.open_id.as_ref(), request)?;

        let did = if resolved.jwt_did_proof_request.is_some() {
            match verify_proof(provider, exchange, exchange_ref, request, now).await {
                Ok(did) => Some(did),
                Err(protocol_err) => return Ok(Err(protocol_err)),
            }
        } else {
            None
        };
        dids.push(did.clone());

        let candidates =
            engine::evaluate_credentials(config, exchange, &resolved, did.as_deref())?;
        let credential = select_candidate(candidates, request, index)?;
        let issued = issuer::issue(
            provider,
            config,
            IssueRequest { credential, format: request.format.clone() },
        )
        .await?;

        issued_all.push(issued.clone());
        responses.push(CredentialResponse {
            format: request.format.clone(),
            credential: issued,
        });
    }

    if let Some(name) = &step_name {
        // a prior OpenID4VP interaction may already have recorded this
        // step's result; the delivery itself is carried by the response
        if exchange.step_result(name).is_none() {
            let mut result = json!({ "verifiableCredential": issued_all });
            if let Some(did) = dids.iter().flatten().next() {
                result["did"] = json!(did);
            }
            exchange.record_result(name, result)?;
        }
    }
    exchange.advance(resolved.next_step.clone());

    Ok(Ok(responses))
}

async fn presentation_required(
    provider: &impl Provider, config: &WorkflowConfig, exchange: &mut Exchange,
    exchange_ref: &ExchangeRef, resolved: &StepDescriptor,
) -> std::result::Result<Result<Vec<CredentialResponse>>, ExchangeError> {
    #[cfg(feature = "oid4vp")]
    {
        let authorization_request = crate::oid4vp::authorization_payload(
            provider,
            config,
            exchange,
            resolved,
            "default",
            exchange_ref,
        )
        .await?;
        engine::serve_authorization_request(exchange, authorization_request.clone());
        Ok(Err(Error::PresentationRequired(authorization_request)))
    }

    #[cfg(not(feature = "oid4vp"))]
    {
        let _ = (provider, config, exchange, exchange_ref, resolved);
        Err(ExchangeError::validation(
            "this exchange requires a presentation, which this server does not support",
        ))
    }
}

// verify the JWT DID proof and its binding to this exchange; any failure
// rotates the nonce so the wallet can retry
async fn verify_proof(
    provider: &impl Provider, exchange: &mut Exchange, exchange_ref: &ExchangeRef,
    request: &CredentialRequest, now: chrono::DateTime<chrono::Utc>,
) -> std::result::Result<String, Error> {
    let jwt = request.proof.as_ref().and_then(|proof| proof.jwt.clone());
    let Some(jwt) = jwt else {
        return Err(proof_error(exchange, "missing proof", now));
    };
    let claims = match provider.verify_did_proof(&jwt).await {
        Ok(claims) => claims,
        Err(e) => return Err(proof_error(exchange, &format!("invalid proof: {e}"), now)),
    };

    let nonce_ok = claims.nonce.as_deref().is_some_and(|nonce| {
        exchange.open_id.as_ref().is_some_and(|open_id| open_id.nonce_valid(nonce, now))
    });
    if !nonce_ok {
        return Err(proof_error(exchange, "proof nonce is not the current c_nonce", now));
    }
    if claims.aud.as_deref() != Some(exchange_ref.url.as_str()) {
        return Err(proof_error(exchange, "proof audience is not this exchange", now));
    }
    Ok(claims.did)
}

fn proof_error(
    exchange: &mut Exchange, description: &str, now: chrono::DateTime<chrono::Utc>,
) -> Error {
    let c_nonce = exchange
        .open_id
        .as_mut()
        .map(|open_id| open_id.rotate_nonce(now).0)
        .unwrap_or_default();
    Error::InvalidProof {
        description: description.to_string(),
        c_nonce,
        c_nonce_expires_in: NONCE_EXPIRES_IN,
    }
}

// a request must match one of the offer's expected credential requests
fn check_expected(
    open_id: Option<&OpenIdContext>, request: &CredentialRequest,
) -> std::result::Result<(), ExchangeError> {
    let Some(expected) =
        open_id.and_then(|open_id| open_id.expected_credential_requests.as_ref())
    else {
        return Ok(());
    };

    let requested_types = request
        .credential_definition
        .as_ref()
        .and_then(CredentialDefinition::requested_types);

    let matches = expected.iter().any(|entry| {
        if let (Some(expected_format), Some(format)) = (&entry.format, &request.format) {
            if expected_format != format {
                return false;
            }
        }
        let Some(requested) = requested_types else {
            return true;
        };
        let expected_types: Vec<&str> = entry
            .credential_definition
            .as_ref()
            .and_then(|definition| definition.get("type").or_else(|| definition.get("types")))
            .and_then(Value::as_array)
            .map(|types| types.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default();
        expected_types.is_empty() || requested.iter().all(|t| expected_types.contains(&t.as_str()))
    });

    if matches {
        Ok(())
    } else {
        Err(ExchangeError::data("credential request does not match the offer"))
    }
}

// pick the evaluated credential a request addresses: by requested type,
// else by position, else the only one
fn select_candidate(
    mut candidates: Vec<Value>, request: &CredentialRequest, index: usize,
) -> std::result::Result<Value, ExchangeError> {
    if candidates.is_empty() {
        return Err(ExchangeError::data("this exchange has no credentials to issue"));
    }

    if let Some(requested) = request
        .credential_definition
        .as_ref()
        .and_then(CredentialDefinition::requested_types)
    {
        if let Some(position) = candidates.iter().position(|candidate| {
            let types: Vec<&str> = candidate
                .get("type")
                .and_then(Value::as_array)
                .map(|types| types.iter().filter_map(Value::as_str).collect())
                .unwrap_or_default();
            requested.iter().all(|t| types.contains(&t.as_str()))
        }) {
            return Ok(candidates.swap_remove(position));
        }
        return Err(ExchangeError::data(
            "no credential template matches the requested types",
        ));
    }

    let position = index.min(candidates.len() - 1);
    Ok(candidates.swap_remove(position))
}

impl Handler for Request<CredentialRequest> {
    type Response = CredentialResponse;
    type Error = Error;

    fn handle(
        self, target: &str, provider: &impl Provider,
    ) -> impl Future<Output = Result<Response<Self::Response>>> + Send {
        credential(target, provider, self.body)
    }
}

impl Body for CredentialRequest {}
