//! # Authorization Request Handler
//!
//! `GET {exchangeId}/openid/client/authorization/request` (legacy single
//! client) and `GET {exchangeId}/openid/clients/{profile}/authorization/request`
//! — serves the exchange's authorization request for the wallet to fulfil.
//! When the selected client profile requires a signed request object, the
//! request is returned as a JAR signed by the profile's delegated
//! `signAuthorizationRequest` capability. First retrieval activates a
//! pending exchange.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::endpoint::{Body, ExchangeRef, Handler, Request, Response};
use crate::error::Error as ExchangeError;
use crate::exchange::Exchange;
use crate::exchange::engine::{self, Transition};
use crate::oid4vp::bridge;
use crate::oid4vp::{Error, Result};
use crate::provider::{Provider, ZcapInvoker};
use crate::step::{self, StepDescriptor};
use crate::workflow::WorkflowConfig;

/// A request for an exchange's authorization request.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct AuthorizationRequestRequest {
    /// The client profile to serve; the legacy path maps to `default`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile: Option<String>,
}

/// The served authorization request.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(untagged)]
pub enum AuthorizationRequestResponse {
    /// A signed JAR (`application/oauth-authz-req+jwt`).
    Jar(String),

    /// The plain authorization request object.
    Object(Value),
}

/// Build the authorization request payload for a step and client profile,
/// binding the exchange challenge as the OpenID `nonce`.
pub(crate) async fn authorization_payload(
    provider: &impl Provider, config: &WorkflowConfig, exchange: &mut Exchange,
    step: &StepDescriptor, profile_name: &str, exchange_ref: &ExchangeRef,
) -> crate::error::Result<Value> {
    let profiles = step.client_profiles();
    let Some(profile) = profiles.get(profile_name) else {
        return Err(ExchangeError::NotFound(format!(
            "unknown client profile \"{profile_name}\""
        )));
    };

    let nonce = engine::bind_challenge(provider, config, exchange, step).await?;
    let response_uri = response_uri(&exchange_ref.url, profile_name);

    let mut authorization_request = json!({
        "response_type": "vp_token",
        "client_id": profile.client_id.clone().unwrap_or_else(|| response_uri.clone()),
        "nonce": nonce,
        "response_mode":
            profile.response_mode.clone().unwrap_or_else(|| "direct_post".to_string()),
        "response_uri": response_uri,
    });
    if let Some(scheme) = &profile.client_id_scheme {
        authorization_request["client_id_scheme"] = json!(scheme);
    }
    if let Some(metadata) = &profile.client_metadata {
        authorization_request["client_metadata"] = metadata.clone();
    }
    if let Some(vpr) = &step.verifiable_presentation_request {
        authorization_request["presentation_definition"] =
            bridge::presentation_definition(vpr, &exchange.id);
    }

    Ok(authorization_request)
}

// the profile's response endpoint; the default profile keeps the legacy
// single-client path
pub(crate) fn response_uri(exchange_url: &str, profile_name: &str) -> String {
    if profile_name == "default" {
        format!("{exchange_url}/openid/client/authorization/response")
    } else {
        format!("{exchange_url}/openid/clients/{profile_name}/authorization/response")
    }
}

async fn authorization_request(
    target: &str, provider: &impl Provider, request: AuthorizationRequestRequest,
) -> Result<Response<AuthorizationRequestResponse>> {
    tracing::debug!("oid4vp::authorization_request");

    let exchange_ref = ExchangeRef::parse(target)?;
    let profile_name = request.profile.unwrap_or_else(|| "default".to_string());

    let response = engine::transition(provider, &exchange_ref, |config, mut exchange| {
        let profile_name = profile_name.clone();
        let exchange_ref = exchange_ref.clone();
        async move {
            let Some(step_name) = exchange.step.clone() else {
                return Err(ExchangeError::validation("workflow has no steps to execute"));
            };
            let step = step::resolve(&config, &exchange, &step_name, None)?;
            if step.open_id.is_none() {
                return Err(ExchangeError::validation(
                    "this step does not support OpenID4VP",
                ));
            }

            let payload = authorization_payload(
                provider, &config, &mut exchange, &step, &profile_name, &exchange_ref,
            )
            .await?;
            engine::serve_authorization_request(&mut exchange, payload.clone());

            let profiles = step.client_profiles();
            let profile = profiles.get(&profile_name).cloned().unwrap_or_default();
            let response = if requires_signing(&profile.client_metadata) {
                let signed = sign_request(provider, &config, &profile, &payload).await?;
                AuthorizationRequestResponse::Jar(signed)
            } else {
                AuthorizationRequestResponse::Object(payload)
            };

            Ok(Transition { exchange, response })
        }
    })
    .await?;

    Ok(response.into())
}

fn requires_signing(client_metadata: &Option<Value>) -> bool {
    client_metadata
        .as_ref()
        .and_then(|metadata| metadata.get("require_signed_request_object"))
        .and_then(Value::as_bool)
        .unwrap_or(false)
}

// sign the request object by invoking the profile's delegated signing
// capability; the signer returns the compact JWS
async fn sign_request(
    provider: &impl Provider, config: &WorkflowConfig,
    profile: &crate::step::ClientProfile, payload: &Value,
) -> crate::error::Result<String> {
    let Some(reference_id) = profile
        .zcap_reference_ids
        .as_ref()
        .and_then(|refs| refs.sign_authorization_request.as_ref())
    else {
        return Err(ExchangeError::Server(
            "client profile requires a signed request but delegates no signer".to_string(),
        ));
    };
    let Some(capability) = config.zcaps.get(reference_id) else {
        return Err(ExchangeError::Server(format!(
            "no zcap delegated for reference id \"{reference_id}\""
        )));
    };

    let response = provider
        .invoke(capability, json!({ "payload": payload }))
        .await
        .map_err(|e| ExchangeError::data(format!("request signing failed: {e}")))?;
    let Some(jws) = response.get("jws").and_then(Value::as_str) else {
        return Err(ExchangeError::data("signer returned no JWS"));
    };
    Ok(jws.to_string())
}

impl Handler for Request<AuthorizationRequestRequest> {
    type Response = AuthorizationRequestResponse;
    type Error = Error;

    fn handle(
        self, target: &str, provider: &impl Provider,
    ) -> impl Future<Output = Result<Response<Self::Response>>> + Send {
        authorization_request(target, provider, self.body)
    }
}

impl Body for AuthorizationRequestRequest {}
