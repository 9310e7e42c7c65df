//! # Credential Offer
//!
//! Builds `openid-credential-offer://` URLs for wallet invocation and
//! serves the offer-by-reference endpoint
//! (`GET {exchangeId}/openid/credential-offer`). The offer endpoint only
//! produces JSON and responds 406 to callers that do not accept it.

use serde::{Deserialize, Serialize};

use crate::endpoint::{Body, ExchangeRef, Handler, Request, Response};
use crate::exchange::OpenIdContext;
use crate::exchange::engine;
use crate::oid4vci::types::{
    AuthorizationCodeGrant, CredentialOffer, Grants, PreAuthorizedCodeGrant,
};
use crate::oid4vci::{Error, Result};
use crate::provider::Provider;

/// Build the credential offer for an exchange.
#[must_use]
pub(crate) fn build_offer(exchange_url: &str, open_id: &OpenIdContext) -> CredentialOffer {
    let credentials = open_id
        .expected_credential_requests
        .as_ref()
        .map(|expected| {
            expected
                .iter()
                .filter_map(|request| serde_json::to_value(request).ok())
                .collect()
        })
        .unwrap_or_default();

    let grants = open_id.pre_authorized_code.as_ref().map_or_else(
        || Grants {
            authorization_code: Some(AuthorizationCodeGrant {
                issuer_state: Some(exchange_url.rsplit('/').next().unwrap_or_default().to_string()),
            }),
            pre_authorized_code: None,
        },
        |code| Grants {
            authorization_code: None,
            pre_authorized_code: Some(PreAuthorizedCodeGrant {
                pre_authorized_code: code.clone(),
                user_pin_required: open_id.user_pin.is_some(),
            }),
        },
    );

    CredentialOffer {
        credential_issuer: exchange_url.to_string(),
        credentials,
        grants: Some(grants),
    }
}

/// The `openid-credential-offer://` URL for an exchange, carrying the
/// offer by value. `None` when the offer cannot be serialized.
#[must_use]
pub fn offer_url(exchange_url: &str, open_id: &OpenIdContext) -> Option<String> {
    let offer = build_offer(exchange_url, open_id);
    let json = serde_json::to_string(&offer).ok()?;
    Some(format!("openid-credential-offer://?credential_offer={}", urlencoding::encode(&json)))
}

/// The `openid-credential-offer://` URL referencing the offer-URI
/// endpoint instead of embedding the offer.
#[must_use]
pub fn offer_uri_url(exchange_url: &str) -> String {
    let uri = format!("{exchange_url}/openid/credential-offer");
    format!("openid-credential-offer://?credential_offer_uri={}", urlencoding::encode(&uri))
}

/// A request to fetch an exchange's credential offer.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct CredentialOfferRequest;

async fn credential_offer(
    target: &str, provider: &impl Provider, request: Request<CredentialOfferRequest>,
) -> Result<Response<CredentialOffer>> {
    tracing::debug!("oid4vci::credential_offer");

    if !request.accepts_json() {
        return Err(Error::NotAcceptable(
            "this endpoint only produces application/json".to_string(),
        ));
    }

    let exchange_ref = ExchangeRef::parse(target)?;
    let (_, exchange) = engine::load(provider, &exchange_ref).await?;
    let Some(open_id) = &exchange.open_id else {
        return Err(Error::InvalidRequest(
            "exchange does not support OpenID4VCI".to_string(),
        ));
    };

    Ok(build_offer(&exchange_ref.url, open_id).into())
}

impl Handler for Request<CredentialOfferRequest> {
    type Response = CredentialOffer;
    type Error = Error;

    fn handle(
        self, target: &str, provider: &impl Provider,
    ) -> impl Future<Output = Result<Response<Self::Response>>> + Send {
        credential_offer(target, provider, self)
    }
}

impl Body for CredentialOfferRequest {}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::exchange::ExpectedCredentialRequest;

    #[test]
    fn pre_authorized_offer_url() {
        let open_id = OpenIdContext {
            pre_authorized_code: Some("z1Secret".to_string()),
            expected_credential_requests: Some(vec![ExpectedCredentialRequest {
                format: Some("ldp_vc".to_string()),
                credential_definition: Some(json!({
                    "type": ["VerifiableCredential", "UniversityDegreeCredential"]
                })),
            }]),
            ..OpenIdContext::default()
        };

        let url = offer_url(
            "https://exchanger.example/workflows/z1A2b/exchanges/z19uokPn3b1Z4XDbQSHo7VhFR",
            &open_id,
        )
        .expect("should build");
        assert!(url.starts_with("openid-credential-offer://?credential_offer="));

        let encoded = url.split('=').nth(1).expect("query value");
        let decoded = urlencoding::decode(encoded).expect("should decode");
        let offer: CredentialOffer =
            serde_json::from_str(&decoded).expect("should deserialize");
        assert_eq!(
            offer.credential_issuer,
            "https://exchanger.example/workflows/z1A2b/exchanges/z19uokPn3b1Z4XDbQSHo7VhFR"
        );
        let grants = offer.grants.expect("has grants");
        assert_eq!(
            grants.pre_authorized_code.expect("pre-auth grant").pre_authorized_code,
            "z1Secret"
        );
    }

    #[test]
    fn authorization_code_fallback() {
        let offer = build_offer(
            "https://exchanger.example/workflows/z1A2b/exchanges/zExchange",
            &OpenIdContext::default(),
        );
        let grants = offer.grants.expect("has grants");
        assert_eq!(
            grants.authorization_code.expect("auth code grant").issuer_state.as_deref(),
            Some("zExchange")
        );
    }
}
