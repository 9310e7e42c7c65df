//! # Token Handler
//!
//! `POST {exchangeId}/openid/token` — exchanges a pre-authorized code (or
//! an authorization code carried as the offer's `issuer_state`) for an
//! exchange-scoped bearer token. Codes are single-use: a second redemption
//! attempt fails without minting a token.

use serde::{Deserialize, Serialize};

use crate::endpoint::{Body, ExchangeRef, Handler, Request, Response};
use crate::error::Error as ExchangeError;
use crate::exchange::engine::{self, Transition};
use crate::oid4vci::types::{AUTHORIZATION_CODE_GRANT, PRE_AUTHORIZED_GRANT};
use crate::oid4vci::{Error, Result};
use crate::provider::{Clock, Provider};

const TOKEN_EXPIRES_IN: i64 = 900;

/// An OAuth token request.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct TokenRequest {
    /// The grant type: the pre-authorized code URN or
    /// `authorization_code`.
    pub grant_type: String,

    /// The pre-authorized code being redeemed.
    #[serde(rename = "pre-authorized_code", skip_serializing_if = "Option::is_none")]
    pub pre_authorized_code: Option<String>,

    /// The authorization code being redeemed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,

    /// The transaction code, when the offer required one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_pin: Option<String>,
}

/// An OAuth token response.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct TokenResponse {
    /// The exchange-scoped bearer token.
    pub access_token: String,

    /// Always `bearer`.
    pub token_type: String,

    /// Seconds until the token expires.
    pub expires_in: i64,
}

async fn token(
    target: &str, provider: &impl Provider, request: TokenRequest,
) -> Result<Response<TokenResponse>> {
    tracing::debug!("oid4vci::token");

    let code = match request.grant_type.as_str() {
        PRE_AUTHORIZED_GRANT => request.pre_authorized_code.clone(),
        AUTHORIZATION_CODE_GRANT => request.code.clone(),
        other => {
            return Err(Error::UnsupportedGrantType(format!(
                "unsupported grant type \"{other}\""
            )));
        }
    };
    let Some(code) = code else {
        return Err(Error::InvalidRequest("no code provided".to_string()));
    };

    let exchange_ref = ExchangeRef::parse(target)?;
    let response = engine::transition(provider, &exchange_ref, |_, mut exchange| {
        let code = code.clone();
        let user_pin = request.user_pin.clone();
        async move {
            let Some(open_id) = exchange.open_id.as_mut() else {
                return Err(ExchangeError::validation(
                    "exchange does not support OpenID4VCI",
                ));
            };

            if open_id.pre_authorized_code.as_deref() != Some(code.as_str()) {
                return Err(ExchangeError::NotAllowed("invalid code".to_string()));
            }
            if open_id.code_consumed {
                return Err(ExchangeError::NotAllowed(
                    "code has already been redeemed".to_string(),
                ));
            }
            if let Some(expected) = &open_id.user_pin {
                if user_pin.as_deref() != Some(expected.as_str()) {
                    return Err(ExchangeError::NotAllowed("invalid user pin".to_string()));
                }
            }

            open_id.code_consumed = true;
            let access_token = open_id.issue_access_token(provider.now());

            Ok(Transition {
                exchange,
                response: TokenResponse {
                    access_token: access_token.token,
                    token_type: "bearer".to_string(),
                    expires_in: TOKEN_EXPIRES_IN,
                },
            })
        }
    })
    .await
    .map_err(|e| match e {
        // grant failures are authorization failures in the exchange
        // taxonomy but `invalid_grant` on the OAuth wire
        ExchangeError::NotAllowed(message) => Error::InvalidGrant(message),
        other => other.into(),
    })?;

    Ok(response.into())
}

impl Handler for Request<TokenRequest> {
    type Response = TokenResponse;
    type Error = Error;

    fn handle(
        self, target: &str, provider: &impl Provider,
    ) -> impl Future<Output = Result<Response<Self::Response>>> + Send {
        token(target, provider, self.body)
    }
}

impl Body for TokenRequest {}
