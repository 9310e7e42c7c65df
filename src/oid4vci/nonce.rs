//! # Nonce Handler
//!
//! `POST {exchangeId}/openid/nonce` — mints the `c_nonce` a wallet binds
//! into its JWT DID proof. The nonce is exchange-scoped and rotates on
//! every request.

use serde::{Deserialize, Serialize};

use crate::endpoint::{Body, ExchangeRef, Handler, Request, Response};
use crate::error::Error as ExchangeError;
use crate::exchange::engine::{self, Transition};
use crate::oid4vci::{Error, Result};
use crate::provider::{Clock, Provider};

const NONCE_EXPIRES_IN: i64 = 900;

/// A request for a fresh proof nonce.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct NonceRequest;

/// A fresh proof nonce.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct NonceResponse {
    /// The nonce to bind into the next proof.
    pub nonce: String,

    /// Seconds until the nonce expires.
    pub nonce_expires_in: i64,
}

async fn nonce(
    target: &str, provider: &impl Provider, _request: NonceRequest,
) -> Result<Response<NonceResponse>> {
    tracing::debug!("oid4vci::nonce");

    let exchange_ref = ExchangeRef::parse(target)?;
    let response = engine::transition(provider, &exchange_ref, |_, mut exchange| async move {
        let Some(open_id) = exchange.open_id.as_mut() else {
            return Err(ExchangeError::validation("exchange does not support OpenID4VCI"));
        };
        let (nonce, _) = open_id.rotate_nonce(provider.now());
        Ok(Transition {
            exchange,
            response: NonceResponse { nonce, nonce_expires_in: NONCE_EXPIRES_IN },
        })
    })
    .await?;

    Ok(response.into())
}

impl Handler for Request<NonceRequest> {
    type Response = NonceResponse;
    type Error = Error;

    fn handle(
        self, target: &str, provider: &impl Provider,
    ) -> impl Future<Output = Result<Response<Self::Response>>> + Send {
        nonce(target, provider, self.body)
    }
}

impl Body for NonceRequest {}
