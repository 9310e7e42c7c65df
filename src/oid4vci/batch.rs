//! # Batch Credential Handler
//!
//! `POST {exchangeId}/openid/batch_credential` — like the credential
//! endpoint, but accepts several credential requests in one call and
//! returns their responses in the same order. The batch commits as a
//! single exchange transition: either every request issues or none does.

use serde::{Deserialize, Serialize};

use crate::endpoint::{Body, ExchangeRef, Handler, Request, Response};
use crate::exchange::engine::{self, Transition};
use crate::oid4vci::credential::{self, CredentialRequest};
use crate::oid4vci::types::CredentialResponse;
use crate::oid4vci::{Error, Result};
use crate::provider::Provider;

/// A batch of credential requests.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct BatchCredentialRequest {
    /// The requests, processed in order.
    pub credential_requests: Vec<CredentialRequest>,

    /// The bearer token, copied from the `Authorization` header by the
    /// HTTP wrapper.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub access_token: String,
}

/// The batch's responses, in request order.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct BatchCredentialResponse {
    /// One response per request.
    pub credential_responses: Vec<CredentialResponse>,
}

async fn batch_credential(
    target: &str, provider: &impl Provider, request: BatchCredentialRequest,
) -> Result<Response<BatchCredentialResponse>> {
    tracing::debug!("oid4vci::batch_credential");

    if request.credential_requests.is_empty() {
        return Err(Error::InvalidRequest("no credential requests".to_string()));
    }
    for inner in &request.credential_requests {
        credential::validate_format(inner)?;
    }

    let exchange_ref = ExchangeRef::parse(target)?;
    let outcome = engine::transition(provider, &exchange_ref, |config, mut exchange| {
        let request = request.clone();
        let exchange_ref = exchange_ref.clone();
        async move {
            let responses = credential::process(
                provider,
                &config,
                &mut exchange,
                &exchange_ref,
                &request.access_token,
                &request.credential_requests,
            )
            .await?;
            Ok(Transition {
                exchange,
                response: responses
                    .map(|credential_responses| BatchCredentialResponse { credential_responses }),
            })
        }
    })
    .await
    .map_err(credential::as_token_error)?;

    outcome.map(Into::into)
}

impl Handler for Request<BatchCredentialRequest> {
    type Response = BatchCredentialResponse;
    type Error = Error;

    fn handle(
        self, target: &str, provider: &impl Provider,
    ) -> impl Future<Output = Result<Response<Self::Response>>> + Send {
        batch_credential(target, provider, self.body)
    }
}

impl Body for BatchCredentialRequest {}
