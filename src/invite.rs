//! # Invite-Request Adapter
//!
//! A minimal callback protocol: `POST
//! {exchangeId}/invite-request/response` records the invited party's
//! response under the current step's result and completes the step. Used
//! by workflows that only need to collect a URL (e.g. an inbox or service
//! endpoint) rather than a presentation.

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::endpoint::{Body, ExchangeRef, Handler, Request, Response};
use crate::error::{Error, Result};
use crate::exchange::engine::{self, Transition};
use crate::provider::Provider;
use crate::step;

/// An invite response.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InviteResponse {
    /// The URL the invited party offers.
    pub url: String,

    /// Why the URL is being shared.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub purpose: Option<String>,

    /// Caller-chosen correlation id, echoed back.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference_id: Option<String>,
}

/// Acknowledgement of a recorded invite response.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InviteResponseResult {
    /// The correlation id from the request, when one was given.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference_id: Option<String>,
}

async fn invite_response(
    target: &str, provider: &impl Provider, response: InviteResponse,
) -> Result<Response<InviteResponseResult>> {
    tracing::debug!("invite::response");

    if response.url.is_empty() {
        return Err(Error::validation("`url` is required"));
    }

    let exchange_ref = ExchangeRef::parse(target)?;
    let result = engine::transition(provider, &exchange_ref, |config, mut exchange| {
        let response = response.clone();
        async move {
            let Some(step_name) = exchange.step.clone() else {
                return Err(Error::validation("workflow has no steps to execute"));
            };
            let step = step::resolve(&config, &exchange, &step_name, None)?;
            if !step.is_invite() {
                return Err(Error::validation(
                    "this step does not accept an invite response",
                ));
            }

            let reference_id = response.reference_id.clone();
            exchange.record_result(
                &step_name,
                json!({ "inviteRequest": { "inviteResponse": response } }),
            )?;
            exchange.advance(step.next_step.clone());

            Ok(Transition {
                exchange,
                response: InviteResponseResult { reference_id },
            })
        }
    })
    .await?;

    Ok(result.into())
}

impl Handler for Request<InviteResponse> {
    type Response = InviteResponseResult;
    type Error = Error;

    fn handle(
        self, target: &str, provider: &impl Provider,
    ) -> impl Future<Output = Result<Response<Self::Response>>> + Send {
        invite_response(target, provider, self.body)
    }
}

impl Body for InviteResponse {}
