//! # Protocols Handler
//!
//! `GET {exchangeId}/protocols` returns the map of protocol name to entry
//! URL a wallet can use against this exchange. The endpoint only produces
//! JSON and requires the caller to accept it.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::endpoint::{Body, ExchangeRef, Handler, Request, Response};
use crate::error::{Error, Result};
use crate::exchange::Exchange;
use crate::exchange::engine;
use crate::provider::Provider;
use crate::step;
use crate::workflow::WorkflowConfig;

#[cfg(feature = "oid4vci")]
use crate::oid4vci;

/// A request for an exchange's protocols map.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct ProtocolsRequest;

/// The protocols map.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct ProtocolsResponse {
    /// Resolvable endpoint URL per protocol name.
    pub protocols: BTreeMap<String, String>,
}

async fn get_protocols(
    target: &str, provider: &impl Provider, request: Request<ProtocolsRequest>,
) -> Result<Response<ProtocolsResponse>> {
    tracing::debug!("vcapi::protocols");

    if !request.accepts_json() {
        return Err(Error::NotAcceptable("this endpoint only produces application/json".into()));
    }

    let exchange_ref = ExchangeRef::parse(target)?;
    let (config, exchange) = engine::load(provider, &exchange_ref).await?;

    Ok(ProtocolsResponse {
        protocols: protocol_map(&config, &exchange, &exchange_ref.url),
    }
    .into())
}

/// The protocols available to an exchange in its current step.
pub(crate) fn protocol_map(
    config: &WorkflowConfig, exchange: &Exchange, exchange_url: &str,
) -> BTreeMap<String, String> {
    let mut protocols = BTreeMap::new();

    // the current step shapes which wallet protocols apply
    let resolved = exchange
        .step
        .as_ref()
        .and_then(|name| step::resolve(config, exchange, name, None).ok());

    let invite_only = resolved.as_ref().is_some_and(|step| {
        step.is_invite()
            && !step.requires_presentation()
            && step.issue_requests.is_empty()
            && config.credential_templates.is_empty()
    });
    if invite_only {
        protocols.insert(
            "inviteRequest".to_string(),
            format!("{exchange_url}/invite-request/response"),
        );
        return protocols;
    }

    protocols.insert("vcapi".to_string(), exchange_url.to_string());
    if let Some(step) = &resolved {
        if step.is_invite() {
            protocols.insert(
                "inviteRequest".to_string(),
                format!("{exchange_url}/invite-request/response"),
            );
        }
        #[cfg(feature = "oid4vp")]
        if step.open_id.is_some() {
            protocols.insert(
                "OID4VP".to_string(),
                format!("{exchange_url}/openid/client/authorization/request"),
            );
        }
    }

    #[cfg(feature = "oid4vci")]
    if let Some(open_id) = &exchange.open_id {
        if let Some(offer) = oid4vci::offer::offer_url(exchange_url, open_id) {
            protocols.insert("OID4VCI".to_string(), offer);
        }
    }

    protocols
}

impl Handler for Request<ProtocolsRequest> {
    type Response = ProtocolsResponse;
    type Error = Error;

    fn handle(
        self, target: &str, provider: &impl Provider,
    ) -> impl Future<Output = Result<Response<Self::Response>>> + Send {
        get_protocols(target, provider, self)
    }
}

impl Body for ProtocolsRequest {}
