//! # Create Exchange Handler
//!
//! `POST {workflowId}/exchanges` creates an exchange from the workflow
//! template. Creation is authorized (zcap or OAuth2) and subject to the
//! workflow's IP allow-list. A created exchange's URL is returned in the
//! `Location` header; the body carries the exchange id and its protocols
//! map so controllers can hand wallets an entry point immediately.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use http::{HeaderMap, header};
use serde::{Deserialize, Serialize};

use crate::core::generate;
use crate::endpoint::{Body, Handler, Request, Response};
use crate::error::{Error, Result};
use crate::exchange::{CreateOptions, Exchange, ExchangeState};
use crate::provider::{Authorizer, Clock, ExchangeStore, Provider};
use crate::vcapi::protocols;
use crate::workflow;

/// A request to create an exchange.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct CreateExchangeRequest {
    /// Creation options: ttl or expiry, variables, OpenID4VCI context.
    #[serde(flatten)]
    pub options: CreateOptions,
}

/// The created exchange.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateExchangeResponse {
    /// The exchange URL.
    pub id: String,

    /// The exchange's lifecycle state.
    pub state: ExchangeState,

    /// Absolute expiry.
    pub expires: DateTime<Utc>,

    /// Resolvable endpoint URL per supported protocol.
    pub protocols: BTreeMap<String, String>,
}

async fn create_exchange(
    workflow_url: &str, provider: &impl Provider, request: Request<CreateExchangeRequest>,
) -> Result<Response<CreateExchangeResponse>> {
    tracing::debug!("vcapi::create_exchange");

    let config = workflow::fetch(provider, workflow_url).await?;
    config.check_ip(request.source)?;
    provider
        .authorize(&config, "createExchange", &request.authorization)
        .await
        .map_err(|e| Error::NotAllowed(format!("not authorized: {e}")))?;

    let mut options = request.body.options;
    if let Some(open_id) = &mut options.open_id {
        // a pre-authorized offer needs a code the wallet can redeem
        if open_id.pre_authorized_code.is_none() {
            open_id.pre_authorized_code = Some(generate::pre_authorized_code());
        }
    }

    let exchange = Exchange::new(&config, options, provider.now())?;
    provider.insert_exchange(&exchange).await?;

    let exchange_url = format!("{workflow_url}/exchanges/{}", exchange.id);
    let mut headers = HeaderMap::new();
    if let Ok(location) = exchange_url.parse() {
        headers.insert(header::LOCATION, location);
    }

    Ok(Response {
        status: 201,
        headers: Some(headers),
        body: CreateExchangeResponse {
            id: exchange_url.clone(),
            state: exchange.state,
            expires: exchange.expires,
            protocols: protocols::protocol_map(&config, &exchange, &exchange_url),
        },
    })
}

impl Handler for Request<CreateExchangeRequest> {
    type Response = CreateExchangeResponse;
    type Error = Error;

    fn handle(
        self, target: &str, provider: &impl Provider,
    ) -> impl Future<Output = Result<Response<Self::Response>>> + Send {
        create_exchange(target, provider, self)
    }
}

impl Body for CreateExchangeRequest {}
