//! # Get Exchange Handler
//!
//! `GET {exchangeId}` returns the authorized controller view of an
//! exchange: state, step, variables (including step results) and the last
//! error. Expired exchanges read as not found.

use serde::{Deserialize, Serialize};

use crate::endpoint::{Body, ExchangeRef, Handler, Request, Response};
use crate::error::{Error, Result};
use crate::exchange::Exchange;
use crate::exchange::engine;
use crate::provider::{Authorizer, Provider};

/// A request for the exchange view.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct GetExchangeRequest;

/// The controller view of an exchange.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct ExchangeView {
    /// The exchange record.
    pub exchange: Exchange,
}

async fn get_exchange(
    target: &str, provider: &impl Provider, request: Request<GetExchangeRequest>,
) -> Result<Response<ExchangeView>> {
    tracing::debug!("vcapi::get_exchange");

    let exchange_ref = ExchangeRef::parse(target)?;
    let (config, exchange) = engine::load(provider, &exchange_ref).await?;

    config.check_ip(request.source)?;
    provider
        .authorize(&config, "readExchange", &request.authorization)
        .await
        .map_err(|e| Error::NotAllowed(format!("not authorized: {e}")))?;

    Ok(ExchangeView { exchange }.into())
}

impl Handler for Request<GetExchangeRequest> {
    type Response = ExchangeView;
    type Error = Error;

    fn handle(
        self, target: &str, provider: &impl Provider,
    ) -> impl Future<Output = Result<Response<Self::Response>>> + Send {
        get_exchange(target, provider, self)
    }
}

impl Body for GetExchangeRequest {}
