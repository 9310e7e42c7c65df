//! # Issuer Metadata Handler
//!
//! `GET {exchangeId}/.well-known/openid-credential-issuer` — static issuer
//! metadata derived from the workflow. The exchange URL doubles as the
//! credential issuer identifier, so endpoints are rooted beneath it.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::endpoint::{Body, ExchangeRef, Handler, Request, Response};
use crate::exchange::engine;
use crate::oid4vci::types::FORMAT_LDP_VC;
use crate::oid4vci::{Error, Result};
use crate::provider::Provider;

/// A request for issuer metadata.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct MetadataRequest;

/// OpenID4VCI issuer metadata.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct IssuerMetadata {
    /// The credential issuer identifier: the exchange URL.
    pub credential_issuer: String,

    /// The credential endpoint.
    pub credential_endpoint: String,

    /// The batch credential endpoint.
    pub batch_credential_endpoint: String,

    /// The token endpoint.
    pub token_endpoint: String,

    /// The nonce endpoint.
    pub nonce_endpoint: String,

    /// Pre-authorized clients need not authenticate.
    #[serde(rename = "pre-authorized_grant_anonymous_access_supported")]
    pub anonymous_access_supported: bool,

    /// Supported credential configurations, keyed by format.
    pub credential_configurations_supported: BTreeMap<String, Value>,
}

async fn metadata(
    target: &str, provider: &impl Provider, _request: Request<MetadataRequest>,
) -> Result<Response<IssuerMetadata>> {
    tracing::debug!("oid4vci::metadata");

    let exchange_ref = ExchangeRef::parse(target)?;
    let (config, _) = engine::load(provider, &exchange_ref).await?;

    let mut configurations = BTreeMap::new();
    for instance in &config.issuer_instances {
        for format in &instance.supported_formats {
            configurations.insert(format.clone(), json!({ "format": format }));
        }
    }
    if configurations.is_empty() && !config.credential_templates.is_empty() {
        configurations.insert(FORMAT_LDP_VC.to_string(), json!({ "format": FORMAT_LDP_VC }));
    }

    let exchange_url = &exchange_ref.url;
    Ok(IssuerMetadata {
        credential_issuer: exchange_url.clone(),
        credential_endpoint: format!("{exchange_url}/openid/credential"),
        batch_credential_endpoint: format!("{exchange_url}/openid/batch_credential"),
        token_endpoint: format!("{exchange_url}/openid/token"),
        nonce_endpoint: format!("{exchange_url}/openid/nonce"),
        anonymous_access_supported: true,
        credential_configurations_supported: configurations,
    }
    .into())
}

impl Handler for Request<MetadataRequest> {
    type Response = IssuerMetadata;
    type Error = Error;

    fn handle(
        self, target: &str, provider: &impl Provider,
    ) -> impl Future<Output = Result<Response<Self::Response>>> + Send {
        metadata(target, provider, self)
    }
}

impl Body for MetadataRequest {}
