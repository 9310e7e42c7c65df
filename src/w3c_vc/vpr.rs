//! # Verifiable Presentation Requests
//!
//! [VPR](https://w3c-ccg.github.io/vp-request-spec/) — the query a workflow
//! step presents to a wallet. Steps author the query statically or via a
//! step template; the exchange binds `challenge` and `domain` at request
//! time.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::core::OneMany;

/// Query type for DID authentication.
pub const DID_AUTHENTICATION: &str = "DIDAuthentication";

/// Query type for credential queries by example.
pub const QUERY_BY_EXAMPLE: &str = "QueryByExample";

/// A Verifiable Presentation Request.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct PresentationRequest {
    /// One or more queries the presentation must satisfy.
    pub query: OneMany<Query>,

    /// The challenge the presentation proof must bind.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub challenge: Option<String>,

    /// The domain the presentation proof must bind.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,

    /// Service endpoints the wallet may use to continue the exchange.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interact: Option<Value>,

    /// Further properties preserved verbatim.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl PresentationRequest {
    /// The first query of the given type, if present.
    #[must_use]
    pub fn query_of_type(&self, type_: &str) -> Option<&Query> {
        match &self.query {
            OneMany::One(query) => (query.type_ == type_).then_some(query),
            OneMany::Many(queries) => queries.iter().find(|q| q.type_ == type_),
        }
    }

    /// Whether the request includes a `DIDAuthentication` query.
    #[must_use]
    pub fn requests_did_authentication(&self) -> bool {
        self.query_of_type(DID_AUTHENTICATION).is_some()
    }

    /// All queries, in order.
    #[must_use]
    pub fn queries(&self) -> Vec<Query> {
        self.query.to_vec()
    }
}

/// A single VPR query.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct Query {
    /// The query type, e.g. `DIDAuthentication` or `QueryByExample`.
    #[serde(rename = "type")]
    pub type_: String,

    /// DID methods acceptable for authentication. Not transmitted over
    /// OpenID4VP.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accepted_methods: Option<Vec<Value>>,

    /// Cryptosuites acceptable for the authentication proof.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accepted_cryptosuites: Option<Vec<Value>>,

    /// Example-based credential queries.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub credential_query: Option<OneMany<Value>>,

    /// Further properties preserved verbatim.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}
