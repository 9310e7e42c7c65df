//! # OID4VCI Adapter
//!
//! Credential issuance over [OpenID for Verifiable Credential Issuance](https://openid.net/specs/openid-4-verifiable-credential-issuance-1_0.html),
//! rooted at the exchange URL: the exchange *is* the credential issuer for
//! the duration of its run. The adapter serves issuer metadata, the token,
//! nonce, credential and batch-credential endpoints, and builds
//! `openid-credential-offer://` URLs for wallet invocation.
//!
//! Endpoints translate their wire semantics into exchange transitions; all
//! state, completion and `lastError` handling is the engine's.

pub mod types;

mod batch;
mod credential;
mod error;
mod metadata;
mod nonce;
pub(crate) mod offer;
mod token;

pub use batch::{BatchCredentialRequest, BatchCredentialResponse};
pub use credential::CredentialRequest;
pub use error::Error;
pub use metadata::{IssuerMetadata, MetadataRequest};
pub use nonce::{NonceRequest, NonceResponse};
pub use offer::{CredentialOfferRequest, offer_uri_url, offer_url};
pub use token::{TokenRequest, TokenResponse};

/// Result type for OpenID4VCI endpoints.
pub type Result<T, E = Error> = std::result::Result<T, E>;
