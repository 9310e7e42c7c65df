//! # OID4VP Adapter
//!
//! Presentation collection over [OpenID for Verifiable Presentations](https://openid.net/specs/openid-4-verifiable-presentations-1_0.html).
//! A wallet retrieves the exchange's authorization request (plain JSON or a
//! signed JAR) and posts its `vp_token` back in `direct_post` or
//! `direct_post.jwt` mode; the adapter bridges between the step's
//! Verifiable Presentation Request and the OpenID `presentation_definition`
//! in both directions and funnels verification through the common verifier
//! client.

pub mod bridge;

mod error;
mod request;
mod response;

pub use error::Error;
pub use request::{AuthorizationRequestRequest, AuthorizationRequestResponse};
pub(crate) use request::authorization_payload;
pub use response::{AuthorizationResponseResult, AuthorizationSubmission};

/// Result type for OpenID4VP endpoints.
pub type Result<T, E = Error> = std::result::Result<T, E>;
