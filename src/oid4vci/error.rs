//! # OpenID4VCI Errors
//!
//! OAuth-style errors for the issuance endpoints. Each variant's `Display`
//! is its wire JSON body, so handlers and HTTP wrappers serialize errors
//! without further mapping.

use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;
use thiserror::Error;

/// OpenID4VCI protocol errors.
#[derive(Error, Debug, Deserialize)]
pub enum Error {
    /// The request is missing a required parameter, includes an unsupported
    /// parameter value, or is otherwise malformed.
    #[error(r#"{{"error": "invalid_request", "error_description": "{0}"}}"#)]
    InvalidRequest(String),

    /// The provided grant (pre-authorized code or authorization code) is
    /// invalid, expired, consumed, or bound to another exchange; or the
    /// transaction code is wrong.
    #[error(r#"{{"error": "invalid_grant", "error_description": "{0}"}}"#)]
    InvalidGrant(String),

    /// The access token is missing, expired, or not scoped to this
    /// exchange.
    #[error(r#"{{"error": "invalid_token", "error_description": "{0}"}}"#)]
    InvalidToken(String),

    /// The grant type is not supported by this issuer.
    #[error(r#"{{"error": "unsupported_grant_type", "error_description": "{0}"}}"#)]
    UnsupportedGrantType(String),

    /// The requested credential format is not supported.
    #[error(r#"{{"error": "unsupported_credential_format", "error_description": "{0}"}}"#)]
    UnsupportedCredentialFormat(String),

    /// The requested credential type is not supported.
    #[error(r#"{{"error": "unsupported_credential_type", "error_description": "{0}"}}"#)]
    UnsupportedCredentialType(String),

    /// The credential request lacked a proof or its proof was not bound to
    /// the issuer-provided `c_nonce`. Carries a fresh nonce for the retry.
    #[error(
        r#"{{"error": "invalid_or_missing_proof", "error_description": "{description}", "c_nonce": "{c_nonce}", "c_nonce_expires_in": {c_nonce_expires_in}}}"#
    )]
    InvalidProof {
        /// What was wrong with the proof.
        description: String,
        /// The fresh nonce to bind into the retried proof.
        c_nonce: String,
        /// Seconds until the fresh nonce expires.
        c_nonce_expires_in: i64,
    },

    /// The exchange requires a verified presentation before it will issue.
    /// Carries the OpenID4VP authorization request to fulfil first.
    #[error(r#"{{"error": "presentation_required", "authorization_request": {0}}}"#)]
    PresentationRequired(Value),

    /// A credential request against an already-completed exchange.
    #[error(r#"{{"error": "duplicate_error", "error_description": "{0}"}}"#)]
    DuplicateError(String),

    /// The workflow or exchange does not exist (or has expired).
    #[error(r#"{{"error": "invalid_request", "error_description": "{0}"}}"#)]
    NotFound(String),

    /// The caller is not authorized.
    #[error(r#"{{"error": "access_denied", "error_description": "{0}"}}"#)]
    AccessDenied(String),

    /// The request's `Accept` header excludes `application/json`.
    #[error(r#"{{"error": "invalid_request", "error_description": "{0}"}}"#)]
    NotAcceptable(String),

    /// The issuer encountered an unexpected condition.
    #[error(r#"{{"error": "server_error", "error_description": "{0}"}}"#)]
    ServerError(String),
}

impl Error {
    /// The HTTP status code conveying this error.
    #[must_use]
    pub const fn status(&self) -> u16 {
        match self {
            Self::InvalidToken(_) => 401,
            Self::AccessDenied(_) => 403,
            Self::NotFound(_) => 404,
            Self::NotAcceptable(_) => 406,
            Self::DuplicateError(_) => 409,
            Self::ServerError(_) => 500,
            _ => 400,
        }
    }

    /// The error as its OpenID-compatible JSON body.
    #[must_use]
    pub fn to_json(&self) -> Value {
        serde_json::from_str(&self.to_string()).unwrap_or_default()
    }
}

impl Serialize for Error {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl From<crate::Error> for Error {
    fn from(err: crate::Error) -> Self {
        match err {
            crate::Error::Validation { message, .. } | crate::Error::Data { message, .. } => {
                Self::InvalidRequest(message)
            }
            crate::Error::Verification { message, .. } => Self::InvalidRequest(message),
            crate::Error::NotAllowed(message) => Self::AccessDenied(message),
            crate::Error::NotFound(message) => Self::NotFound(message),
            crate::Error::Duplicate(message) => Self::DuplicateError(message),
            crate::Error::NotAcceptable(message) => Self::NotAcceptable(message),
            crate::Error::InvalidState(message) | crate::Error::Server(message) => {
                Self::ServerError(message)
            }
        }
    }
}
