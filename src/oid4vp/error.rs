//! # OpenID4VP Errors
//!
//! OAuth-style errors for the presentation endpoints, rendered the same
//! way as the issuance errors: the `Display` of a variant is its wire
//! JSON body.

use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;
use thiserror::Error;

/// OpenID4VP protocol errors.
#[derive(Error, Debug, Deserialize)]
pub enum Error {
    /// The request is malformed: unknown client profile, missing
    /// `vp_token`, undecodable response envelope.
    #[error(r#"{{"error": "invalid_request", "error_description": "{0}"}}"#)]
    InvalidRequest(String),

    /// The submitted presentation was rejected.
    #[error(r#"{{"error": "access_denied", "error_description": "{0}"}}"#)]
    AccessDenied(String),

    /// The workflow or exchange does not exist (or has expired).
    #[error(r#"{{"error": "invalid_request", "error_description": "{0}"}}"#)]
    NotFound(String),

    /// A response posted to an already-completed exchange.
    #[error(r#"{{"error": "invalid_request", "error_description": "{0}"}}"#)]
    Duplicate(String),

    /// The verifier encountered an unexpected condition.
    #[error(r#"{{"error": "server_error", "error_description": "{0}"}}"#)]
    ServerError(String),
}

impl Error {
    /// The HTTP status code conveying this error.
    #[must_use]
    pub const fn status(&self) -> u16 {
        match self {
            Self::InvalidRequest(_) | Self::AccessDenied(_) => 400,
            Self::NotFound(_) => 404,
            Self::Duplicate(_) => 409,
            Self::ServerError(_) => 500,
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
            crate::Error::Validation { message, .. }
            | crate::Error::Data { message, .. }
            | crate::Error::NotAcceptable(message) => Self::InvalidRequest(message),
            crate::Error::Verification { message, .. } | crate::Error::NotAllowed(message) => {
                Self::AccessDenied(message)
            }
            crate::Error::NotFound(message) => Self::NotFound(message),
            crate::Error::Duplicate(message) => Self::Duplicate(message),
            crate::Error::InvalidState(message) | crate::Error::Server(message) => {
                Self::ServerError(message)
            }
        }
    }
}
