//! # Exchange Errors
//!
//! The semantic error taxonomy shared by the workflow registry, the exchange
//! engine, and the protocol adapters. Adapters translate these kinds into
//! protocol-specific payloads; HTTP wrappers map them onto status codes via
//! [`Error::status`].

use serde::{Deserialize, Serialize, Serializer, ser::SerializeMap};
use serde_json::Value;
use thiserror::Error;

/// Errors arising while configuring workflows or progressing exchanges.
#[derive(Clone, Error, Debug)]
pub enum Error {
    /// The input has an invalid shape: schema violation, unknown zcap
    /// reference id, malformed CIDR, or a `presentationSchema` mismatch.
    #[error("{message}")]
    Validation {
        /// Description of the violation.
        message: String,
        /// Per-field details, e.g. `{"errors": [{"message": ...}]}`.
        details: Option<Value>,
    },

    /// The input is well-formed but semantically wrong: verification failed,
    /// VC-JWT claim mismatch, unprotected presentation where one is required.
    #[error("{message}")]
    Data {
        /// Description of the problem.
        message: String,
        /// Supporting detail.
        details: Option<Value>,
    },

    /// Authorization failed: zcap controller mismatch, IP not in the
    /// allow-list, access token scope mismatch, or reuse of a consumed code.
    #[error("{0}")]
    NotAllowed(String),

    /// The workflow or exchange does not exist. Expired exchanges are
    /// indistinguishable from nonexistent ones.
    #[error("{0}")]
    NotFound(String),

    /// A second submission to a completed exchange, or a colliding id.
    #[error("{0}")]
    Duplicate(String),

    /// A stale sequence number or a state incompatible with the attempted
    /// transition.
    #[error("{0}")]
    InvalidState(String),

    /// Wraps verifier-side failure, retaining per-credential results.
    #[error("{message}")]
    Verification {
        /// Description of the verification failure.
        message: String,
        /// The verifier's per-credential results, in submission order.
        credential_results: Vec<Value>,
    },

    /// The request's `Accept` header excludes the only representation the
    /// endpoint produces.
    #[error("{0}")]
    NotAcceptable(String),

    /// An unexpected condition prevented the server from fulfilling the
    /// request. Never recorded to `lastError` with internal detail.
    #[error("{0}")]
    Server(String),
}

impl Error {
    /// Shorthand for a detail-free [`Error::Validation`].
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation { message: message.into(), details: None }
    }

    /// Shorthand for a detail-free [`Error::Data`].
    pub fn data(message: impl Into<String>) -> Self {
        Self::Data { message: message.into(), details: None }
    }

    /// The wire `name` of the error kind.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "ValidationError",
            Self::Data { .. } => "DataError",
            Self::NotAllowed(_) => "NotAllowedError",
            Self::NotFound(_) => "NotFoundError",
            Self::Duplicate(_) => "DuplicateError",
            Self::InvalidState(_) => "InvalidStateError",
            Self::Verification { .. } => "VerificationError",
            Self::NotAcceptable(_) => "NotAcceptableError",
            Self::Server(_) => "ServerError",
        }
    }

    /// The HTTP status code conveying this error kind.
    #[must_use]
    pub const fn status(&self) -> u16 {
        match self {
            Self::Validation { .. } | Self::Data { .. } | Self::Verification { .. } => 400,
            Self::NotAllowed(_) => 403,
            Self::NotFound(_) => 404,
            Self::NotAcceptable(_) => 406,
            Self::Duplicate(_) | Self::InvalidState(_) => 409,
            Self::Server(_) => 500,
        }
    }

    /// Detail payload, when the kind carries one.
    #[must_use]
    pub fn details(&self) -> Option<Value> {
        match self {
            Self::Validation { details, .. } | Self::Data { details, .. } => details.clone(),
            Self::Verification { credential_results, .. } => {
                Some(serde_json::json!({ "credentialResults": credential_results }))
            }
            _ => None,
        }
    }
}

impl Serialize for Error {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let details = self.details();
        let len = if details.is_some() { 3 } else { 2 };
        let mut map = serializer.serialize_map(Some(len))?;
        map.serialize_entry("name", self.name())?;
        map.serialize_entry("message", &self.to_string())?;
        if let Some(details) = &details {
            map.serialize_entry("details", details)?;
        }
        map.end()
    }
}

/// The most recent error that prevented an exchange from advancing, as
/// persisted on `exchange.lastError`.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct LastError {
    /// The error kind, e.g. `DuplicateError`.
    pub name: String,

    /// Human-readable description.
    pub message: String,

    /// Optional structured detail.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

impl From<&Error> for LastError {
    fn from(err: &Error) -> Self {
        // internal failure detail stays out of persisted state
        if let Error::Server(_) = err {
            return Self {
                name: err.name().to_string(),
                message: "internal error".to_string(),
                details: None,
            };
        }
        Self {
            name: err.name().to_string(),
            message: err.to_string(),
            details: err.details(),
        }
    }
}

/// Result type for exchange operations.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Construct an [`Error::Server`] from a format string.
#[macro_export]
macro_rules! server {
    ($fmt:expr, $($arg:tt)*) => {
        $crate::Error::Server(format!($fmt, $($arg)*))
    };
    ($err:expr $(,)?) => {
        $crate::Error::Server(format!($err))
    };
}
