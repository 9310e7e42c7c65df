//! # Exchanges
//!
//! An exchange is a single run of a workflow across one or more protocol
//! round trips. It persists its current step, variables, protocol context
//! and the last error that prevented it from advancing; every mutation is
//! serialized by an optimistic `sequence` check.

pub mod engine;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::core::generate;
use crate::error::{Error, LastError, Result};
use crate::template;
use crate::workflow::WorkflowConfig;

/// Default time-to-live for a new exchange.
pub const DEFAULT_TTL_SECS: u64 = 60 * 15;

/// Maximum time-to-live for a new exchange: 30 days.
pub const MAX_TTL_SECS: u64 = 60 * 60 * 24 * 30;

// c_nonce and access-token lifetimes
const NONCE_TTL_SECS: i64 = 60 * 15;
const ACCESS_TOKEN_TTL_SECS: i64 = 60 * 15;

/// The lifecycle state of an exchange.
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ExchangeState {
    /// Created, no protocol interaction yet.
    #[default]
    Pending,

    /// A protocol interaction has begun.
    Active,

    /// Terminal. Mutating calls are rejected as duplicates.
    Complete,
}

/// Creation-time options for a new exchange.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CreateOptions {
    /// Time-to-live in seconds. Mutually exclusive with `expires`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ttl: Option<u64>,

    /// Absolute expiry. Mutually exclusive with `ttl`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires: Option<DateTime<Utc>>,

    /// Caller-supplied template variables.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub variables: Option<Value>,

    /// Issuer-side OpenID4VCI context, e.g. a pre-authorized code grant.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub open_id: Option<OpenIdContext>,
}

/// A single run of a workflow.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Exchange {
    /// Server-assigned identifier; the exchange URL's last path segment.
    pub id: String,

    /// The owning workflow's id.
    pub workflow_id: String,

    /// Optimistic-concurrency sequence; strictly increases on every
    /// mutation.
    pub sequence: u64,

    /// Lifecycle state.
    pub state: ExchangeState,

    /// Absolute expiry. Expired exchanges read as not found.
    pub expires: DateTime<Utc>,

    /// The current step name; `None` once the workflow is exhausted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step: Option<String>,

    /// Template variables. Always carries `issuanceDate`; grows
    /// `results.<stepName>` after each successful step.
    pub variables: Map<String, Value>,

    /// The challenge bound into the current step's presentation request,
    /// when the step had one created by the verifier's challenge service.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub challenge: Option<String>,

    /// The OpenID4VP authorization request most recently served for the
    /// current step, captured into the step's result on response.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authorization_request: Option<Value>,

    /// Issuer-side OpenID4VCI context.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub open_id: Option<OpenIdContext>,

    /// The most recent error that prevented advancement.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<LastError>,
}

impl Exchange {
    /// Create an exchange for a workflow.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] when both `ttl` and `expires` are
    /// given, the ttl is out of range, or the supplied variables are not a
    /// storable object.
    pub fn new(
        workflow: &WorkflowConfig, options: CreateOptions, now: DateTime<Utc>,
    ) -> Result<Self> {
        let expires = match (options.ttl, options.expires) {
            (Some(_), Some(_)) => {
                return Err(Error::validation("use either `ttl` or `expires`, not both"));
            }
            (None, Some(expires)) => {
                if expires <= now {
                    return Err(Error::validation("`expires` must be in the future"));
                }
                expires
            }
            (ttl, None) => {
                let ttl = ttl.unwrap_or(DEFAULT_TTL_SECS);
                if ttl == 0 || ttl > MAX_TTL_SECS {
                    return Err(Error::validation(format!(
                        "`ttl` must be between 1 and {MAX_TTL_SECS} seconds"
                    )));
                }
                now + Duration::seconds(i64::try_from(ttl).unwrap_or(i64::MAX))
            }
        };

        let mut variables = match options.variables {
            None => Map::new(),
            Some(Value::Object(map)) => {
                template::assert_storable(&Value::Object(map.clone()))?;
                map
            }
            Some(_) => {
                return Err(Error::validation("`variables` must be an object"));
            }
        };
        variables.insert(
            "issuanceDate".to_string(),
            json!(now.format("%Y-%m-%dT%H:%M:%SZ").to_string()),
        );

        Ok(Self {
            id: generate::exchange_id(),
            workflow_id: workflow.id.clone(),
            sequence: 0,
            state: ExchangeState::Pending,
            expires,
            step: workflow.initial_step.clone(),
            variables,
            challenge: None,
            authorization_request: None,
            open_id: options.open_id,
            last_error: None,
        })
    }

    /// Whether the exchange has expired.
    #[must_use]
    pub fn expired(&self, now: DateTime<Utc>) -> bool {
        self.expires <= now
    }

    /// The exchange-scoped challenge derived from the exchange id, used
    /// when a step does not request a verifier-created challenge.
    #[must_use]
    pub fn derived_challenge(&self) -> String {
        self.id.clone()
    }

    /// The challenge currently bound to the exchange: a verifier-created
    /// one when a step requested it, the derived one otherwise.
    #[must_use]
    pub fn bound_challenge(&self) -> String {
        self.challenge.clone().unwrap_or_else(|| self.derived_challenge())
    }

    /// The result recorded for a step, if any.
    #[must_use]
    pub fn step_result(&self, step_name: &str) -> Option<&Value> {
        self.variables.get("results")?.get(step_name)
    }

    /// Record a step's result. Each step's result is written at most once.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Duplicate`] when the step already has a result.
    pub fn record_result(&mut self, step_name: &str, result: Value) -> Result<()> {
        let results = self
            .variables
            .entry("results".to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        let Value::Object(results) = results else {
            return Err(Error::Server("`results` variable is not an object".to_string()));
        };
        if results.contains_key(step_name) {
            return Err(Error::Duplicate(format!(
                "a result has already been recorded for step \"{step_name}\""
            )));
        }
        results.insert(step_name.to_string(), result);
        Ok(())
    }

    /// Advance to the next step, completing the exchange when there is
    /// none.
    pub fn advance(&mut self, next_step: Option<String>) {
        match next_step {
            Some(next) => {
                self.step = Some(next);
                self.state = ExchangeState::Active;
            }
            None => {
                self.step = None;
                self.state = ExchangeState::Complete;
            }
        }
    }
}

/// Issuer-side OpenID4VCI context carried by an exchange.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OpenIdContext {
    /// The credential requests this exchange will accept.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected_credential_requests: Option<Vec<ExpectedCredentialRequest>>,

    /// Key material descriptor for OAuth2 interactions, e.g.
    /// `{"generateKeyPair": {"algorithm": "EdDSA"}}`. Opaque to this crate.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub oauth2: Option<Value>,

    /// The pre-authorized code accepted by the token endpoint.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pre_authorized_code: Option<String>,

    /// Whether the pre-authorized code has been exchanged for a token.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub code_consumed: bool,

    /// The transaction code (user PIN) required with the pre-authorized
    /// code, when one was set at creation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_pin: Option<String>,

    /// The current `c_nonce`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nonce: Option<String>,

    /// Expiry of the current `c_nonce`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nonce_expires: Option<DateTime<Utc>>,

    /// Access tokens issued for this exchange. Tokens never cross
    /// exchanges.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub access_tokens: Vec<AccessToken>,
}

impl OpenIdContext {
    /// Whether the bearer token is one of this exchange's unexpired access
    /// tokens.
    #[must_use]
    pub fn token_valid(&self, token: &str, now: DateTime<Utc>) -> bool {
        self.access_tokens.iter().any(|t| t.token == token && t.expires > now)
    }

    /// Mint a new exchange-scoped access token.
    pub fn issue_access_token(&mut self, now: DateTime<Utc>) -> AccessToken {
        let token = AccessToken {
            token: generate::access_token(),
            expires: now + Duration::seconds(ACCESS_TOKEN_TTL_SECS),
        };
        self.access_tokens.push(token.clone());
        token
    }

    /// Rotate the `c_nonce`, returning the fresh value and its expiry.
    pub fn rotate_nonce(&mut self, now: DateTime<Utc>) -> (String, DateTime<Utc>) {
        let nonce = generate::nonce();
        let expires = now + Duration::seconds(NONCE_TTL_SECS);
        self.nonce = Some(nonce.clone());
        self.nonce_expires = Some(expires);
        (nonce, expires)
    }

    /// Whether `nonce` matches the current unexpired `c_nonce`.
    #[must_use]
    pub fn nonce_valid(&self, nonce: &str, now: DateTime<Utc>) -> bool {
        self.nonce.as_deref() == Some(nonce)
            && self.nonce_expires.is_some_and(|expires| expires > now)
    }
}

/// A credential request an exchange expects to receive.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct ExpectedCredentialRequest {
    /// The acceptable credential format, e.g. `ldp_vc`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,

    /// The acceptable `credential_definition`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub credential_definition: Option<Value>,
}

/// An exchange-scoped OAuth access token.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AccessToken {
    /// The bearer token value.
    pub token: String,

    /// Absolute expiry.
    pub expires: DateTime<Utc>,
}
