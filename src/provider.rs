//! # Provider
//!
//! Traits implemented by the host to supply everything the engine treats as
//! external: configuration and exchange persistence, delegated capability
//! invocation, inbound authorization, JOSE checks, and the clock. A single
//! `Provider` bound bundles them so handlers take one generic parameter.

use std::future::Future;

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::error::{LastError, Result};
use crate::exchange::Exchange;
use crate::workflow::{Capability, WorkflowConfig};

/// Everything the exchange engine requires of its host.
pub trait Provider:
    WorkflowStore + ExchangeStore + ZcapInvoker + Authorizer + Jose + Clock + Clone
{
}

/// A blanket implementation so any type implementing the required super
/// traits is a `Provider`.
impl<T> Provider for T where
    T: WorkflowStore + ExchangeStore + ZcapInvoker + Authorizer + Jose + Clock + Clone
{
}

/// Persistence for workflow configurations.
pub trait WorkflowStore: Send + Sync {
    /// Store a new configuration.
    ///
    /// Implementations return [`crate::Error::Duplicate`] when the id is
    /// taken.
    fn insert_workflow(&self, config: &WorkflowConfig) -> impl Future<Output = Result<()>> + Send;

    /// Replace a configuration, guarded by the stored sequence.
    ///
    /// Implementations return [`crate::Error::InvalidState`] when the
    /// stored sequence is not `expected_sequence`.
    fn update_workflow(
        &self, config: &WorkflowConfig, expected_sequence: u64,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Load a configuration by workflow id.
    fn workflow(
        &self, workflow_id: &str,
    ) -> impl Future<Output = Result<Option<WorkflowConfig>>> + Send;
}

/// Persistence for exchanges. All transitions for a given
/// `(workflowId, exchangeId)` linearize via the sequence field.
pub trait ExchangeStore: Send + Sync {
    /// Store a new exchange.
    ///
    /// Implementations return [`crate::Error::Duplicate`] when the id is
    /// taken.
    fn insert_exchange(&self, exchange: &Exchange) -> impl Future<Output = Result<()>> + Send;

    /// Load an exchange. Implementations need not enforce expiry; the
    /// engine treats expired exchanges as not found at read time.
    fn exchange(
        &self, workflow_id: &str, exchange_id: &str,
    ) -> impl Future<Output = Result<Option<Exchange>>> + Send;

    /// Replace an exchange, guarded by the stored sequence.
    ///
    /// Implementations return [`crate::Error::InvalidState`] when the
    /// stored sequence is not `expected_sequence`.
    fn update_exchange(
        &self, exchange: &Exchange, expected_sequence: u64,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Record the most recent error without advancing state. Best-effort;
    /// concurrent writers may race benignly (last writer wins).
    fn update_last_error(
        &self, workflow_id: &str, exchange_id: &str, error: &LastError,
    ) -> impl Future<Output = Result<()>> + Send;
}

/// Invocation of delegated authorization capabilities against external
/// services (issuer, verifier, challenge creation, AR signing). The
/// capability framework verifies and routes the invocation; this crate
/// treats capabilities as opaque.
pub trait ZcapInvoker: Send + Sync {
    /// Invoke a capability at its target with a JSON body, returning the
    /// target's JSON response.
    fn invoke(
        &self, capability: &Capability, body: Value,
    ) -> impl Future<Output = anyhow::Result<Value>> + Send;
}

/// The credential presented with an inbound request.
#[derive(Clone, Debug)]
pub enum Authorization {
    /// An http-signature zcap invocation, opaque to this crate.
    Zcap {
        /// The invocation material (headers, signature) to verify.
        invocation: Value,
    },

    /// An OAuth2 bearer token issued by the workflow's configured
    /// authorization server.
    OAuth2 {
        /// The bearer token.
        token: String,
    },

    /// No credential was presented.
    None,
}

/// Verification of inbound request credentials against a workflow's access
/// controls (zcap controller match or OAuth2 token introspection).
pub trait Authorizer: Send + Sync {
    /// Verify that `authorization` permits `action` on the workflow.
    /// Failures surface as [`crate::Error::NotAllowed`] without revealing
    /// whether the target exists.
    fn authorize(
        &self, workflow: &WorkflowConfig, action: &str, authorization: &Authorization,
    ) -> impl Future<Output = anyhow::Result<()>> + Send;

    /// Record the revocation of a capability delegated from this workflow.
    fn record_revocation(
        &self, workflow_id: &str, capability: &Value,
    ) -> impl Future<Output = anyhow::Result<()>> + Send;
}

/// Claims recovered from a verified OpenID4VCI JWT DID proof.
#[derive(Clone, Debug, Default)]
pub struct DidProofClaims {
    /// The DID that controls the proof's signing key.
    pub did: String,

    /// The `nonce` claim, matched against the exchange's `c_nonce`.
    pub nonce: Option<String>,

    /// The `aud` claim, matched against the exchange URL.
    pub aud: Option<String>,
}

/// JOSE operations requiring key material or DID resolution, both of which
/// live outside this crate.
pub trait Jose: Send + Sync {
    /// Verify a JWT DID proof's signature and return its claims.
    fn verify_did_proof(
        &self, jwt: &str,
    ) -> impl Future<Output = anyhow::Result<DidProofClaims>> + Send;

    /// Unwrap a `direct_post.jwt` response envelope (JWS or JWE) into its
    /// payload claims.
    fn unwrap_response(&self, jwt: &str) -> impl Future<Output = anyhow::Result<Value>> + Send;
}

/// The single source of time. Tests inject a frozen clock.
pub trait Clock: Send + Sync {
    /// The current instant.
    fn now(&self) -> DateTime<Utc>;
}
