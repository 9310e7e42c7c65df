//! In-memory provider for integration tests: hash-map stores, a
//! controllable clock, a recorded capability invoker with canned issuer /
//! verifier / challenge / signer services, and claims-only JOSE checks.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use base64ct::{Base64UrlUnpadded, Encoding};
use chrono::{DateTime, Duration, Utc};
use serde_json::{Map, Value, json};
use vc_exchange::error::{Error, LastError, Result};
use vc_exchange::exchange::Exchange;
use vc_exchange::provider::{
    Authorization, Authorizer, Clock, DidProofClaims, ExchangeStore, Jose, WorkflowStore,
    ZcapInvoker,
};
use vc_exchange::workflow::{Capability, WorkflowConfig};

pub const WORKFLOW_URL: &str = "https://exchanger.example/workflows/z1A2bWorkflow";
pub const CONTROLLER: &str = "did:key:z6MkpTHR8VNsBxYAAWHut2Geadd9jSwuBV8xRoAnwWsdvktH";
pub const METER_ID: &str = "z19wCharQmCGwDeNrsDnNbSn4";
pub const HOLDER_DID: &str = "did:key:z6MkhaXgBZDvotDkL5257faiztiGiC2QtKLGpbnnEGta2doK";

pub const ISSUE_TARGET: &str = "https://issuer.example/issuers/z1Issuer/credentials/issue";
pub const VERIFY_TARGET: &str =
    "https://verifier.example/verifiers/z1Verifier/presentations/verify";
pub const CHALLENGE_TARGET: &str = "https://verifier.example/verifiers/z1Verifier/challenges";
pub const SIGN_AR_TARGET: &str = "https://kms.example/keystores/z1Kms/keys/z1Key/sign";

#[derive(Clone, Default)]
pub struct ProviderImpl {
    workflows: Arc<Mutex<HashMap<String, WorkflowConfig>>>,
    exchanges: Arc<Mutex<HashMap<(String, String), Exchange>>>,
    now: Arc<Mutex<DateTime<Utc>>>,
    pub invocations: Arc<Mutex<Vec<(String, Value)>>>,
    pub verify_result: Arc<Mutex<Option<Value>>>,
    pub deny_authorization: Arc<Mutex<bool>>,
}

impl ProviderImpl {
    pub fn new() -> Self {
        let provider = Self::default();
        *provider.now.lock().expect("clock lock") =
            "2026-07-01T10:30:15Z".parse().expect("timestamp");
        provider
    }

    /// Move the clock forward.
    pub fn advance_clock(&self, seconds: i64) {
        let mut now = self.now.lock().expect("clock lock");
        *now += Duration::seconds(seconds);
    }

    /// Make the next verifier call return this response instead of the
    /// canned success.
    pub fn set_verify_result(&self, result: Value) {
        *self.verify_result.lock().expect("verify lock") = Some(result);
    }

    pub fn deny_authorization(&self) {
        *self.deny_authorization.lock().expect("deny lock") = true;
    }

    pub fn stored_exchange(&self, workflow_id: &str, exchange_id: &str) -> Option<Exchange> {
        self.exchanges
            .lock()
            .expect("exchange lock")
            .get(&(workflow_id.to_string(), exchange_id.to_string()))
            .cloned()
    }

    pub fn invocation_targets(&self) -> Vec<String> {
        self.invocations
            .lock()
            .expect("invocation lock")
            .iter()
            .map(|(target, _)| target.clone())
            .collect()
    }
}

impl WorkflowStore for ProviderImpl {
    async fn insert_workflow(&self, config: &WorkflowConfig) -> Result<()> {
        let mut workflows = self.workflows.lock().expect("workflow lock");
        if workflows.contains_key(&config.id) {
            return Err(Error::Duplicate("workflow already exists".to_string()));
        }
        workflows.insert(config.id.clone(), config.clone());
        Ok(())
    }

    async fn update_workflow(
        &self, config: &WorkflowConfig, expected_sequence: u64,
    ) -> Result<()> {
        let mut workflows = self.workflows.lock().expect("workflow lock");
        let Some(stored) = workflows.get(&config.id) else {
            return Err(Error::NotFound("workflow not found".to_string()));
        };
        if stored.sequence != expected_sequence {
            return Err(Error::InvalidState("stale workflow sequence".to_string()));
        }
        workflows.insert(config.id.clone(), config.clone());
        Ok(())
    }

    async fn workflow(&self, workflow_id: &str) -> Result<Option<WorkflowConfig>> {
        Ok(self.workflows.lock().expect("workflow lock").get(workflow_id).cloned())
    }
}

impl ExchangeStore for ProviderImpl {
    async fn insert_exchange(&self, exchange: &Exchange) -> Result<()> {
        let mut exchanges = self.exchanges.lock().expect("exchange lock");
        let key = (exchange.workflow_id.clone(), exchange.id.clone());
        if exchanges.contains_key(&key) {
            return Err(Error::Duplicate("exchange already exists".to_string()));
        }
        exchanges.insert(key, exchange.clone());
        Ok(())
    }

    async fn exchange(&self, workflow_id: &str, exchange_id: &str) -> Result<Option<Exchange>> {
        Ok(self
            .exchanges
            .lock()
            .expect("exchange lock")
            .get(&(workflow_id.to_string(), exchange_id.to_string()))
            .cloned())
    }

    async fn update_exchange(&self, exchange: &Exchange, expected_sequence: u64) -> Result<()> {
        let mut exchanges = self.exchanges.lock().expect("exchange lock");
        let key = (exchange.workflow_id.clone(), exchange.id.clone());
        let Some(stored) = exchanges.get(&key) else {
            return Err(Error::NotFound("exchange not found".to_string()));
        };
        if stored.sequence != expected_sequence {
            return Err(Error::InvalidState("stale exchange sequence".to_string()));
        }
        exchanges.insert(key, exchange.clone());
        Ok(())
    }

    async fn update_last_error(
        &self, workflow_id: &str, exchange_id: &str, error: &LastError,
    ) -> Result<()> {
        let mut exchanges = self.exchanges.lock().expect("exchange lock");
        if let Some(stored) =
            exchanges.get_mut(&(workflow_id.to_string(), exchange_id.to_string()))
        {
            stored.last_error = Some(error.clone());
        }
        Ok(())
    }
}

impl ZcapInvoker for ProviderImpl {
    async fn invoke(&self, capability: &Capability, body: Value) -> anyhow::Result<Value> {
        let target = capability
            .0
            .get("invocationTarget")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        self.invocations.lock().expect("invocation lock").push((target.clone(), body.clone()));

        match target.as_str() {
            CHALLENGE_TARGET => Ok(json!({"challenge": "z19uokPn3b1Z4XDbQSHo7VhFR"})),
            VERIFY_TARGET => Ok(self.verify(&body)),
            ISSUE_TARGET => Ok(issue(&body)),
            SIGN_AR_TARGET => {
                let payload = body.get("payload").cloned().unwrap_or_default();
                Ok(json!({"jws": forge_jws(&payload)}))
            }
            other => Err(anyhow::anyhow!("unknown invocation target: {other}")),
        }
    }
}

impl ProviderImpl {
    // canned verifier: checks the proof challenge against the requested
    // one unless a test has primed an explicit verdict
    fn verify(&self, body: &Value) -> Value {
        if let Some(result) = self.verify_result.lock().expect("verify lock").take() {
            return result;
        }

        let vp = body.get("verifiablePresentation").cloned().unwrap_or_default();
        let expected = body
            .pointer("/options/challenge")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        let challenge = match &vp {
            Value::String(jwt) => decode_payload(jwt)
                .get("nonce")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            _ => vp
                .pointer("/proof/challenge")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
        };

        if challenge != expected {
            return json!({
                "verified": false,
                "credentialResults": [],
                "error": {"message": "challenge mismatch"}
            });
        }

        let count = match vp.get("verifiableCredential") {
            Some(Value::Array(items)) => items.len(),
            Some(_) => 1,
            None => 0,
        };
        let credential_results: Vec<Value> =
            (0..count).map(|_| json!({"verified": true})).collect();
        json!({"verified": true, "credentialResults": credential_results})
    }
}

// canned issuer: embedded proof for ldp_vc, a claims-consistent VC-JWT for
// the jwt formats
fn issue(body: &Value) -> Value {
    let credential = body.get("credential").cloned().unwrap_or_default();
    let format = body.pointer("/options/format").and_then(Value::as_str).unwrap_or("ldp_vc");

    if format.starts_with("jwt_vc") {
        let claims = json!({
            "iss": credential.get("issuer").cloned().unwrap_or_default(),
            "jti": credential.get("id").cloned().unwrap_or_default(),
            "sub": credential.pointer("/credentialSubject/id").cloned().unwrap_or_default(),
            "vc": credential,
        });
        return json!({"verifiableCredential": forge_jws(&claims)});
    }

    let mut signed = credential;
    if let Value::Object(map) = &mut signed {
        map.insert(
            "proof".to_string(),
            json!({
                "type": "Ed25519Signature2020",
                "verificationMethod": "did:web:issuer.example#key-1",
                "proofValue": "z3FXQjecWufY46yg5abdVZsXqLhxhueuSoZgNSARiKBk9czhSePTFrHLPPXFDBBmSFQKJsVNFVLEVbMA1sP3nKEbn"
            }),
        );
    }
    json!({"verifiableCredential": signed})
}

impl Authorizer for ProviderImpl {
    async fn authorize(
        &self, _workflow: &WorkflowConfig, _action: &str, _authorization: &Authorization,
    ) -> anyhow::Result<()> {
        if *self.deny_authorization.lock().expect("deny lock") {
            return Err(anyhow::anyhow!("controller does not match"));
        }
        Ok(())
    }

    async fn record_revocation(
        &self, _workflow_id: &str, _capability: &Value,
    ) -> anyhow::Result<()> {
        Ok(())
    }
}

impl Jose for ProviderImpl {
    async fn verify_did_proof(&self, jwt: &str) -> anyhow::Result<DidProofClaims> {
        let claims = decode_payload(jwt);
        let Some(did) = claims.get("iss").and_then(Value::as_str) else {
            return Err(anyhow::anyhow!("proof has no issuer"));
        };
        Ok(DidProofClaims {
            did: did.to_string(),
            nonce: claims.get("nonce").and_then(Value::as_str).map(ToString::to_string),
            aud: claims.get("aud").and_then(Value::as_str).map(ToString::to_string),
        })
    }

    async fn unwrap_response(&self, jwt: &str) -> anyhow::Result<Value> {
        Ok(decode_payload(jwt))
    }
}

impl Clock for ProviderImpl {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().expect("clock lock")
    }
}

/// Compact-JWS shape over a JSON payload, signature not cryptographic.
pub fn forge_jws(payload: &Value) -> String {
    let header = Base64UrlUnpadded::encode_string(br#"{"alg":"EdDSA","typ":"JWT"}"#);
    let body = Base64UrlUnpadded::encode_string(payload.to_string().as_bytes());
    format!("{header}.{body}.c2lnbmF0dXJl")
}

/// Decode a compact JWT's payload without verification.
pub fn decode_payload(jwt: &str) -> Value {
    jwt.split('.')
        .nth(1)
        .and_then(|part| Base64UrlUnpadded::decode_vec(part).ok())
        .and_then(|bytes| serde_json::from_slice(&bytes).ok())
        .unwrap_or_default()
}

/// A delegated capability pointing at one of the canned services.
pub fn zcap(target: &str) -> Value {
    json!({
        "id": format!("urn:zcap:{}", target.rsplit('/').next().unwrap_or_default()),
        "controller": CONTROLLER,
        "invocationTarget": target,
    })
}

/// The standard zcap set used by most test workflows.
pub fn standard_zcaps() -> Value {
    json!({
        "issue": zcap(ISSUE_TARGET),
        "credentialStatus": zcap("https://issuer.example/issuers/z1Issuer/credentials/status"),
        "createChallenge": zcap(CHALLENGE_TARGET),
        "verifyPresentation": zcap(VERIFY_TARGET),
    })
}

/// A JSONata template producing a university degree credential bound to
/// the DID-authentication result.
pub const DEGREE_TEMPLATE: &str = r#"{
    "@context": [
        "https://www.w3.org/2018/credentials/v1",
        "https://www.w3.org/2018/credentials/examples/v1"
    ],
    "id": variables.credentialId,
    "type": ["VerifiableCredential", "UniversityDegreeCredential"],
    "issuer": "did:web:issuer.example",
    "issuanceDate": variables.issuanceDate,
    "credentialSubject": {
        "id": variables.results.didAuthn.did,
        "degree": {"type": "BachelorDegree", "name": "Bachelor of Science and Arts"}
    }
}"#;

/// A JSONata template with a constant subject, for flows with no DID
/// binding.
pub const FIXED_SUBJECT_TEMPLATE: &str = r#"{
    "@context": ["https://www.w3.org/2018/credentials/v1"],
    "id": variables.credentialId,
    "type": ["VerifiableCredential", "UniversityDegreeCredential"],
    "issuer": "did:web:issuer.example",
    "issuanceDate": variables.issuanceDate,
    "credentialSubject": {"id": "did:example:ebfeb1f712ebc6f1c276e12ec21"}
}"#;

/// An Ed25519-style signed presentation over the given credentials.
pub fn signed_vp(challenge: &str, credentials: Vec<Value>) -> Value {
    let mut vp = json!({
        "@context": ["https://www.w3.org/2018/credentials/v1"],
        "type": ["VerifiablePresentation"],
        "holder": HOLDER_DID,
        "proof": {
            "type": "Ed25519Signature2020",
            "verificationMethod": format!("{HOLDER_DID}#{}", &HOLDER_DID[8..]),
            "challenge": challenge,
            "proofValue": "z4oey5q2M3XKaxup3tmzN4DRFTLVqpLMweBrSxMY2xHX5XTYVQeVbY8nQAVHMrXFkXJpmEcqdoDwLWxaqA3Q1geV6"
        }
    });
    if !credentials.is_empty() {
        vp["verifiableCredential"] = json!(credentials);
    }
    vp
}

/// A presentation with no proof.
pub fn unprotected_vp(credentials: Vec<Value>) -> Value {
    let mut vp = json!({
        "@context": ["https://www.w3.org/2018/credentials/v1"],
        "type": ["VerifiablePresentation"],
    });
    if !credentials.is_empty() {
        vp["verifiableCredential"] = json!(credentials);
    }
    vp
}

/// Caller-supplied variables for a degree issuance run.
pub fn degree_variables() -> Map<String, Value> {
    let mut variables = Map::new();
    variables.insert(
        "credentialId".to_string(),
        json!("urn:uuid:188e8450-269e-4b57-89cc-d4e1e3279dcc"),
    );
    variables
}
