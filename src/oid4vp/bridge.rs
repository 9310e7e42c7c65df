//! # VPR ↔ Presentation Definition Bridge
//!
//! Outgoing, a step's Verifiable Presentation Request becomes the
//! `presentation_definition` of an authorization request: each
//! `QueryByExample` credential query maps to an input descriptor
//! constraining the credential's `type`. Incoming, an authorization
//! request is reduced to the effective VPR the verifier client consumes:
//! `challenge = nonce`, `domain = response_uri`, and a
//! `DIDAuthentication` query carrying the server's broad cryptosuite
//! defaults (`acceptedMethods` is not transmitted over OpenID4VP).

use serde_json::{Value, json};

use crate::core::OneMany;
use crate::w3c_vc::vpr::{DID_AUTHENTICATION, PresentationRequest, QUERY_BY_EXAMPLE, Query};

/// Cryptosuites accepted for DID authentication when a wallet arrives
/// over OpenID4VP.
pub const DEFAULT_CRYPTOSUITES: [&str; 3] =
    ["ecdsa-rdfc-2019", "eddsa-rdfc-2022", "Ed25519Signature2020"];

/// Derive a `presentation_definition` from a step's presentation request.
#[must_use]
pub fn presentation_definition(vpr: &PresentationRequest, id: &str) -> Value {
    let mut input_descriptors = vec![];

    for (query_index, query) in vpr.queries().iter().enumerate() {
        if query.type_ != QUERY_BY_EXAMPLE {
            continue;
        }
        let Some(credential_query) = &query.credential_query else {
            continue;
        };
        for (example_index, example) in credential_query.to_vec().iter().enumerate() {
            let types: Vec<String> = example
                .get("example")
                .and_then(|example| example.get("type"))
                .map(type_strings)
                .unwrap_or_default();

            let mut fields = vec![];
            if !types.is_empty() {
                fields.push(json!({
                    "path": ["$.type"],
                    "filter": {
                        "type": "array",
                        "contains": { "enum": types }
                    }
                }));
            }

            let mut descriptor = json!({
                "id": format!("{query_index}-{example_index}"),
                "constraints": { "fields": fields }
            });
            if let Some(reason) = example.get("reason") {
                descriptor["purpose"] = reason.clone();
            }
            input_descriptors.push(descriptor);
        }
    }

    json!({
        "id": id,
        "input_descriptors": input_descriptors
    })
}

/// Derive the effective VPR for a response posted to an authorization
/// request.
#[must_use]
pub fn effective_vpr(authorization_request: &Value) -> PresentationRequest {
    let nonce = authorization_request.get("nonce").and_then(Value::as_str);
    let response_uri = authorization_request.get("response_uri").and_then(Value::as_str);

    PresentationRequest {
        query: OneMany::One(Query {
            type_: DID_AUTHENTICATION.to_string(),
            accepted_cryptosuites: Some(
                DEFAULT_CRYPTOSUITES.iter().map(|suite| json!({"cryptosuite": suite})).collect(),
            ),
            ..Query::default()
        }),
        challenge: nonce.map(ToString::to_string),
        domain: response_uri.map(ToString::to_string),
        ..PresentationRequest::default()
    }
}

fn type_strings(value: &Value) -> Vec<String> {
    match value {
        Value::String(s) => vec![s.clone()],
        Value::Array(items) => {
            items.iter().filter_map(Value::as_str).map(ToString::to_string).collect()
        }
        _ => vec![],
    }
}
