//! OpenID4VCI + OpenID4VP Combined Flow

mod utils;

use serde_json::{Value, json};
use utils::{
    CONTROLLER, DEGREE_TEMPLATE, FIXED_SUBJECT_TEMPLATE, HOLDER_DID, METER_ID, ProviderImpl,
    WORKFLOW_URL, decode_payload, degree_variables, forge_jws, standard_zcaps,
};
use vc_exchange::endpoint;
use vc_exchange::exchange::{CreateOptions, ExchangeState, OpenIdContext};
use vc_exchange::oid4vci::types::PRE_AUTHORIZED_GRANT;
use vc_exchange::oid4vci::{CredentialRequest, Error, NonceRequest, TokenRequest};
use vc_exchange::oid4vp::AuthorizationSubmission;
use vc_exchange::vcapi::CreateExchangeRequest;
use vc_exchange::workflow::{self, WorkflowConfig};

async fn setup(provider: &ProviderImpl, config: Value) -> (String, String) {
    let config: WorkflowConfig =
        serde_json::from_value(config).expect("config should deserialize");
    workflow::create(provider, config).await.expect("should create workflow");

    let request = CreateExchangeRequest {
        options: CreateOptions {
            variables: Some(Value::Object(degree_variables())),
            open_id: Some(OpenIdContext::default()),
            ..CreateOptions::default()
        },
    };
    let exchange_url = endpoint::handle(WORKFLOW_URL, request, provider)
        .await
        .expect("should create exchange")
        .body
        .id;

    let code = provider
        .stored_exchange(WORKFLOW_URL, exchange_url.rsplit('/').next().expect("id"))
        .expect("stored")
        .open_id
        .expect("open id context")
        .pre_authorized_code
        .expect("code");

    let token = endpoint::handle(
        &exchange_url,
        TokenRequest {
            grant_type: PRE_AUTHORIZED_GRANT.to_string(),
            pre_authorized_code: Some(code),
            ..TokenRequest::default()
        },
        provider,
    )
    .await
    .expect("should return token")
    .body
    .access_token;

    (exchange_url, token)
}

fn presentation_gated_workflow() -> Value {
    json!({
        "id": WORKFLOW_URL,
        "controller": CONTROLLER,
        "sequence": 0,
        "meterId": METER_ID,
        "zcaps": standard_zcaps(),
        "credentialTemplates": [{"type": "jsonata", "template": DEGREE_TEMPLATE}],
        "steps": {
            "didAuthn": {
                "createChallenge": true,
                "verifiablePresentationRequest": {
                    "query": {"type": "DIDAuthentication"}
                },
                "openId": {
                    "clientProfiles": {"default": {"response_mode": "direct_post"}}
                }
            }
        },
        "initialStep": "didAuthn"
    })
}

// The credential endpoint signals presentation_required with the
// authorization request; after the wallet completes OpenID4VP with a
// VC-JWT envelope, the retried request succeeds and delivers a decodable
// VC-JWT bound to the presented DID.
#[tokio::test]
async fn presentation_required_then_jwt_delivery() {
    let provider = ProviderImpl::new();
    let (exchange_url, token) = setup(&provider, presentation_gated_workflow()).await;
    let exchange_id = exchange_url.rsplit('/').next().expect("exchange id");

    // --------------------------------------------------
    // The wallet asks for the credential too early
    // --------------------------------------------------
    let request = CredentialRequest {
        format: Some("jwt_vc_json-ld".to_string()),
        access_token: token.clone(),
        ..CredentialRequest::default()
    };
    let err = endpoint::handle(&exchange_url, request.clone(), &provider)
        .await
        .expect_err("presentation required first");
    let Error::PresentationRequired(authorization_request) = err else {
        panic!("expected presentation_required, got {err}");
    };
    let nonce =
        authorization_request["nonce"].as_str().expect("nonce bound").to_string();

    // the exchange activated when the AR was served
    let stored = provider.stored_exchange(WORKFLOW_URL, exchange_id).expect("stored");
    assert_eq!(stored.state, ExchangeState::Active);

    // --------------------------------------------------
    // The wallet fulfils the AR with an enveloped presentation
    // --------------------------------------------------
    let vp_jwt = forge_jws(&json!({
        "iss": HOLDER_DID,
        "nonce": nonce,
        "vp": {
            "@context": ["https://www.w3.org/ns/credentials/v2"],
            "type": ["VerifiablePresentation"],
            "holder": HOLDER_DID
        }
    }));
    let submission = AuthorizationSubmission {
        vp_token: Some(vp_jwt),
        presentation_submission: Some(json!({"id": "z1SubmissionId"}).to_string()),
        ..AuthorizationSubmission::default()
    };
    endpoint::handle(&exchange_url, submission, &provider)
        .await
        .expect("should accept response");

    // credential delivery still pending: the step holds
    let stored = provider.stored_exchange(WORKFLOW_URL, exchange_id).expect("stored");
    assert_eq!(stored.state, ExchangeState::Active);
    assert_eq!(stored.variables["results"]["didAuthn"]["did"], json!(HOLDER_DID));

    // --------------------------------------------------
    // The retried credential request now succeeds
    // --------------------------------------------------
    let response = endpoint::handle(&exchange_url, request, &provider)
        .await
        .expect("should deliver credential")
        .body;

    let jwt = response.credential.as_str().expect("VC-JWT string");
    let claims = decode_payload(jwt);
    assert_eq!(
        claims["vc"]["credentialSubject"]["id"],
        json!(HOLDER_DID)
    );
    assert_eq!(
        claims["vc"]["id"],
        json!("urn:uuid:188e8450-269e-4b57-89cc-d4e1e3279dcc")
    );

    let stored = provider.stored_exchange(WORKFLOW_URL, exchange_id).expect("stored");
    assert_eq!(stored.state, ExchangeState::Complete);
}

fn proof_gated_workflow() -> Value {
    json!({
        "id": WORKFLOW_URL,
        "controller": CONTROLLER,
        "sequence": 0,
        "meterId": METER_ID,
        "zcaps": standard_zcaps(),
        "credentialTemplates": [{"type": "jsonata", "template": FIXED_SUBJECT_TEMPLATE}],
        "steps": {
            "issue": {
                "jwtDidProofRequest": {"allowedAlgorithms": ["EdDSA"]}
            }
        },
        "initialStep": "issue"
    })
}

// A step demanding a JWT DID proof rejects proofless requests with a
// fresh c_nonce, then issues to the proven DID once a bound proof
// arrives.
#[tokio::test]
async fn jwt_did_proof_binding() {
    let provider = ProviderImpl::new();
    let (exchange_url, token) = setup(&provider, proof_gated_workflow()).await;

    // --------------------------------------------------
    // No proof: invalid_or_missing_proof with a usable c_nonce
    // --------------------------------------------------
    let bare = CredentialRequest {
        format: Some("ldp_vc".to_string()),
        access_token: token.clone(),
        ..CredentialRequest::default()
    };
    let err = endpoint::handle(&exchange_url, bare.clone(), &provider)
        .await
        .expect_err("proof required");
    let Error::InvalidProof { c_nonce, .. } = err else {
        panic!("expected invalid_or_missing_proof, got {err}");
    };
    assert_eq!(c_nonce.len(), 43);

    // --------------------------------------------------
    // A proof bound to a stale nonce is rejected and rotates again
    // --------------------------------------------------
    let stale = forge_jws(&json!({
        "iss": HOLDER_DID, "aud": exchange_url, "nonce": "zStaleNonce"
    }));
    let err = endpoint::handle(
        &exchange_url,
        CredentialRequest {
            proof: Some(
                serde_json::from_value(json!({"proof_type": "jwt", "jwt": stale}))
                    .expect("proof should deserialize"),
            ),
            ..bare.clone()
        },
        &provider,
    )
    .await
    .expect_err("stale nonce rejected");
    let Error::InvalidProof { c_nonce, .. } = err else {
        panic!("expected invalid_or_missing_proof, got {err}");
    };

    // --------------------------------------------------
    // A nonce endpoint refresh plus a bound proof succeeds
    // --------------------------------------------------
    let fresh = endpoint::handle(&exchange_url, NonceRequest, &provider)
        .await
        .expect("should rotate nonce")
        .body;
    assert_ne!(fresh.nonce, c_nonce);

    let proof = forge_jws(&json!({
        "iss": HOLDER_DID, "aud": exchange_url, "nonce": fresh.nonce
    }));
    let response = endpoint::handle(
        &exchange_url,
        CredentialRequest {
            proof: Some(
                serde_json::from_value(json!({"proof_type": "jwt", "jwt": proof}))
                    .expect("proof should deserialize"),
            ),
            ..bare
        },
        &provider,
    )
    .await
    .expect("should deliver credential")
    .body;

    // the subject is the proven DID, overriding the template's constant
    assert_eq!(
        response.credential["credentialSubject"]["id"],
        json!(HOLDER_DID)
    );
}
