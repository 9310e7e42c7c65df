//! VC-API Exchange Flow

mod utils;

use serde_json::{Value, json};
use utils::{
    CONTROLLER, DEGREE_TEMPLATE, HOLDER_DID, METER_ID, ProviderImpl, WORKFLOW_URL,
    degree_variables, signed_vp, standard_zcaps, unprotected_vp,
};
use vc_exchange::endpoint;
use vc_exchange::exchange::{CreateOptions, ExchangeState};
use vc_exchange::vcapi::{CreateExchangeRequest, ExchangeSubmission};
use vc_exchange::workflow::{self, WorkflowConfig};

async fn create_workflow(provider: &ProviderImpl, config: Value) -> WorkflowConfig {
    let config: WorkflowConfig =
        serde_json::from_value(config).expect("config should deserialize");
    workflow::create(provider, config).await.expect("should create workflow")
}

async fn create_exchange(provider: &ProviderImpl, variables: Option<Value>) -> String {
    let request = CreateExchangeRequest {
        options: CreateOptions { variables, ..CreateOptions::default() },
    };
    endpoint::handle(WORKFLOW_URL, request, provider)
        .await
        .expect("should create exchange")
        .body
        .id
}

fn did_authn_workflow() -> Value {
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
                    "query": [
                        {"type": "DIDAuthentication",
                         "acceptedMethods": [{"method": "key"}]},
                        {"type": "QueryByExample", "credentialQuery": {
                            "reason": "We need to see your degree.",
                            "example": {"type": "UniversityDegreeCredential"}}}
                    ]
                }
            }
        },
        "initialStep": "didAuthn"
    })
}

// Empty POST returns the step's VPR with a bound challenge and activates
// the exchange; submitting a matching signed VP issues the credential
// bound to the holder DID.
#[tokio::test]
async fn did_authn_and_issue() {
    let provider = ProviderImpl::new();
    create_workflow(&provider, did_authn_workflow()).await;
    let exchange_url =
        create_exchange(&provider, Some(Value::Object(degree_variables()))).await;

    // --------------------------------------------------
    // The wallet asks what the exchange wants
    // --------------------------------------------------
    let response = endpoint::handle(&exchange_url, ExchangeSubmission::default(), &provider)
        .await
        .expect("should return VPR")
        .body;
    let vpr = response.verifiable_presentation_request.expect("has VPR");
    let challenge = vpr.challenge.clone().expect("challenge bound");
    assert_eq!(challenge, "z19uokPn3b1Z4XDbQSHo7VhFR");
    assert_eq!(vpr.domain.as_deref(), Some(exchange_url.as_str()));
    assert!(vpr.requests_did_authentication());

    let exchange_id = exchange_url.rsplit('/').next().expect("exchange id");
    let stored = provider.stored_exchange(WORKFLOW_URL, exchange_id).expect("stored");
    assert_eq!(stored.state, ExchangeState::Active);

    // --------------------------------------------------
    // The wallet submits a signed presentation of its degree
    // --------------------------------------------------
    let presented_degree = json!({
        "@context": ["https://www.w3.org/2018/credentials/v1",
                     "https://www.w3.org/2018/credentials/examples/v1"],
        "type": ["VerifiableCredential", "UniversityDegreeCredential"],
        "issuer": "https://university.example/issuers/14",
        "credentialSubject": {"id": HOLDER_DID}
    });
    let submission = ExchangeSubmission {
        verifiable_presentation: Some(signed_vp(&challenge, vec![presented_degree])),
        ..ExchangeSubmission::default()
    };
    let response = endpoint::handle(&exchange_url, submission, &provider)
        .await
        .expect("should verify and issue")
        .body;

    let vp = response.verifiable_presentation.expect("response VP");
    let issued = &vp["verifiableCredential"][0];
    assert_eq!(issued["credentialSubject"]["id"], json!(HOLDER_DID));
    assert_eq!(issued["id"], json!("urn:uuid:188e8450-269e-4b57-89cc-d4e1e3279dcc"));
    assert!(issued["proof"].is_object());

    // --------------------------------------------------
    // The exchange is complete with the step result captured
    // --------------------------------------------------
    let stored = provider.stored_exchange(WORKFLOW_URL, exchange_id).expect("stored");
    assert_eq!(stored.state, ExchangeState::Complete);
    let result = &stored.variables["results"]["didAuthn"];
    assert_eq!(result["did"], json!(HOLDER_DID));
    assert!(result["verifiablePresentation"].is_object());
    assert_eq!(result["verifiableCredential"][0]["credentialSubject"]["id"], json!(HOLDER_DID));

    // issuance went through the delegated issue zcap
    assert!(provider.invocation_targets().contains(&utils::ISSUE_TARGET.to_string()));
}

// A VP whose proof binds the wrong challenge is rejected, records
// lastError, and leaves the exchange open for a retry.
#[tokio::test]
async fn wrong_challenge_recorded_not_fatal() {
    let provider = ProviderImpl::new();
    create_workflow(&provider, did_authn_workflow()).await;
    let exchange_url =
        create_exchange(&provider, Some(Value::Object(degree_variables()))).await;

    endpoint::handle(&exchange_url, ExchangeSubmission::default(), &provider)
        .await
        .expect("should return VPR");

    let submission = ExchangeSubmission {
        verifiable_presentation: Some(signed_vp("zWrongChallenge", vec![])),
        ..ExchangeSubmission::default()
    };
    let err = endpoint::handle(&exchange_url, submission, &provider)
        .await
        .expect_err("should reject");
    assert_eq!(err.name(), "VerificationError");

    let exchange_id = exchange_url.rsplit('/').next().expect("exchange id");
    let stored = provider.stored_exchange(WORKFLOW_URL, exchange_id).expect("stored");
    assert_eq!(stored.state, ExchangeState::Active);
    assert_eq!(stored.last_error.expect("last error").name, "VerificationError");
    assert!(stored.variables.get("results").is_none());
}

fn unprotected_workflow(allow: bool) -> Value {
    json!({
        "id": WORKFLOW_URL,
        "controller": CONTROLLER,
        "sequence": 0,
        "meterId": METER_ID,
        "zcaps": standard_zcaps(),
        "steps": {
            "present": {
                "verifiablePresentationRequest": {
                    "query": {"type": "QueryByExample", "credentialQuery": {
                        "example": {"type": "UniversityDegreeCredential"}}}
                },
                "allowUnprotectedPresentation": allow
            }
        },
        "initialStep": "present"
    })
}

// An unprotected VP is accepted when the step allows it; the recorded
// result then has no holder DID.
#[tokio::test]
async fn unprotected_presentation_allowed() {
    let provider = ProviderImpl::new();
    create_workflow(&provider, unprotected_workflow(true)).await;
    let exchange_url = create_exchange(&provider, None).await;

    let degree = json!({
        "@context": ["https://www.w3.org/2018/credentials/v1"],
        "type": ["VerifiableCredential", "UniversityDegreeCredential"],
        "issuer": "https://university.example/issuers/14",
        "credentialSubject": {"id": HOLDER_DID}
    });
    let submission = ExchangeSubmission {
        verifiable_presentation: Some(unprotected_vp(vec![degree])),
        ..ExchangeSubmission::default()
    };
    endpoint::handle(&exchange_url, submission, &provider)
        .await
        .expect("should accept");

    let exchange_id = exchange_url.rsplit('/').next().expect("exchange id");
    let stored = provider.stored_exchange(WORKFLOW_URL, exchange_id).expect("stored");
    assert_eq!(stored.state, ExchangeState::Complete);
    let result = &stored.variables["results"]["present"];
    assert!(result.get("did").is_none());
    assert!(result["verifiablePresentation"].is_object());

    // structural acceptance: the verifier service was never invoked
    assert!(!provider.invocation_targets().contains(&utils::VERIFY_TARGET.to_string()));
}

// The same submission without the flag fails and the exchange stays open.
#[tokio::test]
async fn unprotected_presentation_rejected() {
    let provider = ProviderImpl::new();
    create_workflow(&provider, unprotected_workflow(false)).await;
    let exchange_url = create_exchange(&provider, None).await;

    let submission = ExchangeSubmission {
        verifiable_presentation: Some(unprotected_vp(vec![])),
        ..ExchangeSubmission::default()
    };
    let err = endpoint::handle(&exchange_url, submission, &provider)
        .await
        .expect_err("should reject");
    assert_eq!(err.name(), "DataError");

    let exchange_id = exchange_url.rsplit('/').next().expect("exchange id");
    let stored = provider.stored_exchange(WORKFLOW_URL, exchange_id).expect("stored");
    assert_eq!(stored.last_error.expect("last error").name, "DataError");
    assert_ne!(stored.state, ExchangeState::Complete);
}

// A completed exchange rejects further submissions with DuplicateError.
#[tokio::test]
async fn completed_exchange_rejects_resubmission() {
    let provider = ProviderImpl::new();
    create_workflow(&provider, unprotected_workflow(true)).await;
    let exchange_url = create_exchange(&provider, None).await;

    let submission = ExchangeSubmission {
        verifiable_presentation: Some(unprotected_vp(vec![])),
        ..ExchangeSubmission::default()
    };
    endpoint::handle(&exchange_url, submission.clone(), &provider)
        .await
        .expect("first submission completes");

    let err = endpoint::handle(&exchange_url, submission, &provider)
        .await
        .expect_err("second submission fails");
    assert_eq!(err.name(), "DuplicateError");
    assert_eq!(err.status(), 409);
}

fn two_step_workflow() -> Value {
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
                "nextStep": "review"
            },
            "review": {
                "verifiablePresentationRequest": {
                    "query": {"type": "QueryByExample", "credentialQuery": {
                        "example": {"type": "UniversityDegreeCredential"}}}
                }
            }
        },
        "initialStep": "didAuthn"
    })
}

// Workflow-level credential templates issue at every step, not just the
// terminal one: a non-final step with no issueRequests of its own still
// delivers.
#[tokio::test]
async fn non_terminal_step_issues_from_templates() {
    let provider = ProviderImpl::new();
    create_workflow(&provider, two_step_workflow()).await;
    let exchange_url =
        create_exchange(&provider, Some(Value::Object(degree_variables()))).await;
    let exchange_id = exchange_url.rsplit('/').next().expect("exchange id");

    // --------------------------------------------------
    // First step: DID authentication, issuance alongside
    // --------------------------------------------------
    let response = endpoint::handle(&exchange_url, ExchangeSubmission::default(), &provider)
        .await
        .expect("should return VPR")
        .body;
    let challenge = response
        .verifiable_presentation_request
        .expect("has VPR")
        .challenge
        .expect("challenge bound");

    let submission = ExchangeSubmission {
        verifiable_presentation: Some(signed_vp(&challenge, vec![])),
        ..ExchangeSubmission::default()
    };
    let response = endpoint::handle(&exchange_url, submission, &provider)
        .await
        .expect("should verify and issue")
        .body;

    let vp = response.verifiable_presentation.expect("issued on the non-final step");
    assert_eq!(
        vp["verifiableCredential"][0]["credentialSubject"]["id"],
        json!(HOLDER_DID)
    );

    let stored = provider.stored_exchange(WORKFLOW_URL, exchange_id).expect("stored");
    assert_eq!(stored.state, ExchangeState::Active);
    assert_eq!(stored.step.as_deref(), Some("review"));
    assert_eq!(
        stored.variables["results"]["didAuthn"]["verifiableCredential"][0]
            ["credentialSubject"]["id"],
        json!(HOLDER_DID)
    );

    // --------------------------------------------------
    // Second step: templates issue again, then completion
    // --------------------------------------------------
    let response = endpoint::handle(&exchange_url, ExchangeSubmission::default(), &provider)
        .await
        .expect("should return second VPR")
        .body;
    let challenge = response
        .verifiable_presentation_request
        .expect("has VPR")
        .challenge
        .expect("challenge bound");

    let presented_degree = json!({
        "@context": ["https://www.w3.org/2018/credentials/v1"],
        "type": ["VerifiableCredential", "UniversityDegreeCredential"],
        "issuer": "https://university.example/issuers/14",
        "credentialSubject": {"id": HOLDER_DID}
    });
    let submission = ExchangeSubmission {
        verifiable_presentation: Some(signed_vp(&challenge, vec![presented_degree])),
        ..ExchangeSubmission::default()
    };
    let response = endpoint::handle(&exchange_url, submission, &provider)
        .await
        .expect("should verify and issue")
        .body;
    assert!(response.verifiable_presentation.is_some());

    let stored = provider.stored_exchange(WORKFLOW_URL, exchange_id).expect("stored");
    assert_eq!(stored.state, ExchangeState::Complete);
    assert!(stored.variables["results"]["review"]["verifiableCredential"].is_array());
}

// Sequence strictly increases across committed transitions.
#[tokio::test]
async fn sequence_increases() {
    let provider = ProviderImpl::new();
    create_workflow(&provider, did_authn_workflow()).await;
    let exchange_url =
        create_exchange(&provider, Some(Value::Object(degree_variables()))).await;
    let exchange_id = exchange_url.rsplit('/').next().expect("exchange id");

    let before = provider.stored_exchange(WORKFLOW_URL, exchange_id).expect("stored").sequence;
    endpoint::handle(&exchange_url, ExchangeSubmission::default(), &provider)
        .await
        .expect("should return VPR");
    let after = provider.stored_exchange(WORKFLOW_URL, exchange_id).expect("stored").sequence;
    assert_eq!(after, before + 1);
}
