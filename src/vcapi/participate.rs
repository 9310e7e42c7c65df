//! # Exchange Participation Handler
//!
//! `POST {exchangeId}` — the VC-API exchange endpoint. An empty body
//! returns the current step's Verifiable Presentation Request with a
//! freshly bound challenge; a body carrying `verifiablePresentation`
//! submits the presentation for verification, after which any credentials
//! the step calls for are issued and returned wrapped in a presentation.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::endpoint::{Body, ExchangeRef, Handler, Request, Response};
use crate::error::{Error, Result};
use crate::exchange::{Exchange, ExchangeState};
use crate::exchange::engine::{self, Transition};
use crate::provider::Provider;
use crate::step::{self, StepDescriptor};
use crate::template;
use crate::verifier::{self, VerifyOptions};
use crate::w3c_vc::{self, PresentationRequest, VerifiablePresentation, jwt};
use crate::workflow::WorkflowConfig;

/// The VC-API exchange message: empty, or a presentation submission.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ExchangeSubmission {
    /// The submitted presentation: an object, or a VC-JWT compact
    /// serialization.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verifiable_presentation: Option<Value>,

    /// Further properties, exposed to step templates as request input.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// The VC-API exchange reply: a presentation request to fulfil, a
/// presentation wrapping issued credentials, or both for multi-step
/// workflows.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ExchangeResponse {
    /// The next presentation request to fulfil.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verifiable_presentation_request: Option<PresentationRequest>,

    /// The presentation wrapping delivered credentials.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verifiable_presentation: Option<Value>,
}

async fn participate(
    target: &str, provider: &impl Provider, submission: ExchangeSubmission,
) -> Result<Response<ExchangeResponse>> {
    tracing::debug!("vcapi::participate");

    let exchange_ref = ExchangeRef::parse(target)?;
    let input = serde_json::to_value(&submission)
        .map_err(|e| crate::server!("issue serializing submission: {e}"))?;

    let response = engine::transition(provider, &exchange_ref, |config, exchange| {
        let submission = submission.clone();
        let input = input.clone();
        let exchange_ref = exchange_ref.clone();
        async move {
            let Some(step_name) = exchange.step.clone() else {
                return Err(Error::validation("workflow has no steps to execute"));
            };
            let step = step::resolve(&config, &exchange, &step_name, Some(&input))?;

            if invite_only(&config, &step) {
                return Err(Error::validation(
                    "this exchange only supports the invite-request protocol",
                ));
            }

            match submission.verifiable_presentation {
                None => request_phase(provider, &config, exchange, &step, &exchange_ref).await,
                Some(vp) => {
                    submit_phase(
                        provider, &config, exchange, &step, &step_name, &exchange_ref, &vp,
                    )
                    .await
                }
            }
        }
    })
    .await?;

    Ok(response.into())
}

// an empty POST: serve the step's presentation request, or deliver
// credentials directly for issuance-only workflows
async fn request_phase(
    provider: &impl Provider, config: &WorkflowConfig, mut exchange: Exchange,
    step: &StepDescriptor, exchange_ref: &ExchangeRef,
) -> Result<Transition<ExchangeResponse>> {
    if step.requires_presentation() {
        let challenge = engine::bind_challenge(provider, config, &mut exchange, step).await?;
        let mut vpr =
            step.verifiable_presentation_request.clone().unwrap_or_default();
        vpr.challenge = Some(challenge);
        vpr.domain.get_or_insert_with(|| exchange_ref.url.clone());

        if exchange.state == ExchangeState::Pending {
            exchange.state = ExchangeState::Active;
        }
        return Ok(Transition {
            exchange,
            response: ExchangeResponse {
                verifiable_presentation_request: Some(vpr),
                verifiable_presentation: None,
            },
        });
    }

    // issuance-only: deliver immediately
    let issued =
        engine::issue_for_step(provider, config, &exchange, step, None, None).await?;
    let oob = out_of_band(config, &exchange, step)?;
    if issued.is_empty() && oob.is_empty() {
        return Err(Error::validation("this step has nothing to deliver"));
    }

    let presentation = response_presentation(oob, issued.clone());
    let step_name = exchange.step.clone().unwrap_or_default();
    exchange.record_result(&step_name, json!({ "verifiableCredential": issued }))?;
    exchange.advance(step.next_step.clone());

    Ok(Transition {
        exchange,
        response: ExchangeResponse {
            verifiable_presentation_request: None,
            verifiable_presentation: Some(presentation),
        },
    })
}

// a presentation submission: verify, capture the result, issue and advance
#[allow(clippy::too_many_arguments)]
async fn submit_phase(
    provider: &impl Provider, config: &WorkflowConfig, mut exchange: Exchange,
    step: &StepDescriptor, step_name: &str, exchange_ref: &ExchangeRef, vp: &Value,
) -> Result<Transition<ExchangeResponse>> {
    if !step.requires_presentation() {
        return Err(Error::validation("this step does not accept a presentation"));
    }

    let challenge = exchange.bound_challenge();
    let verification = verifier::verify_presentation(
        provider,
        config,
        vp,
        VerifyOptions {
            challenge: &challenge,
            domain: Some(&exchange_ref.url),
            presentation_schema: step.presentation_schema.as_ref(),
            allow_unprotected: step.allow_unprotected_presentation,
        },
    )
    .await?;

    let mut result = json!({
        "verifiablePresentation": verification.presentation,
    });
    if let Some(did) = &verification.did {
        result["did"] = json!(did);
    }

    // record before issuing so credential templates see
    // `variables.results.<step>.did`; nothing persists unless the whole
    // transition commits
    exchange.record_result(step_name, result)?;

    let issued = if should_issue(config, step) {
        engine::issue_for_step(
            provider,
            config,
            &exchange,
            step,
            None,
            verification.did.as_deref(),
        )
        .await?
    } else {
        vec![]
    };
    if !issued.is_empty() {
        if let Some(result) = exchange
            .variables
            .get_mut("results")
            .and_then(|results| results.get_mut(step_name))
        {
            result["verifiableCredential"] = json!(issued);
        }
    }

    exchange.challenge = None;
    exchange.advance(step.next_step.clone());

    let oob = out_of_band(config, &exchange, step)?;
    let response = if issued.is_empty() && oob.is_empty() {
        // nothing delivered; surface the next step's request when there is one
        next_request(provider, config, &mut exchange, exchange_ref).await?
    } else {
        ExchangeResponse {
            verifiable_presentation_request: None,
            verifiable_presentation: Some(response_presentation(oob, issued)),
        }
    };

    Ok(Transition { exchange, response })
}

async fn next_request(
    provider: &impl Provider, config: &WorkflowConfig, exchange: &mut Exchange,
    exchange_ref: &ExchangeRef,
) -> Result<ExchangeResponse> {
    let Some(next_name) = exchange.step.clone() else {
        return Ok(ExchangeResponse::default());
    };
    let next = step::resolve(config, exchange, &next_name, None)?;
    if !next.requires_presentation() {
        return Ok(ExchangeResponse::default());
    }
    let challenge = engine::bind_challenge(provider, config, exchange, &next).await?;
    let mut vpr = next.verifiable_presentation_request.clone().unwrap_or_default();
    vpr.challenge = Some(challenge);
    vpr.domain.get_or_insert_with(|| exchange_ref.url.clone());
    Ok(ExchangeResponse {
        verifiable_presentation_request: Some(vpr),
        verifiable_presentation: None,
    })
}

// pre-issued credentials delivered ahead of any issued in the step; an
// array value or a template expression producing one
fn out_of_band(
    config: &WorkflowConfig, exchange: &Exchange, step: &StepDescriptor,
) -> Result<Vec<Value>> {
    match &step.verifiable_credentials {
        None => Ok(vec![]),
        Some(Value::Array(credentials)) => Ok(credentials.clone()),
        Some(Value::String(expression)) => {
            let env = step::environment(config, exchange);
            match template::evaluate(expression, &env)? {
                Value::Array(credentials) => Ok(credentials),
                single => Ok(vec![single]),
            }
        }
        Some(_) => Err(Error::validation("`verifiableCredentials` must be an array")),
    }
}

// wrap delivered credentials in a response presentation; VC-JWTs are
// enveloped, pushing the presentation to the v2 context
fn response_presentation(oob: Vec<Value>, issued: Vec<Value>) -> Value {
    let mut enveloped_any = false;
    let credentials: Vec<Value> = oob
        .into_iter()
        .chain(issued)
        .map(|credential| match credential {
            Value::String(token) if jwt::is_jwt(&token) => {
                enveloped_any = true;
                jwt::enveloped_credential(&token)
            }
            other => other,
        })
        .collect();

    let context = if enveloped_any { w3c_vc::CONTEXT_V2 } else { w3c_vc::CONTEXT_V1 };
    serde_json::to_value(VerifiablePresentation::wrapping(credentials, context))
        .unwrap_or_default()
}

fn should_issue(config: &WorkflowConfig, step: &StepDescriptor) -> bool {
    !step.issue_requests.is_empty() || !config.credential_templates.is_empty()
}

fn invite_only(config: &WorkflowConfig, step: &StepDescriptor) -> bool {
    step.is_invite()
        && !step.requires_presentation()
        && step.issue_requests.is_empty()
        && config.credential_templates.is_empty()
}

impl Handler for Request<ExchangeSubmission> {
    type Response = ExchangeResponse;
    type Error = Error;

    fn handle(
        self, target: &str, provider: &impl Provider,
    ) -> impl Future<Output = Result<Response<Self::Response>>> + Send {
        participate(target, provider, self.body)
    }
}

impl Body for ExchangeSubmission {}
