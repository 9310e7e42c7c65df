//! # Exchange Engine
//!
//! The single point where exchange state transitions, completion and error
//! recording occur. Protocol adapters load an exchange through the engine,
//! compute a transition, and the engine commits it under the optimistic
//! sequence check, retrying a bounded number of times when a concurrent
//! writer got there first. Adapters never write exchange state themselves.

use serde_json::Value;

use crate::endpoint::ExchangeRef;
use crate::error::{Error, LastError, Result};
use crate::exchange::{Exchange, ExchangeState};
use crate::issuer::{self, IssueRequest};
use crate::provider::{Clock, ExchangeStore, Provider};
use crate::step::{IssueSpec, StepDescriptor, environment};
use crate::template;
use crate::verifier;
use crate::workflow;
use crate::workflow::{CredentialTemplate, WorkflowConfig};

// bound on optimistic-concurrency commit attempts
const MAX_COMMIT_ATTEMPTS: u32 = 3;

/// The outcome of a transition closure: the mutated exchange to commit and
/// the response to surface once the commit lands.
#[derive(Clone, Debug)]
pub struct Transition<R> {
    /// The exchange as mutated by the adapter.
    pub exchange: Exchange,

    /// The adapter's response value.
    pub response: R,
}

/// Load an exchange and its workflow for a read-only operation.
///
/// # Errors
///
/// Returns [`Error::NotFound`] when the workflow or exchange is missing or
/// the exchange has expired.
pub async fn load(
    provider: &impl Provider, exchange_ref: &ExchangeRef,
) -> Result<(WorkflowConfig, Exchange)> {
    let config = workflow::fetch(provider, &exchange_ref.workflow_url).await.map_err(|e| {
        // a missing workflow reads the same as a missing exchange
        if let Error::NotFound(_) = e {
            Error::NotFound("exchange not found".to_string())
        } else {
            e
        }
    })?;

    let Some(exchange) =
        provider.exchange(&exchange_ref.workflow_url, &exchange_ref.exchange_id).await?
    else {
        return Err(Error::NotFound("exchange not found".to_string()));
    };
    if exchange.expired(provider.now()) {
        return Err(Error::NotFound("exchange not found".to_string()));
    }
    Ok((config, exchange))
}

/// Load an exchange for a mutating operation, rejecting completed
/// exchanges.
///
/// # Errors
///
/// As [`load`], plus [`Error::Duplicate`] when the exchange has already
/// completed; the duplicate attempt is recorded on `lastError` while the
/// state remains `complete`.
pub async fn load_for_update(
    provider: &impl Provider, exchange_ref: &ExchangeRef,
) -> Result<(WorkflowConfig, Exchange)> {
    let (config, exchange) = load(provider, exchange_ref).await?;
    if exchange.state == ExchangeState::Complete {
        let error = Error::Duplicate("exchange has already been completed".to_string());
        record_error(provider, exchange_ref, &error).await;
        return Err(error);
    }
    Ok((config, exchange))
}

/// Run a mutating transition: load, compute via `f`, commit with the
/// sequence check, retrying from a fresh load when a concurrent writer won.
///
/// Errors returned by `f` of a validation, data or verification kind are
/// recorded on the exchange's `lastError` before propagating; they never
/// advance state.
///
/// # Errors
///
/// Propagates load failures, `f`'s error, or [`Error::InvalidState`] when
/// every commit attempt lost the race.
pub async fn transition<P, F, Fut, R>(
    provider: &P, exchange_ref: &ExchangeRef, f: F,
) -> Result<R>
where
    P: Provider,
    F: Fn(WorkflowConfig, Exchange) -> Fut,
    Fut: Future<Output = Result<Transition<R>>>,
{
    let mut attempt = 0;
    loop {
        let (config, exchange) = load_for_update(provider, exchange_ref).await?;
        let loaded_sequence = exchange.sequence;

        let outcome = match f(config, exchange).await {
            Ok(outcome) => outcome,
            Err(error) => {
                if recordable(&error) {
                    record_error(provider, exchange_ref, &error).await;
                }
                return Err(error);
            }
        };

        let mut exchange = outcome.exchange;
        exchange.sequence = loaded_sequence + 1;
        match provider.update_exchange(&exchange, loaded_sequence).await {
            Ok(()) => return Ok(outcome.response),
            Err(Error::InvalidState(reason)) => {
                attempt += 1;
                if attempt >= MAX_COMMIT_ATTEMPTS {
                    return Err(Error::InvalidState(reason));
                }
                tracing::debug!("engine::transition retry {attempt}");
            }
            Err(error) => return Err(error),
        }
    }
}

/// Record an error on the exchange's `lastError`. Best-effort: recording
/// never fails the caller's path.
pub async fn record_error(provider: &impl Provider, exchange_ref: &ExchangeRef, error: &Error) {
    let last_error = LastError::from(error);
    if let Err(e) = provider
        .update_last_error(&exchange_ref.workflow_url, &exchange_ref.exchange_id, &last_error)
        .await
    {
        tracing::debug!("engine::record_error failed: {e}");
    }
}

const fn recordable(error: &Error) -> bool {
    matches!(
        error,
        Error::Validation { .. } | Error::Data { .. } | Error::Verification { .. }
    )
}

/// The challenge to bind into the current step's presentation request,
/// creating one via the verifier's challenge service when the step asks
/// for it. The created challenge is stored on the exchange so the
/// subsequent submission verifies against the same value.
///
/// # Errors
///
/// Propagates challenge-service failures.
pub async fn bind_challenge(
    provider: &impl Provider, config: &WorkflowConfig, exchange: &mut Exchange,
    step: &StepDescriptor,
) -> Result<String> {
    if let Some(challenge) = &exchange.challenge {
        return Ok(challenge.clone());
    }
    if step.create_challenge {
        let challenge = verifier::create_challenge(provider, config).await?;
        exchange.challenge = Some(challenge.clone());
        return Ok(challenge);
    }
    Ok(exchange.derived_challenge())
}

/// Evaluate and issue the credentials a step calls for: the step's
/// `issueRequests` when present, otherwise every workflow credential
/// template. Returns the signed credentials in request order.
///
/// # Errors
///
/// Returns [`Error::Data`] for unknown template references and evaluation
/// failures, and propagates issuer failures.
pub async fn issue_for_step(
    provider: &impl Provider, config: &WorkflowConfig, exchange: &Exchange,
    step: &StepDescriptor, format: Option<&str>, subject_did: Option<&str>,
) -> Result<Vec<Value>> {
    let credentials = evaluate_credentials(config, exchange, step, subject_did)?;
    let requests = credentials
        .into_iter()
        .map(|credential| IssueRequest {
            credential,
            format: format.map(ToString::to_string),
        })
        .collect();
    issuer::issue_batch(provider, config, requests).await
}

/// Evaluate the unsigned credentials a step calls for, without invoking
/// the issuer: the step's `issueRequests` when present, otherwise every
/// workflow credential template, in order.
///
/// # Errors
///
/// Returns [`Error::Data`] for unknown template references, evaluation
/// failures, and non-object results.
pub(crate) fn evaluate_credentials(
    config: &WorkflowConfig, exchange: &Exchange, step: &StepDescriptor,
    subject_did: Option<&str>,
) -> Result<Vec<Value>> {
    let specs: Vec<IssueSpec> = if step.issue_requests.is_empty() {
        (0..config.credential_templates.len())
            .map(|index| IssueSpec {
                credential_template_index: Some(index),
                ..IssueSpec::default()
            })
            .collect()
    } else {
        step.issue_requests.clone()
    };

    let mut credentials = Vec::with_capacity(specs.len());
    for spec in &specs {
        let template = select_template(config, spec)?;
        let mut env = environment(config, exchange);
        if let Some(overrides) = &spec.variables {
            env = env.with_overrides(overrides);
        }
        let mut credential = template::evaluate(&template.template, &env)?;
        if !credential.is_object() {
            return Err(Error::data("credential template did not evaluate to an object"));
        }
        if let Some(did) = subject_did {
            bind_subject(&mut credential, did);
        }
        credentials.push(credential);
    }
    Ok(credentials)
}

// the template an issue spec references: by id, by index, or the only one
fn select_template<'a>(
    config: &'a WorkflowConfig, spec: &IssueSpec,
) -> Result<&'a CredentialTemplate> {
    if let Some(id) = &spec.credential_template_id {
        return config
            .credential_templates
            .iter()
            .find(|t| t.id.as_deref() == Some(id))
            .ok_or_else(|| Error::data(format!("unknown credential template \"{id}\"")));
    }
    if let Some(index) = spec.credential_template_index {
        return config
            .credential_templates
            .get(index)
            .ok_or_else(|| Error::data(format!("no credential template at index {index}")));
    }
    if config.credential_templates.len() == 1 {
        return Ok(&config.credential_templates[0]);
    }
    Err(Error::data("issue request does not identify a credential template"))
}

// subject binding for proof-of-possession flows: the issued credential's
// subject id is the proven DID
fn bind_subject(credential: &mut Value, did: &str) {
    match credential.get_mut("credentialSubject") {
        Some(Value::Object(subject)) => {
            subject.insert("id".to_string(), Value::String(did.to_string()));
        }
        Some(Value::Array(subjects)) => {
            if let Some(Value::Object(first)) = subjects.first_mut() {
                first.insert("id".to_string(), Value::String(did.to_string()));
            }
        }
        _ => {
            if let Value::Object(credential) = credential {
                credential.insert(
                    "credentialSubject".to_string(),
                    serde_json::json!({"id": did}),
                );
            }
        }
    }
}

/// Capture a served OpenID4VP authorization request on the exchange,
/// activating a pending exchange. Serving is idempotent: the stored
/// request is reused on re-retrieval.
pub fn serve_authorization_request(exchange: &mut Exchange, authorization_request: Value) {
    exchange.authorization_request = Some(authorization_request);
    if exchange.state == ExchangeState::Pending {
        exchange.state = ExchangeState::Active;
    }
}
