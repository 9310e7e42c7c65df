//! # Workflow Steps
//!
//! A step describes what an exchange requires before it can advance:
//! a challenge, a presentation matching a query, a JWT DID proof, an
//! OpenID4VP interaction, credentials to issue, or an invite response.
//! Steps are configured statically or as a `stepTemplate` evaluated against
//! the exchange's variables at request time; the engine only ever consumes
//! the resolved [`StepDescriptor`].

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::error::{Error, Result};
use crate::exchange::Exchange;
use crate::template::{self, Environment};
use crate::w3c_vc::PresentationRequest;
use crate::workflow::WorkflowConfig;

/// A step as configured on a workflow: a static descriptor or a template
/// producing one.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum StepSource {
    /// A JSONata template evaluated into a [`StepDescriptor`] per exchange.
    Template(StepTemplate),

    /// A descriptor shared by every exchange of the workflow.
    Static(StepDescriptor),
}

/// A dynamic step definition.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StepTemplate {
    /// The template specification.
    pub step_template: TemplateSpec,
}

/// A template expression and its language.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct TemplateSpec {
    /// The template language. Only `jsonata` is recognized.
    #[serde(rename = "type")]
    pub type_: String,

    /// The JSONata expression; must evaluate to a step descriptor.
    pub template: String,
}

/// The evaluated form of a step, consumed by the exchange engine.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct StepDescriptor {
    /// Obtain a fresh challenge from the verifier's challenge service for
    /// this step's presentation request. When false, the exchange-derived
    /// challenge is used instead.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub create_challenge: bool,

    /// The presentation request served to wallets for this step.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verifiable_presentation_request: Option<PresentationRequest>,

    /// JSON schema applied to the submitted (effective) presentation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub presentation_schema: Option<PresentationSchema>,

    /// Accept a presentation without a proof. The holder DID is then not
    /// captured.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub allow_unprotected_presentation: bool,

    /// OpenID4VCI-only: require a JWT DID proof with the credential
    /// request.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jwt_did_proof_request: Option<Value>,

    /// OpenID4VP configuration for this step.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub open_id: Option<OpenIdStep>,

    /// Credentials to issue when the step's requirements are met.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub issue_requests: Vec<IssueSpec>,

    /// Pre-issued, out-of-band credentials to deliver ahead of any issued
    /// in this step.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verifiable_credentials: Option<Value>,

    /// Treat this step as an invite-request step.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub invite_request: Option<Value>,

    /// The step to execute next; terminal when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_step: Option<String>,
}

impl StepDescriptor {
    /// Whether this is an invite-request step.
    #[must_use]
    pub fn is_invite(&self) -> bool {
        match &self.invite_request {
            None | Some(Value::Bool(false)) => false,
            Some(_) => true,
        }
    }

    /// Whether the step requires a verified presentation before advancing.
    #[must_use]
    pub const fn requires_presentation(&self) -> bool {
        self.verifiable_presentation_request.is_some()
    }

    /// The OpenID4VP client profiles for this step. The legacy
    /// single-client form is normalized to a profile named `default`.
    #[must_use]
    pub fn client_profiles(&self) -> BTreeMap<String, ClientProfile> {
        let Some(open_id) = &self.open_id else {
            return BTreeMap::new();
        };
        if let Some(profiles) = &open_id.client_profiles {
            return profiles.clone();
        }
        let mut profiles = BTreeMap::new();
        profiles.insert(
            "default".to_string(),
            ClientProfile {
                client_id: open_id.client_id.clone(),
                client_id_scheme: open_id.client_id_scheme.clone(),
                response_mode: open_id.response_mode.clone(),
                client_metadata: open_id.client_metadata.clone(),
                zcap_reference_ids: open_id.zcap_reference_ids.clone(),
            },
        );
        profiles
    }

    /// Zcap reference ids named by this step's OpenID4VP configuration.
    #[must_use]
    pub fn open_id_zcap_reference_ids(&self) -> Vec<&str> {
        let Some(open_id) = &self.open_id else {
            return vec![];
        };
        let mut ids = vec![];
        if let Some(refs) = &open_id.zcap_reference_ids {
            if let Some(id) = &refs.sign_authorization_request {
                ids.push(id.as_str());
            }
        }
        if let Some(profiles) = &open_id.client_profiles {
            for profile in profiles.values() {
                if let Some(refs) = &profile.zcap_reference_ids {
                    if let Some(id) = &refs.sign_authorization_request {
                        ids.push(id.as_str());
                    }
                }
            }
        }
        ids
    }
}

/// JSON-schema constraint on a submitted presentation.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PresentationSchema {
    /// The schema language. Only `JsonSchema` is recognized.
    #[serde(rename = "type")]
    pub type_: String,

    /// The schema itself.
    pub json_schema: Value,
}

/// OpenID4VP configuration carried by a step: either the legacy
/// single-client form or a map of named client profiles. The legacy fields
/// keep their OAuth wire names.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct OpenIdStep {
    /// Legacy form: serve an authorization request for this step.
    #[serde(rename = "createAuthorizationRequest", skip_serializing_if = "Option::is_none")]
    pub create_authorization_request: Option<Value>,

    /// Legacy form: the client identifier scheme, e.g. `redirect_uri`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_id_scheme: Option<String>,

    /// Legacy form: the verifier client id.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,

    /// Legacy form: the response mode, `direct_post` (default) or
    /// `direct_post.jwt`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_mode: Option<String>,

    /// Legacy form: verifier metadata shared with the wallet.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_metadata: Option<Value>,

    /// Legacy form: zcap reference ids, e.g. for AR signing.
    #[serde(rename = "zcapReferenceIds", skip_serializing_if = "Option::is_none")]
    pub zcap_reference_ids: Option<ProfileZcapRefs>,

    /// Named client profiles; takes precedence over the legacy fields.
    #[serde(rename = "clientProfiles", skip_serializing_if = "Option::is_none")]
    pub client_profiles: Option<BTreeMap<String, ClientProfile>>,
}

/// A named OpenID4VP client profile. OAuth parameters keep their wire
/// names.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct ClientProfile {
    /// The verifier client id; defaults to the response URI.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,

    /// The client identifier scheme, e.g. `redirect_uri` or `did`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_id_scheme: Option<String>,

    /// `direct_post` (default) or `direct_post.jwt`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_mode: Option<String>,

    /// Verifier metadata shared with the wallet. Setting
    /// `require_signed_request_object` makes the authorization request a
    /// signed JAR.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_metadata: Option<Value>,

    /// Zcap reference ids used by this profile.
    #[serde(rename = "zcapReferenceIds", skip_serializing_if = "Option::is_none")]
    pub zcap_reference_ids: Option<ProfileZcapRefs>,
}

/// Zcap reference ids a client profile may name.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct ProfileZcapRefs {
    /// Reference id of the capability used to sign authorization requests.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sign_authorization_request: Option<String>,
}

/// A single issuance instruction within a step.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct IssueSpec {
    /// Id of the credential template to evaluate.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub credential_template_id: Option<String>,

    /// Positional index of the credential template to evaluate.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub credential_template_index: Option<usize>,

    /// Per-issuance variable overrides.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub variables: Option<Value>,
}

impl StepSource {
    /// Convenience accessor for the names referenced by a static step.
    #[must_use]
    pub const fn as_static(&self) -> Option<&StepDescriptor> {
        match self {
            Self::Static(step) => Some(step),
            Self::Template(_) => None,
        }
    }
}

/// The template-evaluation environment for an exchange:
/// `globals.workflow.*`, `globals.exchange.*` and the exchange's variables.
#[must_use]
pub fn environment(workflow: &WorkflowConfig, exchange: &Exchange) -> Environment {
    Environment::new(
        json!({
            "workflow": {
                "id": workflow.id,
                "controller": workflow.controller,
            },
            "exchange": {
                "id": exchange.id,
                "state": exchange.state,
                "expires": exchange.expires.format("%Y-%m-%dT%H:%M:%SZ").to_string(),
            },
        }),
        Value::Object(exchange.variables.clone()),
    )
}

/// Materialize the effective step descriptor for an exchange's step.
///
/// # Errors
///
/// Returns [`Error::Server`] when the step is not configured on the
/// workflow, and [`Error::Validation`]/[`Error::Data`] when a step template
/// fails to evaluate to a descriptor.
pub fn resolve(
    workflow: &WorkflowConfig, exchange: &Exchange, step_name: &str, request_input: Option<&Value>,
) -> Result<StepDescriptor> {
    let Some(source) = workflow.steps.get(step_name) else {
        return Err(Error::Server(format!("step \"{step_name}\" is not configured")));
    };

    match source {
        StepSource::Static(step) => Ok(step.clone()),
        StepSource::Template(dynamic) => {
            if dynamic.step_template.type_ != "jsonata" {
                return Err(Error::Server(format!(
                    "unsupported step template type \"{}\"",
                    dynamic.step_template.type_
                )));
            }
            let mut env = environment(workflow, exchange);
            if let Some(input) = request_input {
                env = env.with_overrides(input);
            }
            let evaluated = template::evaluate(&dynamic.step_template.template, &env)?;
            serde_json::from_value(evaluated).map_err(|e| Error::Validation {
                message: format!("step template did not evaluate to a step: {e}"),
                details: None,
            })
        }
    }
}
