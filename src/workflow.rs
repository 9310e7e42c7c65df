//! # Workflow Configuration
//!
//! A workflow is a tenant-owned template describing credential templates and
//! an ordered graph of steps. Configurations are validated on creation and
//! on every sequenced update; exchanges are instantiated from them.

use std::collections::BTreeMap;
use std::net::IpAddr;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::error::{Error, Result};
use crate::provider::{Provider, WorkflowStore};
use crate::step::StepSource;

/// Well-known zcap reference ids.
pub mod zcap_refs {
    /// Delegated capability to issue credentials.
    pub const ISSUE: &str = "issue";
    /// Delegated capability to manage credential status.
    pub const CREDENTIAL_STATUS: &str = "credentialStatus";
    /// Delegated capability to create challenges.
    pub const CREATE_CHALLENGE: &str = "createChallenge";
    /// Delegated capability to verify presentations.
    pub const VERIFY_PRESENTATION: &str = "verifyPresentation";
}

/// An opaque delegated authorization capability. The capability framework
/// is an external collaborator; this crate stores and forwards capabilities
/// without interpreting them.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct Capability(pub Value);

/// The delegated capabilities available to a workflow, keyed by reference
/// id. Known reference ids are modeled as fields; user-defined ids (e.g.
/// OpenID4VP authorization-request signing keys) live in `extra`.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct Zcaps {
    /// Capability to invoke the external issuer.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub issue: Option<Capability>,

    /// Capability to invoke the external status service.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub credential_status: Option<Capability>,

    /// Capability to invoke the external challenge-creation service.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub create_challenge: Option<Capability>,

    /// Capability to invoke the external verifier.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verify_presentation: Option<Capability>,

    /// User-defined capabilities, e.g. `signAuthorizationRequest` keys.
    #[serde(flatten)]
    pub extra: BTreeMap<String, Capability>,
}

impl Zcaps {
    /// Look up a capability by reference id, known or user-defined.
    #[must_use]
    pub fn get(&self, reference_id: &str) -> Option<&Capability> {
        match reference_id {
            zcap_refs::ISSUE => self.issue.as_ref(),
            zcap_refs::CREDENTIAL_STATUS => self.credential_status.as_ref(),
            zcap_refs::CREATE_CHALLENGE => self.create_challenge.as_ref(),
            zcap_refs::VERIFY_PRESENTATION => self.verify_presentation.as_ref(),
            other => self.extra.get(other),
        }
    }

    /// Whether no capability has been delegated.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.issue.is_none()
            && self.credential_status.is_none()
            && self.create_challenge.is_none()
            && self.verify_presentation.is_none()
            && self.extra.is_empty()
    }
}

/// A template evaluating to a complete Verifiable Credential.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CredentialTemplate {
    /// Optional template id, referenced by a step's `issueRequests`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// The template language. Only `jsonata` is recognized.
    #[serde(rename = "type")]
    pub type_: String,

    /// The JSONata expression.
    pub template: String,
}

/// An issuer instance a workflow can fan issuance out to.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct IssuerInstance {
    /// Credential formats this instance can produce, e.g. `ldp_vc`.
    pub supported_formats: Vec<String>,

    /// Reference ids of the zcaps delegated for this instance.
    pub zcap_reference_ids: Vec<String>,
}

/// OAuth2-based access control for workflow administration.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct OAuth2Config {
    /// URL of the authorization server's configuration document.
    pub issuer_config_url: String,

    /// Further properties preserved verbatim.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A tenant-owned workflow configuration.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct WorkflowConfig {
    /// The workflow URL; also the base of its exchanges' URLs.
    pub id: String,

    /// The controlling principal.
    pub controller: String,

    /// Monotonic update sequence. `0` on creation.
    pub sequence: u64,

    /// The meter accounting for this workflow's usage.
    pub meter_id: String,

    /// Delegated capabilities, keyed by reference id.
    #[serde(skip_serializing_if = "Zcaps::is_empty")]
    pub zcaps: Zcaps,

    /// Ordered credential templates.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub credential_templates: Vec<CredentialTemplate>,

    /// Steps by name; static descriptors or step templates.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub steps: BTreeMap<String, StepSource>,

    /// Name of the first step to execute.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub initial_step: Option<String>,

    /// Issuer instances for format-based fan-out issuance.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub issuer_instances: Vec<IssuerInstance>,

    /// OAuth2 access control; zcap-based access is always accepted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authorization: Option<OAuth2Config>,

    /// CIDR ranges allowed to call this workflow's endpoints. Empty means
    /// no restriction.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub ip_allow_list: Vec<String>,
}

impl WorkflowConfig {
    /// The workflow id's last path segment, used in exchange URLs.
    #[must_use]
    pub fn local_id(&self) -> &str {
        self.id.rsplit('/').next().unwrap_or(&self.id)
    }

    /// Validate the configuration, collecting every violation.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] with `details.errors` naming each
    /// violated constraint.
    pub fn validate(&self, create: bool) -> Result<()> {
        let mut errors = vec![];

        if create && self.sequence != 0 {
            errors.push(json!({
                "name": "sequence",
                "message": "`sequence` must be 0 on creation"
            }));
        }
        if self.id.is_empty() {
            errors.push(json!({"name": "id", "message": "`id` is required"}));
        }
        if self.controller.is_empty() {
            errors.push(json!({"name": "controller", "message": "`controller` is required"}));
        }

        if !self.credential_templates.is_empty() && self.zcaps.issue.is_none() {
            errors.push(json!({
                "name": "zcaps.issue",
                "message": "an `issue` zcap is required when `credentialTemplates` is present"
            }));
        }
        for (index, template) in self.credential_templates.iter().enumerate() {
            if template.type_ != "jsonata" {
                errors.push(json!({
                    "name": format!("credentialTemplates/{index}/type"),
                    "message": "template `type` must be \"jsonata\""
                }));
            }
            if template.template.is_empty() {
                errors.push(json!({
                    "name": format!("credentialTemplates/{index}/template"),
                    "message": "`template` must not be empty"
                }));
            }
        }

        self.validate_steps(&mut errors);
        self.validate_zcap_refs(&mut errors);

        for cidr in &self.ip_allow_list {
            if Cidr::from_str(cidr).is_err() {
                errors.push(json!({
                    "name": "ipAllowList",
                    "message": format!("\"{cidr}\" is not a valid CIDR range")
                }));
            }
        }

        if errors.is_empty() {
            return Ok(());
        }
        Err(Error::Validation {
            message: "invalid workflow configuration".to_string(),
            details: Some(json!({ "errors": errors })),
        })
    }

    fn validate_steps(&self, errors: &mut Vec<Value>) {
        if let Some(initial) = &self.initial_step {
            if !self.steps.contains_key(initial) {
                errors.push(json!({
                    "name": "initialStep",
                    "message": format!("`initialStep` \"{initial}\" is not a configured step")
                }));
            }
        } else if !self.steps.is_empty() {
            errors.push(json!({
                "name": "initialStep",
                "message": "`initialStep` is required when `steps` is present"
            }));
        }

        for (name, source) in &self.steps {
            // step results are stored under the step name
            if name.contains(['.', '$', '%']) {
                errors.push(json!({
                    "name": format!("steps/{name}"),
                    "message": "step names must not contain \".\", \"$\", or \"%\""
                }));
            }
            if let StepSource::Static(step) = source {
                if let Some(next) = &step.next_step {
                    if !self.steps.contains_key(next) {
                        errors.push(json!({
                            "name": format!("steps/{name}/nextStep"),
                            "message": format!("`nextStep` \"{next}\" is not a configured step")
                        }));
                    }
                }
            }
        }
    }

    // user-defined zcap reference ids must be declared by a consumer:
    // an issuer instance or a static step's OpenID4VP client profile. A
    // workflow with step templates can reference any id at runtime.
    fn validate_zcap_refs(&self, errors: &mut Vec<Value>) {
        let has_dynamic_steps =
            self.steps.values().any(|s| matches!(s, StepSource::Template(_)));
        if has_dynamic_steps {
            return;
        }

        let mut declared: Vec<&str> = vec![];
        for instance in &self.issuer_instances {
            declared.extend(instance.zcap_reference_ids.iter().map(String::as_str));
        }
        for source in self.steps.values() {
            let StepSource::Static(step) = source else { continue };
            declared.extend(step.open_id_zcap_reference_ids());
        }

        for key in self.zcaps.extra.keys() {
            if !declared.contains(&key.as_str()) {
                errors.push(json!({
                    "name": format!("zcaps/{key}"),
                    "message": format!("zcap reference id \"{key}\" is not used by this workflow")
                }));
            }
        }
    }

    /// Enforce the workflow's IP allow-list.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotAllowed`] when the list is non-empty and the
    /// caller's address is absent or outside every range.
    pub fn check_ip(&self, remote: Option<IpAddr>) -> Result<()> {
        if self.ip_allow_list.is_empty() {
            return Ok(());
        }
        let Some(remote) = remote else {
            return Err(Error::NotAllowed("source address not permitted".to_string()));
        };
        for cidr in &self.ip_allow_list {
            if Cidr::from_str(cidr).is_ok_and(|c| c.contains(remote)) {
                return Ok(());
            }
        }
        Err(Error::NotAllowed("source address not permitted".to_string()))
    }
}

/// Validate and persist a new workflow configuration.
///
/// # Errors
///
/// Returns [`Error::Validation`] for constraint violations and
/// [`Error::Duplicate`] when the id is already taken.
pub async fn create(provider: &impl Provider, config: WorkflowConfig) -> Result<WorkflowConfig> {
    tracing::debug!("workflow::create");
    config.validate(true)?;
    provider.insert_workflow(&config).await?;
    Ok(config)
}

/// Validate and persist a sequenced update to an existing configuration.
///
/// # Errors
///
/// Returns [`Error::NotFound`] for unknown workflows,
/// [`Error::NotAllowed`] on controller mismatch, and
/// [`Error::InvalidState`] when `sequence` is not the successor of the
/// stored value.
pub async fn update(provider: &impl Provider, config: WorkflowConfig) -> Result<WorkflowConfig> {
    tracing::debug!("workflow::update");
    config.validate(false)?;

    let existing = fetch(provider, &config.id).await?;
    if existing.controller != config.controller {
        return Err(Error::NotAllowed("controller does not match".to_string()));
    }
    if config.sequence != existing.sequence + 1 {
        return Err(Error::InvalidState(format!(
            "expected sequence {}, got {}",
            existing.sequence + 1,
            config.sequence
        )));
    }
    provider.update_workflow(&config, existing.sequence).await?;
    Ok(config)
}

/// Load a workflow configuration.
///
/// # Errors
///
/// Returns [`Error::NotFound`] when no configuration exists for the id.
pub async fn fetch(provider: &impl Provider, workflow_id: &str) -> Result<WorkflowConfig> {
    let Some(config) = provider.workflow(workflow_id).await? else {
        return Err(Error::NotFound("workflow not found".to_string()));
    };
    Ok(config)
}

/// An IPv4 or IPv6 CIDR range.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Cidr {
    network: IpAddr,
    prefix: u8,
}

impl Cidr {
    /// Whether the address falls inside this range.
    #[must_use]
    pub fn contains(&self, addr: IpAddr) -> bool {
        match (self.network, addr) {
            (IpAddr::V4(network), IpAddr::V4(addr)) => {
                prefix_match(&network.octets(), &addr.octets(), self.prefix)
            }
            (IpAddr::V6(network), IpAddr::V6(addr)) => {
                prefix_match(&network.octets(), &addr.octets(), self.prefix)
            }
            _ => false,
        }
    }
}

impl FromStr for Cidr {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let (addr, prefix) = match s.split_once('/') {
            Some((addr, prefix)) => {
                let prefix = prefix
                    .parse::<u8>()
                    .map_err(|_| Error::validation(format!("invalid CIDR prefix: {s}")))?;
                (addr, prefix)
            }
            None => (s, u8::MAX),
        };
        let network: IpAddr =
            addr.parse().map_err(|_| Error::validation(format!("invalid CIDR address: {s}")))?;
        let max = match network {
            IpAddr::V4(_) => 32,
            IpAddr::V6(_) => 128,
        };
        let prefix = if prefix == u8::MAX { max } else { prefix };
        if prefix > max {
            return Err(Error::validation(format!("invalid CIDR prefix: {s}")));
        }
        Ok(Self { network, prefix })
    }
}

fn prefix_match(network: &[u8], addr: &[u8], prefix: u8) -> bool {
    let full = usize::from(prefix / 8);
    let rem = prefix % 8;
    if network[..full] != addr[..full] {
        return false;
    }
    if rem == 0 {
        return true;
    }
    let mask = !(0xffu8 >> rem);
    network[full] & mask == addr[full] & mask
}
