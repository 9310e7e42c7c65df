//! # Verifiable Credentials
//!
//! [Verifiable Credentials](https://www.w3.org/TR/vc-data-model/#credentials)
//!
//! Credentials handled by this crate are authored by tenant templates and
//! signed by an external issuer, so the model keeps unknown properties in a
//! flattened map rather than enumerating the full data model.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::core::{Kind, OneMany};
use crate::w3c_vc::CONTEXT_V2;

/// A Verifiable Credential as produced by a credential template or returned
/// by the issuer service.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct VerifiableCredential {
    /// The @context property. An ordered set where the first item is the
    /// base credentials context (v1.1 or v2).
    #[serde(rename = "@context")]
    pub context: Vec<Kind<Value>>,

    /// URI identifying the credential, e.g. `urn:uuid:...`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// The credential type(s). Contains `VerifiableCredential` plus any
    /// more specific types.
    #[serde(rename = "type")]
    pub type_: OneMany<String>,

    /// The issuer: a URI or an object carrying an `id` property.
    pub issuer: Kind<Value>,

    /// v1.1 issuance date (`issuanceDate`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub issuance_date: Option<String>,

    /// v2 issuance date (`validFrom`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub valid_from: Option<String>,

    /// v1.1 expiry (`expirationDate`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expiration_date: Option<String>,

    /// v2 expiry (`validUntil`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub valid_until: Option<String>,

    /// The subject(s) the claims are about.
    pub credential_subject: OneMany<CredentialSubject>,

    /// Data-integrity proof(s), when the credential is signed with an
    /// embedded proof rather than enveloped as a VC-JWT.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proof: Option<OneMany<Value>>,

    /// Any further properties: `credentialStatus`, `credentialSchema`,
    /// `evidence`, template-defined extensions.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl VerifiableCredential {
    /// Whether the credential uses the v2 data model context.
    #[must_use]
    pub fn is_v2(&self) -> bool {
        self.context.first().and_then(Kind::as_string) == Some(CONTEXT_V2)
    }

    /// The issuer id, whether expressed as a string or an object.
    #[must_use]
    pub fn issuer_id(&self) -> Option<&str> {
        match &self.issuer {
            Kind::String(s) => Some(s.as_str()),
            Kind::Object(o) => o.get("id").and_then(Value::as_str),
        }
    }
}

/// The subject of claims in a Verifiable Credential.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct CredentialSubject {
    /// Identifier of the subject, typically the holder's DID.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// Claims about the subject.
    #[serde(flatten)]
    pub claims: Map<String, Value>,
}
