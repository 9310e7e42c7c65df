//! # Verifiable Presentations
//!
//! [Verifiable Presentations](https://www.w3.org/TR/vc-data-model/#presentations-0)
//!
//! A presentation submitted to an exchange may be protected by a data
//! integrity proof, enveloped as a VC-JWT, or (when a step allows it)
//! entirely unprotected. Contained credentials are kept as raw JSON since
//! their shape is tenant-defined.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::core::{Kind, OneMany};

/// A Verifiable Presentation combining one or more credentials for
/// submission to an exchange.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct VerifiablePresentation {
    /// The @context property. An ordered set where the first item is the
    /// base credentials context.
    #[serde(rename = "@context")]
    pub context: Vec<Kind<Value>>,

    /// Optional unique identifier for the presentation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// The presentation type(s). Contains `VerifiablePresentation` plus any
    /// more specific types.
    #[serde(rename = "type")]
    pub type_: OneMany<String>,

    /// The presented credentials, raw. Each entry is either an embedded
    /// credential object or an `EnvelopedVerifiableCredential`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verifiable_credential: Option<OneMany<Value>>,

    /// URI of the entity generating the presentation, e.g.
    /// `did:key:z6Mk...`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub holder: Option<String>,

    /// Proof(s) binding the presentation to the holder and to the
    /// exchange's challenge and domain.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proof: Option<OneMany<Value>>,

    /// Further properties preserved verbatim.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl VerifiablePresentation {
    /// A minimal unsigned presentation wrapping the given credentials.
    #[must_use]
    pub fn wrapping(credentials: Vec<Value>, context: &str) -> Self {
        Self {
            context: vec![Kind::String(context.to_string())],
            id: Some(format!("urn:uuid:{}", Uuid::new_v4())),
            type_: OneMany::One("VerifiablePresentation".to_string()),
            verifiable_credential: if credentials.is_empty() {
                None
            } else {
                Some(OneMany::Many(credentials))
            },
            ..Self::default()
        }
    }

    /// The DID that authenticated this presentation: the `holder` when set,
    /// otherwise the controller prefix of the proof's verification method.
    #[must_use]
    pub fn did(&self) -> Option<String> {
        if let Some(holder) = &self.holder {
            return Some(holder.clone());
        }
        let vm = self.verification_method()?;
        Some(vm.split('#').next().unwrap_or(&vm).to_string())
    }

    /// The first proof's `verificationMethod`.
    #[must_use]
    pub fn verification_method(&self) -> Option<String> {
        let proof = match self.proof.as_ref()? {
            OneMany::One(proof) => proof,
            OneMany::Many(proofs) => proofs.first()?,
        };
        proof.get("verificationMethod").and_then(Value::as_str).map(ToString::to_string)
    }

    /// The challenge bound into the first proof.
    #[must_use]
    pub fn challenge(&self) -> Option<&str> {
        let proof = match self.proof.as_ref()? {
            OneMany::One(proof) => proof,
            OneMany::Many(proofs) => proofs.first()?,
        };
        proof.get("challenge").and_then(Value::as_str)
    }

    /// The presented credentials as a vector, empty when none were included.
    #[must_use]
    pub fn credentials(&self) -> Vec<Value> {
        self.verifiable_credential.as_ref().map(OneMany::to_vec).unwrap_or_default()
    }
}
