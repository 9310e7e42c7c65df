//! # VC-JWT Envelopes
//!
//! Credentials and presentations secured as JWTs ([VC-JWT](https://www.w3.org/TR/vc-jose-cose/))
//! travel as opaque compact serializations. This module decodes the claims
//! view of an envelope and maps registered claims onto data-model properties
//! (`iss` → `issuer`, `jti` → `id`, `sub` → `credentialSubject.id`,
//! `nbf`/`exp` → validity dates, at second precision), and wraps envelopes
//! into v2 `EnvelopedVerifiableCredential` / `EnvelopedVerifiablePresentation`
//! objects for result capture.
//!
//! Signature verification is NOT performed here; envelopes are verified by
//! the external verifier service. Decoding is a pure transformation of the
//! payload bytes.

use base64ct::{Base64UrlUnpadded, Encoding};
use chrono::DateTime;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::error::{Error, Result};
use crate::w3c_vc::{CONTEXT_V2, vc::VerifiableCredential, vp::VerifiablePresentation};

/// Registered claims of a VC-JWT or VP-JWT payload.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct VcJwtClaims {
    /// Issuer of the JWT; maps to the credential `issuer` or the
    /// presentation `holder`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,

    /// JWT id; maps to the credential or presentation `id`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jti: Option<String>,

    /// Subject; maps to `credentialSubject.id`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,

    /// Not-before, seconds since the epoch; maps to
    /// `issuanceDate`/`validFrom`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nbf: Option<i64>,

    /// Expiry, seconds since the epoch; maps to
    /// `expirationDate`/`validUntil`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exp: Option<i64>,

    /// The embedded credential, for VC-JWTs.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vc: Option<Value>,

    /// The embedded presentation, for VP-JWTs.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vp: Option<Value>,

    /// The challenge bound into a VP-JWT.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nonce: Option<String>,

    /// The domain (audience) bound into a VP-JWT.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aud: Option<Value>,

    /// Unregistered claims, preserved.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Whether a string has the shape of a compact JWS serialization.
#[must_use]
pub fn is_jwt(s: &str) -> bool {
    let parts: Vec<&str> = s.split('.').collect();
    parts.len() == 3 && parts.iter().all(|p| !p.is_empty())
}

/// Decode the claims of a compact JWT without verifying its signature.
///
/// # Errors
///
/// Returns [`Error::Data`] when the token is not a compact JWS or its
/// payload is not a JSON object.
pub fn decode_claims(jwt: &str) -> Result<VcJwtClaims> {
    let mut parts = jwt.split('.');
    let (Some(_), Some(payload), Some(_), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(Error::data("token is not a compact JWT"));
    };
    let bytes = Base64UrlUnpadded::decode_vec(payload)
        .map_err(|e| Error::data(format!("issue decoding JWT payload: {e}")))?;
    serde_json::from_slice(&bytes)
        .map_err(|e| Error::data(format!("JWT payload is not a claims object: {e}")))
}

/// Materialize the credential carried by a VC-JWT's claims, injecting the
/// registered claims into the corresponding data-model properties.
///
/// # Errors
///
/// Returns [`Error::Data`] when the `vc` claim is missing or a claim
/// contradicts the property already present on the embedded credential.
pub fn credential_from_claims(claims: &VcJwtClaims) -> Result<VerifiableCredential> {
    let Some(vc_value) = &claims.vc else {
        return Err(Error::data("missing `vc` claim"));
    };
    let mut vc: VerifiableCredential = serde_json::from_value(vc_value.clone())
        .map_err(|e| Error::data(format!("`vc` claim is not a credential: {e}")))?;

    if let Some(iss) = &claims.iss {
        if let Some(existing) = vc.issuer_id() {
            if existing != iss {
                return Err(Error::data("`iss` claim does not match credential issuer"));
            }
        }
        vc.issuer = crate::core::Kind::String(iss.clone());
    }
    if let Some(jti) = &claims.jti {
        if vc.id.as_deref().is_some_and(|id| id != jti) {
            return Err(Error::data("`jti` claim does not match credential id"));
        }
        vc.id = Some(jti.clone());
    }
    if let Some(sub) = &claims.sub {
        match &mut vc.credential_subject {
            crate::core::OneMany::One(subject) => {
                if subject.id.as_deref().is_some_and(|id| id != sub) {
                    return Err(Error::data("`sub` claim does not match credential subject"));
                }
                subject.id = Some(sub.clone());
            }
            crate::core::OneMany::Many(subjects) => {
                if let Some(first) = subjects.first_mut() {
                    first.id.get_or_insert_with(|| sub.clone());
                }
            }
        }
    }

    let v2 = vc.is_v2();
    if let Some(nbf) = claims.nbf {
        let date = timestamp_to_xml(nbf)?;
        if v2 {
            vc.valid_from = Some(date);
        } else {
            vc.issuance_date = Some(date);
        }
    }
    if let Some(exp) = claims.exp {
        let date = timestamp_to_xml(exp)?;
        if v2 {
            vc.valid_until = Some(date);
        } else {
            vc.expiration_date = Some(date);
        }
    }

    Ok(vc)
}

/// Materialize the presentation carried by a VP-JWT's claims. JWT-string
/// entries in `verifiableCredential` are rewritten as v2
/// `EnvelopedVerifiableCredential` objects so downstream consumers never see
/// bare tokens.
///
/// # Errors
///
/// Returns [`Error::Data`] when the `vp` claim is missing or malformed.
pub fn presentation_from_claims(claims: &VcJwtClaims) -> Result<VerifiablePresentation> {
    let Some(vp_value) = &claims.vp else {
        return Err(Error::data("missing `vp` claim"));
    };
    let mut vp: VerifiablePresentation = serde_json::from_value(vp_value.clone())
        .map_err(|e| Error::data(format!("`vp` claim is not a presentation: {e}")))?;

    if let Some(iss) = &claims.iss {
        vp.holder.get_or_insert_with(|| iss.clone());
    }
    if let Some(jti) = &claims.jti {
        vp.id.get_or_insert_with(|| jti.clone());
    }

    if let Some(credentials) = vp.verifiable_credential.take() {
        let enveloped = credentials
            .to_vec()
            .into_iter()
            .map(|entry| match entry {
                Value::String(token) if is_jwt(&token) => enveloped_credential(&token),
                other => other,
            })
            .collect();
        vp.verifiable_credential = Some(crate::core::OneMany::Many(enveloped));
    }

    Ok(vp)
}

/// Wrap a VC-JWT in a v2 `EnvelopedVerifiableCredential` object.
#[must_use]
pub fn enveloped_credential(jwt: &str) -> Value {
    json!({
        "@context": CONTEXT_V2,
        "id": format!("data:application/jwt,{jwt}"),
        "type": "EnvelopedVerifiableCredential"
    })
}

/// Wrap a VP-JWT in a v2 `EnvelopedVerifiablePresentation` object.
#[must_use]
pub fn enveloped_presentation(jwt: &str) -> Value {
    json!({
        "@context": CONTEXT_V2,
        "id": format!("data:application/jwt,{jwt}"),
        "type": "EnvelopedVerifiablePresentation"
    })
}

/// Recover the compact JWT from an enveloped credential or presentation.
#[must_use]
pub fn unwrap_enveloped(value: &Value) -> Option<&str> {
    let id = value.get("id")?.as_str()?;
    id.strip_prefix("data:application/jwt,")
}

fn timestamp_to_xml(secs: i64) -> Result<String> {
    let Some(date) = DateTime::from_timestamp(secs, 0) else {
        return Err(Error::data("timestamp out of range"));
    };
    Ok(date.format("%Y-%m-%dT%H:%M:%SZ").to_string())
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::w3c_vc::CONTEXT_V1;

    fn encode(claims: &Value) -> String {
        let header = Base64UrlUnpadded::encode_string(br#"{"alg":"EdDSA","typ":"JWT"}"#);
        let payload =
            Base64UrlUnpadded::encode_string(claims.to_string().as_bytes());
        format!("{header}.{payload}.c2lnbmF0dXJl")
    }

    #[test]
    fn claims_map_onto_credential() {
        let jwt = encode(&json!({
            "iss": "did:web:issuer.example",
            "jti": "urn:uuid:43f14128-3b42-11ee-be56-0242ac120002",
            "sub": "did:example:ebfeb1f712ebc6f1c276e12ec21",
            "nbf": 1_735_689_600,
            "exp": 1_767_225_600,
            "vc": {
                "@context": [CONTEXT_V1],
                "type": ["VerifiableCredential"],
                "credentialSubject": {}
            }
        }));

        let claims = decode_claims(&jwt).expect("should decode");
        let vc = credential_from_claims(&claims).expect("should map");

        assert_eq!(vc.issuer_id(), Some("did:web:issuer.example"));
        assert_eq!(vc.id.as_deref(), Some("urn:uuid:43f14128-3b42-11ee-be56-0242ac120002"));
        let subject = vc.credential_subject.as_one().expect("one subject");
        assert_eq!(subject.id.as_deref(), Some("did:example:ebfeb1f712ebc6f1c276e12ec21"));
        assert_eq!(vc.issuance_date.as_deref(), Some("2025-01-01T00:00:00Z"));
        assert_eq!(vc.expiration_date.as_deref(), Some("2026-01-01T00:00:00Z"));
    }

    #[test]
    fn issuer_mismatch_rejected() {
        let jwt = encode(&json!({
            "iss": "did:web:issuer.example",
            "vc": {
                "@context": [CONTEXT_V1],
                "type": ["VerifiableCredential"],
                "issuer": "did:web:other.example",
                "credentialSubject": {}
            }
        }));
        let claims = decode_claims(&jwt).expect("should decode");
        let err = credential_from_claims(&claims).expect_err("should reject");
        assert_eq!(err.name(), "DataError");
    }

    #[test]
    fn missing_vc_claim() {
        let jwt = encode(&json!({"iss": "did:web:issuer.example"}));
        let claims = decode_claims(&jwt).expect("should decode");
        let err = credential_from_claims(&claims).expect_err("should reject");
        assert_eq!(err.to_string(), "missing `vc` claim");
    }

    #[test]
    fn presentation_envelopes_inner_jwts() {
        let inner = encode(&json!({
            "iss": "did:web:issuer.example",
            "vc": {"@context": [CONTEXT_V1], "type": ["VerifiableCredential"],
                   "credentialSubject": {}}
        }));
        let jwt = encode(&json!({
            "iss": "did:key:z6MkhaXgBZDvotDkL5257faiztiGiC2QtKLGpbnnEGta2doK",
            "nonce": "c0ae1c8e-c7e7-469f-b252-86e6a0e7387e",
            "vp": {
                "@context": [CONTEXT_V2],
                "type": ["VerifiablePresentation"],
                "verifiableCredential": [inner]
            }
        }));

        let claims = decode_claims(&jwt).expect("should decode");
        let vp = presentation_from_claims(&claims).expect("should map");
        assert_eq!(
            vp.holder.as_deref(),
            Some("did:key:z6MkhaXgBZDvotDkL5257faiztiGiC2QtKLGpbnnEGta2doK")
        );
        let creds = vp.credentials();
        assert_eq!(creds[0]["type"], "EnvelopedVerifiableCredential");
        assert!(unwrap_enveloped(&creds[0]).expect("has data url").contains('.'));
    }

    #[test]
    fn envelope_round_trip() {
        let wrapped = enveloped_credential("eyJh.eyJi.c2ln");
        assert_eq!(unwrap_enveloped(&wrapped), Some("eyJh.eyJi.c2ln"));
        assert_eq!(wrapped["@context"], CONTEXT_V2);
    }
}
