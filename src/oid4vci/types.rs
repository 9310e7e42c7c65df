//! # OpenID4VCI Types
//!
//! Wire types shared by the issuance endpoints. Field names follow the
//! specification, including the draft-20 `types` alias inside
//! `credential_definition` and the hyphenated `pre-authorized_code` names.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Linked-data proof credential format.
pub const FORMAT_LDP_VC: &str = "ldp_vc";

/// VC-JWT (JSON-LD) credential format.
pub const FORMAT_JWT_VC_JSON_LD: &str = "jwt_vc_json-ld";

/// VC-JWT (JSON) credential format.
pub const FORMAT_JWT_VC_JSON: &str = "jwt_vc_json";

/// Credential formats this adapter can request from the issuer.
pub const SUPPORTED_FORMATS: [&str; 3] =
    [FORMAT_LDP_VC, FORMAT_JWT_VC_JSON_LD, FORMAT_JWT_VC_JSON];

/// The pre-authorized code grant type URN.
pub const PRE_AUTHORIZED_GRANT: &str = "urn:ietf:params:oauth:grant-type:pre-authorized_code";

/// The authorization code grant type.
pub const AUTHORIZATION_CODE_GRANT: &str = "authorization_code";

/// A credential offer, delivered by value inside an
/// `openid-credential-offer://` URL or fetched from the offer-URI
/// endpoint.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct CredentialOffer {
    /// The credential issuer: the exchange URL.
    pub credential_issuer: String,

    /// The offered credentials (format and definition pairs).
    pub credentials: Vec<Value>,

    /// The grants a wallet may use to obtain an access token.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub grants: Option<Grants>,
}

/// Grants carried by a credential offer.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct Grants {
    /// The authorization code grant.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authorization_code: Option<AuthorizationCodeGrant>,

    /// The pre-authorized code grant.
    #[serde(
        rename = "urn:ietf:params:oauth:grant-type:pre-authorized_code",
        skip_serializing_if = "Option::is_none"
    )]
    pub pre_authorized_code: Option<PreAuthorizedCodeGrant>,
}

/// The authorization code grant of a credential offer.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct AuthorizationCodeGrant {
    /// Opaque state binding the authorization to this exchange.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub issuer_state: Option<String>,
}

/// The pre-authorized code grant of a credential offer.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct PreAuthorizedCodeGrant {
    /// The single-use code the wallet redeems at the token endpoint.
    #[serde(rename = "pre-authorized_code")]
    pub pre_authorized_code: String,

    /// Whether the token request must carry a transaction code.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub user_pin_required: bool,
}

/// A key proof accompanying a credential request.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct Proof {
    /// The proof type; only `jwt` is recognized.
    pub proof_type: String,

    /// The proof JWT.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jwt: Option<String>,
}

/// The `credential_definition` of a credential request. Accepts the
/// draft-20 `types` alias of `type`.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct CredentialDefinition {
    /// JSON-LD contexts of the requested credential.
    #[serde(rename = "@context", skip_serializing_if = "Option::is_none")]
    pub context: Option<Vec<Value>>,

    /// The requested credential types.
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub type_: Option<Vec<String>>,

    /// Draft-20 alias of `type`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub types: Option<Vec<String>>,

    /// Requested credential subject shape.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub credential_subject: Option<Value>,
}

impl CredentialDefinition {
    /// The requested types, whichever alias carried them.
    #[must_use]
    pub fn requested_types(&self) -> Option<&[String]> {
        self.type_.as_deref().or(self.types.as_deref())
    }
}

/// A single credential response.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct CredentialResponse {
    /// The credential's format.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,

    /// The issued credential: an object for `ldp_vc`, a compact JWT string
    /// for the VC-JWT formats.
    pub credential: Value,
}
