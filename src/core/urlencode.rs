//! # URL Encoding
//!
//! Query-string and form codecs used when building credential-offer URLs and
//! decoding `direct_post` Authorization Responses.

use anyhow::Result;
use percent_encoding::{AsciiSet, CONTROLS, utf8_percent_encode};
use serde::Serialize;
use serde::de::DeserializeOwned;

// characters that must be escaped inside a query component
const QUERY: &AsciiSet = &CONTROLS.add(b' ').add(b'"').add(b'#').add(b'<').add(b'>').add(b'&');

/// Serialize a value to an `application/x-www-form-urlencoded` string.
///
/// # Errors
///
/// Fails when the value cannot be flattened to key/value pairs.
pub fn to_string<T: Serialize + ?Sized>(value: &T) -> Result<String> {
    Ok(serde_urlencoded::to_string(value)?)
}

/// Deserialize a value from an `application/x-www-form-urlencoded` string.
///
/// # Errors
///
/// Fails when the string does not decode to the target shape.
pub fn from_str<T: DeserializeOwned>(s: &str) -> Result<T> {
    Ok(serde_urlencoded::from_str(s)?)
}

/// Percent-encode a single query component.
#[must_use]
pub fn encode_component(component: &str) -> String {
    utf8_percent_encode(component, QUERY).to_string()
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    #[test]
    fn form_round_trip() {
        let mut form = HashMap::new();
        form.insert("vp_token", r#"{"@context":[]}"#);
        let encoded = to_string(&form).expect("should encode");
        let decoded: HashMap<String, String> = from_str(&encoded).expect("should decode");
        assert_eq!(decoded["vp_token"], r#"{"@context":[]}"#);
    }

    #[test]
    fn component_escapes_json() {
        let encoded = encode_component(r#"{"credential_issuer":"https://x"}"#);
        assert!(!encoded.contains('"'));
    }
}
