//! # Generate
//!
//! Generate random strings for ids, challenges, codes and tokens. All values
//! are 128 bits or more of `fastrand` entropy rendered as unpadded base64url,
//! safe for use in URL path segments and query components.

use base64ct::{Base64UrlUnpadded, Encoding};

const SECRET_BYTES: usize = 32;
const ID_BYTES: usize = 16;

fn random_string(bytes: usize) -> String {
    let mut buf = vec![0u8; bytes];
    fastrand::fill(&mut buf);
    Base64UrlUnpadded::encode_string(&buf)
}

/// A 22-character exchange identifier.
#[must_use]
pub fn exchange_id() -> String {
    random_string(ID_BYTES)
}

/// A 43-character challenge nonce binding a presentation to an exchange.
#[must_use]
pub fn challenge() -> String {
    random_string(SECRET_BYTES)
}

/// A 43-character nonce for OpenID4VP requests and OpenID4VCI `c_nonce`s.
#[must_use]
pub fn nonce() -> String {
    random_string(SECRET_BYTES)
}

/// A 43-character pre-authorized code.
#[must_use]
pub fn pre_authorized_code() -> String {
    random_string(SECRET_BYTES)
}

/// A 43-character OAuth access token.
#[must_use]
pub fn access_token() -> String {
    random_string(SECRET_BYTES)
}
