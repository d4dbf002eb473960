//! Helpers for creating, salting and verifying the CSRF token wire format.
//!
//! An unsalted token is `key || HMAC-SHA1(secret, key)` in standard base64. That value is
//! stored in the cookie. Anything rendered into a response body is salted first: the token
//! bytes are XORed with a fresh random pad and the pad is appended, so the rendered value
//! differs on every response while still unsalting to the cookie.
//!
//! Tokens issued before salting existed are 56 lowercase hex characters. They are accepted
//! by [`verify_token`] and passed through [`salt_token`] and [`unsalt_token`] unchanged.

use base64::{Engine as _, engine::general_purpose::STANDARD};
use hex_simd::AsciiCase;
use rand::{RngCore, rngs::OsRng};
use subtle::ConstantTimeEq;

use crate::{
    error::Error,
    secret::{CHECKSUM_LENGTH, Secret},
};

/// Number of random bytes in a token key.
pub const TOKEN_VALUE_LENGTH: usize = 16;

/// Decoded length of an unsalted token.
pub const TOKEN_WITH_CHECKSUM_LENGTH: usize = TOKEN_VALUE_LENGTH + CHECKSUM_LENGTH;

/// Length of a legacy hexadecimal token: a 16 character key plus a 40 character hex HMAC.
pub const LEGACY_TOKEN_LENGTH: usize = 56;

/// Create a new unsalted token checksummed with `secret`.
pub fn create_token(secret: &Secret) -> String {
    let mut token = [0u8; TOKEN_WITH_CHECKSUM_LENGTH];
    let (key, checksum) = token.split_at_mut(TOKEN_VALUE_LENGTH);
    OsRng.fill_bytes(key);
    checksum.copy_from_slice(&secret.checksum(key));

    STANDARD.encode(token)
}

/// Salt a token for rendering into a response.
///
/// Legacy hexadecimal tokens are returned unchanged.
pub fn salt_token(token: &str) -> Result<String, Error> {
    if is_legacy_token(token) {
        return Ok(token.to_owned());
    }

    let decoded = STANDARD
        .decode(token.as_bytes())
        .map_err(Error::MalformedTokenEncoding)?;

    let mut salt = vec![0u8; decoded.len()];
    OsRng.fill_bytes(&mut salt);

    let mut salted: Vec<u8> = decoded.iter().zip(&salt).map(|(t, s)| t ^ s).collect();
    salted.extend_from_slice(&salt);

    Ok(STANDARD.encode(salted))
}

/// Reverse [`salt_token`].
///
/// Input that is not a well-formed salted token is returned unchanged so that the
/// following comparison against the cookie fails.
pub fn unsalt_token(token: &str) -> String {
    if is_legacy_token(token) {
        return token.to_owned();
    }

    let decoded = match STANDARD.decode(token.as_bytes()) {
        Ok(decoded) if decoded.len() == TOKEN_WITH_CHECKSUM_LENGTH * 2 => decoded,
        _ => return token.to_owned(),
    };

    let (salted, salt) = decoded.split_at(TOKEN_WITH_CHECKSUM_LENGTH);
    let unsalted: Vec<u8> = salted.iter().zip(salt).map(|(t, s)| t ^ s).collect();

    STANDARD.encode(unsalted)
}

/// Check that `token` carries a valid checksum for `secret`.
pub fn verify_token(secret: &Secret, token: &str) -> bool {
    if is_legacy_token(token) {
        return verify_legacy_token(secret, token);
    }

    let Ok(decoded) = STANDARD.decode(token.as_bytes()) else {
        return false;
    };
    if decoded.len() <= TOKEN_VALUE_LENGTH {
        return false;
    }

    let (key, provided) = decoded.split_at(TOKEN_VALUE_LENGTH);
    let expected = secret.checksum(key);

    expected.as_slice().ct_eq(provided).into()
}

/// Whether `token` has the pre-salting hexadecimal shape.
pub fn is_legacy_token(token: &str) -> bool {
    token.len() == LEGACY_TOKEN_LENGTH
        && token
            .bytes()
            .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
}

// Legacy tokens checksum the key characters themselves and store the HMAC as lowercase hex.
fn verify_legacy_token(secret: &Secret, token: &str) -> bool {
    let (key, provided) = token.split_at(TOKEN_VALUE_LENGTH);
    let expected = hex_simd::encode_to_string(secret.checksum(key.as_bytes()), AsciiCase::Lower);

    expected.as_bytes().ct_eq(provided.as_bytes()).into()
}

/// Compare two token strings in constant time.
pub(crate) fn tokens_match(a: &str, b: &str) -> bool {
    a.as_bytes().ct_eq(b.as_bytes()).into()
}
