//! Credential primitives.
//!
//! Provides the pieces the auth handlers are built from:
//! - parsing `Authorization: Basic <base64(email:password)>` headers
//! - one-way password digests and constant-time verification
//! - session token generation and the key-value key layout for sessions

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

/// Prefix of every session entry in the key-value store.
pub const SESSION_KEY_PREFIX: &str = "auth_";

/// Header carrying the session token on protected endpoints.
pub const TOKEN_HEADER: &str = "x-token";

/// Credentials decoded from a Basic authorization header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BasicCredentials {
    pub email: String,
    pub password: String,
}

/// Parse an `Authorization` header value of the form `Basic <base64>`.
///
/// The decoded payload is split at the first `:`, so passwords may contain
/// colons.  Returns `None` for any other scheme, invalid base64, non-UTF-8
/// payloads, or a payload without a `:`.
pub fn parse_basic_auth(header: &str) -> Option<BasicCredentials> {
    let (scheme, encoded) = header.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("basic") {
        return None;
    }
    let decoded = STANDARD.decode(encoded.trim()).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (email, password) = decoded.split_once(':')?;
    Some(BasicCredentials {
        email: email.to_string(),
        password: password.to_string(),
    })
}

/// Hex-encoded SHA-256 digest of a plaintext password.
pub fn hash_password(password: &str) -> String {
    hex::encode(Sha256::digest(password.as_bytes()))
}

/// Check `password` against a stored digest without early exit on mismatch.
pub fn verify_password(password: &str, stored_digest: &str) -> bool {
    constant_time_eq(&hash_password(password), stored_digest)
}

/// Compare two strings in constant time.
pub fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.as_bytes().ct_eq(b.as_bytes()).into()
}

/// A fresh, unguessable session token.
pub fn generate_token() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Key-value key under which a session token is stored.
pub fn session_key(token: &str) -> String {
    format!("{SESSION_KEY_PREFIX}{token}")
}
