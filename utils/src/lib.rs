//! # HCP Sync Utilities
//!
//! Pure helpers shared by the HTTP clients.
//!
//! - Request signing for the access-control platform (HMAC-SHA256, base64)
//! - Base64 encoding of binary payloads such as face photos

use base64::{Engine as _, engine::general_purpose::STANDARD};
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Build the canonical string the platform signs:
/// `method \n accept \n content-type \n path`.
#[must_use]
pub fn string_to_sign(method: &str, accept: &str, content_type: &str, url_path: &str) -> String {
    format!("{method}\n{accept}\n{content_type}\n{url_path}")
}

/// Compute the `X-Ca-Signature` header value.
///
/// `base64(HMAC-SHA256(secret, method \n accept \n content-type \n path))`.
/// Inputs are signed as given; empty values are not rejected.
///
/// # Examples
///
/// ```
/// use utils::sign_request;
///
/// let signature = sign_request(
///     "POST",
///     "application/json",
///     "application/json;charset=UTF-8",
///     "/artemis/api/resource/v1/person/single/add",
///     "test-secret",
/// );
/// assert_eq!(signature, "A2JORQObVgIuxxrxh7+RhbZvGvPBKecQhMnnNsZpSII=");
/// ```
#[must_use]
pub fn sign_request(
    method: &str,
    accept: &str,
    content_type: &str,
    url_path: &str,
    secret: &str
) -> String {
    let mut mac = <HmacSha256 as Mac>::new_from_slice(secret.as_bytes())
        .expect("HMAC can take key of any size");
    mac.update(string_to_sign(method, accept, content_type, url_path).as_bytes());
    STANDARD.encode(mac.finalize().into_bytes())
}

/// Standard (padded) base64 of arbitrary bytes.
#[must_use]
pub fn encode_base64(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}
