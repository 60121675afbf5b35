//! Shared helpers for the credential flow.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use im_domain::error::Error;
use serde::de::DeserializeOwned;

/// Convert a [`reqwest::Error`] into the domain [`Error`] type.
///
/// Every transport failure, timeouts included, is a caller-retryable
/// [`Error::Network`].
pub fn from_reqwest(e: reqwest::Error) -> Error {
    if e.is_timeout() {
        Error::Network(format!("timed out: {e}"))
    } else {
        Error::Network(e.to_string())
    }
}

/// Decode the claims segment of a compact JWT without verifying anything.
///
/// Returns `None` for anything that is not a three-part token with a JSON
/// payload.
pub(crate) fn decode_unverified_claims<T: DeserializeOwned>(token: &str) -> Option<T> {
    let mut parts = token.split('.');
    let (_header, payload, _sig) = (parts.next()?, parts.next()?, parts.next()?);
    if parts.next().is_some() {
        return None;
    }
    let bytes = URL_SAFE_NO_PAD.decode(payload.trim_end_matches('=')).ok()?;
    serde_json::from_slice(&bytes).ok()
}

/// Decode a base64url value, tolerating stray padding.
pub(crate) fn b64url_decode(value: &str) -> Option<Vec<u8>> {
    URL_SAFE_NO_PAD.decode(value.trim_end_matches('=')).ok()
}

pub(crate) fn b64url_encode(bytes: &[u8]) -> String {
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Cap a response body for error messages and logs.
pub(crate) fn truncate_body(body: &str, max: usize) -> String {
    if body.len() <= max {
        return body.to_string();
    }
    let mut end = max;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}… ({} bytes)", &body[..end], body.len())
}
