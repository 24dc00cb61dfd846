//! Pure SAS token signing primitives
//!
//! Token layout expected by the broker:
//!
//! ```text
//! SharedAccessSignature sr=<hostname>/devices/<device_id>&sig=<signature>&se=<expiry>
//! ```
//!
//! where `signature` is the percent-encoded base64 of
//! `HMAC-SHA256(base64_decode(key), "<resource_uri>\n<expiry>")`.

use super::CredentialError;
use base64::prelude::*;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::fmt::Write;

type HmacSha256 = Hmac<Sha256>;

/// Length in bytes of an HMAC-SHA256 tag
pub const SIGNATURE_LEN: usize = 32;

const TOKEN_PREFIX: &str = "SharedAccessSignature";

/// Decode a standard (padded) base64 string
pub fn decode_base64(input: &str) -> Result<Vec<u8>, CredentialError> {
    Ok(BASE64_STANDARD.decode(input)?)
}

/// Compute HMAC-SHA256 of `message` under `key`
#[allow(clippy::expect_used)] // HMAC accepts keys of any length, InvalidLength is unreachable
pub fn hmac_sha256(key: &[u8], message: &[u8]) -> [u8; SIGNATURE_LEN] {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC accepts keys of any length");
    mac.update(message);
    let mut tag = [0u8; SIGNATURE_LEN];
    tag.copy_from_slice(&mac.finalize().into_bytes());
    tag
}

/// Percent-encode bytes the way the hub verifies signatures.
///
/// ASCII alphanumerics pass through, space becomes `+` and every other byte
/// becomes `%XX` with uppercase hex digits. This is not RFC 3986: `-`, `.`,
/// `_` and `~` are encoded too.
pub fn percent_encode(input: &[u8]) -> String {
    let mut encoded = String::with_capacity(input.len() * 3);
    for &byte in input {
        match byte {
            b' ' => encoded.push('+'),
            b if b.is_ascii_alphanumeric() => encoded.push(b as char),
            b => {
                // Writing into a String cannot fail
                let _ = write!(encoded, "%{b:02X}");
            }
        }
    }
    encoded
}

/// Build the signed resource URI: `<hostname>/devices/<device_id>`
pub fn resource_uri(hostname: &str, device_id: &str) -> String {
    format!("{hostname}/devices/{device_id}")
}

/// Build a complete SAS token for a device identity
pub fn build_token(
    hostname: &str,
    device_id: &str,
    base64_key: &str,
    expiry_epoch: u64,
) -> Result<String, CredentialError> {
    let resource_uri = resource_uri(hostname, device_id);
    let string_to_sign = format!("{resource_uri}\n{expiry_epoch}");

    let raw_key = decode_base64(base64_key)?;
    let signature = BASE64_STANDARD.encode(hmac_sha256(&raw_key, string_to_sign.as_bytes()));
    let encoded_signature = percent_encode(signature.as_bytes());

    Ok(format!(
        "{TOKEN_PREFIX} sr={resource_uri}&sig={encoded_signature}&se={expiry_epoch}"
    ))
}
