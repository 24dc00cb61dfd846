//! Shared access signature credentials
//!
//! The device proves possession of its symmetric key by signing a
//! time-bounded resource string. [`signer`] holds the pure signing
//! primitives; [`manager`] owns the current credential and decides when it
//! has to be regenerated.

pub mod manager;
pub mod signer;

pub use manager::{Credential, CredentialManager, DEFAULT_LIFETIME_SECS};
pub use signer::{build_token, decode_base64, hmac_sha256, percent_encode, resource_uri};

use thiserror::Error;

/// Credential generation errors
#[derive(Debug, Error)]
pub enum CredentialError {
    /// The device key is not valid standard base64
    #[error("Device key is not valid base64: {0}")]
    Encoding(#[from] base64::DecodeError),

    /// No calibrated epoch time is available yet
    #[error("No valid time source - epoch clock not synchronized")]
    NoTimeSource,
}
