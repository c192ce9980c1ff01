//! Local PIN gate.
//!
//! The PIN never leaves the machine: its SHA-256 digest is compared against
//! a configured digest and success issues an opaque session token that only
//! marks the gate as passed.

use std::env;
use std::time::{SystemTime, UNIX_EPOCH};

use sha2::{Digest, Sha256};
use thiserror::Error;

pub const PIN_LENGTH: usize = 8;

/// Digest of the fallback PIN `12345678`.
const DEFAULT_PIN_HASH: &str = "ef797c8118f02dfb649607dd5d3f8c7623048c9c063d532cc95c5ed7a898a64f";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AccessError {
    #[error("incomplete PIN; enter all {PIN_LENGTH} characters")]
    IncompletePin,

    #[error("PIN may only contain letters and digits")]
    InvalidCharacters,

    #[error("invalid PIN; access denied")]
    Denied,
}

/// Expected digest, overridable via `XEMST_PIN_HASH`.
pub fn expected_pin_hash() -> String {
    env::var("XEMST_PIN_HASH")
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| DEFAULT_PIN_HASH.to_string())
        .to_lowercase()
}

pub fn pin_digest(pin: &str) -> String {
    hex::encode(Sha256::digest(pin.as_bytes()))
}

pub fn verify_pin(pin: &str, expected_hash: &str) -> Result<(), AccessError> {
    let pin = pin.trim();
    if pin.len() != PIN_LENGTH {
        return Err(AccessError::IncompletePin);
    }
    if !pin.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(AccessError::InvalidCharacters);
    }

    if pin_digest(pin) == expected_hash.to_lowercase() {
        Ok(())
    } else {
        Err(AccessError::Denied)
    }
}

/// Opaque marker that the gate was passed; carries no secrets.
pub fn issue_session_token() -> String {
    let epoch_ms = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis())
        .unwrap_or_default();
    format!("local-token-{epoch_ms}")
}
