//! Content hashing helpers.
//!
//! Memory events and display metadata carry md5/sha256/sha512 hex digests
//! of their payload. Values are hashed over their canonical JSON encoding
//! so digests are stable across field reordering in source.

use crate::error::Result;
use serde::Serialize;
use sha2::{Digest, Sha256, Sha512};

/// MD5 hex digest of a serializable value.
pub fn md5_hex<T: Serialize>(value: &T) -> Result<String> {
    let bytes = serde_json::to_vec(value)?;
    Ok(format!("{:x}", md5::compute(&bytes)))
}

/// SHA-256 hex digest of a serializable value.
pub fn sha256_hex<T: Serialize>(value: &T) -> Result<String> {
    let bytes = serde_json::to_vec(value)?;
    Ok(hex_digest(Sha256::new(), &bytes))
}

/// SHA-512 hex digest of a serializable value.
pub fn sha512_hex<T: Serialize>(value: &T) -> Result<String> {
    let bytes = serde_json::to_vec(value)?;
    Ok(hex_digest(Sha512::new(), &bytes))
}

/// SHA-256 hex digest of raw text, used for display metadata lines.
pub fn sha256_text(text: &str) -> String {
    hex_digest(Sha256::new(), text.as_bytes())
}

fn hex_digest<D: Digest>(mut hasher: D, bytes: &[u8]) -> String {
    hasher.update(bytes);
    hasher
        .finalize()
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect()
}
