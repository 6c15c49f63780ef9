//! Canonical JSON encoding and SHA-256 hashing for hash-chained records.
//!
//! Spec §4.1: hashes are computed over a canonical JSON encoding with stable
//! key order, no trailing whitespace, and UTF-8 strings. `serde_json::Map`
//! (without the `preserve_order` feature, which this workspace never enables)
//! is backed by a `BTreeMap`, so round-tripping any `Serialize` value through
//! `serde_json::Value` and re-serializing it compactly already yields
//! lexicographically sorted keys at every nesting level — this is the whole
//! of the "canonical encoder" the spec calls for.

use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::error::GovernanceError;

/// Encode `value` as canonical JSON bytes: sorted keys, no whitespace.
pub fn canonical_json_bytes(value: &impl Serialize) -> Result<Vec<u8>, GovernanceError> {
    let as_value = serde_json::to_value(value)
        .map_err(|e| GovernanceError::validation("canonical_json", e.to_string()))?;
    serde_json::to_vec(&as_value)
        .map_err(|e| GovernanceError::validation("canonical_json", e.to_string()))
}

/// SHA-256 over the canonical JSON encoding of `value`, as lowercase hex.
pub fn canonical_hash(value: &impl Serialize) -> Result<String, GovernanceError> {
    let bytes = canonical_json_bytes(value)?;
    Ok(hex_sha256(&bytes))
}

/// SHA-256 of arbitrary bytes, as lowercase hex.
pub fn hex_sha256(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// Minimal hex encoder so this crate doesn't need the `hex` crate for one
/// function; kept private-looking but exercised by `hex_sha256` above.
mod hex {
    pub fn encode(bytes: impl AsRef<[u8]>) -> String {
        use std::fmt::Write;
        let mut out = String::with_capacity(bytes.as_ref().len() * 2);
        for byte in bytes.as_ref() {
            write!(out, "{byte:02x}").expect("writing to a String never fails");
        }
        out
    }
}

/// The literal previous-hash value for the first record in a chain.
pub const GENESIS_HASH: &str = "genesis";

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn key_order_does_not_affect_hash() {
        let a = json!({"b": 1, "a": 2});
        let b = json!({"a": 2, "b": 1});
        assert_eq!(canonical_hash(&a).unwrap(), canonical_hash(&b).unwrap());
    }

    #[test]
    fn different_content_hashes_differently() {
        let a = json!({"a": 1});
        let b = json!({"a": 2});
        assert_ne!(canonical_hash(&a).unwrap(), canonical_hash(&b).unwrap());
    }

    #[test]
    fn hash_is_reproducible() {
        let a = json!({"nested": {"z": 1, "y": [1,2,3]}, "x": "hello"});
        assert_eq!(canonical_hash(&a).unwrap(), canonical_hash(&a).unwrap());
    }
}
