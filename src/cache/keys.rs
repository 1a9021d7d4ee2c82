//! Cache key derivation.
//!
//! A cache key identifies one cacheable computation: an operation name
//! plus its arguments. Keys are digested to a fixed-width hex string so
//! they are filesystem-safe regardless of what the arguments contain.

use serde::Serialize;
use sha2::{Digest, Sha256};

/// Key derivation fails only when the arguments cannot be represented as
/// JSON at all (e.g. a map with non-string keys).
#[derive(Debug, thiserror::Error)]
#[error("cache key arguments are not JSON-serializable: {0}")]
pub struct KeyError(#[from] serde_json::Error);

/// Digest an already-derived key into the hex form used for file names.
///
/// Callers may pass arbitrary opaque strings as keys; hashing here keeps
/// path traversal characters and over-long keys off the filesystem.
pub(crate) fn file_digest(key: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(key.as_bytes());
    hex::encode(hasher.finalize())
}

/// Derive a stable cache key from an operation name and its arguments.
///
/// The key is the hex SHA-256 digest of the canonical JSON encoding of
/// `{"args": ..., "op": ...}`. `serde_json` maps are BTreeMap-backed by
/// default, so object keys serialize in sorted order and two argument
/// structs that compare equal always produce the same digest.
pub fn derive_key<A>(op: &str, args: &A) -> Result<String, KeyError>
where
    A: Serialize + ?Sized,
{
    #[derive(Serialize)]
    struct KeyMaterial<'a, A: Serialize + ?Sized> {
        args: &'a A,
        op: &'a str,
    }

    let canonical = serde_json::to_vec(&serde_json::to_value(KeyMaterial { args, op })?)?;

    let mut hasher = Sha256::new();
    hasher.update(&canonical);
    Ok(hex::encode(hasher.finalize()))
}
