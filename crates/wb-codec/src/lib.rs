//! wb-codec
//!
//! Deterministic content hashing and keyed-signature primitives shared by the
//! ledger and the location validator. Everything here is a pure function of
//! its inputs; the signing key is always passed in explicitly.

use anyhow::{Context, Result};
use hmac::{Hmac, Mac};
use rand::RngCore;
use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

/// Prefix carried by every transaction id.
pub const TRANSACTION_ID_PREFIX: &str = "0x";

/// Separator used when joining signed fields.
const FIELD_SEPARATOR: &str = ",";

// ---------------------------------------------------------------------------
// Canonical JSON + content hash
// ---------------------------------------------------------------------------

/// Canonicalize by sorting object keys recursively and emitting compact JSON.
pub fn canonical_json(v: &Value) -> String {
    // Serializing a `Value` cannot fail: keys are strings and numbers are finite.
    sort_keys(v).to_string()
}

/// Serialize any value into canonical JSON.
pub fn canonical_json_of<T: Serialize>(v: &T) -> Result<String> {
    let raw = serde_json::to_value(v).context("serialize for canonical json failed")?;
    Ok(canonical_json(&raw))
}

fn sort_keys(v: &Value) -> Value {
    match v {
        Value::Object(map) => {
            let mut keys: Vec<_> = map.keys().cloned().collect();
            keys.sort();
            let mut new = serde_json::Map::new();
            for k in keys {
                new.insert(k.clone(), sort_keys(&map[&k]));
            }
            Value::Object(new)
        }
        Value::Array(arr) => Value::Array(arr.iter().map(sort_keys).collect()),
        _ => v.clone(),
    }
}

/// SHA-256 of raw bytes, lowercase hex.
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// Content digest of a JSON value. Key insertion order never matters.
pub fn content_hash(v: &Value) -> String {
    sha256_hex(canonical_json(v).as_bytes())
}

/// Content digest of any serializable value.
pub fn content_hash_of<T: Serialize>(v: &T) -> Result<String> {
    Ok(sha256_hex(canonical_json_of(v)?.as_bytes()))
}

// ---------------------------------------------------------------------------
// Transaction ids
// ---------------------------------------------------------------------------

/// Random 256-bit identifier, hex-encoded, `0x`-prefixed (66 chars total).
pub fn new_transaction_id() -> String {
    let mut bytes = [0u8; 32];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    format!("{TRANSACTION_ID_PREFIX}{}", hex::encode(bytes))
}

/// True if `s` has the shape produced by [`new_transaction_id`].
pub fn is_transaction_id(s: &str) -> bool {
    match s.strip_prefix(TRANSACTION_ID_PREFIX) {
        Some(rest) => rest.len() == 64 && rest.bytes().all(|b| b.is_ascii_hexdigit()),
        None => false,
    }
}

// ---------------------------------------------------------------------------
// Keyed signatures
// ---------------------------------------------------------------------------

/// Shared HMAC key used to sign GPS fixes.
///
/// Built once at startup and handed to whoever signs or verifies.
/// **The key bytes are redacted in `Debug` output.**
#[derive(Clone)]
pub struct SigningKey {
    bytes: Vec<u8>,
}

impl SigningKey {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            bytes: bytes.into(),
        }
    }

    pub fn from_secret_str(secret: &str) -> Self {
        Self::new(secret.as_bytes().to_vec())
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    fn mac(&self) -> HmacSha256 {
        // HMAC accepts keys of any length, so this never fails.
        HmacSha256::new_from_slice(&self.bytes)
            .unwrap_or_else(|_| unreachable!("hmac accepts any key length"))
    }
}

impl std::fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningKey")
            .field("bytes", &"<REDACTED>")
            .finish()
    }
}

/// HMAC-SHA256 over `fields` joined with `,`. Lowercase hex.
pub fn sign(key: &SigningKey, fields: &[&str]) -> String {
    let mut mac = key.mac();
    mac.update(fields.join(FIELD_SEPARATOR).as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

/// Recompute the signature over `fields` and compare in constant time.
///
/// Malformed hex or a wrong-length signature is simply a mismatch.
pub fn verify(key: &SigningKey, fields: &[&str], signature: &str) -> bool {
    let provided = match hex::decode(signature) {
        Ok(b) => b,
        Err(_) => return false,
    };
    let mut mac = key.mac();
    mac.update(fields.join(FIELD_SEPARATOR).as_bytes());
    let expected = mac.finalize().into_bytes();
    if provided.len() != expected.len() {
        return false;
    }
    expected.as_slice().ct_eq(provided.as_slice()).into()
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
