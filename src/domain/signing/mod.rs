//! Per-gateway signature schemes over canonical parameter maps.
//!
//! Every gateway authenticates requests and callbacks with a tag computed
//! over the same canonical representation: drop the signature fields and
//! empty values, sort the remaining keys lexicographically, and join them as
//! `key=value` pairs with `&`. The schemes differ only in how the tag is
//! produced from that string.
//!
//! Contracts shared by all implementations:
//! - `verify` returns `false` on malformed input and never panics; a
//!   missing or empty token is an automatic `false`.
//! - `sign` is deterministic for identical maps (the map is ordered).

mod rsa_scheme;
mod sorted_digest;
mod xml;

pub use rsa_scheme::RsaScheme;
pub use sorted_digest::{DigestCasing, SortedDigestScheme};
pub use xml::{document_to_map, map_to_document, XmlError};

use std::collections::BTreeMap;

use thiserror::Error;

/// Canonical parameter set: ordered, string-keyed, string-valued.
pub type ParamMap = BTreeMap<String, String>;

/// Parameter names that never participate in signing.
pub const SIGNATURE_FIELDS: [&str; 2] = ["sign", "sign_type"];

/// Errors constructing a scheme or producing a tag.
#[derive(Debug, Error)]
pub enum SigningError {
    #[error("Invalid key material: {0}")]
    InvalidKey(String),

    #[error("Signing failed: {0}")]
    Signing(String),
}

/// Capability interface implemented once per signing variant.
pub trait SignatureScheme: Send + Sync {
    /// Produce the authentication tag for a parameter map.
    fn sign(&self, params: &ParamMap) -> Result<String, SigningError>;

    /// Check a tag against a parameter map.
    ///
    /// Must return `false` (never error) on any malformed input.
    fn verify(&self, params: &ParamMap, token: &str) -> bool;
}

/// Build the canonical string signed by every scheme.
///
/// Signature fields and empty values are excluded; values are trimmed the
/// way the gateways trim them before signing on their side.
pub fn canonical_string(params: &ParamMap) -> String {
    params
        .iter()
        .filter(|(key, value)| {
            !SIGNATURE_FIELDS.contains(&key.as_str()) && !value.trim().is_empty()
        })
        .map(|(key, value)| format!("{}={}", key, value.trim()))
        .collect::<Vec<_>>()
        .join("&")
}

/// Constant-time equality for signature material.
pub(crate) fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    use subtle::ConstantTimeEq;

    if a.len() != b.len() {
        return false;
    }
    a.ct_eq(b).into()
}
