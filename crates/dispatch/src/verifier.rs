//! HMAC-SHA256 signature verification keyed by event source.
//!
//! A sender holding the shared secret for a source computes
//! `sha256=<hex(HMAC-SHA256(secret, canonical_json(payload)))>` and attaches it
//! to the event. [`SignatureVerifier::verify`] recomputes the digest and
//! compares it in constant time.
//!
//! ## Canonical form
//!
//! The payload is serialised as compact JSON with object keys sorted
//! lexicographically (by UTF-8 bytes) at every nesting level, so the digest
//! does not depend on the order in which a transport happened to parse the
//! keys. Senders must sort too; insertion order is not preserved.
//!
//! Numbers keep the spelling `serde_json` gives them after parsing: integers
//! print as integers, but any number written with a fraction or exponent is a
//! float and prints with one, so `1.0` stays `1.0` and `1e3` becomes
//! `1000.0`. A sender using JavaScript's `JSON.stringify` writes both as
//! integers (`1`, `1000`) and must send integral values as integers to
//! produce a matching digest. Strings use `serde_json` escaping: only `"`,
//! `\` and control characters are escaped, and non-ASCII is written raw.

use std::collections::{BTreeMap, HashMap};

use hmac::{Hmac, Mac};
use parking_lot::RwLock;
use serde::Serialize;
use serde_json::Value;
use sha2::Sha256;
use subtle::ConstantTimeEq;
use thiserror::Error;
use tracing::debug;

use crate::{EventSource, Payload, WebhookEvent};

type HmacSha256 = Hmac<Sha256>;

/// Prefix of every signature value.
pub const SIGNATURE_PREFIX: &str = "sha256=";

/// Errors raised while computing a signature.
///
/// Never surfaced by [`SignatureVerifier::verify`], which folds every failure
/// into `false`.
#[derive(Debug, Error)]
pub enum SignatureError {
    /// The payload could not be serialised to canonical JSON.
    #[error("payload serialisation failed: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The secret was rejected as an HMAC key.
    #[error("secret is not a valid HMAC key")]
    InvalidKey,
}

// ---------------------------------------------------------------------------
// Canonical serialisation
// ---------------------------------------------------------------------------

#[derive(Serialize)]
#[serde(untagged)]
enum Canonical<'a> {
    Object(BTreeMap<&'a str, Canonical<'a>>),
    Array(Vec<Canonical<'a>>),
    Leaf(&'a Value),
}

impl<'a> Canonical<'a> {
    fn from_value(value: &'a Value) -> Self {
        match value {
            Value::Object(map) => Self::Object(
                map.iter()
                    .map(|(k, v)| (k.as_str(), Self::from_value(v)))
                    .collect(),
            ),
            Value::Array(items) => Self::Array(items.iter().map(Self::from_value).collect()),
            leaf => Self::Leaf(leaf),
        }
    }
}

/// Serialises `payload` as compact JSON with recursively sorted keys.
pub fn canonical_json(payload: &Payload) -> Result<String, serde_json::Error> {
    let root: BTreeMap<&str, Canonical<'_>> = payload
        .iter()
        .map(|(k, v)| (k.as_str(), Canonical::from_value(v)))
        .collect();
    serde_json::to_string(&root)
}

/// Computes the `sha256=<hex>` signature a sender holding `secret` attaches
/// to `payload`.
pub fn sign_payload(secret: &str, payload: &Payload) -> Result<String, SignatureError> {
    let message = canonical_json(payload)?;
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| SignatureError::InvalidKey)?;
    mac.update(message.as_bytes());
    let digest = mac.finalize().into_bytes();
    Ok(format!("{SIGNATURE_PREFIX}{}", hex::encode(digest)))
}

// ---------------------------------------------------------------------------
// Verifier
// ---------------------------------------------------------------------------

/// Holds the shared secret for each event source and checks event signatures.
///
/// Read-mostly: secrets are registered at startup and looked up on every
/// dispatch, so the map sits behind an `RwLock`.
#[derive(Default)]
pub struct SignatureVerifier {
    secrets: RwLock<HashMap<EventSource, String>>,
}

impl SignatureVerifier {
    /// Creates a verifier with no secrets; every event fails verification.
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds `secret` to `source`, replacing any earlier binding.
    pub fn register_secret(&self, source: EventSource, secret: impl Into<String>) {
        let replaced = self.secrets.write().insert(source.clone(), secret.into());
        debug!(source = %source, replaced = replaced.is_some(), "Registered webhook secret");
    }

    /// Returns `true` if a secret is bound to `source`.
    pub fn has_secret(&self, source: &EventSource) -> bool {
        self.secrets.read().contains_key(source)
    }

    /// Returns `true` only if `event.signature` matches the digest computed
    /// with the secret registered for `event.source`.
    ///
    /// Fails closed: an unknown source, a payload that cannot be serialised,
    /// and a mismatch all return `false`.
    pub fn verify(&self, event: &WebhookEvent) -> bool {
        let expected = {
            let secrets = self.secrets.read();
            let Some(secret) = secrets.get(&event.source) else {
                debug!(source = %event.source, "No secret registered for source");
                return false;
            };
            match sign_payload(secret, &event.payload) {
                Ok(signature) => signature,
                Err(e) => {
                    debug!(error = %e, "Could not compute expected signature");
                    return false;
                }
            }
        };

        expected.as_bytes().ct_eq(event.signature.as_bytes()).into()
    }
}

impl std::fmt::Debug for SignatureVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Secrets are never printed; only the sources they are bound to.
        let sources: Vec<String> = self.secrets.read().keys().map(|s| s.to_string()).collect();
        f.debug_struct("SignatureVerifier")
            .field("sources", &sources)
            .finish()
    }
}
