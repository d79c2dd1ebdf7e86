//! Canonicalizer and hash (§4.1): a deterministic fingerprint of a request
//! payload, so identical requests replay against the same recorded entry
//! regardless of which language or JSON library produced them.

use serde_json::Value;
use sha2::{Digest, Sha256};
use std::fmt::Write as _;

/// Canonicalizes `value` into JSON with object keys sorted lexicographically
/// at every level, no insignificant whitespace, and numbers/strings in
/// `serde_json`'s own minimal round-trip form.
///
/// `serde_json::Value::Object` is a `BTreeMap` under the hood, so simply
/// re-serializing it already sorts keys; we don't need a hand-rolled
/// walker for that part. We do need to recurse so nested objects are sorted
/// too, which falls out for free since canonicalizing only requires stable
/// serialization, and `serde_json` serializes a `BTreeMap`-backed object in
/// key order at every level already.
pub fn canonicalize(value: &Value) -> String {
    serde_json::to_string(value).expect("serde_json::Value always serializes")
}

/// `sha256(canonicalize(payload))`, hex-encoded, lowercase, 64 characters.
pub fn hash_value(value: &Value) -> String {
    let canonical = canonicalize(value);
    let digest = Sha256::digest(canonical.as_bytes());
    let mut out = String::with_capacity(64);
    for byte in digest {
        write!(out, "{byte:02x}").expect("writing to a String never fails");
    }
    out
}

/// Returns the producer-supplied hash if present, otherwise computes one.
///
/// Per §4.1/§9: consumers must honor a hash the producer already attached
/// rather than re-deriving it, so two ecosystems that disagree on
/// canonicalization bytes can still interoperate as long as they agree on
/// what the hash is *of*.
pub fn hash_or_reuse(existing: Option<&str>, payload: &Value) -> String {
    match existing {
        Some(h) => h.to_owned(),
        None => hash_value(payload),
    }
}

/// An envelope's own routing/timing metadata, as opposed to the request
/// payload it carries. `REPLAY_HASH_NORMALIZE` (§6) controls whether these
/// are folded into the hash.
#[derive(Debug, Clone, Copy)]
pub struct AmbientFields<'a> {
    pub stream_id: &'a str,
    pub trace_id: &'a str,
    pub timestamp: &'a str,
}

/// Computes the hash of a request payload, honoring `normalize` (§6,
/// `REPLAY_HASH_NORMALIZE`). Normalized (the default, `true`) hashes only
/// `request` itself, so the same logical request matches across separate
/// record/playback runs regardless of which envelope carried it each time.
/// Unnormalized (`false`) folds the envelope's own `streamId`/`traceId`/
/// `timestamp` into the hashed value, so only a byte-for-byte repeat of
/// the very same envelope metadata hashes the same.
pub fn hash_request(request: &Value, normalize: bool, ambient: AmbientFields<'_>) -> String {
    if normalize {
        hash_value(request)
    } else {
        hash_value(&serde_json::json!({
            "request": request,
            "streamId": ambient.stream_id,
            "traceId": ambient.trace_id,
            "timestamp": ambient.timestamp,
        }))
    }
}

/// `hash_request`, but honoring a producer-supplied hash first, the same
/// way `hash_or_reuse` does for `hash_value`.
pub fn hash_or_reuse_request(existing: Option<&str>, request: &Value, normalize: bool, ambient: AmbientFields<'_>) -> String {
    match existing {
        Some(h) => h.to_owned(),
        None => hash_request(request, normalize, ambient),
    }
}
