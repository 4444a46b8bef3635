//! Content-hash idempotency layer.
//!
//! Every mutation is fingerprinted from a normalized serialization of its
//! semantically significant fields plus a scoping key (owner, and the UTC
//! calendar day for day-scoped kinds). Two near-duplicate submissions of
//! the same logical write collapse to the same fingerprint, which the
//! remote gateway treats as a natural unique key. That turns "retry on
//! uncertain failure" into a safe operation.

use crate::{EntityKind, Fingerprint, Timestamp};
use serde_json::Value;

const MS_PER_DAY: u64 = 86_400_000;

/// Length of the hex fingerprint. The digest does not need to be
/// cryptographically strong, only deterministic and collision-resistant
/// across semantically different writes.
const FINGERPRINT_LEN: usize = 32;

/// Field separator in the canonical string. Unit separator cannot appear
/// in normalized text, so fields cannot bleed into each other.
const SEP: char = '\u{1f}';

/// Compute the idempotency fingerprint for a mutation payload.
///
/// Deterministic: the same (owner, kind, significant fields, day bucket)
/// always yields the same fingerprint, regardless of field order, casing,
/// or whitespace in the submitted payload.
pub fn fingerprint(
    owner: &str,
    entity: EntityKind,
    payload: &Value,
    created_at: Timestamp,
) -> Fingerprint {
    let mut canonical = String::new();
    canonical.push_str(entity.as_str());

    for field in entity.significant_fields() {
        canonical.push(SEP);
        canonical.push_str(field);
        canonical.push('=');
        canonical.push_str(&value_text(payload.get(*field)));
    }

    canonical.push(SEP);
    canonical.push_str("owner=");
    canonical.push_str(&normalize_text(owner));

    if entity.day_scoped() {
        canonical.push(SEP);
        canonical.push_str("day=");
        canonical.push_str(&day_key(created_at));
    }

    let digest = blake3::hash(canonical.as_bytes());
    digest.to_hex()[..FINGERPRINT_LEN].to_string()
}

/// Normalize free text: trim, collapse internal whitespace runs to a
/// single space, lowercase.
pub fn normalize_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_space = false;
    for ch in text.trim().chars() {
        if ch.is_whitespace() {
            in_space = true;
            continue;
        }
        if in_space && !out.is_empty() {
            out.push(' ');
        }
        in_space = false;
        for lower in ch.to_lowercase() {
            out.push(lower);
        }
    }
    out
}

/// UTC calendar day bucket for a millisecond timestamp.
///
/// Epoch-day numbering is exactly the UTC calendar day, without needing
/// date arithmetic.
pub fn day_key(timestamp: Timestamp) -> String {
    format!("d{}", timestamp / MS_PER_DAY)
}

/// Canonical text for one significant field value.
///
/// A missing field normalizes to the empty marker rather than erroring:
/// "absent" is a legitimate semantic state and must fingerprint stably.
fn value_text(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => normalize_text(s),
        Some(Value::Bool(b)) => b.to_string(),
        Some(Value::Number(n)) => n.to_string(),
        // Compound values serialize with sorted keys (serde_json's default
        // map is ordered), so this stays deterministic.
        Some(other) => normalize_text(&other.to_string()),
    }
}
