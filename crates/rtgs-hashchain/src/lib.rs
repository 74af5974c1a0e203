//! RTGS Hashchain - Canonical serialization and SHA-256 chain links
//!
//! The audit log binds each record to its predecessor with
//! `curr = SHA256(canonical_payload || prev)`. Determinism of the canonical
//! form is the whole point: any key reordering or formatting drift silently
//! breaks every downstream link. The rules are:
//!
//! - Object keys sorted lexicographically at every depth
//! - Compact output, no pretty-printing
//! - Timestamps are RFC 3339 strings at payload-construction time, never
//!   epoch numbers
//! - Decimal values are normalized strings (no trailing zeros beyond the
//!   value's scale)

use serde_json::Value;
use sha2::{Digest, Sha256};
use std::fmt::Write;

/// The root of every chain: 64 ASCII zeros
pub const ZERO_HASH: &str = "0000000000000000000000000000000000000000000000000000000000000000";

/// Returns the all-zero chain root
pub fn zero() -> String {
    ZERO_HASH.to_string()
}

/// Serialize a JSON payload into its canonical byte-exact form.
///
/// Two semantically equal maps canonicalize identically regardless of
/// insertion order.
pub fn canonicalize(payload: &Value) -> String {
    let mut out = String::new();
    write_canonical(payload, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(b) => {
            out.push_str(if *b { "true" } else { "false" });
        }
        Value::Number(n) => {
            // serde_json renders integers without exponent and floats with
            // the shortest roundtrip form; both are stable per value.
            let _ = write!(out, "{}", n);
        }
        Value::String(s) => {
            // serde_json's escaping is deterministic.
            let _ = write!(out, "{}", Value::String(s.clone()));
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                let _ = write!(out, "{}", Value::String(key.clone()));
                out.push(':');
                write_canonical(&map[key], out);
            }
            out.push('}');
        }
    }
}

/// Compute the chain link for a canonical payload and the previous hash.
///
/// `link(c, p) = lower_hex(SHA256(UTF8(c || p)))`
pub fn link(canonical: &str, prev: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    hasher.update(prev.as_bytes());
    hex::encode(hasher.finalize())
}

/// Canonicalize and link in one step
pub fn link_payload(payload: &Value, prev: &str) -> String {
    link(&canonicalize(payload), prev)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_zero_is_64_ascii_zeros() {
        assert_eq!(zero().len(), 64);
        assert!(zero().chars().all(|c| c == '0'));
    }

    #[test]
    fn test_canonical_sorts_keys_at_every_depth() {
        let a = json!({"b": 1, "a": {"z": true, "m": [1, 2]}});
        let b = json!({"a": {"m": [1, 2], "z": true}, "b": 1});
        assert_eq!(canonicalize(&a), canonicalize(&b));
        assert_eq!(canonicalize(&a), r#"{"a":{"m":[1,2],"z":true},"b":1}"#);
    }

    #[test]
    fn test_canonical_is_compact() {
        let value = json!({"k": [1, 2, 3], "s": "x y"});
        let canonical = canonicalize(&value);
        assert!(!canonical.contains('\n'));
        assert!(!canonical.contains(": "));
    }

    #[test]
    fn test_canonical_escapes_strings() {
        let value = json!({"note": "line\n\"quoted\""});
        assert_eq!(canonicalize(&value), r#"{"note":"line\n\"quoted\""}"#);
    }

    #[test]
    fn test_link_is_stable_and_prev_sensitive() {
        let payload = json!({"action": "CLEARED", "amount": "500.00"});
        let canonical = canonicalize(&payload);

        let h1 = link(&canonical, ZERO_HASH);
        let h2 = link(&canonical, ZERO_HASH);
        assert_eq!(h1, h2);
        assert_eq!(h1.len(), 64);
        assert!(h1.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));

        let h3 = link(&canonical, &h1);
        assert_ne!(h1, h3);
    }

    #[test]
    fn test_link_known_vector() {
        // SHA256("" || ZERO_HASH) must stay pinned; a change here means the
        // canonical contract moved and every existing chain is unverifiable.
        let h = link("", ZERO_HASH);
        assert_eq!(
            h,
            "60e05bd1b195af2f94112fa7197a5c88289058840ce7c6df9693756bc6250f55"
        );
    }

    #[test]
    fn test_decimal_amounts_canonicalize_as_normalized_strings() {
        use rust_decimal_macros::dec;
        let amount = dec!(500.250);
        let payload = json!({"amount": amount.normalize().to_string()});
        assert_eq!(canonicalize(&payload), r#"{"amount":"500.25"}"#);
    }

    #[test]
    fn test_timestamps_are_rfc3339_strings() {
        let ts = chrono::DateTime::parse_from_rfc3339("2026-03-01T09:30:00.000001+00:00")
            .unwrap()
            .with_timezone(&chrono::Utc);
        let payload = json!({"at": ts.to_rfc3339()});
        assert!(canonicalize(&payload).contains("2026-03-01T09:30:00.000001+00:00"));
    }
}
