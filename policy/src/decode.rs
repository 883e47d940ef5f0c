//! Loose decoding of values coming back from the node. Numeric fields arrive
//! as JSON numbers, decimal strings or `0x`-prefixed strings depending on the
//! query surface and node version.

use serde_json::Value;

pub(crate) fn loose_u64(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => {
            if let Some(hex) = s.strip_prefix("0x") {
                u64::from_str_radix(hex, 16).ok()
            } else {
                s.parse().ok()
            }
        }
        _ => None,
    }
}

/// Decode a field that is stored as a hex string without a prefix (validator
/// set weights), preferring an explicit decimal twin when present.
pub(crate) fn weight(entry: &Value, dec_field: &str, hex_field: &str) -> Option<u64> {
    if let Some(dec) = entry.get(dec_field).and_then(loose_u64) {
        return Some(dec);
    }
    match entry.get(hex_field)? {
        Value::String(s) => u64::from_str_radix(s.trim_start_matches("0x"), 16).ok(),
        Value::Number(n) => n.as_u64(),
        _ => None,
    }
}
