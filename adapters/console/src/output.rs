//! Parsers for the console's human-oriented stdout.

use regex::Regex;
use serde_json::Value;

use esm_interface::LedgerError;

fn capture(pattern: &str, stdout: &str) -> Option<String> {
    Regex::new(pattern)
        .expect("static pattern")
        .captures(stdout)
        .map(|c| c[1].to_string())
}

/// `newkey` reports the hash of the generated key.
pub(crate) fn key_hash(stdout: &str) -> Result<String, LedgerError> {
    capture(r"key hash: ([0-9A-Fa-f]{64})", stdout)
        .ok_or_else(|| LedgerError::Console(format!("no key hash in console output: {stdout}")))
}

/// `exportpub` reports the public key it imported into its keyring.
pub(crate) fn imported_key(stdout: &str) -> Result<String, LedgerError> {
    capture(r"imported key: ([0-9A-Fa-f]{64})", stdout)
        .ok_or_else(|| LedgerError::Console(format!("no imported key in console output: {stdout}")))
}

/// `sign` reports the detached ed25519 signature.
pub(crate) fn signature(stdout: &str) -> Result<String, LedgerError> {
    capture(r"got signature: ([0-9A-Fa-f]{128})", stdout)
        .ok_or_else(|| LedgerError::Console(format!("no signature in console output: {stdout}")))
}

/// `getaccountstate` prints a Rust debug representation on failure.
pub(crate) fn state_error(stdout: &str) -> LedgerError {
    let msg = capture(r#"ErrorMessage \{ msg: "(.*)" \}"#, stdout)
        .unwrap_or_else(|| stdout.trim().to_string());
    LedgerError::Console(msg)
}

/// `getstats` reports how far the node lags behind the masterchain; the
/// sign is flipped so a positive value means the node runs ahead.
pub(crate) fn time_diff(stdout: &str) -> Result<i64, LedgerError> {
    let stats: Value = serde_json::from_str(stdout)
        .map_err(|e| LedgerError::Console(format!("unparseable getstats output: {e}")))?;
    stats
        .get("timediff")
        .and_then(Value::as_i64)
        .map(|diff| -diff)
        .ok_or_else(|| LedgerError::Console("no timediff in getstats output".into()))
}

/// Account integers arrive as numbers or decimal strings depending on the
/// console version.
pub(crate) fn account_u64(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}
