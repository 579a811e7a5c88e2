//! Content change detection.
//!
//! A fingerprint is the lowercase hex MD5 of the response body. It is only a
//! change signal, not an integrity check.

/// Fingerprint a response body.
pub fn fingerprint(body: &[u8]) -> String {
    format!("{:x}", md5::compute(body))
}

/// Decide whether a new fingerprint marks a change.
///
/// A baseline check never reports a change.
pub fn has_changed(previous: &str, current: &str, is_baseline: bool) -> bool {
    !is_baseline && previous != current
}
