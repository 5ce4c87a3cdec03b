//! Error fingerprinting.
//!
//! A fingerprint is a stable short hash identifying a class of structurally
//! similar errors: two errors with the same type, endpoint, and message shape
//! (ignoring variable parts like ids, addresses, and counts) collapse to the
//! same pattern.

use regex::Regex;
use sha2::{Digest, Sha256};
use std::sync::LazyLock;

/// Substitution order matters: the hex pattern requires a `0x` prefix or 16+
/// contiguous hex digits, so UUID segments (4-12 chars) survive until the
/// UUID pass; the bare-integer pass runs last so it cannot corrupt either.
static HEX_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"0[xX][0-9a-fA-F]+|\b[0-9a-fA-F]{16,}\b").unwrap());

static UUID_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}")
        .unwrap()
});

static NUM_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\d+").unwrap());

/// Replace variable message parts with placeholders, in fixed order:
/// hex -> `<HEX>`, UUID -> `<UUID>`, bare integer -> `<NUM>`.
pub fn normalize_message(message: &str) -> String {
    let s = HEX_RE.replace_all(message, "<HEX>");
    let s = UUID_RE.replace_all(&s, "<UUID>");
    let s = NUM_RE.replace_all(&s, "<NUM>");
    s.into_owned()
}

/// Compute the 8-hex-char fingerprint of an error occurrence.
pub fn fingerprint(error_type: &str, endpoint: &str, message: &str) -> String {
    let signature = format!(
        "{}:{}:{}",
        error_type,
        endpoint,
        normalize_message(message)
    );
    let digest = Sha256::digest(signature.as_bytes());
    hex::encode(&digest[..4])
}
