// digest.rs — Content fingerprints for fragment change detection.
//
// A fragment's digest decides whether its embedding can be carried forward
// or must be regenerated. Digests are SHA-256, lowercase hex, so they match
// what the inventory producer writes into `code_digest`.

use sha2::{Digest, Sha256};

/// Fingerprint arbitrary bytes as a 64-character lowercase hex string.
pub fn digest_bytes(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}

/// Fingerprint a fragment's source text.
///
/// Deterministic: identical text always yields the identical digest, and
/// any single-character change yields a different one.
pub fn digest(text: &str) -> String {
    digest_bytes(text.as_bytes())
}
