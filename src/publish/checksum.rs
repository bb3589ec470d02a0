//! Artifact checksum calculation.

use sha2::{Digest, Sha256};

/// Hex-encoded SHA-256 of `bytes` (64 characters).
///
/// Logged with every upload and returned in the receipt so a published
/// `.ipa` can be matched against the CI artifact it came from.
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_digest() {
        assert_eq!(
            sha256_hex(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert_eq!(sha256_hex(b"").len(), 64);
    }
}
