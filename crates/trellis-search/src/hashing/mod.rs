//! SHA-256 helpers for cache keys and dedup fingerprints.
//!
//! Cache keys truncate the digest to 64 bits. The truncation is safe here:
//! a collision surfaces as a wrong cache entry that fails downstream
//! validation and is simply recomputed, and at practical cache sizes
//! (millions of keys) the birthday bound keeps the probability negligible.
//! Nothing cryptographic depends on these values.

use sha2::{Digest, Sha256};

/// Full 32-byte SHA-256 of a text, used as the embedding-cache key.
#[inline]
pub fn hash_text(text: &str) -> [u8; 32] {
    let digest = Sha256::digest(text.as_bytes());
    digest.into()
}

/// First 64 bits of the SHA-256 of `data`.
#[inline]
pub fn hash_to_u64(data: &[u8]) -> u64 {
    let digest = Sha256::digest(data);
    let bytes: [u8; 8] = digest[0..8]
        .try_into()
        .expect("SHA-256 always produces at least 8 bytes");
    u64::from_be_bytes(bytes)
}

/// Short hex fingerprint of a group identifier, embedded in cache keys so
/// that pattern invalidation can target a single group.
#[inline]
pub fn group_fingerprint(group_id: &str) -> String {
    let digest = Sha256::digest(group_id.as_bytes());
    let bytes: [u8; 4] = digest[0..4]
        .try_into()
        .expect("SHA-256 always produces at least 4 bytes");
    format!("{:08x}", u32::from_be_bytes(bytes))
}

/// 64-bit fingerprint of a fact's lowercased, whitespace-collapsed form,
/// used for exact-duplicate detection.
#[inline]
pub fn fact_fingerprint(fact: &str) -> u64 {
    hash_to_u64(normalize_fact(fact).as_bytes())
}

/// Lowercase and collapse internal whitespace.
pub fn normalize_fact(fact: &str) -> String {
    fact.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_hash_text_determinism() {
        let a = hash_text("who founded Acme?");
        let b = hash_text("who founded Acme?");
        assert_eq!(a, b);
        assert_eq!(a.len(), 32);
    }

    #[test]
    fn test_hash_text_sensitivity() {
        let inputs = [
            "who founded Acme?",
            "Who founded Acme?",
            "who founded Acme? ",
            "who founded acme?",
        ];
        let hashes: HashSet<_> = inputs.iter().map(|s| hash_text(s)).collect();
        assert_eq!(hashes.len(), inputs.len());
    }

    #[test]
    fn test_hash_to_u64_determinism() {
        assert_eq!(hash_to_u64(b"g1"), hash_to_u64(b"g1"));
        assert_ne!(hash_to_u64(b"g1"), hash_to_u64(b"g2"));
    }

    #[test]
    fn test_group_fingerprint_shape() {
        let fp = group_fingerprint("tenant-42");
        assert_eq!(fp.len(), 8);
        assert!(fp.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(fp, group_fingerprint("tenant-43"));
    }

    #[test]
    fn test_normalize_fact_collapses_whitespace_and_case() {
        assert_eq!(
            normalize_fact("  Alice \t works\n at  Acme "),
            "alice works at acme"
        );
    }

    #[test]
    fn test_fact_fingerprint_equates_normal_forms() {
        assert_eq!(
            fact_fingerprint("Alice works at Acme"),
            fact_fingerprint("alice   WORKS at\tacme")
        );
        assert_ne!(
            fact_fingerprint("Alice works at Acme"),
            fact_fingerprint("Alice works at Acme.")
        );
    }
}
