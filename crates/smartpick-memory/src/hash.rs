use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Domain key mixed into every content hash so hashes from other schemes
/// never alias ours.
const HASH_DOMAIN: &[u8] = b"smartpick/content-hash/v1";

/// Deterministic 63-bit hash of a `(metadata, page)` pair.
///
/// This is the upsert key of the persistent store: each pair maps to at most
/// one stored row. The value is pure and stable across processes and
/// platforms, since it only depends on the UTF-8 bytes of `metadata` and the
/// little-endian encoding of `page`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentHash(i64);

impl ContentHash {
    /// Hash a `(metadata, page)` pair.
    ///
    /// The canonical serialization is length-prefixed, so `("ab", 1)` and
    /// `("a", …)` can never produce the same byte stream.
    pub fn of(metadata: &str, page: i64) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(HASH_DOMAIN);
        hasher.update((metadata.len() as u64).to_le_bytes());
        hasher.update(metadata.as_bytes());
        hasher.update(page.to_le_bytes());
        let digest = hasher.finalize();

        let mut head = [0u8; 8];
        head.copy_from_slice(&digest[..8]);
        Self((u64::from_be_bytes(head) & (i64::MAX as u64)) as i64)
    }

    /// Wrap a raw stored value.
    pub fn from_raw(raw: i64) -> Self {
        Self(raw)
    }

    /// The raw `int64` column value (always non-negative).
    pub fn value(self) -> i64 {
        self.0
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_is_deterministic() {
        assert_eq!(ContentHash::of("video-17", 3), ContentHash::of("video-17", 3));
    }

    #[test]
    fn test_hash_known_values() {
        assert_eq!(ContentHash::of("x", 0).value(), 3403567703957555604);
        assert_eq!(ContentHash::of("video-17", 3).value(), 6912633557347539768);
        assert_eq!(ContentHash::of("y", 0).to_string(), "542b2890ca9f6d7f");
    }

    #[test]
    fn test_hash_fits_in_63_bits() {
        for page in 0..64 {
            let h = ContentHash::of("any source", page);
            assert!(h.value() >= 0);
        }
    }

    #[test]
    fn test_page_changes_hash() {
        assert_ne!(ContentHash::of("x", 0), ContentHash::of("x", 1));
    }

    #[test]
    fn test_length_prefix_separates_fields() {
        assert_ne!(ContentHash::of("x1", 0), ContentHash::of("x", 1));
        assert_ne!(ContentHash::of("", 0), ContentHash::of("\0", 0));
    }

    #[test]
    fn test_raw_round_trip() {
        let h = ContentHash::of("리뷰", 2);
        assert_eq!(ContentHash::from_raw(h.value()), h);
        assert_eq!(h.to_string().len(), 16);
    }
}
