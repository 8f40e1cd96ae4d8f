use sha1::{Digest, Sha1};

/// Content address of an uploaded image: lowercase hex SHA-1 of its bytes,
/// the same digest `study.json` is keyed by
pub fn content_hash(bytes: &[u8]) -> String {
    let mut hasher = Sha1::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_hash_is_stable() {
        assert_eq!(content_hash(b""), "da39a3ee5e6b4b0d3255bfef95601890afd80709");
        assert_eq!(content_hash(b"streetview"), content_hash(b"streetview"));
        assert_ne!(content_hash(b"berlin"), content_hash(b"hamburg"));
    }

    #[test]
    fn test_content_hash_matches_dataset_keys() {
        assert_eq!(content_hash(b"abc"), "a9993e364706816aba3e25717850c26c9cd0d89d");
    }
}
