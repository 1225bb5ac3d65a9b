//! Content-addressing for the resume cache (spec §3, ResumeCache entry).

use sha2::{Digest, Sha256};

pub fn content_hash(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    let digest = hasher.finalize();
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_bytes_hash_the_same() {
        assert_eq!(content_hash(b"resume bytes"), content_hash(b"resume bytes"));
    }

    #[test]
    fn different_bytes_hash_differently() {
        assert_ne!(content_hash(b"a"), content_hash(b"b"));
    }

    #[test]
    fn hash_is_sixty_four_hex_characters() {
        let hash = content_hash(b"anything");
        assert_eq!(hash.len(), 64);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
