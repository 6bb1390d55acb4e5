//! Chain-of-custody hashing — SHA-256 over recovered blobs.

use sha2::{Digest, Sha256};

/// Blobs up to this size are hashed in one `update`; larger blobs are
/// streamed in chunks of the same size to keep the working set flat when a
/// multi-megabyte sample is hashed straight off the source map.
pub const HASH_CHUNK_SIZE: usize = 1024 * 1024;

/// Lowercase 64-character SHA-256 hex digest of `data`.
pub fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    if data.len() <= HASH_CHUNK_SIZE {
        hasher.update(data);
    } else {
        for chunk in data.chunks(HASH_CHUNK_SIZE) {
            hasher.update(chunk);
        }
    }
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digest_matches_known_vector() {
        // SHA-256("abc")
        assert_eq!(
            sha256_hex(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn empty_input_digest() {
        assert_eq!(
            sha256_hex(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn chunked_and_single_shot_agree() {
        let big = vec![0x5Au8; HASH_CHUNK_SIZE * 3 + 17];
        let mut hasher = Sha256::new();
        hasher.update(&big);
        assert_eq!(sha256_hex(&big), hex::encode(hasher.finalize()));
    }
}
