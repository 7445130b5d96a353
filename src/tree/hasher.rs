//! Content hashing for resolved nodes

/// Content hash of a node's raw bytes.
pub type ContentHash = [u8; 32];

/// Compute the content hash of raw artifact bytes.
pub fn compute_content_hash(raw: &[u8]) -> ContentHash {
    *blake3::hash(raw).as_bytes()
}

/// Short hex form used in logs and CLI output.
pub fn short_hex(hash: &ContentHash) -> String {
    hex::encode(&hash[..6])
}
