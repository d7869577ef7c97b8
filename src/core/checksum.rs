//! Content checksums for change events

use sha2::{Digest, Sha256};

/// Hex SHA-256 of `content`
pub fn content_checksum(content: &[u8]) -> String {
    hex::encode(Sha256::digest(content))
}
