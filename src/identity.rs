//! Deterministic container naming derived from the username.
//!
//! Every user owns at most one container; its name is recomputed from the
//! username whenever needed and never stored.

use sha2::{Digest, Sha256};

/// Fixed prefix shared by all user containers.
const CONTAINER_PREFIX: &str = "code-server";

/// Number of hex characters of the username digest kept in the name.
const HASH_LEN: usize = 16;

/// Returns the container name for a user: `code-server-<user>-<hash>`,
/// where `<hash>` is the first 16 hex characters of SHA-256 of the username.
pub fn container_identity(username: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(username.as_bytes());
    let digest = hasher.finalize();
    format!(
        "{}-{}-{}",
        CONTAINER_PREFIX,
        username,
        hex_encode(&digest[..HASH_LEN / 2])
    )
}

/// Encodes bytes as lowercase hex string.
fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}
