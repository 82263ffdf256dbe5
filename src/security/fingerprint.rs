//! Secret hashing and generation.
//!
//! Raw secrets never leave the token store: rate-limit buckets and log lines
//! use the short fingerprint, the store's lookup index uses the full digest.

use rand::RngCore;
use sha2::{Digest, Sha256};

/// Hex characters kept from the digest when fingerprinting.
const FINGERPRINT_LEN: usize = 12;

/// SHA-256 hash a secret (full hex digest).
pub fn hash_secret(secret: &str) -> String {
    hex::encode(Sha256::digest(secret.as_bytes()))
}

/// Short, non-reversible identifier for a secret.
pub fn fingerprint(secret: &str) -> String {
    let mut digest = hash_secret(secret);
    digest.truncate(FINGERPRINT_LEN);
    digest
}

/// Constant-time equality comparison for secret strings.
pub fn constant_time_eq(a: &str, b: &str) -> bool {
    use subtle::ConstantTimeEq;
    a.as_bytes().ct_eq(b.as_bytes()).into()
}

/// 128 bits of randomness, hex encoded.
pub fn generate_secret() -> String {
    random_hex::<16>()
}

pub fn generate_token_id() -> String {
    format!("token_{}", random_hex::<8>())
}

fn random_hex<const N: usize>() -> String {
    let mut buf = [0u8; N];
    rand::rng().fill_bytes(&mut buf);
    hex::encode(buf)
}
