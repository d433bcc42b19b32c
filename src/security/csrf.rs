//! CSRF token generation and comparison.

use rand::RngCore;
use subtle::ConstantTimeEq;

/// Request headers a CSRF token is read from, in order.
pub const TOKEN_HEADERS: [&str; 2] = ["x-csrf-token", "x-xsrf-token"];

/// 32 random bytes, hex encoded.
pub fn generate_token() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Constant-time comparison; different lengths never match.
pub fn tokens_match(expected: &str, submitted: &str) -> bool {
    !expected.is_empty() && bool::from(expected.as_bytes().ct_eq(submitted.as_bytes()))
}
