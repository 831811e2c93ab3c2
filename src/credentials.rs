//! Password digests and bearer tokens.
//!
//! Passwords are stored as `pbkdf2-sha256$<iterations>$<salt>$<digest>`
//! (standard base64, no padding). Tokens are random and only their SHA-256
//! is kept server-side.

use base64::engine::general_purpose::{STANDARD_NO_PAD, URL_SAFE_NO_PAD};
use base64::Engine;
use pbkdf2::pbkdf2_hmac;
use rand::RngCore;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

const SCHEME: &str = "pbkdf2-sha256";
const SALT_LENGTH: usize = 16;
const DIGEST_LENGTH: usize = 32;

#[cfg(not(test))]
pub const PBKDF2_ITERATIONS: u32 = 600_000;
// Keep the suite fast; the format records the count so digests stay verifiable.
#[cfg(test)]
pub const PBKDF2_ITERATIONS: u32 = 1_000;

fn derive(password: &str, salt: &[u8], iterations: u32) -> [u8; DIGEST_LENGTH] {
    let mut out = [0u8; DIGEST_LENGTH];
    pbkdf2_hmac::<Sha256>(password.as_bytes(), salt, iterations, &mut out);
    out
}

/// Produce a salted digest for storage.
pub fn hash_password(password: &str) -> String {
    let mut salt = [0u8; SALT_LENGTH];
    rand::thread_rng().fill_bytes(&mut salt);
    let digest = derive(password, &salt, PBKDF2_ITERATIONS);
    format!(
        "{SCHEME}${PBKDF2_ITERATIONS}${}${}",
        STANDARD_NO_PAD.encode(salt),
        STANDARD_NO_PAD.encode(digest)
    )
}

/// Check a password against a stored digest in constant time.
///
/// Malformed digests never verify.
pub fn verify_password(password: &str, stored: &str) -> bool {
    let mut parts = stored.split('$');
    let (Some(SCHEME), Some(iterations), Some(salt), Some(digest), None) =
        (parts.next(), parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return false;
    };
    let Ok(iterations) = iterations.parse::<u32>() else {
        return false;
    };
    let (Ok(salt), Ok(expected)) = (STANDARD_NO_PAD.decode(salt), STANDARD_NO_PAD.decode(digest)) else {
        return false;
    };
    if iterations == 0 || expected.len() != DIGEST_LENGTH {
        return false;
    }
    let actual = derive(password, &salt, iterations);
    actual.as_slice().ct_eq(expected.as_slice()).into()
}

/// Compare a presented secret with the configured one in constant time.
pub fn secrets_match(presented: &str, expected: &str) -> bool {
    presented.as_bytes().ct_eq(expected.as_bytes()).into()
}

/// Hash a bearer token string using SHA-256.
pub fn hash_token(token: &str) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hasher.finalize().into()
}

/// Generate a random bearer token (URL-safe base64, 32 bytes of entropy).
pub fn generate_token() -> String {
    let bytes: [u8; 32] = rand::random();
    URL_SAFE_NO_PAD.encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn correct_password_verifies() {
        let stored = hash_password("s3cret-pass");
        assert!(stored.starts_with("pbkdf2-sha256$1000$"));
        assert!(verify_password("s3cret-pass", &stored));
    }

    #[test]
    fn wrong_password_fails() {
        let stored = hash_password("s3cret-pass");
        assert!(!verify_password("s3cret-Pass", &stored));
    }

    #[test]
    fn same_password_gets_fresh_salt() {
        assert_ne!(hash_password("repeat"), hash_password("repeat"));
    }

    #[test]
    fn malformed_digest_never_verifies() {
        assert!(!verify_password("x", ""));
        assert!(!verify_password("x", "plain-text"));
        assert!(!verify_password("x", "pbkdf2-sha256$abc$AAAA$AAAA"));
        assert!(!verify_password("x", "md5$1000$AAAA$AAAA"));
    }

    #[test]
    fn generate_token_is_unique() {
        let t1 = generate_token();
        let t2 = generate_token();
        assert_ne!(t1, t2);
        assert!(!t1.is_empty());
    }

    #[test]
    fn hash_token_is_deterministic() {
        assert_eq!(hash_token("test"), hash_token("test"));
        assert_ne!(hash_token("token-a"), hash_token("token-b"));
    }

    #[test]
    fn secrets_match_only_on_exact_value() {
        assert!(secrets_match("ops-secret", "ops-secret"));
        assert!(!secrets_match("ops-secre", "ops-secret"));
        assert!(!secrets_match("", "ops-secret"));
    }
}
