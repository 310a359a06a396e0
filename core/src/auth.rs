use std::sync::LazyLock;

use argon2::Argon2;
use password_hash::rand_core::OsRng;
use password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use rand::Rng;
use sha2::{Digest, Sha256};

/// Prefix carried by every session token so it can be recognised in headers and logs.
pub const SESSION_TOKEN_PREFIX: &str = "crs_ss_";

/// Generate a session token. Returns `(full_token, sha256_hash)`.
/// Format: `crs_ss_` + 32 random bytes hex-encoded.
pub fn generate_session_token() -> (String, String) {
    let raw = random_hex(32);
    let full_token = format!("{SESSION_TOKEN_PREFIX}{raw}");
    let hash = hash_token(&full_token);
    (full_token, hash)
}

/// SHA-256 hex digest of a token string.
pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

/// First 8 chars after the prefix, for log correlation without leaking the token.
pub fn token_prefix(full_token: &str) -> String {
    full_token
        .strip_prefix(SESSION_TOKEN_PREFIX)
        .map(|rest| rest.chars().take(8).collect())
        .unwrap_or_default()
}

/// Hash a password with Argon2id and a random salt.
pub fn hash_password(password: &str) -> Result<String, String> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();
    argon2
        .hash_password(password.as_bytes(), &salt)
        .map(|h| h.to_string())
        .map_err(|e| format!("Failed to hash password: {e}"))
}

/// Verify a password against an Argon2id hash.
pub fn verify_password(password: &str, hash: &str) -> Result<bool, String> {
    let parsed = PasswordHash::new(hash).map_err(|e| format!("Invalid password hash: {e}"))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok())
}

/// Hash no account can match; checked against when the username is unknown.
static DUMMY_PASSWORD_HASH: LazyLock<String> =
    LazyLock::new(|| hash_password(&random_hex(32)).unwrap_or_default());

/// Spend the same Argon2 work as `verify_password` for a username that does
/// not exist, so the two cases take equally long.
pub fn verify_against_dummy_hash(password: &str) {
    let _ = verify_password(password, &DUMMY_PASSWORD_HASH);
}

/// Generate `n` random bytes and return as hex string.
fn random_hex(n: usize) -> String {
    let bytes: Vec<u8> = (0..n).map(|_| rand::thread_rng().r#gen::<u8>()).collect();
    hex::encode(&bytes)
}
