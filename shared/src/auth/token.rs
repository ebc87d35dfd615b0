//! # Opaque Bearer Tokens
//!
//! Minting and digesting of the random secrets used for sessions, setup and
//! reset tokens, and node credentials.
//!
//! ## Anatomy of a Token
//!
//! - **Plaintext**: 32 cryptographically random bytes, base64url-encoded
//!   (no padding). This is what the caller receives and presents back.
//! - **Digest**: lowercase hex SHA-256 of the plaintext. This is the only
//!   form that ever touches the database.
//!
//! A fast hash is deliberate here: the plaintext already carries 256 bits of
//! entropy, so there is nothing to brute-force and no need for a slow KDF.
//! Passwords, which are low-entropy, go through Argon2id instead
//! (see [`super::password`]).

use chrono::{DateTime, Duration, Utc};
use rand::RngCore;
use sha2::{Digest, Sha256};

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;

/// Session bearer lifetime: 7 days.
pub fn session_ttl() -> Duration {
    Duration::days(7)
}

/// Setup / reset token lifetime: 1 hour.
pub fn reset_token_ttl() -> Duration {
    Duration::hours(1)
}

/// A freshly minted bearer token.
///
/// The `plaintext` is handed to the caller exactly once; the `hash` is what
/// gets persisted. Never log or store the plaintext.
#[derive(Debug, Clone)]
pub struct MintedToken {
    /// base64url-encoded 32-byte random secret
    pub plaintext: String,
    /// Lowercase hex SHA-256 of `plaintext`
    pub hash: String,
    /// When the token stops being usable
    pub expires_at: DateTime<Utc>,
}

impl MintedToken {
    /// Mints a new token with the given time-to-live.
    pub fn new(ttl: Duration) -> Self {
        let (plaintext, hash) = mint_secret();

        Self {
            plaintext,
            hash,
            expires_at: Utc::now() + ttl,
        }
    }

    /// Mints a session bearer (7 day TTL).
    pub fn session() -> Self {
        Self::new(session_ttl())
    }

    /// Mints a setup / reset token (1 hour TTL).
    pub fn reset() -> Self {
        Self::new(reset_token_ttl())
    }
}

/// Mints a raw `(plaintext, hash)` pair without an expiry.
///
/// Used directly for node credentials, which live until the node is deleted
/// or re-keyed.
pub fn mint_secret() -> (String, String) {
    let mut secret = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut secret);

    let plaintext = URL_SAFE_NO_PAD.encode(secret);
    let hash = hash_token(&plaintext);

    (plaintext, hash)
}

/// Digests a presented bearer for storage or lookup.
///
/// The comparison against a stored digest is a plain byte-equality on the
/// hex strings; since the inputs are hashes of high-entropy secrets, timing
/// is not a concern.
pub fn hash_token(plaintext: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(plaintext.as_bytes());
    hex::encode(hasher.finalize())
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_token_deterministic() {
        let token = "test_token_123";
        assert_eq!(hash_token(token), hash_token(token));
    }

    #[test]
    fn test_hash_token_different_inputs() {
        assert_ne!(hash_token("token1"), hash_token("token2"));
    }

    #[test]
    fn test_hash_token_is_hex_sha256() {
        let hash = hash_token("anything");
        assert_eq!(hash.len(), 64);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn test_minted_tokens_are_unique() {
        let a = MintedToken::session();
        let b = MintedToken::session();
        assert_ne!(a.plaintext, b.plaintext);
        assert_ne!(a.hash, b.hash);
    }

    #[test]
    fn test_minted_token_hash_matches_plaintext() {
        let token = MintedToken::reset();
        assert_eq!(token.hash, hash_token(&token.plaintext));
    }

    #[test]
    fn test_minted_token_plaintext_is_base64url() {
        let token = MintedToken::session();
        // 32 bytes base64url without padding: 43 chars
        assert_eq!(token.plaintext.len(), 43);
        assert!(token
            .plaintext
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }

    #[test]
    fn test_ttl_values() {
        let session = MintedToken::session();
        let reset = MintedToken::reset();
        let now = Utc::now();

        assert!(session.expires_at > now + Duration::days(6));
        assert!(reset.expires_at > now + Duration::minutes(59));
        assert!(reset.expires_at < now + Duration::hours(2));
    }

    #[test]
    fn test_single_byte_mutation_changes_hash() {
        let token = MintedToken::new(Duration::hours(1));
        let mut mutated = token.plaintext.clone().into_bytes();
        mutated[0] = if mutated[0] == b'A' { b'B' } else { b'A' };
        let mutated = String::from_utf8(mutated).unwrap();

        assert_ne!(hash_token(&mutated), token.hash);
    }
}
