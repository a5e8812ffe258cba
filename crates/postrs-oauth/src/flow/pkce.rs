//! PKCE (Proof Key for Code Exchange) implementation for `OAuth2`.
//!
//! PKCE (RFC 7636) protects public clients, such as a desktop or mobile app
//! that cannot keep a secret, against authorization code interception.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::Rng;
use sha2::{Digest, Sha256};

/// PKCE code challenge and verifier pair.
#[derive(Debug, Clone)]
pub struct PkceChallenge {
    verifier: String,
    challenge: String,
}

impl PkceChallenge {
    /// Challenge method sent with the authorization request.
    pub const METHOD: &'static str = "S256";

    /// Generates a new PKCE challenge.
    ///
    /// Creates a random 43-character verifier and its SHA256 challenge.
    #[must_use]
    pub fn generate() -> Self {
        Self::from_verifier(random_urlsafe(32))
    }

    /// Builds the challenge for a known verifier.
    #[must_use]
    pub fn from_verifier(verifier: impl Into<String>) -> Self {
        let verifier = verifier.into();
        let challenge = Self::compute_challenge(&verifier);
        Self {
            verifier,
            challenge,
        }
    }

    /// Computes the code challenge from a verifier using SHA256.
    fn compute_challenge(verifier: &str) -> String {
        let hash = Sha256::digest(verifier.as_bytes());
        URL_SAFE_NO_PAD.encode(hash)
    }

    /// Returns the verifier.
    #[must_use]
    pub fn verifier(&self) -> &str {
        &self.verifier
    }

    /// Returns the challenge.
    #[must_use]
    pub fn challenge(&self) -> &str {
        &self.challenge
    }
}

/// Random bytes, base64url-encoded without padding.
pub(crate) fn random_urlsafe(len: usize) -> String {
    let mut rng = rand::thread_rng();
    let bytes: Vec<u8> = (0..len).map(|_| rng.r#gen::<u8>()).collect();
    URL_SAFE_NO_PAD.encode(bytes)
}
