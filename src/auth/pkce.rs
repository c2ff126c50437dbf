// PKCE verifier/challenge/state generation
//
// The verifier is 96 random bytes base64url-encoded without padding
// (exactly 128 chars); the challenge is the SHA-256 of the verifier text,
// encoded the same way (exactly 43 chars).

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use ring::rand::{SecureRandom, SystemRandom};
use sha2::{Digest, Sha256};

/// One-shot PKCE material for a single authorization attempt.
#[derive(Debug, Clone)]
pub struct PkceCodes {
    pub verifier: String,
    pub challenge: String,
    /// CSRF token echoed back through the redirect.
    pub state: String,
}

/// Generate fresh verifier, challenge, and CSRF state.
pub fn generate() -> PkceCodes {
    let verifier = generate_code_verifier();
    let challenge = generate_code_challenge(&verifier);
    let state = generate_state();

    PkceCodes {
        verifier,
        challenge,
        state,
    }
}

fn generate_code_verifier() -> String {
    let rng = SystemRandom::new();
    let mut bytes = [0u8; 96];
    rng.fill(&mut bytes)
        .expect("Failed to generate random bytes");
    URL_SAFE_NO_PAD.encode(bytes)
}

fn generate_code_challenge(verifier: &str) -> String {
    let hash = Sha256::digest(verifier.as_bytes());
    URL_SAFE_NO_PAD.encode(hash)
}

fn generate_state() -> String {
    let rng = SystemRandom::new();
    let mut bytes = [0u8; 32];
    rng.fill(&mut bytes)
        .expect("Failed to generate random bytes");
    hex::encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn is_base64url(s: &str) -> bool {
        s.chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    }

    #[test]
    fn test_verifier_format() {
        let codes = generate();
        assert_eq!(codes.verifier.len(), 128);
        assert!(is_base64url(&codes.verifier));
    }

    #[test]
    fn test_challenge_format() {
        let codes = generate();
        assert_eq!(codes.challenge.len(), 43);
        assert!(is_base64url(&codes.challenge));
    }

    #[test]
    fn test_challenge_is_sha256_of_verifier() {
        let codes = generate();
        let expected = URL_SAFE_NO_PAD.encode(Sha256::digest(codes.verifier.as_bytes()));
        assert_eq!(codes.challenge, expected);
    }

    #[test]
    fn test_successive_generations_never_collide() {
        let a = generate();
        let b = generate();
        assert_ne!(a.verifier, b.verifier);
        assert_ne!(a.challenge, b.challenge);
        assert_ne!(a.state, b.state);
    }
}
