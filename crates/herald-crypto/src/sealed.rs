//! At-rest sealing of per-subject signing secrets.
//!
//! Secrets are encrypted with ChaCha20-Poly1305 under a single server key.
//! Every seal draws a fresh random 12-byte nonce; ciphertext and nonce are
//! stored hex-encoded next to each other.

use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use rand::RngCore;
use rand::rngs::OsRng;
use zeroize::{Zeroize, Zeroizing};

use crate::error::CryptoError;

/// Nonce size for ChaCha20-Poly1305.
pub const NONCE_SIZE: usize = 12;

/// Key size for ChaCha20-Poly1305.
pub const KEY_SIZE: usize = 32;

/// Hex-encoded ciphertext (including the 16-byte tag) and its nonce.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SealedSecret {
    pub ciphertext: String,
    pub nonce: String,
}

/// Seals and opens secrets with a server-wide key.
#[derive(Clone)]
pub struct SecretSealer {
    cipher: ChaCha20Poly1305,
}

impl std::fmt::Debug for SecretSealer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SecretSealer { .. }")
    }
}

impl SecretSealer {
    /// Build a sealer from a 64-character hex key.
    pub fn from_hex_key(hex_key: &str) -> Result<Self, CryptoError> {
        let mut key_bytes = hex::decode(hex_key.trim())?;
        if key_bytes.len() != KEY_SIZE {
            let actual = key_bytes.len();
            key_bytes.zeroize();
            return Err(CryptoError::InvalidKeyLength {
                expected: KEY_SIZE,
                actual,
            });
        }
        let cipher = ChaCha20Poly1305::new(Key::from_slice(&key_bytes));
        key_bytes.zeroize();
        Ok(Self { cipher })
    }

    /// Encrypt a secret for storage.
    pub fn seal(&self, plaintext: &str) -> Result<SealedSecret, CryptoError> {
        let mut nonce_bytes = [0u8; NONCE_SIZE];
        OsRng.fill_bytes(&mut nonce_bytes);

        let ciphertext = self
            .cipher
            .encrypt(Nonce::from_slice(&nonce_bytes), plaintext.as_bytes())
            .map_err(|e| CryptoError::EncryptionFailed(e.to_string()))?;

        Ok(SealedSecret {
            ciphertext: hex::encode(ciphertext),
            nonce: hex::encode(nonce_bytes),
        })
    }

    /// Decrypt a stored secret.
    pub fn open(&self, sealed: &SealedSecret) -> Result<Zeroizing<String>, CryptoError> {
        let nonce_bytes = hex::decode(&sealed.nonce)?;
        if nonce_bytes.len() != NONCE_SIZE {
            return Err(CryptoError::InvalidNonceLength {
                expected: NONCE_SIZE,
                actual: nonce_bytes.len(),
            });
        }
        let ciphertext = hex::decode(&sealed.ciphertext)?;
        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(&nonce_bytes), ciphertext.as_slice())
            .map_err(|e| CryptoError::DecryptionFailed(e.to_string()))?;
        String::from_utf8(plaintext)
            .map(Zeroizing::new)
            .map_err(|e| CryptoError::DecryptionFailed(e.to_string()))
    }
}

#[cfg(test)]
#[allow(clippy::panic, clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::random::random_hex;

    fn sealer() -> SecretSealer {
        SecretSealer::from_hex_key(&random_hex(KEY_SIZE)).unwrap()
    }

    #[test]
    fn sealed_secret_opens_to_original() {
        let s = sealer();
        let sealed = s.seal("per-subject-secret").unwrap();
        assert_ne!(sealed.ciphertext, hex::encode("per-subject-secret"));
        assert_eq!(s.open(&sealed).unwrap().as_str(), "per-subject-secret");
    }

    #[test]
    fn each_seal_uses_a_fresh_nonce() {
        let s = sealer();
        let a = s.seal("x").unwrap();
        let b = s.seal("x").unwrap();
        assert_ne!(a.nonce, b.nonce);
        assert_ne!(a.ciphertext, b.ciphertext);
    }

    #[test]
    fn wrong_key_fails_to_open() {
        let sealed = sealer().seal("secret").unwrap();
        let err = sealer().open(&sealed).unwrap_err();
        assert!(matches!(err, CryptoError::DecryptionFailed(_)));
    }

    #[test]
    fn tampered_ciphertext_fails_to_open() {
        let s = sealer();
        let mut sealed = s.seal("secret").unwrap();
        let mut raw = hex::decode(&sealed.ciphertext).unwrap();
        raw[0] ^= 0xff;
        sealed.ciphertext = hex::encode(raw);
        assert!(s.open(&sealed).is_err());
    }

    #[test]
    fn short_key_is_rejected() {
        let err = SecretSealer::from_hex_key("abcd").unwrap_err();
        assert!(matches!(
            err,
            CryptoError::InvalidKeyLength {
                expected: 32,
                actual: 2
            }
        ));
    }

    #[test]
    fn non_hex_key_is_rejected() {
        assert!(matches!(
            SecretSealer::from_hex_key("zz").unwrap_err(),
            CryptoError::Encoding(_)
        ));
    }

    #[test]
    fn bad_nonce_length_is_rejected() {
        let s = sealer();
        let mut sealed = s.seal("secret").unwrap();
        sealed.nonce = "00".to_string();
        assert!(matches!(
            s.open(&sealed).unwrap_err(),
            CryptoError::InvalidNonceLength { .. }
        ));
    }
}
