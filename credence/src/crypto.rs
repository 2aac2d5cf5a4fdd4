//! Authenticated encryption for secrets at rest.
//!
//! [`CipherVault`] wraps AES-256-GCM with a 16-byte random nonce per call and
//! a 16-byte authentication tag. Ciphertext, nonce, and tag are carried as
//! separate hex strings ([`SealedSecret`]) so they can be stored in distinct
//! columns. Plaintext only ever exists on the stack inside a single
//! encrypt/decrypt call.

use aes_gcm::{
    aead::{consts::U16, Aead, KeyInit},
    aes::Aes256,
    AesGcm, Nonce,
};
use rand::{thread_rng, Rng};
use serde::{Deserialize, Serialize};

use crate::errors::{Error, Result};

/// AES-256-GCM with a 16-byte nonce, matching the stored `iv` column width.
type Aes256Gcm16 = AesGcm<Aes256, U16>;

const NONCE_LEN: usize = 16;
const TAG_LEN: usize = 16;

/// An encrypted value plus the nonce and authentication tag needed to open
/// it, all hex-encoded for storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SealedSecret {
    pub ciphertext: String,
    pub iv: String,
    pub auth_tag: String,
}

/// Symmetric authenticated-encryption component protecting secrets at rest.
///
/// Construction fails fast on bad key material; encryption and decryption
/// never fail for configuration reasons afterwards.
pub struct CipherVault {
    cipher: Aes256Gcm16,
}

impl std::fmt::Debug for CipherVault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CipherVault").finish_non_exhaustive()
    }
}

impl CipherVault {
    /// Build a vault from a 64-character hex string (32 bytes decoded).
    ///
    /// A missing or wrong-length key is a startup precondition violation and
    /// surfaces as [`Error::Configuration`], never as a per-call error.
    pub fn new(hex_key: &str) -> Result<Self> {
        let key_bytes = hex::decode(hex_key).map_err(|_| Error::Configuration {
            message: "encryption key must be a hex string".to_string(),
        })?;

        if key_bytes.len() != 32 {
            return Err(Error::Configuration {
                message: format!(
                    "encryption key must be 32 bytes (64 hex characters), got {} bytes",
                    key_bytes.len()
                ),
            });
        }

        let cipher = Aes256Gcm16::new_from_slice(&key_bytes).map_err(|_| Error::Configuration {
            message: "failed to initialize cipher from key".to_string(),
        })?;

        Ok(Self { cipher })
    }

    /// Encrypt a plaintext under a fresh random nonce.
    ///
    /// Encrypting the same plaintext twice yields different output; the nonce
    /// must never repeat under one key, and randomizing it per call is what
    /// guarantees that.
    pub fn encrypt(&self, plaintext: &str) -> Result<SealedSecret> {
        let mut nonce_bytes = [0u8; NONCE_LEN];
        thread_rng().fill(&mut nonce_bytes);
        let nonce = Nonce::<U16>::from_slice(&nonce_bytes);

        // The aead API appends the tag to the ciphertext; split it back out
        // so the two can live in separate columns.
        let mut sealed = self
            .cipher
            .encrypt(nonce, plaintext.as_bytes())
            .map_err(|_| Error::Internal {
                operation: "encrypt secret".to_string(),
            })?;
        let auth_tag = sealed.split_off(sealed.len() - TAG_LEN);

        Ok(SealedSecret {
            ciphertext: hex::encode(sealed),
            iv: hex::encode(nonce_bytes),
            auth_tag: hex::encode(auth_tag),
        })
    }

    /// Verify the authentication tag and release the plaintext.
    ///
    /// Any tampering with ciphertext, nonce, or tag (or use of a different
    /// key) fails with [`Error::DecryptionFailed`] before any plaintext byte
    /// is produced.
    pub fn decrypt(&self, sealed: &SealedSecret) -> Result<String> {
        let nonce_bytes = hex::decode(&sealed.iv).map_err(|_| Error::DecryptionFailed)?;
        let mut combined = hex::decode(&sealed.ciphertext).map_err(|_| Error::DecryptionFailed)?;
        let auth_tag = hex::decode(&sealed.auth_tag).map_err(|_| Error::DecryptionFailed)?;

        if nonce_bytes.len() != NONCE_LEN || auth_tag.len() != TAG_LEN {
            return Err(Error::DecryptionFailed);
        }

        let nonce = Nonce::<U16>::from_slice(&nonce_bytes);
        combined.extend_from_slice(&auth_tag);

        let plaintext = self
            .cipher
            .decrypt(nonce, combined.as_slice())
            .map_err(|_| Error::DecryptionFailed)?;

        String::from_utf8(plaintext).map_err(|_| Error::DecryptionFailed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_KEY: &str = "000102030405060708090a0b0c0d0e0f101112131415161718191a1b1c1d1e1f";

    #[test]
    fn test_encrypt_decrypt_roundtrip() {
        let vault = CipherVault::new(TEST_KEY).unwrap();

        let sealed = vault.encrypt("AIzaSyExample-key-material").unwrap();
        assert_eq!(sealed.iv.len(), NONCE_LEN * 2);
        assert_eq!(sealed.auth_tag.len(), TAG_LEN * 2);

        let plaintext = vault.decrypt(&sealed).unwrap();
        assert_eq!(plaintext, "AIzaSyExample-key-material");
    }

    #[test]
    fn test_encryption_produces_different_ciphertexts() {
        let vault = CipherVault::new(TEST_KEY).unwrap();

        let first = vault.encrypt("same plaintext").unwrap();
        let second = vault.encrypt("same plaintext").unwrap();

        // Random nonce per call: same input, different output
        assert_ne!(first.ciphertext, second.ciphertext);
        assert_ne!(first.iv, second.iv);

        assert_eq!(vault.decrypt(&first).unwrap(), "same plaintext");
        assert_eq!(vault.decrypt(&second).unwrap(), "same plaintext");
    }

    #[test]
    fn test_tampered_tag_fails() {
        let vault = CipherVault::new(TEST_KEY).unwrap();
        let mut sealed = vault.encrypt("secret").unwrap();

        // Flip one bit in the tag
        let mut tag = hex::decode(&sealed.auth_tag).unwrap();
        tag[0] ^= 0x01;
        sealed.auth_tag = hex::encode(tag);

        let err = vault.decrypt(&sealed).unwrap_err();
        assert!(matches!(err, Error::DecryptionFailed));
    }

    #[test]
    fn test_tampered_ciphertext_fails() {
        let vault = CipherVault::new(TEST_KEY).unwrap();
        let mut sealed = vault.encrypt("secret").unwrap();

        let mut ciphertext = hex::decode(&sealed.ciphertext).unwrap();
        ciphertext[0] ^= 0x01;
        sealed.ciphertext = hex::encode(ciphertext);

        assert!(matches!(
            vault.decrypt(&sealed).unwrap_err(),
            Error::DecryptionFailed
        ));
    }

    #[test]
    fn test_wrong_key_fails() {
        let vault = CipherVault::new(TEST_KEY).unwrap();
        let sealed = vault.encrypt("secret").unwrap();

        let other_key = "ffffffffffffffffffffffffffffffffffffffffffffffffffffffffffffffff";
        let other = CipherVault::new(other_key).unwrap();

        assert!(matches!(
            other.decrypt(&sealed).unwrap_err(),
            Error::DecryptionFailed
        ));
    }

    #[test]
    fn test_key_must_be_32_bytes() {
        let err = CipherVault::new("0011223344").unwrap_err();
        assert!(matches!(err, Error::Configuration { .. }));

        let err = CipherVault::new("not hex at all").unwrap_err();
        assert!(matches!(err, Error::Configuration { .. }));
    }
}
