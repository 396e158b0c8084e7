//! Encryption at rest for stored secrets.
//!
//! Secrets are sealed with AES-256-GCM and stored as `base64(nonce ‖ ciphertext)`.
//! The cipher key is the SHA-256 digest of the configured key material. If the
//! key material cannot be used, secrets fall back to plain base64, which is
//! reversible and only hides them from casual inspection.

use aes_gcm::{
    aead::{Aead, AeadCore, KeyInit, OsRng},
    Aes256Gcm, Key, Nonce,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use rand::RngCore;
use sha2::{Digest, Sha256};

use crate::error::EncryptionError;

const NONCE_LEN: usize = 12;
const KEY_MATERIAL_LEN: usize = 32;

enum Mode {
    Sealed(Box<Aes256Gcm>),
    Encoded,
}

pub struct SecretCipher {
    mode: Mode,
}

impl SecretCipher {
    /// Builds an AES-256-GCM cipher from base64 key material.
    pub fn from_key_material(material: &str) -> Result<Self, EncryptionError> {
        let raw = STANDARD
            .decode(material.trim())
            .map_err(|e| EncryptionError::InvalidKey(e.to_string()))?;
        if raw.is_empty() {
            return Err(EncryptionError::InvalidKey("key material is empty".into()));
        }

        let digest = Sha256::digest(&raw);
        let key = Key::<Aes256Gcm>::from_slice(digest.as_slice());
        Ok(Self {
            mode: Mode::Sealed(Box::new(Aes256Gcm::new(key))),
        })
    }

    /// Reversible base64 encoding, used when no usable key is available.
    pub fn encoded_only() -> Self {
        Self {
            mode: Mode::Encoded,
        }
    }

    /// True when secrets are merely encoded, not encrypted.
    pub fn is_degraded(&self) -> bool {
        matches!(self.mode, Mode::Encoded)
    }

    pub fn encrypt(&self, plaintext: &str) -> Result<String, EncryptionError> {
        match &self.mode {
            Mode::Sealed(cipher) => {
                let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
                let ciphertext = cipher
                    .encrypt(&nonce, plaintext.as_bytes())
                    .map_err(|_| EncryptionError::EncryptionFailed)?;

                let mut sealed = Vec::with_capacity(NONCE_LEN + ciphertext.len());
                sealed.extend_from_slice(nonce.as_slice());
                sealed.extend_from_slice(&ciphertext);
                Ok(STANDARD.encode(sealed))
            }
            Mode::Encoded => Ok(STANDARD.encode(plaintext.as_bytes())),
        }
    }

    pub fn decrypt(&self, encoded: &str) -> Result<String, EncryptionError> {
        let raw = STANDARD
            .decode(encoded.trim())
            .map_err(|_| EncryptionError::Malformed)?;

        let plaintext = match &self.mode {
            Mode::Sealed(cipher) => {
                if raw.len() <= NONCE_LEN {
                    return Err(EncryptionError::Malformed);
                }
                let (nonce, ciphertext) = raw.split_at(NONCE_LEN);
                cipher
                    .decrypt(Nonce::from_slice(nonce), ciphertext)
                    .map_err(|_| EncryptionError::DecryptionFailed)?
            }
            Mode::Encoded => raw,
        };

        String::from_utf8(plaintext).map_err(|_| EncryptionError::Malformed)
    }
}

impl std::fmt::Debug for SecretCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretCipher")
            .field("degraded", &self.is_degraded())
            .finish()
    }
}

/// Fresh random key material, base64 encoded.
pub fn generate_key_material() -> String {
    let mut bytes = [0u8; KEY_MATERIAL_LEN];
    rand::thread_rng().fill_bytes(&mut bytes);
    STANDARD.encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip() {
        let cipher = SecretCipher::from_key_material(&generate_key_material()).unwrap();
        let sealed = cipher.encrypt("bearer-token-value").unwrap();
        assert_ne!(sealed, "bearer-token-value");
        assert_eq!(cipher.decrypt(&sealed).unwrap(), "bearer-token-value");
    }

    #[test]
    fn test_nonce_differs_per_encryption() {
        let cipher = SecretCipher::from_key_material(&generate_key_material()).unwrap();
        assert_ne!(cipher.encrypt("x").unwrap(), cipher.encrypt("x").unwrap());
    }

    #[test]
    fn test_wrong_key_fails() {
        let a = SecretCipher::from_key_material(&generate_key_material()).unwrap();
        let b = SecretCipher::from_key_material(&generate_key_material()).unwrap();
        let sealed = a.encrypt("secret").unwrap();
        assert_eq!(b.decrypt(&sealed), Err(EncryptionError::DecryptionFailed));
    }

    #[test]
    fn test_invalid_key_material() {
        assert!(matches!(
            SecretCipher::from_key_material("not base64 !!"),
            Err(EncryptionError::InvalidKey(_))
        ));
        assert!(SecretCipher::from_key_material("").is_err());
    }

    #[test]
    fn test_encoded_fallback_is_reversible() {
        let cipher = SecretCipher::encoded_only();
        assert!(cipher.is_degraded());
        let encoded = cipher.encrypt("plain").unwrap();
        assert_eq!(encoded, "cGxhaW4=");
        assert_eq!(cipher.decrypt(&encoded).unwrap(), "plain");
    }

    #[test]
    fn test_malformed_ciphertext() {
        let cipher = SecretCipher::from_key_material(&generate_key_material()).unwrap();
        assert_eq!(cipher.decrypt("%%%"), Err(EncryptionError::Malformed));
        assert_eq!(cipher.decrypt("AAAA"), Err(EncryptionError::Malformed));
    }
}
