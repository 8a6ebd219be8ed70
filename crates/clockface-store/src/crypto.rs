//! Descriptor encryption at rest.
//!
//! Descriptor vectors are biometric data, so they are stored as
//! AES-256-GCM blobs (`nonce ‖ ciphertext`) rather than plaintext floats.
//! The key lives in a file owned by the daemon and is created on first run.

use aes_gcm::aead::Aead;
use aes_gcm::{Aes256Gcm, Key, KeyInit, Nonce};
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha256};
use std::io::Write;
use std::path::Path;
use thiserror::Error;

const KEY_LEN: usize = 32;
const NONCE_LEN: usize = 12;

#[derive(Error, Debug)]
pub enum CryptoError {
    #[error("key file {path}: {source}")]
    KeyFile {
        path: String,
        source: std::io::Error,
    },
    #[error("key file holds {0} bytes, expected {KEY_LEN}")]
    KeyLength(usize),
    #[error("encryption failed")]
    Encrypt,
    #[error("ciphertext rejected (wrong key or tampered blob)")]
    Decrypt,
    #[error("decrypted payload has invalid length {0}")]
    PayloadLength(usize),
}

/// AES-256-GCM cipher for descriptor vectors, with a key fingerprint for
/// startup logs.
pub struct DescriptorCipher {
    cipher: Aes256Gcm,
    fingerprint: String,
}

impl DescriptorCipher {
    /// Load the key from `path`, generating and persisting a fresh one if
    /// the file does not exist yet.
    pub fn from_key_file(path: &Path) -> Result<Self, CryptoError> {
        let keyfile = |source| CryptoError::KeyFile {
            path: path.display().to_string(),
            source,
        };

        let key = if path.exists() {
            let bytes = std::fs::read(path).map_err(keyfile)?;
            if bytes.len() != KEY_LEN {
                return Err(CryptoError::KeyLength(bytes.len()));
            }
            let mut key = [0u8; KEY_LEN];
            key.copy_from_slice(&bytes);
            key
        } else {
            let mut key = [0u8; KEY_LEN];
            OsRng.fill_bytes(&mut key);
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).map_err(keyfile)?;
            }
            let mut file = std::fs::File::create(path).map_err(keyfile)?;
            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                let perms = std::fs::Permissions::from_mode(0o600);
                file.set_permissions(perms).map_err(keyfile)?;
            }
            file.write_all(&key).map_err(keyfile)?;
            tracing::info!(path = %path.display(), "generated new descriptor encryption key");
            key
        };

        Ok(Self::from_key(key))
    }

    pub fn from_key(key: [u8; KEY_LEN]) -> Self {
        let digest = Sha256::digest(key);
        let fingerprint = digest[..8]
            .iter()
            .map(|b| format!("{b:02x}"))
            .collect::<String>();
        Self {
            cipher: Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key)),
            fingerprint,
        }
    }

    /// Short SHA-256 fingerprint of the key, safe to log.
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    /// Encrypt a descriptor vector into `nonce ‖ ciphertext`.
    pub fn encrypt_vector(&self, values: &[f32]) -> Result<Vec<u8>, CryptoError> {
        let mut nonce = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce);

        let plaintext: Vec<u8> = values.iter().flat_map(|v| v.to_le_bytes()).collect();
        let ciphertext = self
            .cipher
            .encrypt(Nonce::from_slice(&nonce), plaintext.as_slice())
            .map_err(|_| CryptoError::Encrypt)?;

        let mut blob = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        blob.extend_from_slice(&nonce);
        blob.extend_from_slice(&ciphertext);
        Ok(blob)
    }

    /// Decrypt a `nonce ‖ ciphertext` blob back into the component vector.
    /// GCM authentication makes tampering and wrong-key use detectable.
    pub fn decrypt_vector(&self, blob: &[u8]) -> Result<Vec<f32>, CryptoError> {
        if blob.len() < NONCE_LEN {
            return Err(CryptoError::Decrypt);
        }
        let (nonce, ciphertext) = blob.split_at(NONCE_LEN);
        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| CryptoError::Decrypt)?;

        if plaintext.len() % 4 != 0 {
            return Err(CryptoError::PayloadLength(plaintext.len()));
        }
        Ok(plaintext
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cipher() -> DescriptorCipher {
        DescriptorCipher::from_key([7u8; KEY_LEN])
    }

    #[test]
    fn encrypt_decrypt_roundtrip() {
        let values: Vec<f32> = (0..128).map(|i| i as f32 * 0.01).collect();
        let blob = cipher().encrypt_vector(&values).unwrap();
        let decrypted = cipher().decrypt_vector(&blob).unwrap();
        assert_eq!(values, decrypted);
    }

    #[test]
    fn nonce_varies_between_encryptions() {
        let values = vec![0.5f32; 128];
        let a = cipher().encrypt_vector(&values).unwrap();
        let b = cipher().encrypt_vector(&values).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn tampered_blob_is_rejected() {
        let values = vec![0.5f32; 128];
        let mut blob = cipher().encrypt_vector(&values).unwrap();
        let last = blob.len() - 1;
        blob[last] ^= 0x01;
        assert!(matches!(
            cipher().decrypt_vector(&blob),
            Err(CryptoError::Decrypt)
        ));
    }

    #[test]
    fn wrong_key_is_rejected() {
        let values = vec![0.5f32; 128];
        let blob = cipher().encrypt_vector(&values).unwrap();
        let other = DescriptorCipher::from_key([8u8; KEY_LEN]);
        assert!(matches!(
            other.decrypt_vector(&blob),
            Err(CryptoError::Decrypt)
        ));
    }

    #[test]
    fn truncated_blob_is_rejected() {
        assert!(matches!(
            cipher().decrypt_vector(&[0u8; 4]),
            Err(CryptoError::Decrypt)
        ));
    }

    #[test]
    fn fingerprint_is_stable_and_short() {
        let a = DescriptorCipher::from_key([7u8; KEY_LEN]);
        let b = DescriptorCipher::from_key([7u8; KEY_LEN]);
        assert_eq!(a.fingerprint(), b.fingerprint());
        assert_eq!(a.fingerprint().len(), 16);
    }

    #[test]
    fn key_file_created_then_reloaded() {
        let path = std::env::temp_dir().join(format!(
            "clockface-crypto-test-{}.key",
            std::process::id()
        ));
        let _ = std::fs::remove_file(&path);

        let created = DescriptorCipher::from_key_file(&path).unwrap();
        let reloaded = DescriptorCipher::from_key_file(&path).unwrap();
        assert_eq!(created.fingerprint(), reloaded.fingerprint());

        let blob = created.encrypt_vector(&[1.0, 2.0, 3.0]).unwrap();
        assert_eq!(reloaded.decrypt_vector(&blob).unwrap(), vec![1.0, 2.0, 3.0]);

        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn short_key_file_is_rejected() {
        let path = std::env::temp_dir().join(format!(
            "clockface-crypto-short-{}.key",
            std::process::id()
        ));
        std::fs::write(&path, [0u8; 5]).unwrap();
        assert!(matches!(
            DescriptorCipher::from_key_file(&path),
            Err(CryptoError::KeyLength(5))
        ));
        std::fs::remove_file(&path).unwrap();
    }
}
