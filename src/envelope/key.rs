use std::fmt;

use aes::cipher::block_padding::Pkcs7;
use aes::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use aes::{Aes128, Aes256};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use rand_core::{OsRng, RngCore};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{MailboxError, Result};

pub const IV_LEN: usize = 16;

/// Symmetric secret both parties hold. Never transmitted.
#[derive(Clone, PartialEq, Eq)]
pub struct SharedSecret(Vec<u8>);

impl SharedSecret {
    /// Text secrets are taken as their UTF-8 bytes.
    pub fn from_text(secret: &str) -> Self {
        Self(secret.as_bytes().to_vec())
    }

    pub fn from_bytes(secret: impl Into<Vec<u8>>) -> Self {
        Self(secret.into())
    }

    pub fn from_base64(encoded: &str) -> Result<Self> {
        let bytes = BASE64
            .decode(encoded.trim())
            .map_err(|e| MailboxError::Config(format!("invalid base64 secret: {e}")))?;
        Ok(Self(bytes))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for SharedSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SharedSecret(<{} bytes>)", self.0.len())
    }
}

/// Deterministic mapping from secret bytes to an AES key. Both parties must agree on it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyDerivation {
    /// Pad with ASCII spaces to 16 bytes (up to 16), to 32 bytes (17 to 32),
    /// or truncate to 32 bytes.
    #[default]
    SpacePadded,
    /// SHA-256 of the secret, always AES-256.
    Sha256,
}

impl KeyDerivation {
    pub fn derive(self, secret: &SharedSecret) -> Result<CipherKey> {
        let bytes = secret.as_bytes();
        if bytes.is_empty() {
            return Err(MailboxError::Config("shared secret is empty".to_string()));
        }
        match self {
            KeyDerivation::SpacePadded if bytes.len() <= 16 => {
                let mut key = [b' '; 16];
                key[..bytes.len()].copy_from_slice(bytes);
                Ok(CipherKey::Aes128(key))
            }
            KeyDerivation::SpacePadded => {
                let mut key = [b' '; 32];
                let len = bytes.len().min(32);
                key[..len].copy_from_slice(&bytes[..len]);
                Ok(CipherKey::Aes256(key))
            }
            KeyDerivation::Sha256 => Ok(CipherKey::Aes256(Sha256::digest(bytes).into())),
        }
    }
}

#[derive(Clone, PartialEq, Eq)]
pub enum CipherKey {
    Aes128([u8; 16]),
    Aes256([u8; 32]),
}

impl CipherKey {
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            CipherKey::Aes128(key) => key.as_slice(),
            CipherKey::Aes256(key) => key.as_slice(),
        }
    }

    /// AES-CBC with PKCS#7 padding.
    pub fn encrypt(&self, iv: &[u8; IV_LEN], plaintext: &[u8]) -> Result<Vec<u8>> {
        let ciphertext = match self {
            CipherKey::Aes128(key) => cbc::Encryptor::<Aes128>::new_from_slices(key, iv)
                .map_err(|e| MailboxError::Config(e.to_string()))?
                .encrypt_padded_vec_mut::<Pkcs7>(plaintext),
            CipherKey::Aes256(key) => cbc::Encryptor::<Aes256>::new_from_slices(key, iv)
                .map_err(|e| MailboxError::Config(e.to_string()))?
                .encrypt_padded_vec_mut::<Pkcs7>(plaintext),
        };
        Ok(ciphertext)
    }

    pub fn decrypt(&self, iv: &[u8; IV_LEN], ciphertext: &[u8]) -> Result<Vec<u8>> {
        let plaintext = match self {
            CipherKey::Aes128(key) => cbc::Decryptor::<Aes128>::new_from_slices(key, iv)
                .map_err(|e| MailboxError::Config(e.to_string()))?
                .decrypt_padded_vec_mut::<Pkcs7>(ciphertext),
            CipherKey::Aes256(key) => cbc::Decryptor::<Aes256>::new_from_slices(key, iv)
                .map_err(|e| MailboxError::Config(e.to_string()))?
                .decrypt_padded_vec_mut::<Pkcs7>(ciphertext),
        };
        plaintext.map_err(|_| MailboxError::Decoding("invalid padding after decryption".to_string()))
    }
}

impl fmt::Debug for CipherKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CipherKey::Aes128(_) => f.write_str("CipherKey::Aes128(<redacted>)"),
            CipherKey::Aes256(_) => f.write_str("CipherKey::Aes256(<redacted>)"),
        }
    }
}

/// Where each envelope's IV comes from. The IV is always written into the
/// envelope, so receivers never need to know the sender's policy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum IvPolicy {
    #[default]
    Random,
    /// Identical plaintexts encrypt to identical ciphertext. Envelopes still
    /// differ when their sent-at timestamps do.
    Fixed([u8; IV_LEN]),
}

impl IvPolicy {
    /// Pads with spaces or truncates to 16 bytes.
    pub fn fixed_from_text(iv: &str) -> Self {
        let bytes = iv.as_bytes();
        let mut out = [b' '; IV_LEN];
        let len = bytes.len().min(IV_LEN);
        out[..len].copy_from_slice(&bytes[..len]);
        IvPolicy::Fixed(out)
    }

    pub fn next_iv(&self) -> [u8; IV_LEN] {
        match self {
            IvPolicy::Random => {
                let mut iv = [0u8; IV_LEN];
                OsRng.fill_bytes(&mut iv);
                iv
            }
            IvPolicy::Fixed(iv) => *iv,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn space_padding_picks_key_size() {
        let short = KeyDerivation::SpacePadded
            .derive(&SharedSecret::from_text("K"))
            .unwrap();
        assert_eq!(short.as_bytes(), b"K               ");

        let exact = KeyDerivation::SpacePadded
            .derive(&SharedSecret::from_text("0123456789abcdef"))
            .unwrap();
        assert!(matches!(exact, CipherKey::Aes128(_)));

        let medium = KeyDerivation::SpacePadded
            .derive(&SharedSecret::from_text("0123456789abcdefg"))
            .unwrap();
        assert!(matches!(medium, CipherKey::Aes256(_)));
        assert_eq!(&medium.as_bytes()[16..18], b"g ");

        let long = "x".repeat(40);
        let truncated = KeyDerivation::SpacePadded
            .derive(&SharedSecret::from_text(&long))
            .unwrap();
        assert_eq!(truncated.as_bytes(), "x".repeat(32).as_bytes());
    }

    #[test]
    fn sha256_derivation_is_deterministic() {
        let a = KeyDerivation::Sha256
            .derive(&SharedSecret::from_text("K"))
            .unwrap();
        let b = KeyDerivation::Sha256
            .derive(&SharedSecret::from_bytes(b"K".to_vec()))
            .unwrap();
        assert_eq!(a, b);
        assert!(matches!(a, CipherKey::Aes256(_)));
    }

    #[test]
    fn empty_secret_is_rejected() {
        let err = KeyDerivation::SpacePadded
            .derive(&SharedSecret::from_bytes(Vec::new()))
            .unwrap_err();
        assert!(matches!(err, MailboxError::Config(_)));
    }

    #[test]
    fn base64_secret_and_redacted_debug() {
        let secret = SharedSecret::from_base64("AAEC").unwrap();
        assert_eq!(secret.as_bytes(), &[0, 1, 2]);
        assert_eq!(format!("{secret:?}"), "SharedSecret(<3 bytes>)");
        assert!(SharedSecret::from_base64("!!").is_err());
    }

    #[test]
    fn iv_policies() {
        let fixed = IvPolicy::fixed_from_text("iv");
        assert_eq!(fixed.next_iv(), *b"iv              ");
        assert_eq!(fixed.next_iv(), fixed.next_iv());
        assert_ne!(IvPolicy::Random.next_iv(), IvPolicy::Random.next_iv());
    }

    #[test]
    fn cbc_pads_to_block_multiple() {
        let key = KeyDerivation::SpacePadded
            .derive(&SharedSecret::from_text("K"))
            .unwrap();
        let iv = [7u8; IV_LEN];
        assert_eq!(key.encrypt(&iv, b"").unwrap().len(), 16);
        assert_eq!(key.encrypt(&iv, &[0u8; 16]).unwrap().len(), 32);
        let ciphertext = key.encrypt(&iv, b"hello").unwrap();
        assert_eq!(key.decrypt(&iv, &ciphertext).unwrap(), b"hello");
    }
}
