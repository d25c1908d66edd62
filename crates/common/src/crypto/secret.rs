//! Content encryption using ChaCha20-Poly1305
//!
//! Every node, chunk and sealed message is encrypted under its own
//!  `Secret`. Secrets are themselves wrapped (AES-KW) under the key of
//!  whatever references them, which is how a directory key unlocks
//!  its descendants.

use aes_kw::KekAes256 as Kek;
use chacha20poly1305::Key;
use chacha20poly1305::{
    aead::{Aead, KeyInit},
    ChaCha20Poly1305, Nonce,
};
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, Bytes};

use super::entropy::Entropy;

/// Size of ChaCha20-Poly1305 nonce in bytes
pub const NONCE_SIZE: usize = 12;
/// Size of ChaCha20-Poly1305 key in bytes (256 bits)
pub const SECRET_SIZE: usize = 32;
/// Size of BLAKE3 hash in bytes (256 bits)
pub const BLAKE3_HASH_SIZE: usize = 32;
/// Size of AES Key Wrap integrity block in bytes
pub const KW_NONCE_SIZE: usize = 8;
/// Size of a 32-byte key after AES-KW
pub const WRAPPED_KEY_SIZE: usize = SECRET_SIZE + KW_NONCE_SIZE;

/// Errors that can occur during encryption/decryption
#[derive(Debug, thiserror::Error)]
pub enum SecretError {
    #[error("secret error: {0}")]
    Default(#[from] anyhow::Error),
}

/// A 256-bit symmetric key
///
/// Encrypted format is
///  `nonce (12 bytes) || encrypted(hash(32 bytes) || plaintext) || tag (16 bytes)`.
#[serde_as]
#[derive(Debug, PartialEq, Eq, Clone, Serialize, Deserialize)]
pub struct Secret(#[serde_as(as = "Bytes")] [u8; SECRET_SIZE]);

impl From<[u8; SECRET_SIZE]> for Secret {
    fn from(bytes: [u8; SECRET_SIZE]) -> Self {
        Secret(bytes)
    }
}

impl Secret {
    /// Draw a fresh secret from the given random source
    pub fn generate(entropy: &Entropy) -> Self {
        Self(entropy.array::<SECRET_SIZE>())
    }

    /// Create a secret from a byte slice of exactly `SECRET_SIZE` bytes
    pub fn from_slice(data: &[u8]) -> Result<Self, SecretError> {
        if data.len() != SECRET_SIZE {
            return Err(anyhow::anyhow!(
                "invalid secret size, expected {}, got {}",
                SECRET_SIZE,
                data.len()
            )
            .into());
        }
        let mut buff = [0; SECRET_SIZE];
        buff.copy_from_slice(data);
        Ok(buff.into())
    }

    pub fn bytes(&self) -> &[u8] {
        self.0.as_ref()
    }

    /// Encrypt data using ChaCha20-Poly1305 AEAD with a nonce drawn
    ///  from `entropy`
    pub fn encrypt(&self, data: &[u8], entropy: &Entropy) -> Result<Vec<u8>, SecretError> {
        let plaintext_hash = blake3::hash(data);

        let mut data_with_hash = Vec::with_capacity(BLAKE3_HASH_SIZE + data.len());
        data_with_hash.extend_from_slice(plaintext_hash.as_bytes());
        data_with_hash.extend_from_slice(data);

        let cipher = ChaCha20Poly1305::new(Key::from_slice(self.bytes()));
        let nonce_bytes = entropy.array::<NONCE_SIZE>();
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = cipher
            .encrypt(nonce, data_with_hash.as_ref())
            .map_err(|_| anyhow::anyhow!("encrypt error"))?;

        let mut out = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        out.extend_from_slice(nonce.as_ref());
        out.extend_from_slice(ciphertext.as_ref());

        Ok(out)
    }

    /// Decrypt data produced by [`Secret::encrypt`]
    ///
    /// Fails if the tag does not authenticate (wrong key or tampering)
    ///  or the embedded plaintext hash does not match.
    pub fn decrypt(&self, data: &[u8]) -> Result<Vec<u8>, SecretError> {
        if data.len() < NONCE_SIZE {
            return Err(anyhow::anyhow!("data too short for nonce").into());
        }

        let cipher = ChaCha20Poly1305::new(Key::from_slice(self.bytes()));
        let nonce = Nonce::from_slice(&data[..NONCE_SIZE]);
        let decrypted = cipher
            .decrypt(nonce, &data[NONCE_SIZE..])
            .map_err(|_| anyhow::anyhow!("decrypt error"))?;

        if decrypted.len() < BLAKE3_HASH_SIZE {
            return Err(anyhow::anyhow!("decrypted data too short for hash header").into());
        }

        let (stored_hash, plaintext) = decrypted.split_at(BLAKE3_HASH_SIZE);
        if stored_hash != blake3::hash(plaintext).as_bytes() {
            return Err(anyhow::anyhow!("hash verification failed - data corrupted").into());
        }

        Ok(plaintext.to_vec())
    }

    /// Wrap 32 bytes of key material under this secret
    fn wrap_bytes(&self, key: &[u8; SECRET_SIZE]) -> Result<WrappedKey, SecretError> {
        let kek = Kek::from(self.0);
        let wrapped = kek
            .wrap_vec(key)
            .map_err(|_| anyhow::anyhow!("AES-KW wrap error"))?;
        WrappedKey::try_from(wrapped.as_slice())
    }

    /// Unwrap key material previously wrapped under this secret
    fn unwrap_bytes(&self, wrapped: &WrappedKey) -> Result<[u8; SECRET_SIZE], SecretError> {
        let kek = Kek::from(self.0);
        let unwrapped = kek
            .unwrap_vec(&wrapped.0)
            .map_err(|_| anyhow::anyhow!("AES-KW unwrap error"))?;
        if unwrapped.len() != SECRET_SIZE {
            return Err(anyhow::anyhow!("unwrapped key has wrong size").into());
        }
        let mut out = [0u8; SECRET_SIZE];
        out.copy_from_slice(&unwrapped);
        Ok(out)
    }

    pub fn wrap(&self, child: &Secret) -> Result<WrappedKey, SecretError> {
        self.wrap_bytes(&child.0)
    }

    pub fn unwrap(&self, wrapped: &WrappedKey) -> Result<Secret, SecretError> {
        self.unwrap_bytes(wrapped).map(Secret)
    }
}

/// Key material wrapped under a parent [`Secret`]
#[serde_as]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WrappedKey(#[serde_as(as = "Bytes")] [u8; WRAPPED_KEY_SIZE]);

impl WrappedKey {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl TryFrom<&[u8]> for WrappedKey {
    type Error = SecretError;
    fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
        if bytes.len() != WRAPPED_KEY_SIZE {
            return Err(anyhow::anyhow!(
                "invalid wrapped key size, expected {}, got {}",
                WRAPPED_KEY_SIZE,
                bytes.len()
            )
            .into());
        }
        let mut buff = [0; WRAPPED_KEY_SIZE];
        buff.copy_from_slice(bytes);
        Ok(WrappedKey(buff))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_secret_encrypt_decrypt() {
        let entropy = Entropy::seeded(10);
        let secret = Secret::generate(&entropy);
        let data = b"hello world, this is a test message for encryption";

        let encrypted = secret.encrypt(data, &entropy).unwrap();
        let decrypted = secret.decrypt(&encrypted).unwrap();

        assert_eq!(data.as_slice(), decrypted.as_slice());
    }

    #[test]
    fn test_wrong_key_fails() {
        let entropy = Entropy::seeded(11);
        let secret = Secret::generate(&entropy);
        let other = Secret::generate(&entropy);

        let encrypted = secret.encrypt(b"payload", &entropy).unwrap();
        assert!(other.decrypt(&encrypted).is_err());
    }

    #[test]
    fn test_secret_size_validation() {
        assert!(Secret::from_slice(&[1u8; 16]).is_err());
        assert!(Secret::from_slice(&[1u8; 64]).is_err());
        assert!(Secret::from_slice(&[1u8; SECRET_SIZE]).is_ok());
    }

    #[test]
    fn test_tampered_ciphertext_fails() {
        let entropy = Entropy::seeded(12);
        let secret = Secret::generate(&entropy);
        let mut encrypted = secret.encrypt(b"test data for integrity check", &entropy).unwrap();

        encrypted[NONCE_SIZE + 10] ^= 0xFF;
        assert!(secret.decrypt(&encrypted).is_err());
    }

    #[test]
    fn test_empty_data_encryption() {
        let entropy = Entropy::seeded(13);
        let secret = Secret::generate(&entropy);

        let encrypted = secret.encrypt(b"", &entropy).unwrap();
        assert!(secret.decrypt(&encrypted).unwrap().is_empty());
    }

    #[test]
    fn test_wrap_unwrap() {
        let entropy = Entropy::seeded(14);
        let parent = Secret::generate(&entropy);
        let child = Secret::generate(&entropy);

        let wrapped = parent.wrap(&child).unwrap();
        assert_eq!(parent.unwrap(&wrapped).unwrap(), child);

        // AES-KW is deterministic, re-wrapping yields identical bytes
        assert_eq!(parent.wrap(&child).unwrap(), wrapped);

        let stranger = Secret::generate(&entropy);
        assert!(stranger.unwrap(&wrapped).is_err());
    }
}
