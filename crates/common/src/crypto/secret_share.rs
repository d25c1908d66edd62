//! Sealing a secret to a recipient's public key
//!
//! An ephemeral Ed25519 keypair is drawn, both sides are converted to
//!  X25519, and the ECDH output is used as an AES-KW key-encryption key
//!  for the secret. The share carries the ephemeral public key so the
//!  recipient can repeat the agreement with their private key.
//!
//! Used for the owner copy of every subtree root key and for the
//!  message keys of follow requests.

use std::convert::TryFrom;

use serde::{Deserialize, Serialize};

use super::entropy::Entropy;
use super::keys::{KeyError, PublicKey, SecretKey, PUBLIC_KEY_SIZE};
use super::secret::{Secret, SecretError, WrappedKey, WRAPPED_KEY_SIZE};

/// Layout: ephemeral_pubkey (32) || wrapped_secret (40) = 72 bytes
pub const SECRET_SHARE_SIZE: usize = PUBLIC_KEY_SIZE + WRAPPED_KEY_SIZE;

#[derive(Debug, thiserror::Error)]
pub enum SecretShareError {
    #[error("share error: {0}")]
    Default(#[from] anyhow::Error),
    #[error("key error: {0}")]
    Key(#[from] KeyError),
    #[error("secret error: {0}")]
    Secret(#[from] SecretError),
}

/// A secret wrapped for exactly one recipient
///
/// ```text
/// [ ephemeral_pubkey: 32 bytes ][ wrapped_secret: 40 bytes ]
/// ```
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct SecretShare(pub(crate) [u8; SECRET_SHARE_SIZE]);

impl Serialize for SecretShare {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_bytes(&self.0)
    }
}

impl<'de> Deserialize<'de> for SecretShare {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        use serde::de::{Error, Visitor};
        use std::fmt;

        struct ShareVisitor;

        impl ShareVisitor {
            fn finish<E: Error>(bytes: &[u8]) -> Result<SecretShare, E> {
                SecretShare::try_from(bytes).map_err(|_| {
                    E::invalid_length(
                        bytes.len(),
                        &format!("expected {} bytes", SECRET_SHARE_SIZE).as_str(),
                    )
                })
            }
        }

        impl<'de> Visitor<'de> for ShareVisitor {
            type Value = SecretShare;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("a byte array or sequence of SECRET_SHARE_SIZE")
            }

            fn visit_bytes<E>(self, v: &[u8]) -> Result<Self::Value, E>
            where
                E: Error,
            {
                Self::finish(v)
            }

            fn visit_seq<A>(self, mut seq: A) -> Result<Self::Value, A::Error>
            where
                A: serde::de::SeqAccess<'de>,
            {
                let mut bytes = Vec::with_capacity(SECRET_SHARE_SIZE);
                while let Some(byte) = seq.next_element::<u8>()? {
                    bytes.push(byte);
                }
                Self::finish(&bytes)
            }
        }

        // bytes for CBOR, seq for JSON
        deserializer.deserialize_byte_buf(ShareVisitor)
    }
}

impl TryFrom<&[u8]> for SecretShare {
    type Error = SecretShareError;
    fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
        if bytes.len() != SECRET_SHARE_SIZE {
            return Err(anyhow::anyhow!(
                "invalid share size, expected {}, got {}",
                SECRET_SHARE_SIZE,
                bytes.len()
            )
            .into());
        }
        let mut share = [0u8; SECRET_SHARE_SIZE];
        share.copy_from_slice(bytes);
        Ok(SecretShare(share))
    }
}

impl SecretShare {
    /// Seal `secret` so that only the holder of `recipient`'s private
    ///  key can recover it
    pub fn new(
        secret: &Secret,
        recipient: &PublicKey,
        entropy: &Entropy,
    ) -> Result<Self, SecretShareError> {
        let ephemeral_private = SecretKey::generate(entropy);
        let ephemeral_public = ephemeral_private.public();

        let shared_secret = ephemeral_private
            .to_x25519()
            .diffie_hellman(&recipient.to_x25519()?);

        let kek = Secret::from(*shared_secret.as_bytes());
        let wrapped = kek.wrap(secret)?;

        let mut share = [0u8; SECRET_SHARE_SIZE];
        share[..PUBLIC_KEY_SIZE].copy_from_slice(&ephemeral_public.to_bytes());
        share[PUBLIC_KEY_SIZE..].copy_from_slice(wrapped.as_bytes());
        Ok(SecretShare(share))
    }

    /// Recover the sealed secret with the recipient's private key
    ///
    /// An error here means the share was made for someone else or was
    ///  tampered with.
    pub fn recover(&self, recipient_secret: &SecretKey) -> Result<Secret, SecretShareError> {
        let ephemeral_public = PublicKey::try_from(&self.0[..PUBLIC_KEY_SIZE])?;

        let shared_secret = recipient_secret
            .to_x25519()
            .diffie_hellman(&ephemeral_public.to_x25519()?);

        let kek = Secret::from(*shared_secret.as_bytes());
        let wrapped = WrappedKey::try_from(&self.0[PUBLIC_KEY_SIZE..])?;
        Ok(kek.unwrap(&wrapped)?)
    }

    pub fn bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}
