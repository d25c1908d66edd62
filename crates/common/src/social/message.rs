use serde::{Deserialize, Serialize};
use serde_with::{serde_as, Bytes};

use crate::crypto::{
    Entropy, PublicKey, Secret, SecretError, SecretKey, SecretShare, SecretShareError, Signature,
    SIGNATURE_SIZE,
};
use crate::linked_data::{BlockEncoded, CodecError, PublicKeyHash};
use crate::mount::Capability;

#[derive(Debug, thiserror::Error)]
pub enum MessageError {
    #[error("message is addressed to {0}")]
    WrongRecipient(PublicKeyHash),
    #[error("unknown sender: {0}")]
    UnknownSender(PublicKeyHash),
    #[error("invalid message signature")]
    InvalidSignature,
    #[error("message claims to be from {claimed}, envelope says {sender}")]
    SenderMismatch {
        claimed: PublicKeyHash,
        sender: PublicKeyHash,
    },
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),
    #[error("share error: {0}")]
    Share(#[from] SecretShareError),
    #[error("secret error: {0}")]
    Secret(#[from] SecretError),
}

/// What one user tells another about following
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FollowMessage {
    /// Ask to follow `to`, offering a capability to the directory the
    ///  sender shares with them
    Request {
        from: String,
        from_key: PublicKeyHash,
        to: String,
        entry: Capability,
    },
    /// Answer a request. An accepted request carries a capability to
    ///  the directory the replier shares back.
    Reply {
        from: String,
        from_key: PublicKeyHash,
        to: String,
        entry: Option<Capability>,
        reciprocated: bool,
    },
}

impl BlockEncoded for FollowMessage {}

impl FollowMessage {
    pub fn from(&self) -> &str {
        match self {
            FollowMessage::Request { from, .. } | FollowMessage::Reply { from, .. } => from,
        }
    }

    pub fn from_key(&self) -> &PublicKeyHash {
        match self {
            FollowMessage::Request { from_key, .. } | FollowMessage::Reply { from_key, .. } => {
                from_key
            }
        }
    }
}

/// A [`FollowMessage`] on the wire
///
/// The message is encrypted under a fresh key, which is sealed to the
///  recipient's public key. The sender signs
///  `recipient || share || ciphertext` so the envelope cannot be
///  redirected or tampered with.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SealedMessage {
    pub sender: PublicKeyHash,
    pub recipient: PublicKeyHash,
    pub share: SecretShare,
    #[serde_as(as = "Bytes")]
    pub ciphertext: Vec<u8>,
    #[serde_as(as = "Bytes")]
    pub signature: [u8; SIGNATURE_SIZE],
}

impl BlockEncoded for SealedMessage {}

impl SealedMessage {
    pub fn seal(
        message: &FollowMessage,
        sender: &SecretKey,
        recipient: &PublicKey,
        entropy: &Entropy,
    ) -> Result<Self, MessageError> {
        let message_key = Secret::generate(entropy);
        let share = SecretShare::new(&message_key, recipient, entropy)?;
        let ciphertext = message_key.encrypt(&message.encode()?, entropy)?;
        let recipient = recipient.hash();
        let signature = sender
            .sign(&Self::signed_bytes(&recipient, &share, &ciphertext))
            .to_bytes();
        Ok(Self {
            sender: sender.public().hash(),
            recipient,
            share,
            ciphertext,
            signature,
        })
    }

    fn signed_bytes(recipient: &PublicKeyHash, share: &SecretShare, ciphertext: &[u8]) -> Vec<u8> {
        let mut out = Vec::with_capacity(
            recipient.as_bytes().len() + share.bytes().len() + ciphertext.len(),
        );
        out.extend_from_slice(recipient.as_bytes());
        out.extend_from_slice(share.bytes());
        out.extend_from_slice(ciphertext);
        out
    }

    /// Check the envelope against the sender's key, then decrypt it
    pub fn open(
        &self,
        sender_key: &PublicKey,
        recipient: &SecretKey,
    ) -> Result<FollowMessage, MessageError> {
        if self.recipient != recipient.public().hash() {
            return Err(MessageError::WrongRecipient(self.recipient));
        }
        if sender_key.hash() != self.sender {
            return Err(MessageError::UnknownSender(self.sender));
        }
        let signature = Signature::from_bytes(&self.signature);
        sender_key
            .verify(
                &Self::signed_bytes(&self.recipient, &self.share, &self.ciphertext),
                &signature,
            )
            .map_err(|_| MessageError::InvalidSignature)?;

        let message_key = self.share.recover(recipient)?;
        let message = FollowMessage::decode(&message_key.decrypt(&self.ciphertext)?)?;
        if *message.from_key() != self.sender {
            return Err(MessageError::SenderMismatch {
                claimed: *message.from_key(),
                sender: self.sender,
            });
        }
        Ok(message)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::linked_data::ContentHash;
    use crate::mount::Reference;

    fn request(from: &SecretKey, entropy: &Entropy) -> FollowMessage {
        FollowMessage::Request {
            from: "alice".into(),
            from_key: from.public().hash(),
            to: "bob".into(),
            entry: Capability {
                base_key: Secret::generate(entropy),
                reference: Reference::Immutable(ContentHash::of(b"shared/bob")),
            },
        }
    }

    #[test]
    fn test_seal_and_open() {
        let entropy = Entropy::seeded(80);
        let alice = SecretKey::generate(&entropy);
        let bob = SecretKey::generate(&entropy);
        let message = request(&alice, &entropy);

        let sealed = SealedMessage::seal(&message, &alice, &bob.public(), &entropy).unwrap();
        let decoded = SealedMessage::decode(&sealed.encode().unwrap()).unwrap();
        assert_eq!(decoded.open(&alice.public(), &bob).unwrap(), message);
    }

    #[test]
    fn test_rejects_other_recipient_and_tampering() {
        let entropy = Entropy::seeded(81);
        let alice = SecretKey::generate(&entropy);
        let bob = SecretKey::generate(&entropy);
        let eve = SecretKey::generate(&entropy);
        let message = request(&alice, &entropy);
        let sealed = SealedMessage::seal(&message, &alice, &bob.public(), &entropy).unwrap();

        assert!(matches!(
            sealed.open(&alice.public(), &eve),
            Err(MessageError::WrongRecipient(_))
        ));

        let mut tampered = sealed.clone();
        tampered.ciphertext[0] ^= 0xff;
        assert!(matches!(
            tampered.open(&alice.public(), &bob),
            Err(MessageError::InvalidSignature)
        ));
    }

    #[test]
    fn test_rejects_forged_sender_name() {
        let entropy = Entropy::seeded(82);
        let alice = SecretKey::generate(&entropy);
        let mallory = SecretKey::generate(&entropy);
        let bob = SecretKey::generate(&entropy);

        // mallory signs a message claiming alice's key
        let sealed =
            SealedMessage::seal(&request(&alice, &entropy), &mallory, &bob.public(), &entropy)
                .unwrap();
        assert!(matches!(
            sealed.open(&mallory.public(), &bob),
            Err(MessageError::SenderMismatch { .. })
        ));
    }
}
