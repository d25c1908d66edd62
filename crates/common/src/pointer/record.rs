use crate::crypto::{PublicKey, SecretKey, Signature, SIGNATURE_SIZE};
use crate::linked_data::{ContentHash, HASH_SIZE};

use super::provider::PointerError;

const EMPTY_MARKER: u8 = 0x00;
const HASH_MARKER: u8 = 0x01;

/// The (previous, current) pair a writer signs to move a pointer
///
/// Canonical encoding, for each of previous then current:
///
/// ```text
/// 0x00                   -- empty
/// 0x01 || hash(32 bytes) -- present
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HashCasPair {
    pub previous: Option<ContentHash>,
    pub current: Option<ContentHash>,
}

impl HashCasPair {
    pub fn new(previous: Option<ContentHash>, current: Option<ContentHash>) -> Self {
        Self { previous, current }
    }

    pub fn serialize(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(2 * (1 + HASH_SIZE));
        for hash in [&self.previous, &self.current] {
            match hash {
                Some(hash) => {
                    out.push(HASH_MARKER);
                    out.extend_from_slice(hash.as_bytes());
                }
                None => out.push(EMPTY_MARKER),
            }
        }
        out
    }

    pub fn deserialize(bytes: &[u8]) -> Result<Self, PointerError> {
        let (previous, rest) = read_maybe_hash(bytes)?;
        let (current, rest) = read_maybe_hash(rest)?;
        if !rest.is_empty() {
            return Err(PointerError::MalformedRecord(format!(
                "{} trailing bytes after cas pair",
                rest.len()
            )));
        }
        Ok(Self { previous, current })
    }
}

fn read_maybe_hash(bytes: &[u8]) -> Result<(Option<ContentHash>, &[u8]), PointerError> {
    match bytes.split_first() {
        Some((&EMPTY_MARKER, rest)) => Ok((None, rest)),
        Some((&HASH_MARKER, rest)) if rest.len() >= HASH_SIZE => {
            let mut hash = [0u8; HASH_SIZE];
            hash.copy_from_slice(&rest[..HASH_SIZE]);
            Ok((Some(ContentHash::from_bytes(hash)), &rest[HASH_SIZE..]))
        }
        Some((&HASH_MARKER, rest)) => Err(PointerError::MalformedRecord(format!(
            "truncated hash, {} of {} bytes",
            rest.len(),
            HASH_SIZE
        ))),
        Some((marker, _)) => Err(PointerError::MalformedRecord(format!(
            "unknown hash marker {:#04x}",
            marker
        ))),
        None => Err(PointerError::MalformedRecord("empty cas pair".into())),
    }
}

/// A signed pointer update, as submitted to and persisted by the
///  pointer store
///
/// Wire format is `signature (64 bytes) || payload`, where the payload
///  is the serialized [`HashCasPair`]. The payload bytes are kept
///  verbatim and verification runs over exactly those bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedCasRecord {
    signature: [u8; SIGNATURE_SIZE],
    payload: Vec<u8>,
}

impl SignedCasRecord {
    pub fn sign(writer: &SecretKey, pair: &HashCasPair) -> Self {
        let payload = pair.serialize();
        let signature = writer.sign(&payload).to_bytes();
        Self { signature, payload }
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, PointerError> {
        if bytes.len() < SIGNATURE_SIZE {
            return Err(PointerError::MalformedRecord(format!(
                "record of {} bytes is shorter than a signature",
                bytes.len()
            )));
        }
        let (signature, payload) = bytes.split_at(SIGNATURE_SIZE);
        let mut sig = [0u8; SIGNATURE_SIZE];
        sig.copy_from_slice(signature);
        Ok(Self {
            signature: sig,
            payload: payload.to_vec(),
        })
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(SIGNATURE_SIZE + self.payload.len());
        out.extend_from_slice(&self.signature);
        out.extend_from_slice(&self.payload);
        out
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Check the signature against `writer` and decode the pair
    pub fn verify(&self, writer: &PublicKey) -> Result<HashCasPair, PointerError> {
        let signature = Signature::from_bytes(&self.signature);
        writer
            .verify(&self.payload, &signature)
            .map_err(|_| PointerError::InvalidSignature)?;
        HashCasPair::deserialize(&self.payload)
    }
}
