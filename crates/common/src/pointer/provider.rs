use async_trait::async_trait;

use super::record::SignedCasRecord;
use crate::linked_data::{ContentHash, PublicKeyHash};

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum PointerError {
    /// No signing key is registered for the writer
    #[error("writer key not found: {0}")]
    NotFound(PublicKeyHash),
    /// The record's signature does not verify under the writer's key
    #[error("invalid signature on cas record")]
    InvalidSignature,
    /// The record's previous hash is not the stored value. Nothing
    ///  was written; the caller should refetch and retry.
    #[error("cas conflict: expected {expected:?}, found {actual:?}")]
    CasConflict {
        expected: Option<ContentHash>,
        actual: Option<ContentHash>,
    },
    /// The signed payload does not decode as a cas pair
    #[error("malformed cas record: {0}")]
    MalformedRecord(String),
    #[error("pointer store unreachable: {0}")]
    Unreachable(String),
    #[error("unhandled pointer provider error: {0}")]
    Provider(String),
}

/// The mutable pointer table
///
/// Maps each (owner, writer) key pair to the hash it currently points
///  at. Updates are compare-and-swap: a signed record naming the
///  expected previous value is accepted only if that value is still
///  current. The provider never merges, it only rejects.
#[async_trait]
pub trait PointerProvider: Send + Sync + std::fmt::Debug + 'static {
    /// Apply a signed cas update
    ///
    /// Should fail with the following errors to be considered correct:
    /// * `PointerError::NotFound` - writer key is not registered
    /// * `PointerError::InvalidSignature` - record is not signed by the writer
    /// * `PointerError::MalformedRecord` - payload is not a cas pair
    /// * `PointerError::CasConflict` - previous hash is stale
    ///
    /// Must be linearizable per key: of several concurrent updates
    ///  carrying the same previous hash, exactly one is accepted.
    async fn set_pointer(
        &self,
        owner: &PublicKeyHash,
        writer: &PublicKeyHash,
        record: &SignedCasRecord,
    ) -> Result<(), PointerError>;

    /// The latest accepted hash, if any
    async fn get_pointer(
        &self,
        owner: &PublicKeyHash,
        writer: &PublicKeyHash,
    ) -> Result<Option<ContentHash>, PointerError>;

    /// The latest accepted record, so readers can audit the signature
    async fn get_record(
        &self,
        owner: &PublicKeyHash,
        writer: &PublicKeyHash,
    ) -> Result<Option<SignedCasRecord>, PointerError>;
}
