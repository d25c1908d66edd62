use crate::crypto::{KeyError, SecretError, SecretShareError};
use crate::linked_data::CodecError;
use crate::pointer::PointerError;
use crate::social::MessageError;
use crate::store::{InboxError, RegistryError, StoreError};

/// Errors surfaced by session operations
#[derive(Debug, thiserror::Error)]
pub enum FsError {
    #[error("default error: {0}")]
    Default(#[from] anyhow::Error),
    #[error("path not found: {0}")]
    PathNotFound(String),
    #[error("path already exists: {0}")]
    PathAlreadyExists(String),
    #[error("path is not a directory: {0}")]
    PathNotDir(String),
    #[error("path is not a file: {0}")]
    NotAFile(String),
    #[error("invalid path: {0}")]
    InvalidPath(String),
    #[error("cannot move '{from}' to '{to}': destination is inside source")]
    MoveIntoSelf { from: String, to: String },
    #[error("write offset {offset} is past the end of the file ({size} bytes)")]
    OffsetPastEnd { offset: u64, size: u64 },
    /// A capability is missing or does not decrypt what it points at
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    #[error("unknown user: {0}")]
    UnknownUser(String),
    #[error("{0} is not a follower")]
    NotFollower(String),
    #[error("path is not shared: {0}")]
    NotShared(String),
    #[error("username already taken: {0}")]
    UsernameTaken(String),
    /// Gave up after repeated conflicts or transient failures
    #[error("conflict: gave up after {attempts} attempts")]
    Conflict { attempts: u32 },
    #[error("request timed out")]
    Timeout,
    #[error("pointer error: {0}")]
    Pointer(#[from] PointerError),
    #[error("block store error: {0}")]
    Store(#[from] StoreError),
    #[error("registry error: {0}")]
    Registry(RegistryError),
    #[error("inbox error: {0}")]
    Inbox(#[from] InboxError),
    #[error("message error: {0}")]
    Message(#[from] MessageError),
    #[error("secret error: {0}")]
    Secret(#[from] SecretError),
    #[error("share error: {0}")]
    Share(#[from] SecretShareError),
    #[error("key error: {0}")]
    Key(#[from] KeyError),
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),
}

impl From<RegistryError> for FsError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::UsernameTaken(username) => FsError::UsernameTaken(username),
            err => FsError::Registry(err),
        }
    }
}

impl FsError {
    /// Conflicts and transient transport failures. Everything else is
    ///  terminal for the operation.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            FsError::Timeout
                | FsError::Pointer(PointerError::CasConflict { .. })
                | FsError::Pointer(PointerError::Unreachable(_))
                | FsError::Store(StoreError::Unreachable(_))
                | FsError::Registry(RegistryError::Unreachable(_))
                | FsError::Inbox(InboxError::Unreachable(_))
        )
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, FsError::Pointer(PointerError::CasConflict { .. }))
    }

    /// Errors that mean "this path cannot be located by this session"
    pub(crate) fn is_not_located(&self) -> bool {
        matches!(
            self,
            FsError::PathNotFound(_) | FsError::PathNotDir(_) | FsError::Unauthorized(_)
        )
    }
}
