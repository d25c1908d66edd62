//! Follow requests between users
//!
//! Following is mutual key exchange over the inbox: each side hands the
//!  other a capability to the `shared/<them>` directory it keeps for
//!  them, sealed so only the addressee can read it.

mod message;

use crate::linked_data::PublicKeyHash;
use crate::mount::Capability;

pub use message::{FollowMessage, MessageError, SealedMessage};

/// A pending request, as seen by the user it was sent to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FollowRequest {
    pub from: String,
    pub from_key: PublicKeyHash,
    /// Capability to the sender's `shared/<recipient>` directory
    pub capability: Capability,
}

/// How a follow request was answered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FollowOutcome {
    /// Both sides can see each other
    AcceptedReciprocated,
    /// The sender sees the replier, not the other way around
    AcceptedOnly,
    /// The replier sees the sender, not the other way around
    ReciprocatedOnly,
    Rejected,
}

impl FollowOutcome {
    pub fn new(accept: bool, reciprocate: bool) -> Self {
        match (accept, reciprocate) {
            (true, true) => FollowOutcome::AcceptedReciprocated,
            (true, false) => FollowOutcome::AcceptedOnly,
            (false, true) => FollowOutcome::ReciprocatedOnly,
            (false, false) => FollowOutcome::Rejected,
        }
    }
}
