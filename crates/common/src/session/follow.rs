use bytes::Bytes;

use crate::client::SHARED_DIR;
use crate::crypto::{PublicKey, Secret};
use crate::error::FsError;
use crate::linked_data::{BlockEncoded, PublicKeyHash};
use crate::mount::{Change, EntryPoint, Scope};
use crate::retry::timed;
use crate::social::{FollowMessage, FollowOutcome, FollowRequest, MessageError, SealedMessage};

use super::Session;

impl Session {
    /// Ask `username` to follow us back
    ///
    /// Creates our `shared/<username>` directory under `key` if it does
    ///  not exist yet, and sends them a capability to it.
    pub async fn send_follow_request(&self, username: &str, key: Secret) -> Result<(), FsError> {
        let (recipient_hash, recipient) = self.lookup_user(username).await?;
        let entry = self.ensure_follower_dir(username, Some(key)).await?;
        let message = FollowMessage::Request {
            from: self.username.clone(),
            from_key: self.key_hash,
            to: username.to_string(),
            entry,
        };
        self.post(recipient_hash, &recipient, &message).await?;
        tracing::info!("send_follow_request: {} -> {}", self.username, username);
        Ok(())
    }

    /// Drain the inbox
    ///
    /// Returns pending follow requests, one per sender (the newest
    ///  wins). Replies are handled on the way: an accepted reply's
    ///  capability is mounted at `/<sender>/shared/<us>`. Messages that
    ///  do not verify are dropped. Messages that fail for any other
    ///  reason are put back in the inbox for the next drain, and the
    ///  rest are still processed.
    pub async fn get_follow_requests(&self) -> Result<Vec<FollowRequest>, FsError> {
        let inbox = &self.client.network().inbox;
        let messages = timed(self.client.config(), inbox.take_all(&self.key_hash)).await?;

        let mut pending: Vec<FollowRequest> = Vec::new();
        let mut retained = Vec::new();
        for raw in messages {
            match self.handle_message(&raw, &mut pending).await {
                Ok(()) => {}
                Err(FsError::Message(err)) => {
                    tracing::warn!("get_follow_requests: dropping message: {}", err);
                }
                Err(FsError::Codec(err)) => {
                    tracing::warn!("get_follow_requests: dropping undecodable message: {}", err);
                }
                Err(err) => {
                    tracing::warn!("get_follow_requests: keeping message for later: {}", err);
                    retained.push(raw);
                }
            }
        }

        for raw in retained {
            timed(self.client.config(), inbox.post(self.key_hash, raw)).await?;
        }
        Ok(pending)
    }

    async fn handle_message(
        &self,
        raw: &[u8],
        pending: &mut Vec<FollowRequest>,
    ) -> Result<(), FsError> {
        match self.open_message(raw).await? {
            FollowMessage::Request {
                from,
                from_key,
                entry,
                ..
            } => {
                pending.retain(|request| request.from_key != from_key);
                pending.push(FollowRequest {
                    from,
                    from_key,
                    capability: entry,
                });
            }
            FollowMessage::Reply {
                from,
                entry: Some(capability),
                ..
            } => {
                tracing::debug!("get_follow_requests: {} accepted, mounting", from);
                self.add_entry_point(EntryPoint {
                    path: self.shared_mount_path(&from),
                    capability,
                })
                .await?;
            }
            FollowMessage::Reply { from, .. } => {
                tracing::debug!("get_follow_requests: {} did not accept", from);
            }
        }
        Ok(())
    }

    /// Answer a follow request
    ///
    /// With `reciprocate` the offered capability is mounted, so the
    ///  sender's shared directory shows up at `/<sender>/shared/<us>`.
    ///  With `accept` we create a `shared/<sender>` directory and send
    ///  the sender a capability to it. A reply is sent either way.
    pub async fn send_reply_follow_request(
        &self,
        request: &FollowRequest,
        accept: bool,
        reciprocate: bool,
    ) -> Result<FollowOutcome, FsError> {
        let (sender_hash, sender) = self.lookup_user(&request.from).await?;
        if sender_hash != request.from_key {
            return Err(FsError::UnknownUser(request.from.clone()));
        }

        if reciprocate {
            self.add_entry_point(EntryPoint {
                path: self.shared_mount_path(&request.from),
                capability: request.capability.clone(),
            })
            .await?;
        }

        let entry = if accept {
            Some(self.ensure_follower_dir(&request.from, None).await?)
        } else {
            None
        };
        let reply = FollowMessage::Reply {
            from: self.username.clone(),
            from_key: self.key_hash,
            to: request.from.clone(),
            entry,
            reciprocated: reciprocate,
        };
        self.post(sender_hash, &sender, &reply).await?;

        let outcome = FollowOutcome::new(accept, reciprocate);
        tracing::info!(
            "send_reply_follow_request: {} -> {}: {:?}",
            self.username,
            request.from,
            outcome
        );
        Ok(outcome)
    }

    /// Where a capability received from `from` is mounted
    fn shared_mount_path(&self, from: &str) -> Vec<String> {
        vec![from.to_string(), SHARED_DIR.to_string(), self.username.clone()]
    }

    /// Record a mount in the home manifest and in this session
    async fn add_entry_point(&self, entry: EntryPoint) -> Result<(), FsError> {
        self.mount()
            .commit(
                &Scope::home(&self.secret_key),
                &Change::AddEntryPoint(entry.clone()),
            )
            .await?;
        let mut entry_points = self.entry_points.write();
        entry_points.retain(|existing| existing.path != entry.path);
        entry_points.push(entry);
        Ok(())
    }

    async fn lookup_user(&self, username: &str) -> Result<(PublicKeyHash, PublicKey), FsError> {
        let hash = self
            .client
            .lookup_username(username)
            .await?
            .ok_or_else(|| FsError::UnknownUser(username.to_string()))?;
        let key = self
            .mount()
            .signing_key(&hash)
            .await?
            .ok_or_else(|| FsError::UnknownUser(username.to_string()))?;
        Ok((hash, key))
    }

    async fn post(
        &self,
        recipient_hash: PublicKeyHash,
        recipient: &PublicKey,
        message: &FollowMessage,
    ) -> Result<(), FsError> {
        let sealed =
            SealedMessage::seal(message, &self.secret_key, recipient, self.client.entropy())?;
        timed(
            self.client.config(),
            self.client
                .network()
                .inbox
                .post(recipient_hash, Bytes::from(sealed.encode()?)),
        )
        .await
    }

    /// Verify and decrypt one inbox message
    async fn open_message(&self, raw: &[u8]) -> Result<FollowMessage, FsError> {
        let sealed = SealedMessage::decode(raw)?;
        let sender = self
            .mount()
            .signing_key(&sealed.sender)
            .await?
            .ok_or(MessageError::UnknownSender(sealed.sender))?;
        let message = sealed.open(&sender, &self.secret_key)?;

        // the claimed username must belong to the signing key
        if self.client.lookup_username(message.from()).await? != Some(sealed.sender) {
            return Err(MessageError::SenderMismatch {
                claimed: *message.from_key(),
                sender: sealed.sender,
            }
            .into());
        }
        Ok(message)
    }
}

