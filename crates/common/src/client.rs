use crate::config::Config;
use crate::crypto::{Entropy, SecretKey};
use crate::error::FsError;
use crate::linked_data::PublicKeyHash;
use crate::mount::{Mount, Node, Scope, TreeEdit};
use crate::network::Network;
use crate::retry::timed;
use crate::session::Session;

/// Directory every home tree starts with, holding one published
///  subdirectory per follower
pub const SHARED_DIR: &str = "shared";

/// Entry to the network: signs users up and logs them in
#[derive(Debug, Clone)]
pub struct Client {
    network: Network,
    config: Config,
    entropy: Entropy,
}

impl Client {
    pub fn new(network: Network, config: Config, entropy: Entropy) -> Self {
        Self {
            network,
            config,
            entropy,
        }
    }

    pub fn network(&self) -> &Network {
        &self.network
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn entropy(&self) -> &Entropy {
        &self.entropy
    }

    pub(crate) fn mount(&self) -> Mount<'_> {
        Mount::new(&self.network, &self.config, &self.entropy)
    }

    /// Register `secret_key`, claim `username` for it and publish an
    ///  empty home tree
    pub async fn sign_up(&self, username: &str, secret_key: SecretKey) -> Result<Session, FsError> {
        validate_username(username)?;
        let mount = self.mount();

        let key_hash = mount.register_key(&secret_key).await?;
        timed(
            &self.config,
            self.network.identities.claim_username(username, key_hash),
        )
        .await?;

        let scope = Scope::home(&secret_key);
        let root_key = mount.fresh_key();
        let root = TreeEdit::Mkdir {
            path: vec![SHARED_DIR.to_string()],
        }
        .apply(&mount, Node::Dir(Default::default()), &root_key)
        .await?;
        let root_hash = mount.store_node(&root, &root_key).await?;
        mount.publish_genesis(&scope, root_hash, &root_key).await?;
        tracing::info!("sign_up: {} registered as {}", username, key_hash);

        Session::open(self.clone(), username, secret_key).await
    }

    /// Open a session for an existing user
    pub async fn login(&self, username: &str, secret_key: SecretKey) -> Result<Session, FsError> {
        let registered = self
            .lookup_username(username)
            .await?
            .ok_or_else(|| FsError::UnknownUser(username.to_string()))?;
        if registered != secret_key.public().hash() {
            return Err(FsError::Unauthorized(format!(
                "key does not belong to {}",
                username
            )));
        }
        tracing::debug!("login: {}", username);
        Session::open(self.clone(), username, secret_key).await
    }

    /// Log in, signing up first if the username is unclaimed
    pub async fn ensure_signed_up(
        &self,
        username: &str,
        secret_key: SecretKey,
    ) -> Result<Session, FsError> {
        match self.lookup_username(username).await? {
            Some(_) => self.login(username, secret_key).await,
            None => self.sign_up(username, secret_key).await,
        }
    }

    pub async fn lookup_username(&self, username: &str) -> Result<Option<PublicKeyHash>, FsError> {
        timed(&self.config, self.network.identities.lookup_username(username)).await
    }
}

fn validate_username(username: &str) -> Result<(), FsError> {
    if username.is_empty() || username.contains('/') || username == "." || username == ".." {
        return Err(FsError::InvalidPath(username.to_string()));
    }
    Ok(())
}
