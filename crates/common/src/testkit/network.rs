use std::collections::HashMap;
use std::time::Duration;

use parking_lot::Mutex;

use crate::client::Client;
use crate::config::Config;
use crate::crypto::{Entropy, SecretKey};
use crate::error::FsError;
use crate::network::Network;
use crate::session::Session;

/// An in-process network plus the credentials of every user created
///  on it
pub struct TestNetwork {
    client: Client,
    users: Mutex<HashMap<String, SecretKey>>,
}

impl TestNetwork {
    /// Memory-backed network with small chunks and fast retries
    pub async fn new() -> anyhow::Result<Self> {
        let network = Network::memory().await?;
        Ok(Self::with_network(network))
    }

    pub fn with_network(network: Network) -> Self {
        Self::with_config(network, Self::config())
    }

    pub fn with_config(network: Network, config: Config) -> Self {
        Self {
            client: Client::new(network, config, Entropy::seeded(0x5eed)),
            users: Mutex::new(HashMap::new()),
        }
    }

    /// The config test networks run with
    pub fn config() -> Config {
        Config {
            max_attempts: 8,
            retry_backoff: Duration::from_millis(1),
            request_timeout: Duration::from_secs(5),
            chunk_size: 16,
        }
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    pub fn network(&self) -> &Network {
        self.client.network()
    }

    /// A fresh session for `name`, signing them up the first time
    pub async fn user(&self, name: &str) -> Result<Session, FsError> {
        let key = self
            .users
            .lock()
            .entry(name.to_string())
            .or_insert_with(|| SecretKey::generate(self.client.entropy()))
            .clone();
        self.client.ensure_signed_up(name, key).await
    }
}
