//! Shared test utilities for session integration tests
#![allow(dead_code)]

use std::sync::Arc;

use common::crypto::Secret;
use common::network::Network;
use common::pointer::{MemoryPointerProvider, PointerProvider};
use common::session::Session;
use common::store::{BlobsStore, IdentityRegistry, MemoryIdentityRegistry, MemoryInboxProvider};
use common::testkit::{FlakyPointerProvider, TestNetwork};
use tracing_subscriber::EnvFilter;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Set up an in-memory network
pub async fn setup_test_env() -> TestNetwork {
    init_tracing();
    TestNetwork::new().await.unwrap()
}

/// A memory network whose pointer updates can be made to conflict
pub async fn conflicting_network() -> (TestNetwork, Arc<FlakyPointerProvider>) {
    init_tracing();
    let blocks = Arc::new(BlobsStore::memory().await.unwrap());
    let identities: Arc<dyn IdentityRegistry> = Arc::new(MemoryIdentityRegistry::new());
    let inner: Arc<dyn PointerProvider> =
        Arc::new(MemoryPointerProvider::new(identities.clone()));
    let pointers = Arc::new(FlakyPointerProvider::new(inner));
    let network = Network::new(
        blocks,
        identities,
        pointers.clone(),
        Arc::new(MemoryInboxProvider::new()),
    );
    (TestNetwork::with_network(network), pointers)
}

/// Set up a network with a single signed up user
pub async fn setup_user(name: &str) -> (TestNetwork, Session) {
    let net = setup_test_env().await;
    let session = net.user(name).await.unwrap();
    (net, session)
}

/// `a` asks to follow `b`, who accepts and reciprocates, after which
///  each has a shared directory for the other and sees it mounted
pub async fn befriend(net: &TestNetwork, a: &Session, b: &Session) {
    let key = Secret::generate(net.client().entropy());
    a.send_follow_request(b.username(), key).await.unwrap();

    let requests = b.get_follow_requests().await.unwrap();
    let request = requests
        .iter()
        .find(|request| request.from == a.username())
        .expect("request from a");
    b.send_reply_follow_request(request, true, true)
        .await
        .unwrap();

    assert!(a.get_follow_requests().await.unwrap().is_empty());
}
