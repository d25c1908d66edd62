//! Integration tests for conflict retries and transient failures

mod common;

use std::sync::Arc;
use std::time::Duration;

use ::common::config::Config;
use ::common::error::FsError;
use ::common::network::Network;
use ::common::store::{BlobsStore, BlockStore};
use ::common::testkit::{Fault, FlakyBlockStore, TestNetwork};

/// A memory network whose block store can be made to fail
async fn flaky_block_network(fault: Fault, config: Config) -> (TestNetwork, Arc<FlakyBlockStore>) {
    common::init_tracing();
    let inner: Arc<dyn BlockStore> = Arc::new(BlobsStore::memory().await.unwrap());
    let blocks = Arc::new(FlakyBlockStore::new(inner, fault));
    let network = Network::with_blocks(blocks.clone());
    (TestNetwork::with_config(network, config), blocks)
}

#[tokio::test]
async fn test_persistent_conflicts_give_up() {
    let (net, pointers) = common::conflicting_network().await;
    let alice = net.user("alice").await.unwrap();

    pointers.conflict_next(u32::MAX);
    let result = alice.create_file("/alice/a.txt", "a").await;
    assert!(matches!(result, Err(FsError::Conflict { attempts: 8 })));

    // nothing was published
    pointers.conflict_next(0);
    assert!(alice.get_by_path("/alice/a.txt").await.unwrap().is_none());
}

#[tokio::test]
async fn test_transient_conflicts_are_retried() {
    let (net, pointers) = common::conflicting_network().await;
    let alice = net.user("alice").await.unwrap();
    let before = alice.history("/alice").await.unwrap().len();

    pointers.conflict_next(3);
    alice.create_file("/alice/a.txt", "a").await.unwrap();

    assert_eq!(alice.read("/alice/a.txt").await.unwrap(), b"a");
    // losing attempts leave no versions behind
    assert_eq!(alice.history("/alice").await.unwrap().len(), before + 1);
}

#[tokio::test]
async fn test_unreachable_store_recovers() {
    let (net, blocks) = flaky_block_network(Fault::Unreachable, TestNetwork::config()).await;
    let alice = net.user("alice").await.unwrap();

    blocks.fail_next(3);
    alice.create_file("/alice/a.txt", "payload").await.unwrap();
    blocks.fail_next(3);
    assert_eq!(alice.read("/alice/a.txt").await.unwrap(), b"payload");
}

#[tokio::test]
async fn test_unreachable_store_gives_up() {
    let (net, blocks) = flaky_block_network(Fault::Unreachable, TestNetwork::config()).await;
    let alice = net.user("alice").await.unwrap();
    alice.create_file("/alice/a.txt", "payload").await.unwrap();

    blocks.fail_next(u32::MAX);
    let result = alice.read("/alice/a.txt").await;
    assert!(matches!(result, Err(FsError::Conflict { attempts: 8 })));
}

#[tokio::test]
async fn test_stalled_store_times_out_and_recovers() {
    let config = Config {
        request_timeout: Duration::from_millis(100),
        ..TestNetwork::config()
    };
    let (net, blocks) = flaky_block_network(Fault::Stall(Duration::from_secs(2)), config).await;
    let alice = net.user("alice").await.unwrap();
    alice.create_file("/alice/a.txt", "payload").await.unwrap();

    blocks.fail_next(2);
    assert_eq!(alice.read("/alice/a.txt").await.unwrap(), b"payload");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_concurrent_appends_all_land() {
    let (net, alice) = common::setup_user("alice").await;
    alice.create_file("/alice/log", "").await.unwrap();
    let other = net.user("alice").await.unwrap();

    let writer = |session: ::common::session::Session, line: &'static str| async move {
        for _ in 0..5 {
            session.append("/alice/log", line).await.unwrap();
        }
    };
    tokio::join!(writer(alice.clone(), "a\n"), writer(other, "b\n"));

    let data = alice.read("/alice/log").await.unwrap();
    let text = String::from_utf8(data).unwrap();
    assert_eq!(text.lines().filter(|line| *line == "a").count(), 5);
    assert_eq!(text.lines().filter(|line| *line == "b").count(), 5);
    assert_eq!(text.len(), 20);
}
