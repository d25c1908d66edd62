/// Test harness for multi-user scenarios
///
/// Everything runs in process: the network is in memory, entropy is
/// seeded, and users are signed up on first use.
///
/// # Example
///
/// ```rust,ignore
/// use common::testkit::TestNetwork;
///
/// #[tokio::test]
/// async fn test_share() -> anyhow::Result<()> {
///     let net = TestNetwork::new().await?;
///     let alice = net.user("alice").await?;
///     let bob = net.user("bob").await?;
///
///     alice.create_file("/alice/a.txt", "hi").await?;
///     Ok(())
/// }
/// ```
mod faults;
mod network;

pub use faults::{Fault, FlakyBlockStore, FlakyPointerProvider};
pub use network::TestNetwork;
