//! Integration tests for sharing and revoking access

mod common;

use ::common::error::FsError;

const CONTENT: &str = "Hello Peergos friend!\n";
const SUFFIX: &str = "Some new data at the end\n";

#[tokio::test]
async fn test_share_and_unshare_file() {
    let net = common::setup_test_env().await;
    let a = net.user("a").await.unwrap();
    let b = net.user("b").await.unwrap();
    let c = net.user("c").await.unwrap();
    common::befriend(&net, &a, &b).await;
    common::befriend(&net, &a, &c).await;

    a.upload("/a/file", CONTENT).await.unwrap();
    assert_eq!(CONTENT.len(), 22);
    a.share("/a/file", &["b", "c"]).await.unwrap();

    assert_eq!(b.read("/a/shared/b/file").await.unwrap(), CONTENT.as_bytes());
    assert_eq!(c.read("/a/shared/c/file").await.unwrap(), CONTENT.as_bytes());
    // the owner's path is unchanged by sharing
    assert_eq!(a.read("/a/file").await.unwrap(), CONTENT.as_bytes());

    a.unshare("/a/file", "b").await.unwrap();
    a.append("/a/file", SUFFIX).await.unwrap();

    let expected = format!("{}{}", CONTENT, SUFFIX);
    assert_eq!(expected.len(), 47);
    let info = c.get_by_path("/a/shared/c/file").await.unwrap().unwrap();
    assert_eq!(info.size(), 47);
    assert_eq!(c.read("/a/shared/c/file").await.unwrap(), expected.as_bytes());

    let a_again = net.user("a").await.unwrap();
    assert_eq!(a_again.read("/a/file").await.unwrap(), expected.as_bytes());

    assert!(b.get_by_path("/a/shared/b/file").await.unwrap().is_none());
    let b_again = net.user("b").await.unwrap();
    assert!(b_again.get_by_path("/a/shared/b/file").await.unwrap().is_none());
}

#[tokio::test]
async fn test_share_and_unshare_folder() {
    let net = common::setup_test_env().await;
    let a = net.user("a").await.unwrap();
    let b = net.user("b").await.unwrap();
    let c = net.user("c").await.unwrap();
    common::befriend(&net, &a, &b).await;
    common::befriend(&net, &a, &c).await;

    a.create_file("/a/folder/doc.txt", CONTENT).await.unwrap();
    a.share("/a/folder", &["b", "c"]).await.unwrap();
    assert_eq!(
        b.read("/a/shared/b/folder/doc.txt").await.unwrap(),
        CONTENT.as_bytes()
    );

    // writes below a shared folder are published to its recipients
    a.create_file("/a/folder/later.txt", "later").await.unwrap();
    assert_eq!(b.read("/a/shared/b/folder/later.txt").await.unwrap(), b"later");
    let names: Vec<_> = c
        .children("/a/shared/c/folder")
        .await
        .unwrap()
        .into_iter()
        .map(|child| child.name)
        .collect();
    assert_eq!(names, vec!["doc.txt".to_string(), "later.txt".to_string()]);

    a.unshare("/a/folder", "b").await.unwrap();
    a.append("/a/folder/doc.txt", SUFFIX).await.unwrap();

    assert!(b.get_by_path("/a/shared/b/folder").await.unwrap().is_none());
    assert!(b
        .get_by_path("/a/shared/b/folder/doc.txt")
        .await
        .unwrap()
        .is_none());
    assert_eq!(
        c.read("/a/shared/c/folder/doc.txt").await.unwrap().len(),
        47
    );
    assert_eq!(a.read("/a/folder/later.txt").await.unwrap(), b"later");
}

#[tokio::test]
async fn test_unshare_leaves_siblings() {
    let net = common::setup_test_env().await;
    let a = net.user("a").await.unwrap();
    let b = net.user("b").await.unwrap();
    common::befriend(&net, &a, &b).await;

    a.create_file("/a/one.txt", "one").await.unwrap();
    a.create_file("/a/two.txt", "two").await.unwrap();
    a.share("/a/one.txt", &["b"]).await.unwrap();
    a.share("/a/two.txt", &["b"]).await.unwrap();

    a.unshare("/a/one.txt", "b").await.unwrap();
    a.upload("/a/one.txt", "one, revised").await.unwrap();

    assert!(b.get_by_path("/a/shared/b/one.txt").await.unwrap().is_none());
    assert_eq!(b.read("/a/shared/b/two.txt").await.unwrap(), b"two");
    assert_eq!(a.read("/a/one.txt").await.unwrap(), b"one, revised");
}

#[tokio::test]
async fn test_share_requires_follower() {
    let net = common::setup_test_env().await;
    let a = net.user("a").await.unwrap();
    let _b = net.user("b").await.unwrap();

    a.create_file("/a/file", CONTENT).await.unwrap();
    let result = a.share("/a/file", &["b"]).await;
    assert!(matches!(result, Err(FsError::NotFollower(_))));

    let result = a.share("/a/missing", &["b"]).await;
    assert!(matches!(result, Err(FsError::PathNotFound(_))));
}

#[tokio::test]
async fn test_unshare_requires_shared_item() {
    let net = common::setup_test_env().await;
    let a = net.user("a").await.unwrap();
    let b = net.user("b").await.unwrap();
    common::befriend(&net, &a, &b).await;

    a.create_file("/a/private.txt", "mine").await.unwrap();
    let result = a.unshare("/a/private.txt", "b").await;
    assert!(matches!(result, Err(FsError::NotShared(_))));
}

#[tokio::test]
async fn test_share_name_clash() {
    let net = common::setup_test_env().await;
    let a = net.user("a").await.unwrap();
    let b = net.user("b").await.unwrap();
    common::befriend(&net, &a, &b).await;

    a.create_file("/a/x/notes", "x").await.unwrap();
    a.create_file("/a/y/notes", "y").await.unwrap();
    a.share("/a/x/notes", &["b"]).await.unwrap();
    // sharing the same item again is a no-op
    a.share("/a/x/notes", &["b"]).await.unwrap();

    let result = a.share("/a/y/notes", &["b"]).await;
    assert!(matches!(result, Err(FsError::PathAlreadyExists(_))));
    assert_eq!(b.read("/a/shared/b/notes").await.unwrap(), b"x");
}

#[tokio::test]
async fn test_recipient_cannot_write() {
    let net = common::setup_test_env().await;
    let a = net.user("a").await.unwrap();
    let b = net.user("b").await.unwrap();
    common::befriend(&net, &a, &b).await;

    a.create_file("/a/file", CONTENT).await.unwrap();
    a.share("/a/file", &["b"]).await.unwrap();

    let result = b.append("/a/shared/b/file", SUFFIX).await;
    assert!(matches!(result, Err(FsError::Unauthorized(_))));
    assert_eq!(a.read("/a/file").await.unwrap(), CONTENT.as_bytes());
}

#[tokio::test]
async fn test_interrupted_unshare_can_be_rerun() {
    let (net, pointers) = common::conflicting_network().await;
    let a = net.user("a").await.unwrap();
    let b = net.user("b").await.unwrap();
    let c = net.user("c").await.unwrap();
    common::befriend(&net, &a, &b).await;
    common::befriend(&net, &a, &c).await;

    a.upload("/a/file", CONTENT).await.unwrap();
    a.share("/a/file", &["b", "c"]).await.unwrap();

    // the item's key is rotated, then rekeying its parent entry fails
    pointers.conflict_after(1, u32::MAX);
    let result = a.unshare("/a/file", "b").await;
    assert!(matches!(result, Err(FsError::Conflict { .. })));

    pointers.conflict_next(0);
    assert_eq!(a.read("/a/file").await.unwrap(), CONTENT.as_bytes());
    assert!(c.get_by_path("/a/shared/c/file").await.unwrap().is_none());

    a.unshare("/a/file", "b").await.unwrap();
    assert_eq!(c.read("/a/shared/c/file").await.unwrap(), CONTENT.as_bytes());
    assert!(b.get_by_path("/a/shared/b/file").await.unwrap().is_none());
    assert_eq!(a.read("/a/file").await.unwrap(), CONTENT.as_bytes());
}
