//! Records whose blob has disappeared from disk.

use crate::harness::{audit_request, download_request, public, TestNode};
use cas_node::{compute_hash, RequestError};

#[tokio::test]
async fn test_lost_file_reports_peers() {
    let node = TestNode::start().await;
    let hash = node.store(b"about to vanish", public()).await;
    tokio::fs::write(
        node.node.config().peers_file(),
        "203.0.113.7:4000\n203.0.113.8:4000\n",
    )
    .await
    .unwrap();

    let blob = node.node.content_store().blob_path(&hash).unwrap();
    tokio::fs::remove_file(blob).await.unwrap();

    let err = node
        .node
        .download(&download_request(&node.owner, &hash))
        .await
        .unwrap_err();
    match err {
        RequestError::LostFile { peers } => {
            assert_eq!(peers, vec!["203.0.113.7:4000", "203.0.113.8:4000"]);
        }
        other => panic!("expected lost file, got {other:?}"),
    }

    let err = node
        .node
        .audit(&audit_request(&node.owner, &hash, &compute_hash(b"seed")))
        .await
        .unwrap_err();
    assert!(matches!(err, RequestError::LostFile { .. }));

    let lost = node.node.find_lost_files().await.unwrap();
    assert_eq!(lost.len(), 1);
    assert_eq!(lost[0].hash, hash);
}

#[tokio::test]
async fn test_removing_lost_file_clears_record() {
    let node = TestNode::start().await;
    let hash = node.store(b"cleaned up", public()).await;
    let blob = node.node.content_store().blob_path(&hash).unwrap();
    tokio::fs::remove_file(blob).await.unwrap();

    assert!(node.node.remove_file(&hash).await.unwrap());
    assert!(node.node.find_lost_files().await.unwrap().is_empty());
    assert!(node.node.list_files().await.unwrap().is_empty());
    assert!(node.root().join("records.db").exists());
}
