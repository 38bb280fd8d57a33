//! Bandwidth, capacity, and persistence scenarios.

use crate::harness::{download_request, public, upload_request, TestNode};
use cas_node::crypto::Signer;
use cas_node::{compute_hash, Direction, ErrorCode};
use std::sync::Arc;

#[tokio::test]
async fn test_outgoing_limit_blocks_download() {
    let node = TestNode::start().await;
    let data = b"existing file data";
    let hash = node.store(data, public()).await;
    node.node.set_limits(None, Some(1)).await.unwrap();

    let err = node
        .node
        .download(&download_request(&node.owner, &hash))
        .await
        .unwrap_err();
    assert_eq!(err.code(), Some(ErrorCode::LimitReached));
    assert_eq!(node.node.state().current_usage(Direction::Outgoing), 0);
}

#[tokio::test]
async fn test_incoming_limit_blocks_upload() {
    let node = TestNode::start().await;
    node.node.set_limits(Some(10), None).await.unwrap();

    let data = b"eleven byte";
    let err = node.upload_as(&node.owner, data, public()).await.unwrap_err();
    assert_eq!(err.code(), Some(ErrorCode::LimitReached));
    assert!(node.node.list_files().await.unwrap().is_empty());

    node.node.reset_bandwidth().await.unwrap();
    node.node.set_limits(None, None).await.unwrap();
    node.store(data, public()).await;
}

#[tokio::test]
async fn test_capacity_bounds_each_file() {
    let node = TestNode::start_with(|config| config.capacity = 16).await;
    node.store(b"ten bytes!", public()).await;
    node.store(b"seven b", public()).await;

    let data = b"seventeen bytes!!";
    let err = node.upload_as(&node.owner, data, public()).await.unwrap_err();
    assert_eq!(err.code(), Some(ErrorCode::FullDisk));
    assert_eq!(node.node.state().current_usage(Direction::Incoming), 17);

    node.node.set_capacity(17).await.unwrap();
    node.store(data, public()).await;
}

#[tokio::test]
async fn test_huge_file_rejected() {
    let node = TestNode::start_with(|config| config.max_file_size = 8).await;

    let err = node
        .upload_as(&node.owner, b"nine byte", public())
        .await
        .unwrap_err();
    assert_eq!(err.code(), Some(ErrorCode::HugeFile));
    assert_eq!(node.node.state().current_usage(Direction::Incoming), 0);
}

#[tokio::test]
async fn test_state_survives_restart() {
    let node = TestNode::start().await;
    let hash = node.store(b"persistent", public()).await;
    node.node
        .download(&download_request(&node.owner, &hash))
        .await
        .expect("download");
    node.node.set_limits(Some(1000), Some(2000)).await.unwrap();

    let node = node.restart().await;
    let status = node.node.status().await.unwrap();
    assert_eq!(status.public_key, "test-node");
    assert_eq!(status.bandwidth.limits.incoming, Some(1000));
    assert_eq!(status.bandwidth.limits.outgoing, Some(2000));
    assert_eq!(status.bandwidth.current.incoming, 10);
    assert_eq!(status.bandwidth.current.outgoing, 10);
    assert_eq!(status.storage.used, 10);
    assert_eq!(node.node.list_files().await.unwrap(), vec![hash]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_duplicate_uploads_store_once() {
    let node = TestNode::start().await;
    let shared = Arc::new(node.node);
    let data = b"raced by many clients".to_vec();
    let hash = compute_hash(&data);

    let mut handles = Vec::new();
    for _ in 0..8 {
        let node = Arc::clone(&shared);
        let data = data.clone();
        let request = upload_request(&Signer::generate(), &hash, public());
        handles.push(tokio::spawn(async move {
            node.upload(&request, data.as_slice()).await
        }));
    }

    let mut stored = 0;
    for handle in handles {
        let receipt = handle.await.unwrap().expect("upload");
        assert_eq!(receipt.data_hash, hash);
        if receipt.stored {
            stored += 1;
        }
    }
    assert_eq!(stored, 1);
    assert_eq!(shared.list_files().await.unwrap(), vec![hash]);
    assert_eq!(shared.status().await.unwrap().storage.used, data.len() as u64);
}
