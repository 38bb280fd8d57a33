//! Upload and download scenarios.

use crate::harness::{
    download_request, encrypted, private, public, read_all, upload_request, TestNode,
};
use cas_node::crypto::{ConvergentCodec, Signer};
use cas_node::{compute_hash, DownloadRequest, ErrorCode, RequestError};

#[tokio::test]
async fn test_upload_then_download() {
    let node = TestNode::start().await;
    let data = b"hello from the e2e suite";
    let hash = node.store(data, public()).await;

    let download = node
        .node
        .download(&download_request(&node.owner, &hash))
        .await
        .expect("download");
    assert_eq!(download.size, data.len() as u64);
    assert_eq!(read_all(download).await, data);
    assert_eq!(node.node.list_files().await.unwrap(), vec![hash]);
}

#[tokio::test]
async fn test_unknown_hash_not_found() {
    let node = TestNode::start().await;
    let hash = compute_hash(b"never uploaded");

    let err = node
        .node
        .download(&download_request(&node.owner, &hash))
        .await
        .unwrap_err();
    assert_eq!(err.code(), Some(ErrorCode::NotFound));
}

#[tokio::test]
async fn test_mismatched_hash_creates_no_record() {
    let node = TestNode::start().await;
    let claimed = compute_hash(b"what the client claims");
    let request = upload_request(&node.owner, &claimed, public());

    let err = node
        .node
        .upload(&request, &b"what the client sends"[..])
        .await
        .unwrap_err();
    assert_eq!(err.code(), Some(ErrorCode::MismatchedHash));
    assert!(node.node.list_files().await.unwrap().is_empty());
    assert!(!node.node.content_store().exists(&claimed).await);

    let status = node.node.status().await.unwrap();
    assert_eq!(status.storage.used, 0);
    assert_eq!(status.bandwidth.current.incoming, 0);
}

#[tokio::test]
async fn test_repeated_upload_keeps_existing_role() {
    let node = TestNode::start().await;
    let data = b"uploaded twice";
    let hash = node.store(data, private()).await;
    let other = Signer::generate();

    let receipt = node.upload_as(&other, data, public()).await.expect("upload");
    assert!(!receipt.stored);
    assert_eq!(receipt.data_hash, hash);
    assert_eq!(receipt.file_role, private());

    let status = node.node.status().await.unwrap();
    assert_eq!(status.bandwidth.total.incoming, data.len() as u64);
    assert_eq!(node.node.content_store().stats().blobs_stored, 1);
}

#[tokio::test]
async fn test_private_file_hidden_from_others() {
    let node = TestNode::start().await;
    let hash = node.store(b"owner eyes only", private()).await;
    let stranger = Signer::generate();

    let err = node
        .node
        .download(&download_request(&stranger, &hash))
        .await
        .unwrap_err();
    assert_eq!(err.code(), Some(ErrorCode::NotFound));

    let err = node
        .node
        .download(&DownloadRequest::anonymous(hash.clone()))
        .await
        .unwrap_err();
    assert_eq!(err.code(), Some(ErrorCode::NotFound));

    let download = node
        .node
        .download(&download_request(&node.owner, &hash))
        .await
        .expect("owner download");
    assert_eq!(read_all(download).await, b"owner eyes only");
}

#[tokio::test]
async fn test_anonymous_download_of_encrypted_public_file() {
    let node = TestNode::start().await;
    let plain = node.store(b"plain public", public()).await;
    let (_, blob) = ConvergentCodec::encrypt(b"sealed public").unwrap();
    let sealed = node.store(&blob, encrypted()).await;

    let err = node
        .node
        .download(&DownloadRequest::anonymous(plain))
        .await
        .unwrap_err();
    assert_eq!(err.code(), Some(ErrorCode::NotFound));

    let download = node
        .node
        .download(&DownloadRequest::anonymous(sealed))
        .await
        .expect("anonymous download");
    assert_eq!(read_all(download).await, blob);
}

#[tokio::test]
async fn test_encrypted_download_with_key() {
    let node = TestNode::start().await;
    let plaintext: Vec<u8> = (0..200_000u32).map(|i| (i % 251) as u8).collect();
    let (key, blob) = ConvergentCodec::encrypt(&plaintext).unwrap();
    let hash = node.store(&blob, encrypted()).await;

    let mut request = download_request(&node.owner, &hash);
    request.decryption_key = Some(hex::encode(key));
    let download = node.node.download(&request).await.expect("decrypt");
    assert_eq!(read_all(download).await, plaintext);

    let status = node.node.status().await.unwrap();
    assert_eq!(status.bandwidth.current.outgoing, blob.len() as u64);
}

#[tokio::test]
async fn test_encrypted_download_with_wrong_key() {
    let node = TestNode::start().await;
    let (_, blob) = ConvergentCodec::encrypt(b"secret payload").unwrap();
    let hash = node.store(&blob, encrypted()).await;

    let mut request = download_request(&node.owner, &hash);
    request.decryption_key = Some(hex::encode([7u8; 32]));
    let err = node.node.download(&request).await.unwrap_err();
    assert_eq!(err.code(), Some(ErrorCode::InvalidDecryptionKey));

    request.decryption_key = Some("not hex".to_string());
    let err = node.node.download(&request).await.unwrap_err();
    assert_eq!(err.code(), Some(ErrorCode::InvalidDecryptionKey));

    let status = node.node.status().await.unwrap();
    assert_eq!(status.bandwidth.current.outgoing, 0);
}

#[tokio::test]
async fn test_decryption_key_on_plaintext_file() {
    let node = TestNode::start().await;
    let hash = node.store(b"plaintext", public()).await;

    let mut request = download_request(&node.owner, &hash);
    request.decryption_key = Some(hex::encode([1u8; 32]));
    let err = node.node.download(&request).await.unwrap_err();
    assert_eq!(err.code(), Some(ErrorCode::NotFound));
}

#[tokio::test]
async fn test_blacklisted_file_hidden_after_reload() {
    let node = TestNode::start().await;
    let hash = node.store(b"revoked later", public()).await;

    tokio::fs::write(node.node.config().blacklist_file(), format!("{hash}\n"))
        .await
        .unwrap();
    node.node.reload_blacklist().await.unwrap();

    let err = node
        .node
        .download(&download_request(&node.owner, &hash))
        .await
        .unwrap_err();
    assert!(matches!(err, RequestError::Blacklisted));
    assert_eq!(err.http_status(), 404);
    assert!(node.node.list_files().await.unwrap().is_empty());
}
