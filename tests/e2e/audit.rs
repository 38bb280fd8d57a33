//! Audit challenge scenarios.

use crate::harness::{audit_request, private, public, TestNode};
use cas_node::crypto::Signer;
use cas_node::{compute_hash, Direction, ErrorCode};

#[tokio::test]
async fn test_audit_existing_file() {
    let node = TestNode::start().await;
    let data = b"existing file data";
    let hash = node.store(data, public()).await;
    let seed = compute_hash(b"seed");

    let proof = node
        .node
        .audit(&audit_request(&node.owner, &hash, &seed))
        .await
        .expect("audit");

    let mut challenge = data.to_vec();
    challenge.extend_from_slice(seed.as_bytes());
    assert_eq!(proof.challenge_response, compute_hash(&challenge));
    assert_eq!(proof.data_hash, hash);
}

#[tokio::test]
async fn test_audit_limit_per_requester_class() {
    let node = TestNode::start_with(|config| {
        config.audit.owner = 2;
        config.audit.other = 1;
    })
    .await;
    let hash = node.store(b"audited often", public()).await;
    let seed = compute_hash(b"seed");
    let auditor = Signer::generate();

    for _ in 0..2 {
        node.node
            .audit(&audit_request(&node.owner, &hash, &seed))
            .await
            .expect("owner audit");
    }
    let err = node
        .node
        .audit(&audit_request(&node.owner, &hash, &seed))
        .await
        .unwrap_err();
    assert_eq!(err.code(), Some(ErrorCode::LimitReached));

    node.node
        .audit(&audit_request(&auditor, &hash, &seed))
        .await
        .expect("first foreign audit");
    let err = node
        .node
        .audit(&audit_request(&auditor, &hash, &seed))
        .await
        .unwrap_err();
    assert_eq!(err.code(), Some(ErrorCode::LimitReached));

    assert_eq!(node.node.state().current_usage(Direction::Outgoing), 0);
}

#[tokio::test]
async fn test_audit_rejects_bad_seed_and_signature() {
    let node = TestNode::start().await;
    let hash = node.store(b"challenge me", public()).await;

    let err = node
        .node
        .audit(&audit_request(&node.owner, &hash, "short"))
        .await
        .unwrap_err();
    assert_eq!(err.code(), Some(ErrorCode::InvalidSeed));

    let mut request = audit_request(&node.owner, &hash, &compute_hash(b"seed"));
    request.signature = Some(Signer::generate().sign(&hash));
    let err = node.node.audit(&request).await.unwrap_err();
    assert_eq!(err.code(), Some(ErrorCode::InvalidSignature));
}

#[tokio::test]
async fn test_audit_private_file_by_stranger() {
    let node = TestNode::start().await;
    let hash = node.store(b"private audit target", private()).await;

    let err = node
        .node
        .audit(&audit_request(&Signer::generate(), &hash, &compute_hash(b"seed")))
        .await
        .unwrap_err();
    assert_eq!(err.code(), Some(ErrorCode::NotFound));
}
