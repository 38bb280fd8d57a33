//! End-to-end tests for cas-node.
//!
//! Each test builds a complete [`cas_node::Node`] in a temporary root
//! directory, backed by SQLite, and drives it through the public API the way
//! a transport layer would.
//!
//! ## Architecture
//!
//! ```text
//! TestNode
//!     ├── Node (SQLite records, on-disk blobs, node.json)
//!     ├── owner: Signer (uploads by default)
//!     └── TempDir (removed on drop)
//! ```

#![allow(clippy::unwrap_used, clippy::expect_used)]

mod harness;

mod accounting;
mod audit;
mod lost_files;
mod transfers;
