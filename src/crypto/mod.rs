//! Cryptographic collaborators of the node.
//!
//! - [`SignatureVerifier`]: proves that a sender address signed a content
//!   hash. [`Ed25519Verifier`] is the shipped implementation.
//! - [`DecryptCodec`]: lazily decrypts a convergent-encrypted blob.
//!   [`ConvergentCodec`] is the shipped implementation.

pub mod convergence;
pub mod signature;

pub use convergence::{ConvergentCodec, DecryptCodec};
pub use signature::{Ed25519Verifier, SignatureVerifier, Signer};
