//! Ed25519 sender signatures.
//!
//! An address is the hex-encoded 32-byte verifying key. A signature is the
//! hex-encoded 64-byte Ed25519 signature over the UTF-8 bytes of the message
//! (for node requests, the content hash string).

use crate::error::{Error, Result};
use ed25519_dalek::{Signature, Signer as _, SigningKey, Verifier as _, VerifyingKey};

/// Verifies that an address produced a signature over a message.
pub trait SignatureVerifier: Send + Sync {
    /// Return `true` iff `signature` is valid for `message` under `address`.
    ///
    /// Malformed addresses or signatures are simply invalid.
    fn verify(&self, address: &str, signature: &str, message: &str) -> bool;
}

/// [`SignatureVerifier`] for hex-encoded Ed25519 keys and signatures.
#[derive(Debug, Clone, Copy, Default)]
pub struct Ed25519Verifier;

impl SignatureVerifier for Ed25519Verifier {
    fn verify(&self, address: &str, signature: &str, message: &str) -> bool {
        let Some(key_bytes) = decode_fixed::<32>(address) else {
            return false;
        };
        let Some(sig_bytes) = decode_fixed::<64>(signature) else {
            return false;
        };
        let Ok(key) = VerifyingKey::from_bytes(&key_bytes) else {
            return false;
        };
        let signature = Signature::from_bytes(&sig_bytes);
        key.verify(message.as_bytes(), &signature).is_ok()
    }
}

fn decode_fixed<const N: usize>(value: &str) -> Option<[u8; N]> {
    let bytes = hex::decode(value).ok()?;
    bytes.try_into().ok()
}

/// Signing half, used by clients and tests. The node never signs.
pub struct Signer {
    key: SigningKey,
}

impl Signer {
    /// Generate a fresh random key.
    #[must_use]
    pub fn generate() -> Self {
        let secret: [u8; 32] = rand::random();
        Self {
            key: SigningKey::from_bytes(&secret),
        }
    }

    /// Load a key from its hex-encoded 32-byte secret.
    ///
    /// # Errors
    ///
    /// Returns an error if the value is not 64 hex characters.
    pub fn from_secret_hex(secret: &str) -> Result<Self> {
        let bytes = decode_fixed::<32>(secret.trim())
            .ok_or_else(|| Error::Crypto("secret key must be 32 hex-encoded bytes".to_string()))?;
        Ok(Self {
            key: SigningKey::from_bytes(&bytes),
        })
    }

    /// Hex-encoded secret key.
    #[must_use]
    pub fn secret_hex(&self) -> String {
        hex::encode(self.key.to_bytes())
    }

    /// Address (hex-encoded verifying key) of this signer.
    #[must_use]
    pub fn address(&self) -> String {
        hex::encode(self.key.verifying_key().to_bytes())
    }

    /// Hex-encoded signature over `message`.
    #[must_use]
    pub fn sign(&self, message: &str) -> String {
        hex::encode(self.key.sign(message.as_bytes()).to_bytes())
    }
}

impl std::fmt::Debug for Signer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Signer")
            .field("address", &self.address())
            .finish_non_exhaustive()
    }
}
