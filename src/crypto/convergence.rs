//! Convergent encryption for stored blobs.
//!
//! The convergent key of a file is `SHA256(plaintext)`, so identical files
//! encrypt to identical blobs and deduplicate under content addressing. The
//! AES-256-GCM-SIV cipher key is derived from the convergent key with
//! HKDF-SHA256.
//!
//! ## Blob Format
//!
//! The plaintext is split into 64 KiB chunks, each sealed separately so the
//! blob can be decrypted as a stream:
//!
//! ```text
//! frame := flag (1 byte, 1 = final) | len (u32 BE) | ciphertext + tag
//! nonce := chunk index (u64 BE) | flag | 0 0 0
//! ```
//!
//! Every blob ends with exactly one final frame (empty plaintext still
//! produces one). A wrong key fails authentication on the first frame, which
//! is what lets callers detect it before streaming anything.

use crate::error::{Error, Result};
use crate::storage::BlobStream;
use aes_gcm_siv::{
    aead::{Aead, KeyInit},
    Aes256GcmSiv, Nonce,
};
use async_trait::async_trait;
use bytes::Bytes;
use hkdf::Hkdf;
use sha2::{Digest, Sha256};
use std::io;
use std::path::Path;
use tokio::io::{AsyncReadExt, BufReader};

/// Convergent key size (32 bytes).
pub const KEY_SIZE: usize = 32;

/// Plaintext bytes per frame.
pub const CHUNK_SIZE: usize = 64 * 1024;

/// AEAD tag size.
const TAG_SIZE: usize = 16;

/// Frame header: flag + length.
const HEADER_SIZE: usize = 5;

const KEY_INFO: &[u8] = b"cas-node-convergent-v1";

/// Opens decrypting streams over stored blobs.
#[async_trait]
pub trait DecryptCodec: Send + Sync {
    /// Open a lazily-decrypting stream over the blob at `path`.
    ///
    /// A key of the wrong shape fails here with
    /// [`io::ErrorKind::InvalidInput`]. A key that does not decrypt the blob
    /// is only detected when the first chunk is pulled, which then yields an
    /// [`io::ErrorKind::InvalidData`] error.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or the key is malformed.
    async fn open_decrypt_stream(&self, path: &Path, key: &[u8]) -> io::Result<BlobStream>;
}

/// Chunked AES-256-GCM-SIV convergent codec.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConvergentCodec;

impl ConvergentCodec {
    /// Encrypt `plaintext` under its convergent key.
    ///
    /// Returns the key and the encrypted blob.
    ///
    /// # Errors
    ///
    /// Returns an error if encryption fails.
    pub fn encrypt(plaintext: &[u8]) -> Result<([u8; KEY_SIZE], Vec<u8>)> {
        let key: [u8; KEY_SIZE] = Sha256::digest(plaintext).into();
        let blob = Self::encrypt_with_key(plaintext, &key)?;
        Ok((key, blob))
    }

    /// Encrypt `plaintext` under an explicit key.
    ///
    /// # Errors
    ///
    /// Returns an error if key derivation or encryption fails.
    pub fn encrypt_with_key(plaintext: &[u8], key: &[u8; KEY_SIZE]) -> Result<Vec<u8>> {
        let cipher = derive_cipher(key).map_err(|e| Error::Crypto(e.to_string()))?;

        let chunks: Vec<&[u8]> = if plaintext.is_empty() {
            vec![&[]]
        } else {
            plaintext.chunks(CHUNK_SIZE).collect()
        };
        let last_index = chunks.len() - 1;

        let mut blob = Vec::with_capacity(plaintext.len() + chunks.len() * (HEADER_SIZE + TAG_SIZE));
        for (index, chunk) in chunks.into_iter().enumerate() {
            let last = index == last_index;
            let nonce = frame_nonce(index as u64, last);
            let sealed = cipher
                .encrypt(Nonce::from_slice(&nonce), chunk)
                .map_err(|e| Error::Crypto(format!("Encryption failed: {e}")))?;
            let len = u32::try_from(sealed.len())
                .map_err(|_| Error::Crypto("frame too large".to_string()))?;

            blob.push(u8::from(last));
            blob.extend_from_slice(&len.to_be_bytes());
            blob.extend_from_slice(&sealed);
        }
        Ok(blob)
    }
}

#[async_trait]
impl DecryptCodec for ConvergentCodec {
    async fn open_decrypt_stream(&self, path: &Path, key: &[u8]) -> io::Result<BlobStream> {
        let key: &[u8; KEY_SIZE] = key.try_into().map_err(|_| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("convergent key must be {KEY_SIZE} bytes, got {}", key.len()),
            )
        })?;
        let cipher = derive_cipher(key)?;
        let file = tokio::fs::File::open(path).await?;

        let state = DecryptState {
            reader: BufReader::new(file),
            cipher,
            index: 0,
            done: false,
        };
        Ok(Box::pin(futures::stream::try_unfold(state, next_frame)))
    }
}

struct DecryptState {
    reader: BufReader<tokio::fs::File>,
    cipher: Aes256GcmSiv,
    index: u64,
    done: bool,
}

async fn next_frame(mut state: DecryptState) -> io::Result<Option<(Bytes, DecryptState)>> {
    if state.done {
        return Ok(None);
    }

    let mut header = [0u8; HEADER_SIZE];
    state
        .reader
        .read_exact(&mut header)
        .await
        .map_err(truncated)?;

    let last = match header[0] {
        0 => false,
        1 => true,
        flag => return Err(invalid_data(format!("bad frame flag {flag}"))),
    };
    let len = u32::from_be_bytes([header[1], header[2], header[3], header[4]]) as usize;
    if len < TAG_SIZE || len > CHUNK_SIZE + TAG_SIZE {
        return Err(invalid_data(format!("bad frame length {len}")));
    }

    let mut sealed = vec![0u8; len];
    state.reader.read_exact(&mut sealed).await.map_err(truncated)?;

    let nonce = frame_nonce(state.index, last);
    let plaintext = state
        .cipher
        .decrypt(Nonce::from_slice(&nonce), sealed.as_ref())
        .map_err(|_| invalid_data(format!("decryption failed at chunk {}", state.index)))?;

    state.index += 1;
    state.done = last;
    Ok(Some((Bytes::from(plaintext), state)))
}

fn derive_cipher(key: &[u8; KEY_SIZE]) -> io::Result<Aes256GcmSiv> {
    let mut okm = [0u8; KEY_SIZE];
    Hkdf::<Sha256>::new(None, key)
        .expand(KEY_INFO, &mut okm)
        .map_err(|e| invalid_data(format!("HKDF expansion failed: {e}")))?;
    Aes256GcmSiv::new_from_slice(&okm).map_err(|e| invalid_data(format!("bad cipher key: {e}")))
}

fn frame_nonce(index: u64, last: bool) -> [u8; 12] {
    let mut nonce = [0u8; 12];
    nonce[..8].copy_from_slice(&index.to_be_bytes());
    nonce[8] = u8::from(last);
    nonce
}

fn invalid_data(message: String) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, message)
}

fn truncated(err: io::Error) -> io::Error {
    if err.kind() == io::ErrorKind::UnexpectedEof {
        invalid_data("truncated ciphertext".to_string())
    } else {
        err
    }
}
